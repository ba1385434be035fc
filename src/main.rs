use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cache;
mod catalog;
mod config;
mod error;
mod llm;
mod models;
mod playlist;
mod profile;
mod stats_store;
mod trace;


use crate::cache::{InMemoryCache, RequesterIdentity};
use crate::catalog::{CatalogApi, HttpCatalogClient};
use crate::config::{PipelineConfig, load_service_config};
use crate::llm::HttpLlmClient;
use crate::models::GenerationPayload;
use crate::playlist::scoring::create_playlist_with_tracks;
use crate::playlist::{GenerateRequest, PlaylistGenerator};
use crate::profile::ProfileCache;
use crate::stats_store::MemoryStatSink;

#[derive(Parser)]
#[command(name = "promptlist")]
#[command(about = "Prompt-driven playlist generator for music catalog APIs")]
#[command(version)]
struct Args {
    /// Free-text playlist prompt, e.g. "rainy sunday jazz for reading"
    prompt: Vec<String>,

    /// Remix the generated playlist once before printing the final result
    #[arg(short = 'r', long = "remix")]
    remix: bool,

    /// Save the result to the catalog under this playlist name
    #[arg(short = 's', long = "save")]
    save: Option<String>,

    /// Path to a listening-profile snapshot JSON for personalization
    #[arg(short = 'p', long = "profile")]
    profile: Option<String>,

    /// Print the pipeline debug trace after the playlist
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// Quiet mode - reduce output verbosity
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

fn print_payload(payload: &GenerationPayload, quiet: bool) {
    println!("\n{}", payload.suggested_name);
    println!("{}", "=".repeat(payload.suggested_name.len().max(1)));
    if payload.playlist.is_empty() {
        println!("No tracks found for this prompt.");
    }
    for (index, entry) in payload.playlist.iter().enumerate() {
        println!("  {}. {entry}", index + 1);
    }

    let stats = &payload.stats;
    println!("\nPlaylist details:");
    println!(
        "   Tracks: {} | Duration: {} | Novelty: {:.0}%",
        stats.total_tracks, stats.total_duration, stats.novelty
    );
    if let Some(avg) = stats.avg_popularity {
        println!("   Avg popularity: {avg:.1}/100");
    }
    if !stats.genre_top.is_empty() {
        let top: Vec<String> = stats
            .genre_top
            .iter()
            .map(|share| format!("{} ({:.1}%)", share.genre, share.percentage))
            .collect();
        println!("   Top genres: {}", top.join(", "));
    }
    if !quiet && !stats.source_mix.is_empty() {
        let mix: Vec<String> = stats
            .source_mix
            .iter()
            .map(|entry| format!("{} {}", entry.count, entry.label))
            .collect();
        println!("   Source mix: {}", mix.join(", "));
    }
    if !payload.errors.is_empty() {
        println!("\nWarnings:");
        for warning in &payload.errors {
            println!("   ! {warning}");
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Error: a playlist prompt is required.");
        eprintln!("Usage: promptlist <prompt words...>");
        return Err(error::Error::EmptyPrompt.into());
    }

    let service = load_service_config()?;
    let Some(token) = service.catalog_token.clone() else {
        eprintln!("Error: CATALOG_ACCESS_TOKEN is not set; authenticate first.");
        return Err(error::Error::Unauthenticated.into());
    };

    let catalog = HttpCatalogClient::new(service.catalog_base_url.clone(), token);
    let llm = HttpLlmClient::new(
        service.llm_base_url.clone(),
        service.llm_api_key.clone(),
        service.llm_model.clone(),
    );
    let cache = InMemoryCache::new();
    let stat_sink = MemoryStatSink::new();

    // The CLI has no web session; the catalog user id (when resolvable)
    // scopes the cache, falling back to an anonymous identity.
    let catalog_user_id = catalog.current_user_id().ok();
    let identity = RequesterIdentity::resolve(None, catalog_user_id.as_deref(), "cli");

    let profile: Option<ProfileCache> = match &args.profile {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            let snapshot = serde_json::from_str(&content)?;
            if !args.quiet {
                println!("Loaded listening-profile snapshot from {path}");
            }
            Some(snapshot)
        }
        None => None,
    };

    let generator = PlaylistGenerator::new(
        &catalog,
        &llm,
        &cache,
        &stat_sink,
        PipelineConfig::default(),
    );

    if !args.quiet {
        println!("Generating playlist for: {prompt}");
    }
    let outcome = generator.generate(&GenerateRequest {
        prompt: &prompt,
        identity: identity.clone(),
        profile: profile.as_ref(),
    })?;
    let mut payload = outcome.payload;
    print_payload(&payload, args.quiet);

    if args.remix {
        if !args.quiet {
            println!("\nRemixing playlist...");
        }
        let remixed = generator.remix(&payload.cache_key, &identity, profile.as_ref())?;
        payload = remixed.payload;
        print_payload(&payload, args.quiet);
    }

    if args.debug {
        println!("\nDebug trace:");
        for step in &payload.debug_steps {
            println!("   {step}");
        }
    }

    if let Some(name) = &args.save {
        println!("\nSaving playlist '{name}' to the catalog...");
        match create_playlist_with_tracks(
            &catalog,
            &payload.track_ids,
            name,
            "",
            catalog_user_id.as_deref(),
            false,
        ) {
            Ok(created) => println!(
                "Created playlist '{}' with ID: {}",
                created.playlist_name, created.playlist_id
            ),
            Err(e) => {
                eprintln!("Failed to save playlist: {e}");
                return Err(e.into());
            }
        }
    }

    Ok(())
}

use std::collections::{HashMap, HashSet};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogApi, TRACK_ADD_CHUNK};
use crate::config::{PipelineConfig, ScoringWeights};
use crate::error::Error;
use crate::models::{Attributes, CreatedPlaylist, ResolvedTrack, SeedSource, TrackObject};
use crate::playlist::normalize::{
    filter_by_market, filter_non_latin, filter_tracks_by_artist_genre, normalize_genre,
};
use crate::playlist::seeds::mine_playlist_tracks;
use crate::profile::ProfileCache;
use crate::trace::DebugTrace;

/// Year span used for the recency-biased similarity search query.
const RECENT_YEAR_RANGE: &str = "2015-2025";

/// Longest playlist name the catalog accepts.
pub const PLAYLIST_NAME_MAX_LENGTH: usize = 100;

/// Per-channel contributions of the candidate score, exposed for
/// explainability. Every channel is a non-negative bonus except `novelty`,
/// which may penalize saturated artists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub popularity: f64,
    pub seed_overlap: f64,
    pub focus_artist: f64,
    pub keyword_match: f64,
    pub year_alignment: f64,
    pub energy_bias: f64,
    pub cache_track_hit: f64,
    pub cache_genre_alignment: f64,
    pub novelty: f64,
    pub total: f64,
}

/// Read-only inputs to the scoring heuristic. Every field degrades to a
/// neutral contribution when absent; the score is never undefined.
pub struct ScoreContext<'a> {
    pub seed_artist_ids: &'a HashSet<String>,
    pub focus_artist_ids: &'a HashSet<String>,
    pub target_year: Option<f64>,
    pub energy: Option<&'a str>,
    pub prompt_keywords: &'a HashSet<String>,
    pub profile: Option<&'a ProfileCache>,
    pub target_genre: Option<&'a str>,
    pub weights: &'a ScoringWeights,
}

/// A similarity candidate with its score and explainability breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTrack {
    pub track: ResolvedTrack,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Expected popularity band for an energy label. A coarse proxy: no audio
/// feature access is assumed at this layer.
fn energy_popularity_band(energy: &str) -> Option<std::ops::RangeInclusive<u32>> {
    match energy.trim().to_lowercase().as_str() {
        "high" => Some(65..=100),
        "medium" => Some(35..=80),
        "low" => Some(0..=50),
        _ => None,
    }
}

/// Weighted multi-factor heuristic over independent signal channels.
/// Returns the total score together with the per-channel breakdown.
pub fn score_track_basic(track: &TrackObject, ctx: &ScoreContext) -> (f64, ScoreBreakdown) {
    let weights = ctx.weights;
    let mut breakdown = ScoreBreakdown::default();

    // Unknown popularity is treated as middling rather than zero.
    let popularity = track.popularity.unwrap_or(40);
    breakdown.popularity = round4(popularity as f64 / 100.0 * weights.popularity_scale);
    let mut score = breakdown.popularity;

    let artist_ids: HashSet<String> = track.artist_ids().into_iter().collect();

    if !ctx.seed_artist_ids.is_empty() && !artist_ids.is_disjoint(ctx.seed_artist_ids) {
        breakdown.seed_overlap = round4(weights.seed_overlap);
        score += breakdown.seed_overlap;
    }

    if !ctx.focus_artist_ids.is_empty() && !artist_ids.is_disjoint(ctx.focus_artist_ids) {
        breakdown.focus_artist = round4(weights.focus_artist);
        score += breakdown.focus_artist;
    }

    if !ctx.prompt_keywords.is_empty() {
        let haystack = format!("{} {}", track.name, track.artist_credit()).to_lowercase();
        let hits = ctx
            .prompt_keywords
            .iter()
            .filter(|kw| haystack.contains(kw.as_str()))
            .count()
            .min(weights.keyword_hit_cap);
        breakdown.keyword_match = round4(hits as f64 * weights.keyword_hit);
        score += breakdown.keyword_match;
    }

    if let (Some(target_year), Some(candidate_year)) = (ctx.target_year, track.release_year()) {
        let distance = (candidate_year as f64 - target_year).abs();
        let window = ctx.weights.year_window;
        let alignment = ((window - distance) / (2.0 * window)).max(0.0);
        breakdown.year_alignment = round4(alignment * weights.year_alignment);
        score += breakdown.year_alignment;
    }

    if let (Some(energy), Some(popularity)) = (ctx.energy, track.popularity) {
        if let Some(band) = energy_popularity_band(energy) {
            if band.contains(&popularity) {
                breakdown.energy_bias = round4(weights.energy_bias);
                score += breakdown.energy_bias;
            }
        }
    }

    if let Some(profile) = ctx.profile {
        let track_id = track.id.as_deref().unwrap_or("");
        if !track_id.is_empty() && profile.knows_track(track_id) {
            breakdown.cache_track_hit = round4(weights.cache_track_hit);
            score += breakdown.cache_track_hit;
        }

        if let Some(genre) = ctx.target_genre {
            if !track_id.is_empty() && profile.genre_bucket_contains(genre, track_id) {
                breakdown.cache_genre_alignment = round4(weights.cache_genre_alignment);
                score += breakdown.cache_genre_alignment;
            }
        }

        // Diminishing returns on artists the listener is already saturated with.
        let mut novelty = 0.0;
        for artist_id in &artist_ids {
            novelty += match profile.artist_play_count(artist_id) {
                0 => weights.novelty_fresh,
                1..=2 => weights.novelty_light,
                3..=5 => weights.novelty_worn,
                _ => weights.novelty_saturated,
            };
        }
        breakdown.novelty = round4(novelty);
        score += breakdown.novelty;
    }

    let total = score.max(0.0);
    breakdown.total = round4(total);
    (total, breakdown)
}

/// Discover, score, and rank candidates similar to the seed set.
///
/// Cheap to call speculatively: an empty seed set returns immediately with
/// no catalog calls. Results are deduplicated against the seeds, sorted by
/// score (popularity breaks ties), and capped per artist.
#[allow(clippy::too_many_arguments)]
pub fn get_similar_tracks(
    catalog: &dyn CatalogApi,
    seed_track_ids: &[String],
    seed_artist_ids: &HashSet<String>,
    target_year: Option<f64>,
    attributes: &Attributes,
    prompt_keywords: &HashSet<String>,
    limit: usize,
    profile: Option<&ProfileCache>,
    focus_artist_ids: &HashSet<String>,
    config: &PipelineConfig,
    trace: &mut DebugTrace,
) -> Vec<ScoredTrack> {
    if seed_track_ids.is_empty() {
        trace.log("No seed track IDs available; skipping similarity search.");
        return Vec::new();
    }

    let canonical_genre = normalize_genre(if attributes.genre.trim().is_empty() {
        "pop"
    } else {
        &attributes.genre
    });

    let mut candidates = mine_playlist_tracks(
        catalog,
        &canonical_genre,
        config.mining_playlist_limit + 1,
        config.mining_track_limit,
        config,
        trace,
    );

    let mut queries = vec![format!("genre:\"{canonical_genre}\" year:{RECENT_YEAR_RANGE}")];
    if !attributes.mood.trim().is_empty() {
        queries.push(format!("\"{}\" {canonical_genre}", attributes.mood.trim()));
    }

    for query in &queries {
        let search_limit = ((limit * 4) as u32).min(50);
        let offset_cap = 100u32.saturating_sub(search_limit);
        let offset = if offset_cap > 0 {
            rand::thread_rng().gen_range(0..=offset_cap)
        } else {
            0
        };
        trace.log(format!(
            "Catalog search (similar): q='{query}', limit={search_limit}, market={}, offset={offset}",
            config.market
        ));
        match catalog.search_tracks(query, search_limit, Some(&config.market), offset) {
            Ok(tracks) => {
                let tracks = filter_by_market(tracks, &config.market);
                let tracks = filter_tracks_by_artist_genre(
                    catalog,
                    tracks,
                    &canonical_genre,
                    &config.normalizer,
                    trace,
                );
                let tracks = filter_non_latin(tracks, &config.normalizer);
                trace.log(format!(
                    "Search returned {} candidates for query '{query}'.",
                    tracks.len()
                ));
                candidates.extend(tracks);
            }
            Err(e) => {
                trace.log(format!("Catalog search error for '{query}': {e}."));
            }
        }
    }

    // Dedup against both the seed set and earlier candidates.
    let mut seen_ids: HashSet<String> = seed_track_ids.iter().cloned().collect();
    let mut unique_candidates: Vec<TrackObject> = Vec::new();
    for track in candidates {
        let Some(id) = track.id.clone() else { continue };
        if seen_ids.insert(id) {
            unique_candidates.push(track);
        }
    }
    trace.log(format!(
        "Similarity candidate pool size after filtering: {}.",
        unique_candidates.len()
    ));

    let ctx = ScoreContext {
        seed_artist_ids,
        focus_artist_ids,
        target_year,
        energy: Some(attributes.energy.as_str()),
        prompt_keywords,
        profile,
        target_genre: Some(canonical_genre.as_str()),
        weights: &config.scoring,
    };

    let mut scored: Vec<(f64, ScoreBreakdown, TrackObject)> = unique_candidates
        .into_iter()
        .map(|track| {
            let (score, breakdown) = score_track_basic(&track, &ctx);
            (score, breakdown, track)
        })
        .collect();
    trace.log(format!("Similarity engine scored {} candidates.", scored.len()));

    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.2.popularity.unwrap_or(0).cmp(&a.2.popularity.unwrap_or(0)))
    });

    let mut artist_counts: HashMap<String, usize> = HashMap::new();
    let mut recommendations: Vec<ScoredTrack> = Vec::new();
    for (score, breakdown, track) in scored {
        if recommendations.len() >= limit {
            break;
        }
        let artist_names: Vec<String> = track
            .artists
            .iter()
            .map(|artist| artist.name.clone())
            .filter(|name| !name.is_empty())
            .collect();
        if artist_names
            .iter()
            .any(|name| artist_counts.get(name).copied().unwrap_or(0) >= config.max_tracks_per_artist)
        {
            continue;
        }
        for name in &artist_names {
            *artist_counts.entry(name.clone()).or_insert(0) += 1;
        }
        recommendations.push(ScoredTrack {
            track: ResolvedTrack::from_track_object(&track, SeedSource::Similarity),
            score: round4(score),
            breakdown,
        });
    }

    trace.log(format!(
        "Similarity engine selected {} tracks.",
        recommendations.len()
    ));
    recommendations
}

/// Result of a successful playlist creation.
#[derive(Debug, Clone)]
pub struct CreatedPlaylistInfo {
    pub playlist_id: String,
    pub playlist_name: String,
    pub user_id: String,
}

/// Create a catalog playlist and add the tracks in chunks of
/// [`TRACK_ADD_CHUNK`] (the catalog's per-call item limit), preserving
/// track order across chunks.
pub fn create_playlist_with_tracks(
    catalog: &dyn CatalogApi,
    track_ids: &[String],
    playlist_name: &str,
    prefix: &str,
    user_id: Option<&str>,
    public: bool,
) -> Result<CreatedPlaylistInfo, Error> {
    if track_ids.is_empty() {
        return Err(Error::NoTracks);
    }
    let cleaned_name = playlist_name.trim();
    if cleaned_name.is_empty() {
        return Err(Error::InvalidPlaylistName("name must not be empty".to_string()));
    }
    let full_name = format!("{prefix}{cleaned_name}");
    if full_name.chars().count() > PLAYLIST_NAME_MAX_LENGTH {
        return Err(Error::InvalidPlaylistName(format!(
            "name must be {PLAYLIST_NAME_MAX_LENGTH} characters or fewer"
        )));
    }

    let resolved_user_id = match user_id {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => catalog
            .current_user_id()
            .map_err(|e| Error::Catalog(e.to_string()))?,
    };

    let created: CreatedPlaylist = catalog
        .create_playlist(&resolved_user_id, &full_name, public)
        .map_err(|e| Error::Catalog(e.to_string()))?;

    for chunk in track_ids.chunks(TRACK_ADD_CHUNK) {
        catalog
            .add_tracks(&created.id, chunk)
            .map_err(|e| Error::Catalog(format!("failed to add playlist items: {e}")))?;
    }

    Ok(CreatedPlaylistInfo {
        playlist_id: created.id,
        playlist_name: full_name,
        user_id: resolved_user_id,
    })
}

use std::collections::HashSet;

use chrono::Utc;

use crate::cache::{CacheStore, RequesterIdentity, cache_key, payload_owned_by};
use crate::catalog::CatalogApi;
use crate::config::PipelineConfig;
use crate::error::Error;
use crate::llm::{LlmDispatcher, extract_attributes, suggest_remix_tracks, suggest_seed_tracks};
use crate::models::{GenerationPayload, ResolvedTrack, SeedSource, TrackSuggestion};
use crate::playlist::naming::suggested_playlist_name;
use crate::playlist::scoring::get_similar_tracks;
use crate::playlist::seeds::{discover_top_tracks_for_genre, resolve_seed_tracks};
use crate::playlist::stats::compute_playlist_statistics;
use crate::playlist::trackset::OrderedTrackSet;
use crate::profile::{ProfileCache, cached_tracks_for_genre};
use crate::stats_store::{GenerationStat, StatSink};
use crate::trace::DebugTrace;

/// One generation request: the prompt plus the requester's identity and an
/// optional externally built listening-profile snapshot.
pub struct GenerateRequest<'a> {
    pub prompt: &'a str,
    pub identity: RequesterIdentity,
    pub profile: Option<&'a ProfileCache>,
}

/// Result of a generate or remix call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    pub payload: GenerationPayload,
    pub from_cache: bool,
}

/// Wires the pipeline stages into the end-to-end generate and remix flows,
/// with a content-addressed, user-owned payload cache in front.
pub struct PlaylistGenerator<'a> {
    catalog: &'a dyn CatalogApi,
    llm: &'a dyn LlmDispatcher,
    cache: &'a dyn CacheStore,
    stats: &'a dyn StatSink,
    config: PipelineConfig,
}

/// Keywords from the prompt used by the scoring engine: lowercase
/// alphanumeric tokens longer than two characters.
fn prompt_keywords(prompt: &str) -> HashSet<String> {
    prompt
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() > 2)
        .map(str::to_string)
        .collect()
}

fn seed_year_average(tracks: &[ResolvedTrack]) -> Option<f64> {
    let years: Vec<i32> = tracks.iter().filter_map(|track| track.year).collect();
    if years.is_empty() {
        None
    } else {
        Some(years.iter().map(|y| *y as f64).sum::<f64>() / years.len() as f64)
    }
}

fn seed_artist_ids(tracks: &[ResolvedTrack]) -> HashSet<String> {
    tracks
        .iter()
        .flat_map(|track| track.artist_ids.iter().cloned())
        .filter(|id| !id.is_empty())
        .collect()
}

fn format_cache_timeout(seconds: u64) -> String {
    if seconds % 60 == 0 {
        let minutes = seconds / 60;
        format!("{minutes} minute{}", if minutes == 1 { "" } else { "s" })
    } else {
        format!("{seconds} seconds")
    }
}

impl<'a> PlaylistGenerator<'a> {
    pub fn new(
        catalog: &'a dyn CatalogApi,
        llm: &'a dyn LlmDispatcher,
        cache: &'a dyn CacheStore,
        stats: &'a dyn StatSink,
        config: PipelineConfig,
    ) -> Self {
        Self {
            catalog,
            llm,
            cache,
            stats,
            config,
        }
    }

    /// Run the full prompt-to-playlist pipeline, or serve the cached payload
    /// when a valid, owned entry exists for this (user, prompt) pair.
    pub fn generate(&self, request: &GenerateRequest) -> Result<GenerationOutcome, Error> {
        let prompt = request.prompt.trim();
        if prompt.is_empty() {
            return Err(Error::EmptyPrompt);
        }

        self.llm.reset_usage();
        let mut trace = DebugTrace::new(self.config.capture_debug);
        trace.log(format!("Prompt received: {prompt}"));

        let key = cache_key(&request.identity.user_id, prompt);
        if let Some(cached) = self.cache.get(&key) {
            if payload_owned_by(&cached, &request.identity) {
                // Cache hit bypasses every downstream stage, including the
                // LLM calls; this is the primary cost-control mechanism.
                return Ok(GenerationOutcome {
                    payload: cached,
                    from_cache: true,
                });
            }
            tracing::warn!("cache ownership mismatch for key {key}; recomputing");
        }

        let attributes = extract_attributes(self.llm, prompt, &self.config, &mut trace);
        trace.log(format!("Attributes after normalization: {attributes:?}"));
        let canonical_genre =
            crate::playlist::normalize::normalize_genre(&attributes.genre);

        let mut seeds = OrderedTrackSet::new();

        // Listening-history seeds come first so known favorites win dedup ties.
        if let Some(profile) = request.profile {
            let cached_genre_tracks = cached_tracks_for_genre(profile, &canonical_genre, 5);
            if !cached_genre_tracks.is_empty() {
                trace.log(format!(
                    "User cache contributed {} seed tracks for genre '{canonical_genre}'.",
                    cached_genre_tracks.len()
                ));
                for track in cached_genre_tracks {
                    seeds.insert(track);
                }
            }
        }

        let mut llm_suggestions = suggest_seed_tracks(
            self.llm,
            prompt,
            &attributes,
            self.config.suggestion_cap,
            &mut trace,
        );
        let llm_seed_tracks = resolve_seed_tracks(
            self.catalog,
            &llm_suggestions,
            self.config.seed_limit,
            SeedSource::LlmSeed,
            &self.config,
            &mut trace,
        );
        let resolved_any_llm_seed = !llm_seed_tracks.is_empty();
        for track in llm_seed_tracks {
            seeds.insert(track);
        }

        if seeds.is_empty() {
            trace.log("Seed count below threshold; discovering top tracks from the catalog.");
            let discovered = discover_top_tracks_for_genre(
                self.catalog,
                &attributes.genre,
                self.config.seed_limit,
                &self.config,
                &mut trace,
            );
            if !discovered.is_empty() && !resolved_any_llm_seed {
                // Downstream consumers expect suggestions to mirror the
                // seeds actually used.
                llm_suggestions = discovered
                    .iter()
                    .map(|track| TrackSuggestion::new(track.name.clone(), track.artists.clone()))
                    .collect();
            }
            for track in discovered {
                seeds.insert(track);
            }
        } else if seeds.len() < self.config.seed_limit {
            trace.log(
                "Seed count below threshold but primary sources provided seeds; skipping genre discovery.",
            );
        }

        let resolved_seed_tracks: Vec<ResolvedTrack> = seeds.tracks().to_vec();
        let seed_track_display: Vec<String> = resolved_seed_tracks
            .iter()
            .map(ResolvedTrack::display)
            .collect();
        trace.log(format!(
            "Resolved seed tracks ({}): {seed_track_display:?}",
            seed_track_display.len()
        ));

        let seed_ids: Vec<String> = resolved_seed_tracks
            .iter()
            .map(|track| track.id.clone())
            .filter(|id| !id.is_empty())
            .collect();
        let artist_ids = seed_artist_ids(&resolved_seed_tracks);
        let year_avg = seed_year_average(&resolved_seed_tracks);
        let keywords = prompt_keywords(prompt);

        let mut final_tracks = seeds;
        let mut similar_display: Vec<String> = Vec::new();
        if seed_ids.is_empty() {
            trace.log("No seed track IDs resolved; skipping similarity search.");
        } else {
            let focus: HashSet<String> = HashSet::new();
            let similar = get_similar_tracks(
                self.catalog,
                &seed_ids,
                &artist_ids,
                year_avg,
                &attributes,
                &keywords,
                self.config.similar_limit,
                request.profile,
                &focus,
                &self.config,
                &mut trace,
            );
            trace.log(format!("Similarity engine produced {} tracks.", similar.len()));
            for scored in similar {
                if final_tracks.insert(scored.track.clone()) {
                    similar_display.push(scored.track.display());
                }
            }
        }

        let ordered_tracks = final_tracks.into_vec();
        trace.log(format!(
            "Final playlist ({} tracks) compiled from seeds and similar tracks.",
            ordered_tracks.len()
        ));

        let stats = compute_playlist_statistics(
            self.catalog,
            &ordered_tracks,
            request.profile,
            None,
            &self.config,
            &mut trace,
        );

        self.record_generation_stat(&request.identity, prompt, &ordered_tracks, &stats);

        let payload = self.assemble_payload(
            prompt,
            &key,
            &request.identity,
            attributes,
            ordered_tracks,
            resolved_seed_tracks,
            llm_suggestions,
            seed_track_display,
            similar_display,
            stats,
            trace,
        );

        Ok(GenerationOutcome {
            payload,
            from_cache: false,
        })
    }

    /// Regenerate the cached playlist in place, seeded by its current
    /// contents. The payload must belong to the requester; the same cache
    /// entry is overwritten, no new key is created.
    pub fn remix(
        &self,
        key: &str,
        identity: &RequesterIdentity,
        profile: Option<&ProfileCache>,
    ) -> Result<GenerationOutcome, Error> {
        let cached = self.cache.get(key).ok_or(Error::StalePayload)?;
        if !payload_owned_by(&cached, identity) {
            return Err(Error::StalePayload);
        }
        if cached.track_details.is_empty() {
            return Err(Error::NothingToRemix);
        }

        self.llm.reset_usage();
        let mut trace = DebugTrace::new(self.config.capture_debug);
        let prompt = cached.prompt.clone();
        let attributes = cached.attributes.clone();

        let target_count = cached.track_details.len();
        let seed_snapshot: Vec<String> = cached
            .track_details
            .iter()
            .map(ResolvedTrack::display)
            .collect();
        trace.log(format!("Remix target track count: {target_count}"));

        let remix_suggestions = suggest_remix_tracks(
            self.llm,
            &seed_snapshot,
            &attributes,
            &prompt,
            target_count,
            &mut trace,
        );
        let resolved_seed_tracks = resolve_seed_tracks(
            self.catalog,
            &remix_suggestions,
            target_count,
            SeedSource::RemixSeed,
            &self.config,
            &mut trace,
        );
        trace.log(format!(
            "Resolved {} remix tracks via catalog search.",
            resolved_seed_tracks.len()
        ));

        let mut tracks = OrderedTrackSet::new();
        for track in &resolved_seed_tracks {
            tracks.insert(track.clone());
        }

        let seed_ids: Vec<String> = resolved_seed_tracks
            .iter()
            .map(|track| track.id.clone())
            .filter(|id| !id.is_empty())
            .collect();
        let mut similar_display: Vec<String> = Vec::new();
        if tracks.len() < target_count && !seed_ids.is_empty() {
            trace.log("Resolved remix seeds below target; fetching similarity tracks.");
            let artist_ids = seed_artist_ids(&resolved_seed_tracks);
            let year_avg = seed_year_average(&resolved_seed_tracks);
            let keywords = prompt_keywords(&prompt);
            let focus: HashSet<String> = HashSet::new();
            let candidates = get_similar_tracks(
                self.catalog,
                &seed_ids,
                &artist_ids,
                year_avg,
                &attributes,
                &keywords,
                (target_count - tracks.len()).max(5),
                profile,
                &focus,
                &self.config,
                &mut trace,
            );
            for scored in candidates {
                if tracks.len() >= target_count {
                    break;
                }
                if tracks.insert(scored.track.clone()) {
                    similar_display.push(scored.track.display());
                }
            }
        }

        if tracks.len() < target_count {
            trace.log("Falling back to original playlist tracks to maintain length.");
            for entry in &cached.track_details {
                if tracks.len() >= target_count {
                    break;
                }
                let mut fallback = entry.clone();
                fallback.source = SeedSource::Playlist;
                tracks.force_insert(fallback);
            }
        }

        let ordered_tracks = tracks.into_vec();
        let stats = compute_playlist_statistics(
            self.catalog,
            &ordered_tracks,
            profile,
            Some(&cached.stats.novelty_reference_ids),
            &self.config,
            &mut trace,
        );

        let payload = self.assemble_payload(
            &prompt,
            key,
            identity,
            attributes,
            ordered_tracks,
            resolved_seed_tracks,
            remix_suggestions,
            seed_snapshot,
            similar_display,
            stats,
            trace,
        );

        Ok(GenerationOutcome {
            payload,
            from_cache: false,
        })
    }

    /// Build, tag, and cache the payload; the single atomic cache write at
    /// the end of a full run.
    #[allow(clippy::too_many_arguments)]
    fn assemble_payload(
        &self,
        prompt: &str,
        key: &str,
        identity: &RequesterIdentity,
        attributes: crate::models::Attributes,
        ordered_tracks: Vec<ResolvedTrack>,
        resolved_seed_tracks: Vec<ResolvedTrack>,
        llm_suggestions: Vec<TrackSuggestion>,
        seed_track_display: Vec<String>,
        similar_tracks_display: Vec<String>,
        stats: crate::playlist::stats::PlaylistStatistics,
        mut trace: DebugTrace,
    ) -> GenerationPayload {
        let ttl = self.config.cache_ttl;
        trace.log(format!(
            "Playlist cached for {}.",
            format_cache_timeout(ttl.as_secs())
        ));
        let (debug_steps, errors) = trace.into_parts();

        let payload = GenerationPayload {
            playlist: ordered_tracks.iter().map(ResolvedTrack::display).collect(),
            track_ids: ordered_tracks
                .iter()
                .map(|track| track.id.clone())
                .filter(|id| !id.is_empty())
                .collect(),
            track_details: ordered_tracks,
            attributes,
            llm_suggestions,
            resolved_seed_tracks,
            seed_track_display,
            similar_tracks_display,
            stats,
            debug_steps,
            errors,
            prompt: prompt.to_string(),
            suggested_name: suggested_playlist_name(prompt),
            cache_key: key.to_string(),
            owner: identity.as_owner(),
        };
        self.cache.set(key, payload.clone(), ttl);
        payload
    }

    /// Persist the generation snapshot for external reporting. Sink
    /// failures are logged and never fail the run.
    fn record_generation_stat(
        &self,
        identity: &RequesterIdentity,
        prompt: &str,
        tracks: &[ResolvedTrack],
        stats: &crate::playlist::stats::PlaylistStatistics,
    ) {
        let top_genre = stats
            .genre_top
            .first()
            .map(|share| share.genre.clone())
            .or_else(|| stats.genre_distribution.keys().next().cloned())
            .unwrap_or_default();
        let stat = GenerationStat {
            user_identifier: identity.user_id.clone(),
            prompt: prompt.to_string(),
            track_count: tracks.len(),
            total_duration_ms: stats.total_duration_ms,
            top_genre,
            avg_novelty: Some(stats.novelty),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            genre_breakdown: serde_json::to_value(&stats.genre_top)
                .unwrap_or(serde_json::Value::Null),
            created_at: Utc::now(),
        }
        .with_usage(self.llm.usage());
        if let Err(e) = self.stats.record(stat) {
            tracing::warn!("failed to record playlist generation stat: {e}");
        }
    }
}

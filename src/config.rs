use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;

use crate::models::Attributes;

/// Connection settings loaded from `.env` and the environment.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub catalog_base_url: String,
    /// Bearer token from the external token supplier. Absence is a hard
    /// precondition failure before any pipeline work.
    pub catalog_token: Option<String>,
    pub llm_base_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
}

/// Load service configuration from `.env` and environment variables.
pub fn load_service_config() -> Result<ServiceConfig> {
    // Load `.env` file if present
    dotenv::dotenv().ok();
    Ok(ServiceConfig {
        catalog_base_url: std::env::var("CATALOG_BASE_URL")
            .unwrap_or_else(|_| "https://api.spotify.com".to_string()),
        catalog_token: std::env::var("CATALOG_ACCESS_TOKEN").ok().filter(|t| !t.is_empty()),
        llm_base_url: std::env::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com".to_string()),
        llm_api_key: std::env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty()),
        llm_model: std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
    })
}

/// Track filtering policy for the normalizer.
///
/// The Latin-script check is a locale bias, not a correctness rule, so both
/// the switch and the threshold are explicit configuration.
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    pub require_latin: bool,
    /// Minimum share of alphabetic characters that must be Latin.
    pub latin_threshold: f64,
    /// Popularity floor applied by the artist-genre filter.
    pub popularity_threshold: u32,
    /// Per-genre overrides for sparse genres where the default floor is too strict.
    pub genre_popularity_overrides: HashMap<String, u32>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        let mut overrides = HashMap::new();
        for (genre, threshold) in [
            ("ambient", 25),
            ("lo-fi", 25),
            ("lofi", 25),
            ("jazz", 30),
            ("classical", 30),
            ("folk", 35),
            ("singer-songwriter", 35),
        ] {
            overrides.insert(genre.to_string(), threshold);
        }
        NormalizerConfig {
            require_latin: true,
            latin_threshold: 0.4,
            popularity_threshold: 45,
            genre_popularity_overrides: overrides,
        }
    }
}

impl NormalizerConfig {
    /// Resolve the popularity floor for a canonical genre.
    pub fn popularity_threshold_for(&self, canonical_genre: &str) -> u32 {
        self.genre_popularity_overrides
            .get(canonical_genre)
            .copied()
            .unwrap_or(self.popularity_threshold)
    }
}

/// Additive bonus weights for the candidate scoring heuristic.
///
/// Magnitudes are tunable policy; only the direction of each channel is
/// contractual (more overlap/alignment scores higher, saturated artists
/// score lower).
#[derive(Debug, Clone)]
pub struct ScoringWeights {
    /// Scale applied to popularity/100.
    pub popularity_scale: f64,
    pub seed_overlap: f64,
    pub focus_artist: f64,
    /// Bonus per prompt-keyword hit, capped at `keyword_hit_cap` hits.
    pub keyword_hit: f64,
    pub keyword_hit_cap: usize,
    pub year_alignment: f64,
    /// Years of distance at which the year bonus reaches zero.
    pub year_window: f64,
    pub energy_bias: f64,
    pub cache_track_hit: f64,
    pub cache_genre_alignment: f64,
    /// Novelty adjustments keyed on the artist's cached play count.
    pub novelty_fresh: f64,
    pub novelty_light: f64,
    pub novelty_worn: f64,
    pub novelty_saturated: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        ScoringWeights {
            popularity_scale: 0.45,
            seed_overlap: 0.2,
            focus_artist: 0.3,
            keyword_hit: 0.05,
            keyword_hit_cap: 2,
            year_alignment: 0.18,
            year_window: 18.0,
            energy_bias: 0.05,
            cache_track_hit: 0.18,
            cache_genre_alignment: 0.12,
            novelty_fresh: 0.05,
            novelty_light: 0.02,
            novelty_worn: -0.01,
            novelty_saturated: -0.03,
        }
    }
}

/// All pipeline tunables, passed explicitly into the orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub market: String,
    /// Target number of resolved seed tracks.
    pub seed_limit: usize,
    /// Maximum suggestions requested from the LLM per call.
    pub suggestion_cap: usize,
    /// Number of similarity tracks appended after the seeds.
    pub similar_limit: usize,
    /// Community playlists inspected per mining pass.
    pub mining_playlist_limit: u32,
    /// Tracks pulled per mined playlist.
    pub mining_track_limit: u32,
    /// Result size for direct catalog searches.
    pub search_limit: u32,
    pub cache_ttl: Duration,
    /// Retain per-step diagnostics on the payload.
    pub capture_debug: bool,
    /// Entries in each popularity highlight list.
    pub highlight_count: usize,
    /// Genres shown before the "remaining" fold.
    pub genre_top_count: usize,
    /// Similarity results allowed per artist.
    pub max_tracks_per_artist: usize,
    pub default_attributes: Attributes,
    pub normalizer: NormalizerConfig,
    pub scoring: ScoringWeights,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            market: "US".to_string(),
            seed_limit: 5,
            suggestion_cap: 5,
            similar_limit: 10,
            mining_playlist_limit: 3,
            mining_track_limit: 40,
            search_limit: 50,
            cache_ttl: Duration::from_secs(15 * 60),
            capture_debug: true,
            highlight_count: 5,
            genre_top_count: 3,
            max_tracks_per_artist: 2,
            default_attributes: Attributes::default(),
            normalizer: NormalizerConfig::default(),
            scoring: ScoringWeights::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn popularity_threshold_prefers_override() {
        let config = NormalizerConfig::default();
        assert_eq!(config.popularity_threshold_for("jazz"), 30);
        assert_eq!(config.popularity_threshold_for("pop"), 45);
    }

    #[test]
    fn default_attributes_fill_every_field() {
        let attributes = Attributes::default();
        assert_eq!(attributes.mood, "chill");
        assert_eq!(attributes.genre, "pop");
        assert_eq!(attributes.energy, "medium");
    }
}

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::catalog::{ARTIST_LOOKUP_BATCH, CatalogApi};
use crate::config::PipelineConfig;
use crate::models::ResolvedTrack;
use crate::playlist::normalize::normalize_genre;
use crate::profile::ProfileCache;
use crate::trace::DebugTrace;

/// One genre's share of the playlist, as a percentage of all genre tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreShare {
    pub genre: String,
    pub percentage: f64,
}

/// Provenance breakdown entry: how many tracks a pipeline stage contributed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMixEntry {
    pub key: String,
    pub label: String,
    pub count: usize,
    pub percentage: f64,
}

/// Derived, stateless metrics over a finished track list. Recomputed on
/// demand; never cached independently of the playlist it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistStatistics {
    pub total_tracks: usize,
    /// Zero-padded HH:MM:SS.
    pub total_duration: String,
    pub total_duration_ms: u64,
    pub avg_popularity: Option<f64>,
    /// Percentage of tracks not already known to the listener (0-100).
    pub novelty: f64,
    pub genre_distribution: BTreeMap<String, f64>,
    pub genre_top: Vec<GenreShare>,
    pub genre_remaining: Vec<GenreShare>,
    /// The reference set novelty was measured against.
    pub novelty_reference_ids: Vec<String>,
    pub source_mix: Vec<SourceMixEntry>,
    pub source_total: usize,
    pub top_popular_tracks: Vec<ResolvedTrack>,
    pub least_popular_tracks: Vec<ResolvedTrack>,
}

impl PlaylistStatistics {
    /// The defined baseline for an empty playlist: all-zero counters and
    /// maximum novelty (nothing to compare against means everything is new).
    pub fn empty() -> Self {
        PlaylistStatistics {
            total_tracks: 0,
            total_duration: "00:00:00".to_string(),
            total_duration_ms: 0,
            avg_popularity: None,
            novelty: 100.0,
            genre_distribution: BTreeMap::new(),
            genre_top: Vec::new(),
            genre_remaining: Vec::new(),
            novelty_reference_ids: Vec::new(),
            source_mix: Vec::new(),
            source_total: 0,
            top_popular_tracks: Vec::new(),
            least_popular_tracks: Vec::new(),
        }
    }
}

/// Format a millisecond duration as zero-padded HH:MM:SS. Playlist-length
/// durations are assumed; there is no day rollover.
pub fn format_duration(total_ms: u64) -> String {
    let total_seconds = total_ms / 1_000;
    let hours = total_seconds / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Look up artists' genre tags for the playlist, batched to the catalog's
/// 50-id limit. Lookup failures skip the batch; genre rows simply go missing
/// rather than failing the statistics.
fn genre_tags_by_artist(
    catalog: &dyn CatalogApi,
    tracks: &[ResolvedTrack],
    trace: &mut DebugTrace,
) -> HashMap<String, Vec<String>> {
    let mut unique_artist_ids: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for track in tracks {
        for id in &track.artist_ids {
            if !id.is_empty() && seen.insert(id.clone()) {
                unique_artist_ids.push(id.clone());
            }
        }
    }

    let mut genres_by_artist = HashMap::new();
    for batch in unique_artist_ids.chunks(ARTIST_LOOKUP_BATCH) {
        match catalog.artists(batch) {
            Ok(artists) => {
                for artist in artists {
                    let normalized: Vec<String> = artist
                        .genres
                        .iter()
                        .map(|genre| normalize_genre(genre))
                        .filter(|genre| !genre.is_empty())
                        .collect();
                    genres_by_artist.insert(artist.id, normalized);
                }
            }
            Err(e) => {
                trace.log(format!("Failed to fetch artist genres for statistics: {e}."));
            }
        }
    }
    genres_by_artist
}

/// Compute the full statistics block for a finished track list.
///
/// The novelty reference set is the union of the profile cache's known
/// track ids, its top-track ids, and any explicitly supplied ids; novelty
/// is the percentage of playlist tracks absent from that union.
pub fn compute_playlist_statistics(
    catalog: &dyn CatalogApi,
    tracks: &[ResolvedTrack],
    profile: Option<&ProfileCache>,
    cached_track_ids: Option<&[String]>,
    config: &PipelineConfig,
    trace: &mut DebugTrace,
) -> PlaylistStatistics {
    if tracks.is_empty() {
        return PlaylistStatistics::empty();
    }

    let total_duration_ms: u64 = tracks.iter().map(|track| track.duration_ms).sum();

    let popularity_values: Vec<u32> = tracks.iter().filter_map(|track| track.popularity).collect();
    let avg_popularity = if popularity_values.is_empty() {
        None
    } else {
        Some(popularity_values.iter().sum::<u32>() as f64 / popularity_values.len() as f64)
    };

    // Novelty against the union of everything the listener is known to know.
    let mut reference_ids: BTreeSet<String> = BTreeSet::new();
    if let Some(profile) = profile {
        reference_ids.extend(profile.tracks.keys().cloned());
        reference_ids.extend(profile.top_track_ids.iter().cloned());
    }
    if let Some(ids) = cached_track_ids {
        reference_ids.extend(ids.iter().cloned());
    }
    let novelty = if reference_ids.is_empty() {
        100.0
    } else {
        let known = tracks
            .iter()
            .filter(|track| reference_ids.contains(&track.id))
            .count();
        100.0 * (1.0 - known as f64 / tracks.len() as f64)
    };

    // Genre distribution: each track contributes one tally per distinct
    // genre across its artists; shares are normalized over all tallies.
    let genres_by_artist = genre_tags_by_artist(catalog, tracks, trace);
    let mut genre_tally: HashMap<String, usize> = HashMap::new();
    for track in tracks {
        let mut track_genres: BTreeSet<&str> = BTreeSet::new();
        for artist_id in &track.artist_ids {
            if let Some(genres) = genres_by_artist.get(artist_id) {
                track_genres.extend(genres.iter().map(String::as_str));
            }
        }
        for genre in track_genres {
            *genre_tally.entry(genre.to_string()).or_insert(0) += 1;
        }
    }
    let tally_total: usize = genre_tally.values().sum();
    let mut shares: Vec<GenreShare> = genre_tally
        .into_iter()
        .map(|(genre, count)| GenreShare {
            genre,
            percentage: round1(count as f64 / tally_total.max(1) as f64 * 100.0),
        })
        .collect();
    shares.sort_by(|a, b| {
        b.percentage
            .partial_cmp(&a.percentage)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.genre.cmp(&b.genre))
    });
    let genre_distribution: BTreeMap<String, f64> = shares
        .iter()
        .map(|share| (share.genre.clone(), share.percentage))
        .collect();
    let remaining = shares.split_off(shares.len().min(config.genre_top_count));
    let genre_top = shares;

    // Source mix over provenance tags attached during assembly.
    let mut source_counts: Vec<(&'static str, &'static str, usize)> = Vec::new();
    for track in tracks {
        let key = track.source.key();
        match source_counts.iter_mut().find(|(k, _, _)| *k == key) {
            Some(entry) => entry.2 += 1,
            None => source_counts.push((key, track.source.label(), 1)),
        }
    }
    source_counts.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(b.0)));
    let source_mix: Vec<SourceMixEntry> = source_counts
        .into_iter()
        .map(|(key, label, count)| SourceMixEntry {
            key: key.to_string(),
            label: label.to_string(),
            count,
            percentage: round1(count as f64 / tracks.len() as f64 * 100.0),
        })
        .collect();

    // Popularity highlights; stable sorts keep original order on ties.
    let highlight_count = config.highlight_count;
    let mut by_popularity: Vec<ResolvedTrack> = tracks.to_vec();
    by_popularity.sort_by_key(|track| std::cmp::Reverse(track.popularity.unwrap_or(0)));
    let top_popular_tracks: Vec<ResolvedTrack> =
        by_popularity.iter().take(highlight_count).cloned().collect();
    let mut ascending: Vec<ResolvedTrack> = tracks.to_vec();
    ascending.sort_by_key(|track| track.popularity.unwrap_or(0));
    let least_popular_tracks: Vec<ResolvedTrack> =
        ascending.into_iter().take(highlight_count).collect();

    PlaylistStatistics {
        total_tracks: tracks.len(),
        total_duration: format_duration(total_duration_ms),
        total_duration_ms,
        avg_popularity,
        novelty,
        genre_distribution,
        genre_top,
        genre_remaining: remaining,
        novelty_reference_ids: reference_ids.into_iter().collect(),
        source_mix,
        source_total: tracks.len(),
        top_popular_tracks,
        least_popular_tracks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MockCatalogApi;
    use crate::models::{ArtistObject, SeedSource};
    use approx::assert_relative_eq;

    fn resolved(id: &str, popularity: Option<u32>, duration_ms: u64) -> ResolvedTrack {
        ResolvedTrack {
            id: id.to_string(),
            name: format!("Track {id}"),
            artists: "Artist".to_string(),
            artist_ids: vec![format!("artist-{id}")],
            album_name: String::new(),
            album_image_url: String::new(),
            year: None,
            duration_ms,
            popularity,
            source: SeedSource::Playlist,
        }
    }

    fn no_genre_catalog() -> MockCatalogApi {
        let mut catalog = MockCatalogApi::new();
        catalog.expect_artists().returning(|_| Ok(Vec::new()));
        catalog
    }

    #[test]
    fn empty_playlist_yields_neutral_baseline() {
        let catalog = MockCatalogApi::new();
        let config = PipelineConfig::default();
        let mut trace = DebugTrace::new(true);
        let stats = compute_playlist_statistics(&catalog, &[], None, None, &config, &mut trace);

        assert_eq!(stats.total_tracks, 0);
        assert_eq!(stats.total_duration, "00:00:00");
        assert_eq!(stats.avg_popularity, None);
        assert_relative_eq!(stats.novelty, 100.0);
        assert!(stats.genre_top.is_empty());
        assert!(stats.genre_remaining.is_empty());
        assert!(stats.novelty_reference_ids.is_empty());
        assert!(stats.source_mix.is_empty());
        assert_eq!(stats.source_total, 0);
        assert!(stats.top_popular_tracks.is_empty());
        assert!(stats.least_popular_tracks.is_empty());
    }

    #[test]
    fn duration_formats_as_zero_padded_hms() {
        assert_eq!(format_duration(188_000), "00:03:08");
        assert_eq!(format_duration(0), "00:00:00");
        assert_eq!(format_duration(3_600_000), "01:00:00");
        assert_eq!(format_duration(59_999), "00:00:59");
    }

    #[test]
    fn no_reference_set_means_full_novelty() {
        let catalog = no_genre_catalog();
        let config = PipelineConfig::default();
        let mut trace = DebugTrace::new(true);
        let tracks = vec![resolved("t1", Some(50), 60_000), resolved("t2", Some(70), 60_000)];
        let stats =
            compute_playlist_statistics(&catalog, &tracks, None, None, &config, &mut trace);
        assert_relative_eq!(stats.novelty, 100.0);
    }

    #[test]
    fn novelty_tracks_reference_overlap_proportionally() {
        let catalog = no_genre_catalog();
        let config = PipelineConfig::default();
        let tracks: Vec<ResolvedTrack> = (0..4)
            .map(|i| resolved(&format!("t{i}"), Some(50), 60_000))
            .collect();

        for known in 0..=4usize {
            let reference: Vec<String> = (0..known).map(|i| format!("t{i}")).collect();
            let mut trace = DebugTrace::new(true);
            let stats = compute_playlist_statistics(
                &catalog,
                &tracks,
                None,
                Some(&reference),
                &config,
                &mut trace,
            );
            let expected = if known == 0 {
                100.0
            } else {
                100.0 * (4 - known) as f64 / 4.0
            };
            assert_relative_eq!(stats.novelty, expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn reference_union_covers_profile_and_supplied_ids() {
        let catalog = no_genre_catalog();
        let config = PipelineConfig::default();
        let mut profile = ProfileCache::default();
        profile
            .tracks
            .insert("t1".to_string(), crate::profile::ProfileTrack::default());
        profile.top_track_ids.push("t3".to_string());

        let tracks = vec![
            resolved("t1", Some(50), 60_000),
            resolved("t2", Some(70), 120_000),
        ];
        let cached = vec!["t2".to_string()];
        let mut trace = DebugTrace::new(true);
        let stats = compute_playlist_statistics(
            &catalog,
            &tracks,
            Some(&profile),
            Some(&cached),
            &config,
            &mut trace,
        );

        assert_eq!(stats.total_duration, "00:03:00");
        assert_relative_eq!(stats.avg_popularity.unwrap(), 60.0);
        // Both playlist tracks are in the reference union.
        assert_relative_eq!(stats.novelty, 0.0);
        for id in ["t1", "t2", "t3"] {
            assert!(stats.novelty_reference_ids.iter().any(|r| r == id));
        }
        assert_eq!(stats.top_popular_tracks[0].id, "t2");
        assert_eq!(stats.least_popular_tracks[0].id, "t1");
        assert_eq!(stats.source_total, 2);
        assert_eq!(stats.source_mix.len(), 1);
        assert_eq!(stats.source_mix[0].key, "playlist");
        assert_relative_eq!(stats.source_mix[0].percentage, 100.0);
    }

    #[test]
    fn genre_distribution_normalizes_artist_tags() {
        let mut catalog = MockCatalogApi::new();
        catalog.expect_artists().returning(|ids| {
            Ok(ids
                .iter()
                .map(|id| ArtistObject {
                    id: id.clone(),
                    name: String::new(),
                    genres: match id.as_str() {
                        "artist-t1" => vec!["Synth Pop".to_string(), "Pop".to_string()],
                        _ => vec!["Indie Rock".to_string()],
                    },
                })
                .collect())
        });

        let config = PipelineConfig::default();
        let tracks = vec![resolved("t1", Some(80), 90_000), resolved("t2", Some(70), 90_000)];
        let mut trace = DebugTrace::new(true);
        let stats =
            compute_playlist_statistics(&catalog, &tracks, None, None, &config, &mut trace);

        assert_eq!(stats.genre_top.len(), 3);
        assert!(stats.genre_top.iter().any(|s| s.genre == "synth-pop"));
        assert!(stats.genre_top.iter().any(|s| s.genre == "pop"));
        assert!(stats.genre_top.iter().any(|s| s.genre == "indie-rock"));
        assert!(stats.genre_remaining.is_empty());
        let total: f64 = stats.genre_distribution.values().sum();
        assert!(total <= 100.0 + 1e-6);
    }

    #[test]
    fn genre_shares_fold_beyond_top_three() {
        let mut catalog = MockCatalogApi::new();
        catalog.expect_artists().returning(|ids| {
            Ok(ids
                .iter()
                .enumerate()
                .map(|(index, id)| ArtistObject {
                    id: id.clone(),
                    name: String::new(),
                    genres: vec![format!("genre {index}")],
                })
                .collect())
        });

        let config = PipelineConfig::default();
        let tracks: Vec<ResolvedTrack> = (0..5)
            .map(|i| resolved(&format!("t{i}"), Some(50), 60_000))
            .collect();
        let mut trace = DebugTrace::new(true);
        let stats =
            compute_playlist_statistics(&catalog, &tracks, None, None, &config, &mut trace);

        assert_eq!(stats.genre_top.len(), 3);
        assert_eq!(stats.genre_remaining.len(), 2);
    }

    #[test]
    fn highlight_ties_preserve_original_order() {
        let catalog = no_genre_catalog();
        let config = PipelineConfig::default();
        let tracks = vec![
            resolved("t1", Some(50), 60_000),
            resolved("t2", Some(50), 60_000),
            resolved("t3", Some(90), 60_000),
        ];
        let mut trace = DebugTrace::new(true);
        let stats =
            compute_playlist_statistics(&catalog, &tracks, None, None, &config, &mut trace);

        assert_eq!(stats.top_popular_tracks[0].id, "t3");
        // Tied entries keep their playlist order.
        assert_eq!(stats.top_popular_tracks[1].id, "t1");
        assert_eq!(stats.top_popular_tracks[2].id, "t2");
        assert_eq!(stats.least_popular_tracks[0].id, "t1");
    }

    #[test]
    fn source_mix_aggregates_provenance_tags() {
        let catalog = no_genre_catalog();
        let config = PipelineConfig::default();
        let mut tracks = vec![
            resolved("t1", Some(50), 60_000),
            resolved("t2", Some(50), 60_000),
            resolved("t3", Some(50), 60_000),
        ];
        tracks[0].source = SeedSource::LlmSeed;
        tracks[1].source = SeedSource::Similarity;
        tracks[2].source = SeedSource::Similarity;

        let mut trace = DebugTrace::new(true);
        let stats =
            compute_playlist_statistics(&catalog, &tracks, None, None, &config, &mut trace);

        assert_eq!(stats.source_mix[0].key, "similarity");
        assert_eq!(stats.source_mix[0].count, 2);
        assert_eq!(stats.source_mix[1].key, "llm_seed");
        assert_relative_eq!(stats.source_mix[1].percentage, 33.3);
    }
}

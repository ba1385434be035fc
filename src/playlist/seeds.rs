use std::collections::HashSet;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::catalog::CatalogApi;
use crate::config::PipelineConfig;
use crate::models::{ResolvedTrack, SeedSource, TrackObject, TrackSuggestion};
use crate::playlist::normalize::{
    filter_by_market, filter_non_latin, filter_tracks_by_artist_genre, normalize_genre,
};
use crate::trace::DebugTrace;

/// Separators that introduce secondary credits in an artist string.
const CREDIT_SEPARATORS: [&str; 7] = [",", "&", " feat. ", " feat ", " ft. ", " ft ", " with "];

/// Extract the primary artist from a formatted credit string, e.g.
/// "Mark Ronson ft. Bruno Mars" -> "Mark Ronson".
pub fn primary_artist_hint(artist: &str) -> String {
    let lowered = artist.to_lowercase();
    let cut = CREDIT_SEPARATORS
        .iter()
        .filter_map(|sep| lowered.find(sep))
        .min()
        .unwrap_or(artist.len());
    artist[..cut].trim().to_string()
}

fn first_match(
    catalog: &dyn CatalogApi,
    query: &str,
    market: Option<&str>,
    config: &PipelineConfig,
    trace: &mut DebugTrace,
) -> Option<TrackObject> {
    match catalog.search_tracks(query, 5, market, 0) {
        Ok(tracks) => {
            let tracks = match market {
                Some(market) => filter_by_market(tracks, market),
                None => tracks,
            };
            filter_non_latin(tracks, &config.normalizer).into_iter().next()
        }
        Err(e) => {
            let scope = market.unwrap_or("any");
            trace.log(format!("Catalog search failed for '{query}' (market {scope}): {e}."));
            None
        }
    }
}

/// Resolve LLM suggestions into concrete catalog tracks.
///
/// Per suggestion: market-scoped structured search, then a retry with the
/// primary artist only, then a marketless retry. The first hit wins;
/// suggestions that resolve to nothing are skipped without retry. Stops once
/// `limit` tracks are collected.
pub fn resolve_seed_tracks(
    catalog: &dyn CatalogApi,
    suggestions: &[TrackSuggestion],
    limit: usize,
    source: SeedSource,
    config: &PipelineConfig,
    trace: &mut DebugTrace,
) -> Vec<ResolvedTrack> {
    let market = config.market.as_str();
    let mut resolved = Vec::new();

    for suggestion in suggestions {
        if resolved.len() >= limit {
            break;
        }
        let title = suggestion.title.trim();
        if title.is_empty() {
            continue;
        }
        let artist = suggestion.artist.trim();

        let mut query = format!("track:\"{title}\"");
        if !artist.is_empty() {
            query.push_str(&format!(" artist:\"{artist}\""));
        }
        trace.log(format!("Catalog search (seed): q={query}, market={market}"));

        let mut hit = first_match(catalog, &query, Some(market), config, trace);

        if hit.is_none() && !artist.is_empty() {
            let primary = primary_artist_hint(artist);
            if !primary.is_empty() && primary != artist {
                let fallback_query = format!("track:\"{title}\" artist:\"{primary}\"");
                trace.log(format!(
                    "Catalog search (seed, primary artist): q={fallback_query}, market={market}"
                ));
                hit = first_match(catalog, &fallback_query, Some(market), config, trace);
            }
        }

        if hit.is_none() {
            trace.log(format!("Catalog search (seed, no market): q={query}"));
            hit = first_match(catalog, &query, None, config, trace);
        }

        match hit {
            Some(track) => resolved.push(ResolvedTrack::from_track_object(&track, source)),
            None => trace.log(format!("No search results found for '{title}' ({artist}).")),
        }
    }

    trace.log(format!("Resolved {} seed tracks via catalog search.", resolved.len()));
    resolved
}

/// Harvest candidate tracks by scanning community playlists for the genre.
/// Human-curated genre playlists are denser and fresher than the catalog's
/// own genre tag, so this runs before any direct genre search.
pub fn mine_playlist_tracks(
    catalog: &dyn CatalogApi,
    canonical_genre: &str,
    playlist_limit: u32,
    track_limit: u32,
    config: &PipelineConfig,
    trace: &mut DebugTrace,
) -> Vec<TrackObject> {
    let base_label = canonical_genre.replace('-', " ");
    let base_label = if base_label.trim().is_empty() {
        "popular".to_string()
    } else {
        base_label.trim().to_string()
    };
    let queries = [
        format!("{base_label} hits"),
        format!("top {base_label}"),
        format!("best of {base_label}"),
        format!("{base_label} mix"),
    ];
    let query = queries
        .choose(&mut rand::thread_rng())
        .expect("query list is non-empty");

    trace.log(format!("Catalog search (playlists): q='{query}', limit={playlist_limit}"));
    let playlists = match catalog.search_playlists(query, playlist_limit) {
        Ok(playlists) => playlists,
        Err(e) => {
            trace.log(format!("Catalog playlist search failed: {e}."));
            Vec::new()
        }
    };

    let mut collected: Vec<TrackObject> = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();

    for playlist in playlists {
        // Editorial playlists skew the pool; keep community ones.
        if playlist
            .owner
            .as_ref()
            .is_some_and(|owner| owner.id.eq_ignore_ascii_case("spotify"))
        {
            continue;
        }
        trace.log(format!(
            "Catalog playlist items: playlist_id={}, limit={track_limit}, market={}",
            playlist.id, config.market
        ));
        let items = match catalog.playlist_items(&playlist.id, track_limit, Some(&config.market)) {
            Ok(items) => items,
            Err(_) => match catalog.playlist_items(&playlist.id, track_limit, None) {
                Ok(items) => items,
                Err(e) => {
                    trace.log(format!(
                        "Failed to fetch playlist items for '{}': {e}.",
                        playlist.id
                    ));
                    continue;
                }
            },
        };
        for track in items {
            let Some(id) = track.id.clone() else { continue };
            if seen_ids.insert(id) {
                collected.push(track);
            }
        }
    }

    trace.log(format!(
        "Collected {} tracks from playlists for genre '{canonical_genre}'.",
        collected.len()
    ));
    collected
}

fn sort_by_popularity(tracks: &mut [TrackObject]) {
    tracks.sort_by(|a, b| b.popularity.unwrap_or(0).cmp(&a.popularity.unwrap_or(0)));
}

/// Fallback seed path for when no LLM suggestion resolves: mine community
/// playlists for the genre, then top up from a direct genre-tag search.
pub fn discover_top_tracks_for_genre(
    catalog: &dyn CatalogApi,
    genre: &str,
    seed_limit: usize,
    config: &PipelineConfig,
    trace: &mut DebugTrace,
) -> Vec<ResolvedTrack> {
    let canonical = normalize_genre(if genre.trim().is_empty() { "pop" } else { genre });

    // Stage one: playlist mining.
    let mut pool = mine_playlist_tracks(
        catalog,
        &canonical,
        config.mining_playlist_limit,
        config.mining_track_limit,
        config,
        trace,
    );
    pool = filter_tracks_by_artist_genre(catalog, pool, &canonical, &config.normalizer, trace);
    pool = filter_non_latin(pool, &config.normalizer);
    sort_by_popularity(&mut pool);

    let mut selected: Vec<ResolvedTrack> = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut take = |tracks: &[TrackObject], selected: &mut Vec<ResolvedTrack>| {
        for track in tracks {
            if selected.len() >= seed_limit {
                break;
            }
            let Some(id) = track.id.clone() else { continue };
            if seen_ids.insert(id) {
                selected.push(ResolvedTrack::from_track_object(track, SeedSource::GenreDiscovery));
            }
        }
    };
    take(&pool, &mut selected);

    // Stage two: direct genre search when mining came up short.
    if selected.len() < seed_limit {
        let query = format!("genre:\"{canonical}\"");
        let search_limit = config.search_limit;
        let offset_cap = 100u32.saturating_sub(search_limit);
        let offset = if offset_cap > 0 {
            rand::thread_rng().gen_range(0..=offset_cap)
        } else {
            0
        };
        trace.log(format!(
            "Catalog search (genre seed): q='{query}', limit={search_limit}, market={}, offset={offset}",
            config.market
        ));
        let mut tracks = match catalog.search_tracks(&query, search_limit, Some(&config.market), offset)
        {
            Ok(tracks) => filter_by_market(tracks, &config.market),
            Err(e) => {
                trace.log(format!("Catalog search for genre seeds failed: {e}."));
                Vec::new()
            }
        };

        if tracks.is_empty() {
            trace.log(format!("Catalog search (genre seed, no market): q='{query}'"));
            tracks = catalog
                .search_tracks(&query, search_limit, None, 0)
                .unwrap_or_else(|e| {
                    trace.log(format!("Catalog search without market failed: {e}."));
                    Vec::new()
                });
        }

        if !tracks.is_empty() {
            tracks =
                filter_tracks_by_artist_genre(catalog, tracks, &canonical, &config.normalizer, trace);
            tracks = filter_non_latin(tracks, &config.normalizer);
            sort_by_popularity(&mut tracks);
            take(&tracks, &mut selected);
        }
    }

    trace.log(format!(
        "Discovered {} top tracks for genre '{canonical}'.",
        selected.len()
    ));
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MockCatalogApi;
    use crate::models::ArtistRef;

    fn track(id: &str, name: &str, popularity: u32) -> TrackObject {
        TrackObject {
            id: Some(id.to_string()),
            name: name.to_string(),
            artists: vec![ArtistRef {
                id: Some(format!("artist-{id}")),
                name: "Artist".to_string(),
            }],
            popularity: Some(popularity),
            ..TrackObject::default()
        }
    }

    #[test]
    fn primary_artist_hint_splits_credits() {
        assert_eq!(primary_artist_hint("Mark Ronson ft. Bruno Mars"), "Mark Ronson");
        assert_eq!(primary_artist_hint("David Guetta feat. Sia"), "David Guetta");
        assert_eq!(primary_artist_hint("Simon & Garfunkel"), "Simon");
        assert_eq!(primary_artist_hint("Beyoncé, Jay-Z"), "Beyoncé");
        assert_eq!(primary_artist_hint("Adele"), "Adele");
    }

    #[test]
    fn resolve_takes_first_hit_and_skips_misses() {
        let mut catalog = MockCatalogApi::new();
        catalog.expect_search_tracks().returning(|query, _, _, _| {
            if query.contains("Findable") {
                Ok(vec![track("t1", "Findable", 70), track("t2", "Other", 50)])
            } else {
                Ok(Vec::new())
            }
        });

        let suggestions = vec![
            TrackSuggestion::new("Unfindable", "Nobody"),
            TrackSuggestion::new("Findable", "Somebody"),
        ];
        let config = PipelineConfig::default();
        let mut trace = DebugTrace::new(true);
        let resolved = resolve_seed_tracks(
            &catalog,
            &suggestions,
            5,
            SeedSource::LlmSeed,
            &config,
            &mut trace,
        );
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, "t1");
        assert_eq!(resolved[0].source, SeedSource::LlmSeed);
    }

    #[test]
    fn resolve_stops_at_limit() {
        let mut catalog = MockCatalogApi::new();
        catalog
            .expect_search_tracks()
            .returning(|_, _, _, _| Ok(vec![track("t1", "Hit", 70)]));

        let suggestions: Vec<TrackSuggestion> = (0..5)
            .map(|i| TrackSuggestion::new(format!("Song {i}"), "Artist"))
            .collect();
        let config = PipelineConfig::default();
        let mut trace = DebugTrace::new(true);
        let resolved = resolve_seed_tracks(
            &catalog,
            &suggestions,
            2,
            SeedSource::LlmSeed,
            &config,
            &mut trace,
        );
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn discovery_prefers_playlist_pool_then_search() {
        let mut catalog = MockCatalogApi::new();
        catalog.expect_search_playlists().returning(|_, _| {
            Ok(vec![crate::models::PlaylistRef {
                id: "pl1".to_string(),
                name: "pop hits".to_string(),
                owner: None,
            }])
        });
        catalog
            .expect_playlist_items()
            .returning(|_, _, _| Ok(vec![track("p1", "Mined One", 80), track("p2", "Mined Two", 60)]));
        // Artist-genre enrichment tags everything as pop.
        catalog.expect_artists().returning(|ids| {
            Ok(ids
                .iter()
                .map(|id| crate::models::ArtistObject {
                    id: id.clone(),
                    name: String::new(),
                    genres: vec!["pop".to_string()],
                })
                .collect())
        });
        catalog
            .expect_search_tracks()
            .returning(|_, _, _, _| Ok(vec![track("s1", "Searched", 90)]));

        let config = PipelineConfig::default();
        let mut trace = DebugTrace::new(true);
        let discovered = discover_top_tracks_for_genre(&catalog, "pop", 3, &config, &mut trace);

        assert_eq!(discovered.len(), 3);
        // Playlist-mined tracks come first, sorted by popularity.
        assert_eq!(discovered[0].id, "p1");
        assert_eq!(discovered[1].id, "p2");
        assert_eq!(discovered[2].id, "s1");
        assert!(discovered.iter().all(|t| t.source == SeedSource::GenreDiscovery));
    }

    #[test]
    fn discovery_survives_empty_catalog() {
        let mut catalog = MockCatalogApi::new();
        catalog.expect_search_playlists().returning(|_, _| Ok(Vec::new()));
        catalog.expect_search_tracks().returning(|_, _, _, _| Ok(Vec::new()));

        let config = PipelineConfig::default();
        let mut trace = DebugTrace::new(true);
        let discovered =
            discover_top_tracks_for_genre(&catalog, "obscure micro-genre xyz", 5, &config, &mut trace);
        assert!(discovered.is_empty());
    }
}

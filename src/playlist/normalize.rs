use std::collections::{HashMap, HashSet};

use crate::catalog::{ARTIST_LOOKUP_BATCH, CatalogApi};
use crate::config::NormalizerConfig;
use crate::models::TrackObject;
use crate::trace::DebugTrace;

/// Canonicalize a genre string: lowercase, trimmed, spaces replaced with hyphens.
pub fn normalize_genre(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "-")
}

/// Expand a canonical genre into the equivalent spellings a catalog artist
/// might be tagged with: space form, compact form, trailing "-music"
/// stripped, and the known irregular aliases.
pub fn genre_aliases(canonical: &str) -> HashSet<String> {
    let mut aliases = HashSet::new();
    if canonical.is_empty() {
        return aliases;
    }
    let space_form = canonical.replace('-', " ");
    let compact = space_form.replace(' ', "");
    aliases.insert(canonical.to_string());
    aliases.insert(space_form);
    aliases.insert(compact);
    if let Some(stripped) = canonical.strip_suffix("-music") {
        aliases.insert(stripped.to_string());
    }
    if canonical == "r-b" || canonical == "r&b" {
        aliases.extend(["r&b".to_string(), "rb".to_string(), "r-b".to_string()]);
    }
    if canonical == "hip-hop" {
        aliases.insert("hiphop".to_string());
    }
    aliases.retain(|alias| !alias.is_empty());
    aliases
}

/// Keep tracks with no market restriction list, or whose list includes `market`.
pub fn filter_by_market(tracks: Vec<TrackObject>, market: &str) -> Vec<TrackObject> {
    tracks
        .into_iter()
        .filter(|track| match &track.available_markets {
            None => true,
            Some(markets) => markets.is_empty() || markets.iter().any(|m| m == market),
        })
        .collect()
}

fn is_latin_letter(c: char) -> bool {
    matches!(c as u32,
        0x0041..=0x005A          // A-Z
        | 0x0061..=0x007A        // a-z
        | 0x00C0..=0x00FF        // Latin-1 letters
        | 0x0100..=0x017F        // Latin Extended-A
        | 0x0180..=0x024F        // Latin Extended-B
        | 0x1E00..=0x1EFF        // Latin Extended Additional
        | 0x2C60..=0x2C7F        // Latin Extended-C
        | 0xA720..=0xA7FF)       // Latin Extended-D
}

/// Heuristic locale bias: true when at least `threshold` of the alphabetic
/// characters are Latin. Text with no alphabetic characters counts as Latin.
pub fn is_mostly_latin(text: &str, threshold: f64) -> bool {
    let alphabetic: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if alphabetic.is_empty() {
        return true;
    }
    let latin = alphabetic.iter().filter(|c| is_latin_letter(**c)).count();
    latin as f64 / alphabetic.len() as f64 >= threshold
}

/// Drop tracks whose names are mostly non-Latin, when the policy is enabled.
pub fn filter_non_latin(tracks: Vec<TrackObject>, config: &NormalizerConfig) -> Vec<TrackObject> {
    if !config.require_latin {
        return tracks;
    }
    tracks
        .into_iter()
        .filter(|track| is_mostly_latin(&track.name, config.latin_threshold))
        .collect()
}

/// Keep tracks whose artists are tagged with the target genre (or one of its
/// aliases) and whose popularity clears the genre's floor.
///
/// Fail-open on both axes: if the artist lookup itself produces nothing the
/// input is returned unfiltered, and if filtering would empty the result the
/// unfiltered input is returned instead.
pub fn filter_tracks_by_artist_genre(
    catalog: &dyn CatalogApi,
    tracks: Vec<TrackObject>,
    canonical_genre: &str,
    config: &NormalizerConfig,
    trace: &mut DebugTrace,
) -> Vec<TrackObject> {
    if tracks.is_empty() {
        return tracks;
    }

    let aliases = genre_aliases(canonical_genre);

    // Track id -> credited artist ids, preserving first-seen artist order.
    let mut artist_ids_by_track: HashMap<String, Vec<String>> = HashMap::new();
    let mut unique_artist_ids: Vec<String> = Vec::new();
    let mut seen_artists = HashSet::new();
    for track in &tracks {
        let Some(track_id) = track.id.as_deref() else {
            continue;
        };
        let ids = track.artist_ids();
        for id in &ids {
            if seen_artists.insert(id.clone()) {
                unique_artist_ids.push(id.clone());
            }
        }
        if !ids.is_empty() {
            artist_ids_by_track.insert(track_id.to_string(), ids);
        }
    }

    if unique_artist_ids.is_empty() {
        return tracks;
    }

    let mut artist_genres: HashMap<String, Vec<String>> = HashMap::new();
    for batch in unique_artist_ids.chunks(ARTIST_LOOKUP_BATCH) {
        match catalog.artists(batch) {
            Ok(artists) => {
                for artist in artists {
                    artist_genres.insert(artist.id, artist.genres);
                }
            }
            Err(e) => {
                trace.log(format!("Failed to fetch artist genres: {e}."));
            }
        }
    }

    // Enrichment unavailable entirely: pass everything through.
    if artist_genres.is_empty() {
        return tracks;
    }

    let target_compact = canonical_genre.replace('-', "");
    let threshold = config.popularity_threshold_for(canonical_genre);

    let filtered: Vec<TrackObject> = tracks
        .iter()
        .filter(|track| {
            if track.popularity.unwrap_or(0) < threshold {
                return false;
            }
            let Some(track_id) = track.id.as_deref() else {
                return false;
            };
            let Some(artist_ids) = artist_ids_by_track.get(track_id) else {
                return false;
            };
            artist_ids.iter().any(|artist_id| {
                artist_genres
                    .get(artist_id)
                    .is_some_and(|genres| genres.iter().any(|genre| {
                        let normalized = genre.to_lowercase();
                        let compact = normalized.replace(' ', "").replace('-', "");
                        (!target_compact.is_empty() && compact.contains(&target_compact))
                            || aliases.iter().any(|alias| {
                                alias == &normalized
                                    || alias == &compact
                                    || compact.contains(alias.as_str())
                            })
                    }))
            })
        })
        .cloned()
        .collect();

    trace.log(format!(
        "Filtered tracks by artist genre '{canonical_genre}': {} remaining.",
        filtered.len()
    ));

    // Never produce zero results from an overly strict filter.
    if filtered.is_empty() { tracks } else { filtered }
}

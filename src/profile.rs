use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{ResolvedTrack, SeedSource};

/// Snapshot of a user's recent listening, produced by an external profile
/// builder. This crate only reads it, as a weighting and overlap input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileCache {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub tracks: HashMap<String, ProfileTrack>,
    #[serde(default)]
    pub artists: HashMap<String, ProfileArtist>,
    /// Observed play counts per artist id within the snapshot window.
    #[serde(default)]
    pub artist_counts: HashMap<String, u32>,
    #[serde(default)]
    pub genre_buckets: HashMap<String, GenreBucket>,
    #[serde(default)]
    pub top_track_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileTrack {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artists: String,
    #[serde(default)]
    pub artist_ids: Vec<String>,
    #[serde(default)]
    pub album_name: String,
    #[serde(default)]
    pub album_image_url: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub popularity: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileArtist {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub play_count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenreBucket {
    #[serde(default)]
    pub track_ids: Vec<String>,
    #[serde(default)]
    pub track_count: u32,
}

impl ProfileTrack {
    fn to_resolved(&self, source: SeedSource) -> ResolvedTrack {
        ResolvedTrack {
            id: self.id.clone(),
            name: self.name.clone(),
            artists: self.artists.clone(),
            artist_ids: self.artist_ids.clone(),
            album_name: self.album_name.clone(),
            album_image_url: self.album_image_url.clone(),
            year: self.year,
            duration_ms: self.duration_ms,
            popularity: self.popularity,
            source,
        }
    }
}

impl ProfileCache {
    /// Whether the cached profile already knows this track id.
    pub fn knows_track(&self, track_id: &str) -> bool {
        self.tracks.contains_key(track_id)
    }

    /// Whether the genre bucket for `canonical_genre` contains this track.
    pub fn genre_bucket_contains(&self, canonical_genre: &str, track_id: &str) -> bool {
        self.genre_buckets
            .get(canonical_genre)
            .is_some_and(|bucket| bucket.track_ids.iter().any(|id| id == track_id))
    }

    /// Cached play count for an artist; zero when unseen.
    pub fn artist_play_count(&self, artist_id: &str) -> u32 {
        self.artist_counts.get(artist_id).copied().unwrap_or(0)
    }
}

/// Pull up to `limit` known tracks for a genre out of the snapshot, tagged
/// as listening-history seeds.
pub fn cached_tracks_for_genre(
    profile: &ProfileCache,
    canonical_genre: &str,
    limit: usize,
) -> Vec<ResolvedTrack> {
    if canonical_genre.is_empty() {
        return Vec::new();
    }
    let Some(bucket) = profile.genre_buckets.get(canonical_genre) else {
        return Vec::new();
    };
    bucket
        .track_ids
        .iter()
        .filter_map(|track_id| profile.tracks.get(track_id))
        .map(|track| track.to_resolved(SeedSource::UserGenreCache))
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile_with_bucket() -> ProfileCache {
        let mut profile = ProfileCache::default();
        for id in ["t1", "t2", "t3"] {
            profile.tracks.insert(
                id.to_string(),
                ProfileTrack {
                    id: id.to_string(),
                    name: format!("Track {id}"),
                    artists: "Artist".to_string(),
                    ..ProfileTrack::default()
                },
            );
        }
        profile.genre_buckets.insert(
            "indie-rock".to_string(),
            GenreBucket {
                track_ids: vec!["t1".to_string(), "missing".to_string(), "t2".to_string()],
                track_count: 3,
            },
        );
        profile
    }

    #[test]
    fn cached_tracks_skip_unknown_ids_and_honor_limit() {
        let profile = profile_with_bucket();
        let tracks = cached_tracks_for_genre(&profile, "indie-rock", 2);
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].id, "t1");
        assert_eq!(tracks[1].id, "t2");
        assert!(tracks.iter().all(|t| t.source == SeedSource::UserGenreCache));
    }

    #[test]
    fn unknown_genre_yields_nothing() {
        let profile = profile_with_bucket();
        assert!(cached_tracks_for_genre(&profile, "jazz", 5).is_empty());
        assert!(cached_tracks_for_genre(&profile, "", 5).is_empty());
    }
}

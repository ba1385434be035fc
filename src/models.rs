use serde::{Deserialize, Serialize};

use crate::playlist::stats::PlaylistStatistics;

/// Raw track object as returned by the catalog search and playlist endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackObject {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub album: Option<AlbumRef>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub popularity: Option<u32>,
    /// Market restriction list; absent means no restriction.
    #[serde(default)]
    pub available_markets: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtistRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlbumRef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    #[serde(default)]
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageRef {
    #[serde(default)]
    pub url: String,
}

impl TrackObject {
    /// Collect the non-empty artist ids credited on this track.
    pub fn artist_ids(&self) -> Vec<String> {
        self.artists
            .iter()
            .filter_map(|artist| artist.id.clone())
            .filter(|id| !id.is_empty())
            .collect()
    }

    /// Join artist names into a single display credit.
    pub fn artist_credit(&self) -> String {
        let names: Vec<&str> = self
            .artists
            .iter()
            .map(|artist| artist.name.as_str())
            .filter(|name| !name.is_empty())
            .collect();
        if names.is_empty() {
            "Unknown".to_string()
        } else {
            names.join(", ")
        }
    }

    /// Release year parsed from the album release date, if available.
    pub fn release_year(&self) -> Option<i32> {
        let date = self.album.as_ref()?.release_date.as_deref()?;
        let digits: String = date.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.len() == 4 {
            digits.parse().ok()
        } else {
            None
        }
    }

    /// First usable album image URL.
    pub fn primary_image_url(&self) -> String {
        self.album
            .as_ref()
            .map(|album| {
                album
                    .images
                    .iter()
                    .map(|image| image.url.clone())
                    .find(|url| !url.is_empty())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }
}

/// Full artist record from the batched artist lookup endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtistObject {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
}

/// Community playlist reference from playlist search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaylistRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub owner: Option<OwnerRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OwnerRef {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct CreatedPlaylist {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

// --- Response envelopes -----------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub tracks: Option<Paging<TrackObject>>,
    #[serde(default)]
    pub playlists: Option<Paging<PlaylistRef>>,
}

#[derive(Debug, Deserialize)]
pub struct Paging<T> {
    #[serde(default)]
    pub items: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlaylistItemsResponse {
    #[serde(default)]
    pub items: Vec<PlaylistItem>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlaylistItem {
    #[serde(default)]
    pub track: Option<TrackObject>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArtistsResponse {
    /// Unknown ids come back as nulls; they are dropped during flattening.
    #[serde(default)]
    pub artists: Vec<Option<ArtistObject>>,
}

#[derive(Debug, Default, Deserialize)]
#[allow(dead_code)]
pub struct UserProfileResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

// --- Pipeline domain types --------------------------------------------------

/// Mood/genre/energy descriptors extracted from the free-text prompt.
/// Always fully populated; defaults fill anything the LLM leaves out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    pub mood: String,
    pub genre: String,
    pub energy: String,
}

impl Default for Attributes {
    fn default() -> Self {
        Attributes {
            mood: "chill".to_string(),
            genre: "pop".to_string(),
            energy: "medium".to_string(),
        }
    }
}

/// An LLM-proposed track with no catalog identity yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSuggestion {
    pub title: String,
    pub artist: String,
}

impl TrackSuggestion {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        TrackSuggestion {
            title: title.into(),
            artist: artist.into(),
        }
    }
}

/// Which pipeline stage contributed a track. Feeds the source-mix statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedSource {
    LlmSeed,
    GenreDiscovery,
    UserGenreCache,
    Similarity,
    RemixSeed,
    /// Pre-existing tracks carried over from a cached playlist.
    Playlist,
}

impl SeedSource {
    pub fn key(self) -> &'static str {
        match self {
            SeedSource::LlmSeed => "llm_seed",
            SeedSource::GenreDiscovery => "genre_discovery",
            SeedSource::UserGenreCache => "user_genre_cache",
            SeedSource::Similarity => "similarity",
            SeedSource::RemixSeed => "remix_seed",
            SeedSource::Playlist => "playlist",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SeedSource::LlmSeed => "LLM seed",
            SeedSource::GenreDiscovery => "Genre discovery",
            SeedSource::UserGenreCache => "Listening history",
            SeedSource::Similarity => "Similarity engine",
            SeedSource::RemixSeed => "Remix seed",
            SeedSource::Playlist => "Existing playlist",
        }
    }
}

/// A track resolved against the catalog, normalized for the pipeline.
/// `id` is the dedup key across the whole generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTrack {
    pub id: String,
    pub name: String,
    /// Joined artist credit, e.g. "Artist One, Artist Two".
    pub artists: String,
    pub artist_ids: Vec<String>,
    pub album_name: String,
    pub album_image_url: String,
    pub year: Option<i32>,
    pub duration_ms: u64,
    pub popularity: Option<u32>,
    pub source: SeedSource,
}

impl ResolvedTrack {
    pub fn from_track_object(track: &TrackObject, source: SeedSource) -> Self {
        ResolvedTrack {
            id: track.id.clone().unwrap_or_default(),
            name: if track.name.is_empty() {
                "Unknown".to_string()
            } else {
                track.name.clone()
            },
            artists: track.artist_credit(),
            artist_ids: track.artist_ids(),
            album_name: track
                .album
                .as_ref()
                .map(|album| album.name.clone())
                .unwrap_or_default(),
            album_image_url: track.primary_image_url(),
            year: track.release_year(),
            duration_ms: track.duration_ms.unwrap_or(0),
            popularity: track.popularity,
            source,
        }
    }

    /// Display form used for legacy dedup and rendering: "name - artists".
    pub fn display(&self) -> String {
        format!("{} - {}", self.name, self.artists)
    }
}

/// Ownership metadata carried on every cached payload. A payload is only
/// served back to the requester whose identity matches both fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadOwner {
    pub user_id: String,
    pub session_key: String,
}

/// The full computed result of one generation run; the unit of caching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationPayload {
    /// Display strings, "name - artists", in final order.
    pub playlist: Vec<String>,
    pub track_ids: Vec<String>,
    pub track_details: Vec<ResolvedTrack>,
    pub attributes: Attributes,
    pub llm_suggestions: Vec<TrackSuggestion>,
    pub resolved_seed_tracks: Vec<ResolvedTrack>,
    pub seed_track_display: Vec<String>,
    pub similar_tracks_display: Vec<String>,
    pub stats: PlaylistStatistics,
    pub debug_steps: Vec<String>,
    pub errors: Vec<String>,
    pub prompt: String,
    pub suggested_name: String,
    pub cache_key: String,
    pub owner: PayloadOwner,
}

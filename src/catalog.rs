use anyhow::Result;
use ureq::Agent;
use urlencoding::encode;

use crate::models::{
    ArtistObject, ArtistsResponse, CreatedPlaylist, PlaylistItemsResponse, PlaylistRef,
    SearchResponse, TrackObject, UserProfileResponse,
};

/// The catalog API caps batched artist lookups at 50 ids per call.
pub const ARTIST_LOOKUP_BATCH: usize = 50;

/// The catalog API caps playlist track additions at 100 ids per call.
pub const TRACK_ADD_CHUNK: usize = 100;

/// Blocking catalog search/lookup surface used by the pipeline.
///
/// Callers treat any `Err` as "no results for this call" and fall back;
/// only the save flow surfaces catalog failures to the user.
#[cfg_attr(test, mockall::automock)]
pub trait CatalogApi {
    fn search_tracks<'a>(
        &self,
        query: &str,
        limit: u32,
        market: Option<&'a str>,
        offset: u32,
    ) -> Result<Vec<TrackObject>>;

    fn search_playlists(&self, query: &str, limit: u32) -> Result<Vec<PlaylistRef>>;

    fn playlist_items<'a>(
        &self,
        playlist_id: &str,
        limit: u32,
        market: Option<&'a str>,
    ) -> Result<Vec<TrackObject>>;

    /// Batched artist lookup; callers chunk ids to [`ARTIST_LOOKUP_BATCH`].
    fn artists(&self, ids: &[String]) -> Result<Vec<ArtistObject>>;

    fn current_user_id(&self) -> Result<String>;

    fn create_playlist(&self, user_id: &str, name: &str, public: bool) -> Result<CreatedPlaylist>;

    /// Add up to [`TRACK_ADD_CHUNK`] tracks to a playlist.
    fn add_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<()>;
}

/// HTTP client for the music catalog using bearer-token authentication.
pub struct HttpCatalogClient {
    agent: Agent,
    base_url: String,
    token: String,
}

impl HttpCatalogClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        HttpCatalogClient {
            agent: Agent::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    fn url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path_and_query)
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        let response = self
            .agent
            .get(&self.url(path_and_query))
            .set("Authorization", &format!("Bearer {}", self.token))
            .call()
            .map_err(|e| anyhow::anyhow!("catalog request failed: {e}"))?;
        let response_text = response.into_string()?;
        serde_json::from_str(&response_text)
            .map_err(|e| anyhow::anyhow!("failed to parse catalog response: {e}"))
    }

    fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let response = self
            .agent
            .post(&self.url(path))
            .set("Authorization", &format!("Bearer {}", self.token))
            .send_json(body)
            .map_err(|e| anyhow::anyhow!("catalog request failed: {e}"))?;
        let response_text = response.into_string()?;
        serde_json::from_str(&response_text)
            .map_err(|e| anyhow::anyhow!("failed to parse catalog response: {e}"))
    }
}

impl CatalogApi for HttpCatalogClient {
    fn search_tracks<'a>(
        &self,
        query: &str,
        limit: u32,
        market: Option<&'a str>,
        offset: u32,
    ) -> Result<Vec<TrackObject>> {
        let mut path = format!(
            "/v1/search?q={}&type=track&limit={limit}&offset={offset}",
            encode(query)
        );
        if let Some(market) = market {
            path.push_str(&format!("&market={}", encode(market)));
        }
        let response: SearchResponse = self.get_json(&path)?;
        Ok(response.tracks.map(|page| page.items).unwrap_or_default())
    }

    fn search_playlists(&self, query: &str, limit: u32) -> Result<Vec<PlaylistRef>> {
        let path = format!("/v1/search?q={}&type=playlist&limit={limit}", encode(query));
        let response: SearchResponse = self.get_json(&path)?;
        Ok(response.playlists.map(|page| page.items).unwrap_or_default())
    }

    fn playlist_items<'a>(
        &self,
        playlist_id: &str,
        limit: u32,
        market: Option<&'a str>,
    ) -> Result<Vec<TrackObject>> {
        let mut path = format!("/v1/playlists/{}/tracks?limit={limit}", encode(playlist_id));
        if let Some(market) = market {
            path.push_str(&format!("&market={}", encode(market)));
        }
        let response: PlaylistItemsResponse = self.get_json(&path)?;
        Ok(response
            .items
            .into_iter()
            .filter_map(|item| item.track)
            .collect())
    }

    fn artists(&self, ids: &[String]) -> Result<Vec<ArtistObject>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids
            .iter()
            .map(|id| encode(id).into_owned())
            .collect::<Vec<_>>()
            .join(",");
        let response: ArtistsResponse = self.get_json(&format!("/v1/artists?ids={joined}"))?;
        Ok(response.artists.into_iter().flatten().collect())
    }

    fn current_user_id(&self) -> Result<String> {
        let profile: UserProfileResponse = self.get_json("/v1/me")?;
        if profile.id.is_empty() {
            return Err(anyhow::anyhow!("catalog user id could not be resolved"));
        }
        Ok(profile.id)
    }

    fn create_playlist(&self, user_id: &str, name: &str, public: bool) -> Result<CreatedPlaylist> {
        let body = serde_json::json!({ "name": name, "public": public });
        self.post_json(&format!("/v1/users/{}/playlists", encode(user_id)), body)
    }

    fn add_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<()> {
        let uris: Vec<String> = track_ids
            .iter()
            .map(|id| format!("spotify:track:{id}"))
            .collect();
        let body = serde_json::json!({ "uris": uris });
        let _: serde_json::Value =
            self.post_json(&format!("/v1/playlists/{}/tracks", encode(playlist_id)), body)?;
        Ok(())
    }
}

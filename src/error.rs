use thiserror::Error;

/// Errors that can escape the pipeline.
///
/// Only precondition failures and save-time validation problems surface here.
/// Upstream unavailability (catalog timeouts, unreachable LLM, malformed
/// responses) is absorbed at the call site by each stage's fallback and is
/// reported through the debug trace instead.
#[derive(Debug, Error)]
pub enum Error {
    /// The caller submitted an empty prompt; nothing to generate.
    #[error("a non-empty prompt is required")]
    EmptyPrompt,

    /// No catalog access token is available for this session.
    #[error("catalog access token is missing; authenticate first")]
    Unauthenticated,

    /// A remix or save referenced a cache entry that is gone or belongs to
    /// another requester. Treated the same as an expired session.
    #[error("playlist session expired or does not belong to this requester")]
    StalePayload,

    /// A remix was requested before any tracks were generated.
    #[error("no tracks available to remix yet")]
    NothingToRemix,

    /// Saving requires at least one track id.
    #[error("at least one track id is required to create a playlist")]
    NoTracks,

    #[error("invalid playlist name: {0}")]
    InvalidPlaylistName(String),

    /// The catalog rejected a playlist-creation call. Save is the one flow
    /// where a catalog failure is surfaced rather than substituted.
    #[error("catalog error: {0}")]
    Catalog(String),
}

pub type Result<T> = std::result::Result<T, Error>;

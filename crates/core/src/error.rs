/// Failure to start a sound. Always swallowed by the dispatchers; audio is
/// best-effort and never interrupts the simulation.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("could not create a voice for '{source_url}': {reason}")]
    Create { source_url: String, reason: String },

    #[error("playback of '{source_url}' was rejected: {reason}")]
    Rejected { source_url: String, reason: String },
}

/// Malformed configuration handed in from outside (JSON from the page, a
/// replay scenario).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid element registration: {0}")]
    Registration(#[source] serde_json::Error),

    #[error("invalid tuning parameters: {0}")]
    Params(#[source] serde_json::Error),

    #[error("invalid sound library: {0}")]
    SoundLibrary(#[source] serde_json::Error),

    #[error("invalid sound map: {0}")]
    SoundMap(#[source] serde_json::Error),
}

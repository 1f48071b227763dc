use reqwest::StatusCode;

/// Errors surfaced by the monitor coordinator.
///
/// Everything that happens while monitoring (connect failures, dead streams,
/// silence) is folded into offline transitions and never reaches the caller;
/// only construction-time problems are reported here.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("failed to build HTTP client: {source}")]
    Client {
        #[from]
        source: reqwest::Error,
    },
}

/// Errors from playlist resolution.
///
/// All of these are non-fatal: the coordinator logs a warning and simply does
/// not start a worker until the next `restart()`.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no stream URL configured")]
    EmptyUrl,

    #[error("playlist request failed: {source}")]
    Fetch {
        #[from]
        source: reqwest::Error,
    },

    #[error("playlist request returned HTTP {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("no usable entry in playlist {url}")]
    EmptyPlaylist { url: String },
}

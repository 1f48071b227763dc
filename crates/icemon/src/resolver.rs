//! Playlist resolution.
//!
//! A configured URL may point at an `.m3u` playlist instead of the stream
//! itself. Resolution fetches the playlist with a bounded timeout and returns
//! its first usable entry verbatim; direct stream URLs pass through
//! unchanged. Stateless: every call re-resolves from scratch.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info};

use crate::error::ResolveError;

/// Case-insensitive extension marking a playlist indirection file.
pub const PLAYLIST_EXTENSION: &str = ".m3u";

/// Overall timeout for a playlist fetch (connect + body).
pub const PLAYLIST_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether the URL points at a playlist rather than the stream itself.
pub fn is_playlist_url(url: &str) -> bool {
    url.trim().to_ascii_lowercase().ends_with(PLAYLIST_EXTENSION)
}

/// First non-blank, non-comment line of a playlist body.
///
/// The entry is returned verbatim (trimmed) and not re-validated as a URL;
/// the connection worker finds out whether it is reachable.
pub fn parse_playlist(body: &str) -> Option<&str> {
    body.lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
}

/// Resolve a configured URL to the effective stream URL.
///
/// Non-playlist URLs resolve to themselves. Playlist URLs are fetched and
/// scanned; any failure (network, HTTP status, empty playlist) is returned as
/// a [`ResolveError`] for the coordinator to log. None of them are fatal.
pub async fn resolve(client: &Client, raw: &str) -> Result<String, ResolveError> {
    let url = raw.trim();
    if url.is_empty() {
        return Err(ResolveError::EmptyUrl);
    }
    if !is_playlist_url(url) {
        return Ok(url.to_string());
    }

    debug!(url = %url, "resolving playlist");

    let response = client
        .get(url)
        .timeout(PLAYLIST_FETCH_TIMEOUT)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(ResolveError::HttpStatus {
            status,
            url: url.to_string(),
        });
    }

    // Tolerate invalid byte sequences; playlists in the wild are not always
    // clean UTF-8.
    let body = response.bytes().await?;
    let body = String::from_utf8_lossy(&body);

    match parse_playlist(&body) {
        Some(entry) => {
            info!(playlist = %url, entry = %entry, "resolved stream URL from playlist");
            Ok(entry.to_string())
        }
        None => Err(ResolveError::EmptyPlaylist {
            url: url.to_string(),
        }),
    }
}

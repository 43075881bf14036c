//! Relay URL construction.

use url::Url;

use sendit_protocol::constants::{RELAY_CREATE_ROOM_PATH, RELAY_ROOM_PARAM, RELAY_WS_PATH};

use crate::RelayError;

/// Builds the WebSocket URL joining `room_id` on the relay at `endpoint`.
///
/// `endpoint` may use `http(s)` or `ws(s)`; any path, query or fragment is
/// replaced.
pub fn relay_ws_url(endpoint: &str, room_id: &str) -> Result<Url, RelayError> {
    let room_id = room_id.trim();
    if room_id.is_empty() {
        return Err(RelayError::MissingRoom);
    }
    let mut url = base_url(endpoint)?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme)
        .map_err(|_| RelayError::InvalidEndpoint(endpoint.to_string()))?;
    url.set_path(RELAY_WS_PATH);
    url.query_pairs_mut().append_pair(RELAY_ROOM_PARAM, room_id);
    Ok(url)
}

/// Builds the HTTP URL of the relay's room allocation endpoint.
pub fn create_room_url(endpoint: &str) -> Result<Url, RelayError> {
    let mut url = base_url(endpoint)?;
    let scheme = match url.scheme() {
        "https" | "wss" => "https",
        _ => "http",
    };
    url.set_scheme(scheme)
        .map_err(|_| RelayError::InvalidEndpoint(endpoint.to_string()))?;
    url.set_path(RELAY_CREATE_ROOM_PATH);
    Ok(url)
}

fn base_url(endpoint: &str) -> Result<Url, RelayError> {
    let mut url =
        Url::parse(endpoint).map_err(|e| RelayError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
    match url.scheme() {
        "http" | "https" | "ws" | "wss" => {}
        other => {
            return Err(RelayError::InvalidEndpoint(format!(
                "unsupported scheme: {other}"
            )));
        }
    }
    url.set_path("");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

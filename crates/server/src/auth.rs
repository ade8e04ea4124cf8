//! HTTP Basic authentication for stream creation. Publishing and
//! subscribing authenticate by possession of the stream id instead.

use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD as base64;
use base64::Engine;

/// One accepted `user:password` pair.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Credential {
    user: String,
    password: String,
}

/// Parses a `|`-separated list of `user:password` pairs. Malformed entries
/// (no colon) are dropped.
pub(crate) fn parse(raw: &str) -> Vec<Credential> {
    raw.split('|')
        .filter_map(|pair| {
            pair.split_once(':').map(|(user, password)| Credential {
                user: user.to_string(),
                password: password.to_string(),
            })
        })
        .collect()
}

/// True when `credentials` is empty (auth disabled) or the request carries
/// a Basic authorization matching any accepted pair.
pub(crate) fn authorized(headers: &HeaderMap, credentials: &[Credential]) -> bool {
    if credentials.is_empty() {
        return true;
    }

    let Some(presented) = presented_credential(headers) else {
        return false;
    };

    credentials.contains(&presented)
}

fn presented_credential(headers: &HeaderMap) -> Option<Credential> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = base64.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;

    decoded.split_once(':').map(|(user, password)| Credential {
        user: user.to_string(),
        password: password.to_string(),
    })
}

pub(crate) fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(WWW_AUTHENTICATE, "Basic realm=\"tailcast\"")],
        "Unauthorized\n",
    )
        .into_response()
}

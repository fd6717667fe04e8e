//! Pre-handshake gate: path routing and header authentication.

use easyws_core::AuthPolicy;
use metrics::counter;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request};
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tracing::{debug, info};

use crate::metrics::WS_AUTH_REJECTIONS_TOTAL;

/// Whether `path` is served by an endpoint registered at `pattern`.
///
/// A pattern ending in `/` matches itself and everything below it; any
/// other pattern matches exactly.
pub fn path_matches(pattern: &str, path: &str) -> bool {
    if pattern.ends_with('/') {
        path.starts_with(pattern)
    } else {
        path == pattern
    }
}

/// Checks run against every upgrade request before the handshake.
#[derive(Clone, Debug, Default)]
pub struct HandshakeGate {
    path: Option<String>,
    auth: Option<AuthPolicy>,
}

impl HandshakeGate {
    /// Gate on `path` (when set) and `auth` (when set).
    pub fn new(path: Option<String>, auth: Option<AuthPolicy>) -> Self {
        Self { path, auth }
    }

    /// Accept or refuse a request. Path is checked before auth.
    ///
    /// With no path and no policy every request passes.
    pub fn check(&self, request: &Request) -> Result<(), ErrorResponse> {
        let path = request.uri().path();
        if let Some(pattern) = &self.path {
            if !path_matches(pattern, path) {
                info!(path, pattern = %pattern, "upgrade refused: no route");
                counter!(WS_AUTH_REJECTIONS_TOTAL, "reason" => "path").increment(1);
                return Err(refusal(StatusCode::NOT_FOUND, "not found"));
            }
        }

        if let Some(policy) = &self.auth {
            let headers = request.headers();
            if let Err(rejection) =
                policy.evaluate(|name| headers.get(name).map(HeaderValue::as_bytes))
            {
                info!(path, reason = %rejection, "upgrade refused: unauthorized");
                counter!(WS_AUTH_REJECTIONS_TOTAL, "reason" => "auth").increment(1);
                return Err(refusal(StatusCode::UNAUTHORIZED, "unauthorized"));
            }
        }

        debug!(path, "upgrade request accepted");
        Ok(())
    }
}

fn refusal(status: StatusCode, body: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(body.to_owned()));
    *response.status_mut() = status;
    response
}

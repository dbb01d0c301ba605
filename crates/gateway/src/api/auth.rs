//! HTTP Basic authentication middleware: username is
//! ignored, the password is compared byte-for-byte in constant time.
//! Missing or wrong credentials -> 401 with
//! `WWW-Authenticate: basic realm="wforce"`.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use subtle::ConstantTimeEq;

use crate::state::AppState;

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [("WWW-Authenticate", "basic realm=\"wforce\"")],
        axum::Json(serde_json::json!({ "status": "failure", "reason": "authentication failure" })),
    )
        .into_response()
}

/// Extracts the password half of an `Authorization: Basic <b64>` header.
/// The username is accepted but never inspected.
fn extract_password(header: &str) -> Option<String> {
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (_, password) = text.split_once(':')?;
    Some(password.to_string())
}

pub async fn require_basic_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let expected = state.config.server.password.as_bytes();
    if expected.is_empty() {
        return next.run(req).await;
    }

    let provided = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(extract_password)
        .unwrap_or_default();

    if !bool::from(provided.as_bytes().ct_eq(expected)) {
        return unauthorized();
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_password_ignoring_username() {
        let header = format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode("anything:secret")
        );
        assert_eq!(extract_password(&header), Some("secret".to_string()));
    }

    #[test]
    fn malformed_header_yields_none() {
        assert_eq!(extract_password("Bearer xyz"), None);
    }
}

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use super::app::App;

/// Basic auth gate, layered over the whole router when enabled so
/// static and upgrade routes are protected uniformly.
pub async fn basic_auth(
    State(app): State<Arc<App>>,
    request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    if !authorized(header, &app.options.credential) {
        return challenge();
    }
    tracing::debug!("Basic authentication succeeded");
    next.run(request).await
}

/// Byte-exact comparison of the decoded credential against the
/// configured `user:password` string.
fn authorized(header: Option<&str>, credential: &str) -> bool {
    let Some(header) = header else {
        return false;
    };
    let Some((scheme, payload)) = header.split_once(' ') else {
        return false;
    };
    if !scheme.eq_ignore_ascii_case("basic") {
        return false;
    }
    let Ok(decoded) = BASE64.decode(payload.trim()) else {
        return false;
    };
    decoded == credential.as_bytes()
}

fn challenge() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(
            WWW_AUTHENTICATE,
            HeaderValue::from_static(r#"Basic realm="GoTTY""#),
        )],
        "Authorization required",
    )
        .into_response()
}

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use rolegate_auth::LoginFailure;

/// Challenge sent with every 401.
pub const BASIC_CHALLENGE: &str = r#"Basic realm="rolegate", charset="UTF-8""#;

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// 401 for missing credentials and for every failed login alike.
pub fn unauthorized() -> Response {
    let mut res = json_error(
        StatusCode::UNAUTHORIZED,
        "unauthorized",
        LoginFailure::AuthenticationFailed.to_string(),
    );
    res.headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(BASIC_CHALLENGE));
    res
}

pub fn forbidden() -> Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", "access denied")
}

pub fn unavailable() -> Response {
    json_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "unavailable",
        LoginFailure::Unavailable.to_string(),
    )
}

pub fn not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, "not_found", "not found")
}

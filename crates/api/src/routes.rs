use axum::{
    Json,
    extract::{Extension, Query, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};

use rolegate_auth::Principal;

use crate::{app::AppState, errors};

// Handlers take the principal as optional: a policy may open any route to
// anonymous callers, in which case the gate inserts nothing.

fn username_of(principal: &Option<Extension<Principal>>) -> Option<&str> {
    principal.as_ref().map(|Extension(p)| p.username().as_str())
}

pub async fn home(principal: Option<Extension<Principal>>) -> impl IntoResponse {
    Json(json!({
        "message": "welcome",
        "username": username_of(&principal),
    }))
}

fn area(name: &str, principal: &Option<Extension<Principal>>) -> Json<Value> {
    let message = match username_of(principal) {
        Some(username) => format!("hello {username}"),
        None => "hello".to_string(),
    };
    Json(json!({
        "message": message,
        "area": name,
        "username": username_of(principal),
    }))
}

pub async fn user_home(principal: Option<Extension<Principal>>) -> impl IntoResponse {
    area("user", &principal)
}

pub async fn admin_home(principal: Option<Extension<Principal>>) -> impl IntoResponse {
    area("admin", &principal)
}

/// GET /me - the resolved principal, or an empty identity for anonymous callers.
pub async fn me(principal: Option<Extension<Principal>>) -> Response {
    match principal {
        Some(Extension(principal)) => Json(principal).into_response(),
        None => Json(json!({ "username": null, "roles": [] })).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub resource: String,
}

/// GET /explain?resource=/admin - why the caller would get the verdict it gets.
pub async fn explain(
    State(state): State<AppState>,
    principal: Option<Extension<Principal>>,
    Query(query): Query<ExplainQuery>,
) -> impl IntoResponse {
    let principal = principal.as_ref().map(|Extension(p)| p);
    Json(state.policy.explain(principal, &query.resource))
}

pub async fn not_found() -> Response {
    errors::not_found()
}

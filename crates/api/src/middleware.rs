//! Per-request authentication and authorization gate.
//!
//! 1. Decode HTTP Basic credentials, if any.
//! 2. Resolve them to a [`Principal`] on the blocking pool (hash verification
//!    is CPU-bound and the store trait is synchronous).
//! 3. Ask the policy table for a verdict on the request path.
//!
//! Presented-but-wrong credentials are rejected even on public resources.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use tracing::{debug, error, info};

use rolegate_auth::{LoginFailure, Principal, Verdict};

use crate::{app::AppState, errors};

enum Credentials {
    Absent,
    Malformed,
    Present { username: String, secret: String },
}

pub async fn gate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let resource = req.uri().path().to_string();

    let principal = match basic_credentials(req.headers()) {
        Credentials::Absent => None,
        Credentials::Malformed => {
            debug!(%resource, "malformed authorization header");
            return errors::unauthorized();
        }
        Credentials::Present { username, secret } => {
            match authenticate(&state, username, secret).await {
                Ok(principal) => Some(principal),
                Err(LoginFailure::AuthenticationFailed) => return errors::unauthorized(),
                Err(LoginFailure::Unavailable) => return errors::unavailable(),
            }
        }
    };

    match state.policy.decide(principal.as_ref(), &resource) {
        Verdict::Allow => {
            if let Some(principal) = principal {
                req.extensions_mut().insert(principal);
            }
            next.run(req).await
        }
        Verdict::Unauthenticated => errors::unauthorized(),
        Verdict::Forbidden => {
            info!(
                %resource,
                username = principal.as_ref().map(|p| p.username().as_str()),
                "access denied"
            );
            errors::forbidden()
        }
    }
}

async fn authenticate(
    state: &AppState,
    username: String,
    secret: String,
) -> Result<Principal, LoginFailure> {
    let resolver = Arc::clone(&state.resolver);
    let outcome = tokio::task::spawn_blocking(move || resolver.resolve(&username, &secret)).await;

    match outcome {
        Ok(Ok(principal)) => Ok(principal),
        Ok(Err(err)) => {
            debug!(reason = %err, "login rejected");
            Err(err.into())
        }
        Err(join) => {
            error!(error = %join, "login task failed");
            Err(LoginFailure::Unavailable)
        }
    }
}

fn basic_credentials(headers: &HeaderMap) -> Credentials {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Credentials::Absent;
    };
    let Ok(value) = value.to_str() else {
        return Credentials::Malformed;
    };
    let Some((scheme, encoded)) = value.trim().split_once(' ') else {
        return Credentials::Malformed;
    };
    if !scheme.eq_ignore_ascii_case("basic") {
        return Credentials::Malformed;
    }

    let Some(decoded) = STANDARD
        .decode(encoded.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
    else {
        return Credentials::Malformed;
    };

    // The username cannot contain ':'; the secret can.
    match decoded.split_once(':') {
        Some((username, secret)) => Credentials::Present {
            username: username.to_string(),
            secret: secret.to_string(),
        },
        None => Credentials::Malformed,
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        map
    }

    #[test]
    fn decodes_basic_credentials() {
        // "admin:se:cret"
        let creds = basic_credentials(&headers("Basic YWRtaW46c2U6Y3JldA=="));
        assert!(matches!(
            creds,
            Credentials::Present { ref username, ref secret } if username == "admin" && secret == "se:cret"
        ));
    }

    #[test]
    fn scheme_is_case_insensitive() {
        // "user:password"
        let creds = basic_credentials(&headers("basic dXNlcjpwYXNzd29yZA=="));
        assert!(matches!(creds, Credentials::Present { .. }));
    }

    #[test]
    fn missing_header_is_anonymous() {
        assert!(matches!(basic_credentials(&HeaderMap::new()), Credentials::Absent));
    }

    #[test]
    fn malformed_headers_are_rejected() {
        for value in [
            "Bearer abc.def.ghi",
            "Basic",
            "Basic !!!not-base64!!!",
            // "no-colon"
            "Basic bm8tY29sb24=",
        ] {
            assert!(
                matches!(basic_credentials(&headers(value)), Credentials::Malformed),
                "expected {value:?} to be malformed"
            );
        }
    }
}

// gateway-server/src/auth.rs
// ============================================================================
// Module: Control Surface Guard
// Description: Authenticates DLQ and execution-log control endpoints.
// Purpose: Keep operator-facing endpoints off the open internet without a
//          dedicated identity provider.
// Dependencies: axum, gateway-core::core::hashing
// ============================================================================

//! ## Overview
//! Two independent credentials are accepted, either is sufficient: a static
//! `X-Api-Key` header compared against `auth.api_key`, or an
//! `Authorization: Bearer <payload>.<signature>` token whose signature is an
//! HMAC-SHA256 (base64) of `payload` under `auth.jwt_secret`, verified with
//! [`gateway_core::core::hashing::verify_hmac_sha256_base64`] — the same
//! primitive the outbound signing provider uses, rather than pulling in a
//! dedicated JWT crate for one bearer check. When neither secret is
//! configured, the control surface is left open (local/dev use).

use axum::extract::Request;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use gateway_core::core::hashing::verify_hmac_sha256_base64;

use crate::error::ServerError;
use crate::state::AppState;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn accepts_api_key(headers: &HeaderMap, expected: &str) -> bool {
    header_str(headers, "x-api-key").is_some_and(|value| value == expected)
}

fn accepts_bearer(headers: &HeaderMap, secret: &str) -> bool {
    let Some(token) = header_str(headers, "authorization").and_then(|value| value.strip_prefix("Bearer ")) else {
        return false;
    };
    let Some((payload, signature)) = token.rsplit_once('.') else {
        return false;
    };
    verify_hmac_sha256_base64(secret.as_bytes(), payload, signature)
}

/// Rejects requests to a control-surface endpoint that present neither a
/// valid `X-Api-Key` nor a valid bearer token, when either secret is configured.
///
/// Never returns `Err`: an unauthorized request is answered in place with a
/// `401` response rather than surfacing as a [`ServerError`] variant. The
/// `Result` return type only exists to satisfy `axum::middleware::from_fn`'s
/// signature alongside the handlers this guards, which do return one.
pub async fn control_surface_guard(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, ServerError> {
    let api_key = state.auth.api_key.as_deref();
    let jwt_secret = state.auth.jwt_secret.as_deref();
    if api_key.is_none() && jwt_secret.is_none() {
        return Ok(next.run(request).await);
    }

    let headers = request.headers();
    let authorized = api_key.is_some_and(|key| accepts_api_key(headers, key)) || jwt_secret.is_some_and(|secret| accepts_bearer(headers, secret));
    if !authorized {
        return Ok((axum::http::StatusCode::UNAUTHORIZED, "missing or invalid control-surface credential").into_response());
    }
    Ok(next.run(request).await)
}

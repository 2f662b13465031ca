//! SAML 2.0 Service Provider middleware for axum: Web Browser SSO and Single
//! Logout, pluggable in front of an application router.
//!
//! The middleware owns a configurable base path. Requests under it are
//! dispatched to the SAML phases; everything else passes through to the
//! wrapped application. A successful authentication callback inserts a
//! [`SamlIdentity`] into the request's extensions and hands the request on.

pub mod attributes;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod identity;
pub mod phases;
pub mod relay;
pub mod session;
pub mod state;
pub mod xmlutil;

pub use config::{RelayStateDefault, RequestedAttribute, SamlConfig};
pub use error::{Error, FailureKind};
pub use identity::SamlIdentity;
pub use state::SamlState;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, request::Parts};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dispatch::Phase;
use std::collections::HashMap;
use std::sync::Arc;

/// Layers the SAML middleware onto an application router.
pub fn attach(router: Router, state: Arc<SamlState>) -> Router {
    router.layer(axum::middleware::from_fn_with_state(state, middleware))
}

/// The middleware entry point, usable directly with
/// `axum::middleware::from_fn_with_state`.
pub async fn middleware(
    State(state): State<Arc<SamlState>>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    if !dispatch::is_saml_path(&path, &state.config.base_path) {
        return next.run(req).await;
    }

    let (mut parts, body) = req.into_parts();
    let (params, body_bytes) = match collect_params(&parts, body).await {
        Ok(collected) => collected,
        Err(e) => return e.into_response(),
    };

    let (session_id, fresh_cookie) = resolve_session_id(&parts.headers, &state);
    let phase = dispatch::select_phase(&path, &state.config.base_path, &params);
    tracing::debug!(?phase, %path, "dispatching SAML request");

    let result = match phase {
        // is_saml_path already filtered these out; kept for totality
        Phase::PassThrough => {
            let req = Request::from_parts(parts, Body::from(body_bytes));
            return next.run(req).await;
        }
        Phase::AuthnRequest => phases::request::authn_request(&state, &parts, &params),
        Phase::Callback => match phases::callback::callback(&state, &session_id, &params) {
            Ok(identity) => {
                parts.extensions.insert(identity);
                let req = Request::from_parts(parts, Body::from(body_bytes));
                Ok(next.run(req).await)
            }
            Err(e) => Err(e),
        },
        Phase::Metadata => phases::metadata::metadata(&state),
        Phase::SloResponse => phases::slo::slo_response(&state, &session_id, &parts, &params),
        Phase::SloRequest => phases::slo::slo_request(&state, &session_id, &parts, &params),
        Phase::SloMissingMessage => {
            Err(Error::Validation("SAML logout response/request missing".into()))
        }
        Phase::SpInitiatedLogout => {
            phases::spslo::sp_initiated_logout(&state, &session_id, &parts, &params)
        }
    };

    let mut response = match result {
        Ok(response) => response,
        Err(e) => e.into_response(),
    };
    if let Some(cookie) = fresh_cookie {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

const MAX_FORM_BODY: usize = 2 * 1024 * 1024;

/// Collects request parameters from the query string and, for form posts,
/// the body. The raw body bytes are kept so pass-through and callback can
/// reconstruct the request.
async fn collect_params(
    parts: &Parts,
    body: Body,
) -> Result<(HashMap<String, String>, Bytes), Error> {
    let mut params = HashMap::new();
    if let Some(query) = parts.uri.query() {
        for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
            params.insert(k.into_owned(), v.into_owned());
        }
    }

    let bytes = axum::body::to_bytes(body, MAX_FORM_BODY)
        .await
        .map_err(|e| Error::InvalidRequest(format!("failed to read request body: {e}")))?;

    let is_form = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
    if is_form {
        for (k, v) in url::form_urlencoded::parse(&bytes) {
            params.insert(k.into_owned(), v.into_owned());
        }
    }

    Ok((params, bytes))
}

/// Session id from the session cookie, or a freshly created session plus the
/// Set-Cookie value to issue it.
fn resolve_session_id(headers: &HeaderMap, state: &SamlState) -> (String, Option<HeaderValue>) {
    let cookie_name = &state.config.session_cookie;
    if let Some(id) = cookie_value(headers, cookie_name) {
        return (id, None);
    }

    let id = state.sessions.create();
    let cookie = format!("{cookie_name}={id}; Path=/; HttpOnly; SameSite=Lax");
    (id, HeaderValue::from_str(&cookie).ok())
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(raw) = header.to_str() else { continue };
        for pair in raw.split(';') {
            if let Some((k, v)) = pair.trim().split_once('=') {
                if k == name && !v.is_empty() {
                    return Some(v.to_string());
                }
            }
        }
    }
    None
}

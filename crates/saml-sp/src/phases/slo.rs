use crate::error::Error;
use crate::relay;
use crate::state::SamlState;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Redirect, Response};
use std::collections::HashMap;

/// Completes an SP-initiated logout: the IdP's LogoutResponse must correlate
/// with the session's outstanding transaction id. Only then are the principal
/// and the pending id cleared.
pub fn slo_response(
    state: &SamlState,
    session_id: &str,
    parts: &Parts,
    params: &HashMap<String, String>,
) -> Result<Response, Error> {
    let raw = params
        .get("SAMLResponse")
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::Validation("SAML logout response missing".into()))?;

    let pending = state
        .sessions
        .pending_logout_id(session_id)
        .ok_or_else(|| Error::Validation("no outstanding logout request for this session".into()))?;

    state.engine.validate_logout_response(raw, &pending)?;
    state.sessions.clear_logout_state(session_id);

    let relay = relay::resolve_relay_state(parts, params, state.config.default_relay_state.as_ref())
        .unwrap_or_else(|| "/".into());

    tracing::info!(transaction_id = pending, "SP-initiated logout completed");
    Ok(Redirect::to(&relay).into_response())
}

/// Handles an IdP-initiated LogoutRequest. The request is accepted only when
/// it validates and its subject names the session's current principal; on
/// acceptance the whole session is wiped and a LogoutResponse redirect is
/// issued back to the IdP.
pub fn slo_request(
    state: &SamlState,
    session_id: &str,
    parts: &Parts,
    params: &HashMap<String, String>,
) -> Result<Response, Error> {
    let raw = params
        .get("SAMLRequest")
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::Validation("SAML logout request missing".into()))?;

    let parsed = state.engine.parse_logout_request(raw)?;
    let current = state.sessions.principal_id(session_id);

    let subject_matches = matches!(
        (&parsed.subject_id, &current),
        (Some(requested), Some(session)) if requested == session
    );
    if !state.engine.validate_logout_request(&parsed) || !subject_matches {
        return Err(Error::Validation("failed to process logout request".into()));
    }

    state.sessions.clear(session_id);

    let relay = relay::resolve_relay_state(parts, params, state.config.default_relay_state.as_ref());
    let url = state.engine.build_logout_response(&parsed.id, relay.as_deref())?;

    tracing::info!(request_id = parsed.id, "IdP-initiated logout accepted");
    Ok(Redirect::to(&url).into_response())
}

use crate::error::Error;
use crate::relay;
use crate::state::SamlState;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Redirect, Response};
use std::collections::HashMap;

/// Starts an SP-initiated logout round-trip: issues a LogoutRequest to the
/// IdP's SLO endpoint and stores its transaction id for correlation with the
/// eventual LogoutResponse. Without a configured IdP SLO endpoint the phase
/// answers 501.
pub fn sp_initiated_logout(
    state: &SamlState,
    session_id: &str,
    parts: &Parts,
    params: &HashMap<String, String>,
) -> Result<Response, Error> {
    let config = &state.config;

    if config.idp_slo_target_url.is_none() {
        tracing::warn!("SP-initiated logout requested but no IdP SLO endpoint is configured");
        return Ok((StatusCode::NOT_IMPLEMENTED, "Not Implemented").into_response());
    }

    let name_id = config
        .name_identifier_value
        .clone()
        .or_else(|| state.sessions.principal_id(session_id))
        .ok_or_else(|| Error::Validation("no authenticated principal to log out".into()))?;

    let relay = relay::resolve_relay_state(parts, params, config.default_relay_state.as_ref());
    let redirect = state.engine.build_logout_request(&name_id, relay.as_deref())?;

    // supersedes any prior outstanding transaction id
    state
        .sessions
        .set_pending_logout(session_id, &redirect.transaction_id);

    tracing::info!(
        transaction_id = redirect.transaction_id,
        "issued SP-initiated logout request"
    );
    Ok(Redirect::to(&redirect.url).into_response())
}

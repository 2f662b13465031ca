use crate::error::Error;
use crate::relay;
use crate::state::SamlState;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Redirect, Response};
use std::collections::HashMap;

/// Builds an authentication request and redirects the browser to the IdP's
/// SSO endpoint. Only whitelisted inbound parameters are forwarded, renamed
/// per the configured mapping; everything else is dropped. No session state
/// is touched.
pub fn authn_request(
    state: &SamlState,
    parts: &Parts,
    params: &HashMap<String, String>,
) -> Result<Response, Error> {
    let config = &state.config;

    let mut extra_params = Vec::new();
    for (inbound_name, outbound_name) in &config.runtime_request_parameters {
        if let Some(value) = params.get(inbound_name) {
            extra_params.push((outbound_name.clone(), value.clone()));
        }
    }

    let relay_state = relay::resolve_relay_state(parts, params, config.default_relay_state.as_ref());
    let url = state
        .engine
        .build_authn_request(&extra_params, relay_state.as_deref())?;

    tracing::info!(idp = config.idp_sso_target_url, "redirecting to IdP SSO endpoint");
    Ok(Redirect::to(&url).into_response())
}

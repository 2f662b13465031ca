use crate::config::RelayStateDefault;
use axum::http::request::Parts;
use std::collections::HashMap;

/// Post-authentication/post-logout redirect target. An explicit non-empty
/// `RelayState` parameter always wins; otherwise the configured default is
/// evaluated according to its shape.
pub fn resolve_relay_state(
    parts: &Parts,
    params: &HashMap<String, String>,
    default: Option<&RelayStateDefault>,
) -> Option<String> {
    if let Some(relay) = params.get("RelayState") {
        if !relay.is_empty() {
            return Some(relay.clone());
        }
    }

    match default {
        Some(RelayStateDefault::Literal(s)) => Some(s.clone()),
        Some(RelayStateDefault::NoArgFn(f)) => Some(f()),
        Some(RelayStateDefault::RequestArgFn(f)) => Some(f(parts)),
        None => None,
    }
}

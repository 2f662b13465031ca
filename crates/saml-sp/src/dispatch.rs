use std::collections::HashMap;

/// The phase an inbound request is routed to. Exactly one phase per request;
/// path matching is checked before parameter inspection, and unrecognized
/// sub-paths always fall through to the wrapped application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    PassThrough,
    AuthnRequest,
    Callback,
    Metadata,
    SloResponse,
    SloRequest,
    /// `<base>/slo` hit with neither `SAMLResponse` nor `SAMLRequest`.
    SloMissingMessage,
    SpInitiatedLogout,
}

/// Whether the path belongs to the middleware at all. Anything else is the
/// application's, untouched.
pub fn is_saml_path(path: &str, base: &str) -> bool {
    path == base
        || path == subpath(base, "metadata")
        || path == subpath(base, "slo")
        || path == subpath(base, "spslo")
}

pub fn select_phase(path: &str, base: &str, params: &HashMap<String, String>) -> Phase {
    if !path.starts_with(base) {
        return Phase::PassThrough;
    }
    if path == subpath(base, "metadata") {
        return Phase::Metadata;
    }
    if path == subpath(base, "slo") {
        if params.contains_key("SAMLResponse") {
            return Phase::SloResponse;
        }
        if params.contains_key("SAMLRequest") {
            return Phase::SloRequest;
        }
        return Phase::SloMissingMessage;
    }
    if path == subpath(base, "spslo") {
        return Phase::SpInitiatedLogout;
    }
    if path == base {
        if params.contains_key("SAMLResponse") {
            return Phase::Callback;
        }
        return Phase::AuthnRequest;
    }
    Phase::PassThrough
}

fn subpath(base: &str, leaf: &str) -> String {
    format!("{base}/{leaf}")
}

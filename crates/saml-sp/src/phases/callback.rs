use crate::attributes;
use crate::engine::ResponseOptions;
use crate::error::Error;
use crate::fingerprint;
use crate::identity::SamlIdentity;
use crate::state::SamlState;
use std::collections::HashMap;
use std::sync::Arc;

/// Validates an inbound authentication response and produces the identity
/// record. The session principal is written only after the engine accepted
/// the response and a non-empty principal identifier was extracted; a failure
/// anywhere leaves the session untouched.
pub fn callback(
    state: &SamlState,
    session_id: &str,
    params: &HashMap<String, String>,
) -> Result<SamlIdentity, Error> {
    let config = &state.config;

    let raw = params
        .get("SAMLResponse")
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::Validation("SAML response missing".into()))?;

    let mut opts = ResponseOptions::from_config(config);
    if let Some(validator) = &config.idp_cert_fingerprint_validator {
        let observed = fingerprint::response_fingerprint(raw)?;
        let resolved = validator(&observed)
            .ok_or_else(|| Error::Validation("non-existent fingerprint".into()))?;
        // the resolved fingerprint overrides the configured one, for this
        // request only
        opts.fingerprint = Some(resolved);
    }

    let validated = state.engine.validate_response(raw, &opts)?;

    let principal_id = validated
        .principal_id
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| Error::Validation("SAML response missing principal identifier".into()))?
        .to_string();

    state.sessions.set_principal(session_id, &principal_id);

    let resolved = attributes::resolve_attributes(&config.attribute_statements, &validated.attributes);

    tracing::info!(
        principal = principal_id,
        attribute_count = validated.attributes.len(),
        "authentication callback validated"
    );

    Ok(SamlIdentity {
        principal_id,
        attributes: resolved,
        raw_attributes: validated.attributes,
        raw_response: Arc::from(validated.xml),
    })
}

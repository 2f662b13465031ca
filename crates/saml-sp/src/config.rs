use anyhow::{Context, Result};
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub const BASIC_ATTRIBUTE_NAME_FORMAT: &str = "urn:oasis:names:tc:SAML:2.0:attrname-format:basic";

/// An attribute declared in the SP metadata's attribute-consuming service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestedAttribute {
    pub name: String,
    pub name_format: String,
    pub friendly_name: String,
}

impl RequestedAttribute {
    pub fn basic(name: &str, friendly_name: &str) -> Self {
        Self {
            name: name.into(),
            name_format: BASIC_ATTRIBUTE_NAME_FORMAT.into(),
            friendly_name: friendly_name.into(),
        }
    }
}

/// Default relay state when the inbound request carries none. The three
/// shapes the original option accepted, as an explicit tagged variant.
#[derive(Clone)]
pub enum RelayStateDefault {
    Literal(String),
    NoArgFn(Arc<dyn Fn() -> String + Send + Sync>),
    RequestArgFn(Arc<dyn Fn(&Parts) -> String + Send + Sync>),
}

impl fmt::Debug for RelayStateDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayStateDefault::Literal(s) => f.debug_tuple("Literal").field(s).finish(),
            RelayStateDefault::NoArgFn(_) => f.write_str("NoArgFn(..)"),
            RelayStateDefault::RequestArgFn(_) => f.write_str("RequestArgFn(..)"),
        }
    }
}

/// Dynamic fingerprint lookup: given the fingerprint of the certificate
/// embedded in an inbound response, returns the trusted fingerprint to pin
/// for that request, or `None` if the certificate is unknown.
pub type FingerprintValidator = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Immutable per-deployment configuration, read by every phase.
#[derive(Clone)]
pub struct SamlConfig {
    /// External base URL of this service, e.g. `https://sp.example.com`.
    pub base_url: String,
    /// Path prefix owned by the middleware, e.g. `/auth/saml`.
    pub base_path: String,
    /// SP entity id.
    pub issuer: String,
    pub idp_sso_target_url: String,
    pub idp_slo_target_url: Option<String>,
    /// IdP entity id, embedded in synthesized IdP metadata when known.
    pub idp_entity_id: Option<String>,
    /// PEM-encoded IdP signing certificate.
    pub idp_cert: Option<String>,
    /// SHA-1 fingerprint of the IdP signing certificate, uppercase
    /// colon-separated hex. Used when no certificate is configured.
    pub idp_cert_fingerprint: Option<String>,
    pub idp_cert_fingerprint_validator: Option<FingerprintValidator>,
    /// Overrides the default callback URL (`base_url` + `base_path`).
    pub assertion_consumer_service_url: Option<String>,
    pub name_identifier_format: Option<String>,
    /// NameID value for outbound logout requests; defaults to the session
    /// principal when unset.
    pub name_identifier_value: Option<String>,
    /// Whitelist of inbound query parameters forwarded into the outbound
    /// authentication request, renamed inbound name -> outbound name.
    pub runtime_request_parameters: HashMap<String, String>,
    pub requested_attributes: Vec<RequestedAttribute>,
    pub attribute_service_name: String,
    /// Per identity field, the ordered list of raw attribute names to try.
    pub attribute_statements: HashMap<String, Vec<String>>,
    pub default_relay_state: Option<RelayStateDefault>,
    /// Extra validation options recognized by the protocol engine.
    pub allowed_clock_drift: Option<chrono::Duration>,
    pub matches_request_id: Option<String>,
    /// Relaxation switches for engines that support them. The default
    /// samael-backed engine has no such switches and refuses to validate
    /// when either is set.
    pub skip_subject_confirmation: bool,
    pub skip_conditions: bool,
    /// Name of the cookie carrying the browser session id.
    pub session_cookie: String,
}

impl SamlConfig {
    pub fn new(
        base_url: impl Into<String>,
        issuer: impl Into<String>,
        idp_sso_target_url: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            base_path: "/auth/saml".into(),
            issuer: issuer.into(),
            idp_sso_target_url: idp_sso_target_url.into(),
            idp_slo_target_url: None,
            idp_entity_id: None,
            idp_cert: None,
            idp_cert_fingerprint: None,
            idp_cert_fingerprint_validator: None,
            assertion_consumer_service_url: None,
            name_identifier_format: None,
            name_identifier_value: None,
            runtime_request_parameters: HashMap::new(),
            requested_attributes: default_requested_attributes(),
            attribute_service_name: "Required attributes".into(),
            attribute_statements: default_attribute_statements(),
            default_relay_state: None,
            allowed_clock_drift: None,
            matches_request_id: None,
            skip_subject_confirmation: false,
            skip_conditions: false,
            session_cookie: "sp_session".into(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("BASE_URL").context("BASE_URL must be set")?;
        let issuer = std::env::var("SP_ISSUER").context("SP_ISSUER must be set")?;
        let idp_sso_target_url =
            std::env::var("IDP_SSO_TARGET_URL").context("IDP_SSO_TARGET_URL must be set")?;

        let mut config = Self::new(base_url, issuer, idp_sso_target_url);
        if let Ok(path) = std::env::var("SAML_BASE_PATH") {
            config.base_path = path;
        }
        config.idp_slo_target_url = std::env::var("IDP_SLO_TARGET_URL").ok();
        config.idp_entity_id = std::env::var("IDP_ENTITY_ID").ok();
        config.idp_cert_fingerprint = std::env::var("IDP_CERT_FINGERPRINT").ok();
        if let Ok(path) = std::env::var("IDP_CERT_PATH") {
            let pem = std::fs::read_to_string(&path).context("failed to read IdP certificate")?;
            config.idp_cert = Some(pem);
        }
        config.name_identifier_format = std::env::var("NAME_IDENTIFIER_FORMAT").ok();

        Ok(config)
    }

    /// Assertion-consumer callback URL, defaulting to the middleware's own
    /// callback path when not explicitly configured.
    pub fn callback_url(&self) -> String {
        self.assertion_consumer_service_url
            .clone()
            .unwrap_or_else(|| format!("{}{}", self.base_url, self.base_path))
    }

    pub fn slo_url(&self) -> String {
        format!("{}{}/slo", self.base_url, self.base_path)
    }
}

/// The attribute descriptors requested by default in SP metadata.
pub fn default_requested_attributes() -> Vec<RequestedAttribute> {
    vec![
        RequestedAttribute::basic("email", "Email address"),
        RequestedAttribute::basic("name", "Full name"),
        RequestedAttribute::basic("first_name", "Given name"),
        RequestedAttribute::basic("last_name", "Family name"),
    ]
}

/// Default per-field candidate lists for the attribute resolver.
pub fn default_attribute_statements() -> HashMap<String, Vec<String>> {
    let mut map = HashMap::new();
    map.insert("name".into(), vec!["name".into()]);
    map.insert("email".into(), vec!["email".into(), "mail".into()]);
    map.insert(
        "first_name".into(),
        vec!["first_name".into(), "firstname".into(), "firstName".into()],
    );
    map.insert(
        "last_name".into(),
        vec!["last_name".into(), "lastname".into(), "lastName".into()],
    );
    map
}

//! The SAML protocol engine boundary. The core phases only ever talk to the
//! [`ProtocolEngine`] trait; [`SamaelEngine`] is the production
//! implementation backed by samael and openssl.

use crate::config::SamlConfig;
use crate::fingerprint;
use crate::xmlutil;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{SecondsFormat, Utc};
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use openssl::x509::X509;
use samael::key_info::{KeyInfo, X509Data};
use samael::metadata::{
    Endpoint, EntityDescriptor, HTTP_POST_BINDING, HTTP_REDIRECT_BINDING, IdpSsoDescriptor,
    IndexedEndpoint, KeyDescriptor, SpSsoDescriptor,
};
use samael::service_provider::ServiceProvider;
use samael::traits::ToXml;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;
use url::Url;

const SAML_SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("malformed SAML message: {0}")]
    Malformed(String),
    #[error("response validation failed: {0}")]
    ResponseValidation(String),
    #[error("logout validation failed: {0}")]
    LogoutValidation(String),
    #[error("failed to build SAML message: {0}")]
    Build(String),
}

/// Extra validation options recognized by the engine, filtered out of the
/// wider configuration surface.
#[derive(Debug, Clone, Default)]
pub struct ResponseOptions {
    /// Effective certificate fingerprint to pin trust to; a dynamically
    /// resolved fingerprint overrides the configured one per request.
    pub fingerprint: Option<String>,
    pub allowed_clock_drift: Option<chrono::Duration>,
    pub matches_request_id: Option<String>,
    pub skip_subject_confirmation: bool,
    pub skip_conditions: bool,
}

impl ResponseOptions {
    pub fn from_config(config: &SamlConfig) -> Self {
        Self {
            fingerprint: config.idp_cert_fingerprint.clone(),
            allowed_clock_drift: config.allowed_clock_drift,
            matches_request_id: config.matches_request_id.clone(),
            skip_subject_confirmation: config.skip_subject_confirmation,
            skip_conditions: config.skip_conditions,
        }
    }
}

/// A parsed, signature-checked authentication response.
#[derive(Debug, Clone)]
pub struct ValidatedResponse {
    pub principal_id: Option<String>,
    /// Raw assertion attributes, first value per name.
    pub attributes: HashMap<String, String>,
    /// The validated response document.
    pub xml: String,
}

#[derive(Debug, Clone)]
pub struct ParsedLogoutRequest {
    pub id: String,
    pub subject_id: Option<String>,
    pub issuer: Option<String>,
}

/// An outbound LogoutRequest: its transaction id and the IdP redirect URL
/// carrying it.
#[derive(Debug, Clone)]
pub struct LogoutRedirect {
    pub transaction_id: String,
    pub url: String,
}

pub trait ProtocolEngine: Send + Sync {
    /// Builds the redirect URL for an authentication request to the IdP's SSO
    /// endpoint, embedding the given extra parameters and relay state.
    fn build_authn_request(
        &self,
        extra_params: &[(String, String)],
        relay_state: Option<&str>,
    ) -> Result<String, EngineError>;

    /// Parses and strictly validates an authentication response (signature,
    /// conditions, audience, timestamps). Never soft-fails.
    fn validate_response(
        &self,
        raw: &str,
        opts: &ResponseOptions,
    ) -> Result<ValidatedResponse, EngineError>;

    /// The SP metadata document.
    fn build_metadata(&self) -> Result<String, EngineError>;

    /// Validates a LogoutResponse against the expected in-response-to
    /// correlator.
    fn validate_logout_response(
        &self,
        raw: &str,
        expected_transaction_id: &str,
    ) -> Result<(), EngineError>;

    fn parse_logout_request(&self, raw: &str) -> Result<ParsedLogoutRequest, EngineError>;

    fn validate_logout_request(&self, parsed: &ParsedLogoutRequest) -> bool;

    /// Builds an SP-initiated LogoutRequest naming the given principal.
    fn build_logout_request(
        &self,
        name_id: &str,
        relay_state: Option<&str>,
    ) -> Result<LogoutRedirect, EngineError>;

    /// Builds a LogoutResponse echoing the given request id, as a redirect
    /// URL to the IdP.
    fn build_logout_response(
        &self,
        in_response_to: &str,
        relay_state: Option<&str>,
    ) -> Result<String, EngineError>;
}

pub struct SamaelEngine {
    config: Arc<SamlConfig>,
}

impl SamaelEngine {
    pub fn new(config: Arc<SamlConfig>) -> Self {
        Self { config }
    }

    /// The certificate that response signatures must verify against: the
    /// configured certificate when present, otherwise the certificate
    /// embedded in the response, pinned by the effective fingerprint.
    fn trusted_certificate(&self, xml: &str, opts: &ResponseOptions) -> Result<X509, EngineError> {
        if let Some(pem) = &self.config.idp_cert {
            return X509::from_pem(pem.as_bytes())
                .map_err(|e| EngineError::Build(format!("configured IdP certificate invalid: {e}")));
        }

        let expected = opts
            .fingerprint
            .as_deref()
            .ok_or_else(|| {
                EngineError::ResponseValidation(
                    "no IdP certificate or fingerprint configured".into(),
                )
            })?;

        let embedded = fingerprint::embedded_certificate(xml)
            .map_err(|e| EngineError::Malformed(e.to_string()))?;
        let actual = fingerprint::fingerprint_of(&embedded)
            .map_err(|e| EngineError::Malformed(e.to_string()))?;
        if !fingerprint_eq(&actual, expected) {
            return Err(EngineError::ResponseValidation(format!(
                "certificate fingerprint mismatch: {actual}"
            )));
        }
        Ok(embedded)
    }

    fn idp_descriptor(&self, cert: &X509) -> Result<EntityDescriptor, EngineError> {
        let cert_der = cert
            .to_der()
            .map_err(|e| EngineError::Build(format!("certificate DER encode failed: {e}")))?;
        let cert_b64 = samael::crypto::mime_encode_x509_cert(&cert_der);

        let key_descriptor = KeyDescriptor {
            key_use: Some("signing".to_string()),
            key_info: KeyInfo {
                id: None,
                x509_data: Some(X509Data {
                    certificates: vec![cert_b64],
                }),
            },
            encryption_methods: None,
        };

        let slo_services = self
            .config
            .idp_slo_target_url
            .iter()
            .map(|url| Endpoint {
                binding: HTTP_REDIRECT_BINDING.to_string(),
                location: url.clone(),
                response_location: None,
            })
            .collect();

        Ok(EntityDescriptor {
            entity_id: self.config.idp_entity_id.clone(),
            idp_sso_descriptors: Some(vec![IdpSsoDescriptor {
                id: None,
                valid_until: None,
                cache_duration: None,
                protocol_support_enumeration: Some(
                    "urn:oasis:names:tc:SAML:2.0:protocol".to_string(),
                ),
                error_url: None,
                signature: None,
                key_descriptors: vec![key_descriptor],
                organization: None,
                contact_people: vec![],
                artifact_resolution_service: vec![],
                single_logout_services: slo_services,
                manage_name_id_services: vec![],
                name_id_formats: vec![],
                single_sign_on_services: vec![
                    Endpoint {
                        binding: HTTP_REDIRECT_BINDING.to_string(),
                        location: self.config.idp_sso_target_url.clone(),
                        response_location: None,
                    },
                    Endpoint {
                        binding: HTTP_POST_BINDING.to_string(),
                        location: self.config.idp_sso_target_url.clone(),
                        response_location: None,
                    },
                ],
                want_authn_requests_signed: None,
                name_id_mapping_services: vec![],
                assertion_id_request_services: vec![],
                attribute_profiles: vec![],
                attributes: vec![],
            }]),
            ..EntityDescriptor::default()
        })
    }

    fn service_provider(
        &self,
        cert: &X509,
        opts: &ResponseOptions,
    ) -> Result<ServiceProvider, EngineError> {
        let max_issue_delay = chrono::Duration::minutes(5)
            + opts.allowed_clock_drift.unwrap_or_else(chrono::Duration::zero);

        Ok(ServiceProvider {
            entity_id: Some(self.config.issuer.clone()),
            acs_url: Some(self.config.callback_url()),
            slo_url: Some(self.config.slo_url()),
            idp_metadata: self.idp_descriptor(cert)?,
            allow_idp_initiated: opts.matches_request_id.is_none(),
            max_issue_delay,
            ..ServiceProvider::default()
        })
    }
}

impl ProtocolEngine for SamaelEngine {
    fn build_authn_request(
        &self,
        extra_params: &[(String, String)],
        relay_state: Option<&str>,
    ) -> Result<String, EngineError> {
        // The authn request itself carries no signature here, so trust
        // material is not needed; synthesize the SP without it.
        let sp = ServiceProvider {
            entity_id: Some(self.config.issuer.clone()),
            acs_url: Some(self.config.callback_url()),
            slo_url: Some(self.config.slo_url()),
            idp_metadata: EntityDescriptor {
                entity_id: self.config.idp_entity_id.clone(),
                ..EntityDescriptor::default()
            },
            ..ServiceProvider::default()
        };

        let authn_request = sp
            .make_authentication_request(&self.config.idp_sso_target_url)
            .map_err(|e| EngineError::Build(format!("{e}")))?;

        let mut url = authn_request
            .redirect(relay_state.unwrap_or_default())
            .map_err(|e| EngineError::Build(format!("{e}")))?
            .ok_or_else(|| EngineError::Build("AuthnRequest has no destination".into()))?;

        for (name, value) in extra_params {
            url.query_pairs_mut().append_pair(name, value);
        }
        Ok(url.into())
    }

    fn validate_response(
        &self,
        raw: &str,
        opts: &ResponseOptions,
    ) -> Result<ValidatedResponse, EngineError> {
        // samael exposes no switch for either check; fail loudly instead of
        // validating stricter than configured
        if opts.skip_subject_confirmation || opts.skip_conditions {
            return Err(EngineError::Build(
                "skipping subject confirmation or conditions is not supported".into(),
            ));
        }

        let xml = decode_message(raw)?;
        let cert = self.trusted_certificate(&xml, opts)?;
        let sp = self.service_provider(&cert, opts)?;

        let expected_ids: Option<Vec<&str>> =
            opts.matches_request_id.as_deref().map(|id| vec![id]);
        let assertion = sp
            .parse_xml_response(&xml, expected_ids.as_deref())
            .map_err(|e| EngineError::ResponseValidation(e.to_string()))?;

        let principal_id = assertion
            .subject
            .as_ref()
            .and_then(|s| s.name_id.as_ref())
            .map(|n| n.value.clone());

        let mut attributes = HashMap::new();
        for stmt in assertion.attribute_statements.iter().flatten() {
            for attr in &stmt.attributes {
                let Some(name) = &attr.name else { continue };
                let Some(value) = attr.values.first().and_then(|v| v.value.clone()) else {
                    continue;
                };
                attributes.entry(name.clone()).or_insert(value);
            }
        }

        Ok(ValidatedResponse {
            principal_id,
            attributes,
            xml,
        })
    }

    fn build_metadata(&self) -> Result<String, EngineError> {
        let sp_descriptor = SpSsoDescriptor {
            authn_requests_signed: Some(false),
            want_assertions_signed: Some(true),
            protocol_support_enumeration: Some("urn:oasis:names:tc:SAML:2.0:protocol".to_string()),
            name_id_formats: self
                .config
                .name_identifier_format
                .clone()
                .map(|format| vec![format]),
            assertion_consumer_services: vec![IndexedEndpoint {
                binding: HTTP_POST_BINDING.to_string(),
                location: self.config.callback_url(),
                response_location: None,
                index: 0,
                is_default: Some(true),
            }],
            single_logout_services: Some(vec![Endpoint {
                binding: HTTP_REDIRECT_BINDING.to_string(),
                location: self.config.slo_url(),
                response_location: None,
            }]),
            ..SpSsoDescriptor::default()
        };

        let entity_descriptor = EntityDescriptor {
            entity_id: Some(self.config.issuer.clone()),
            sp_sso_descriptors: Some(vec![sp_descriptor]),
            ..EntityDescriptor::default()
        };

        let xml = entity_descriptor
            .to_string()
            .map_err(|e| EngineError::Build(format!("{e}")))?;

        Ok(attach_attribute_consuming_service(&xml, &self.config))
    }

    fn validate_logout_response(
        &self,
        raw: &str,
        expected_transaction_id: &str,
    ) -> Result<(), EngineError> {
        let xml = decode_message(raw)?;
        if !xmlutil::well_formed(&xml) {
            return Err(EngineError::Malformed("LogoutResponse is not valid XML".into()));
        }

        if let Some(expected_issuer) = &self.config.idp_entity_id {
            if let Some(issuer) = xmlutil::element_text(&xml, "Issuer") {
                if &issuer != expected_issuer {
                    return Err(EngineError::LogoutValidation(format!(
                        "unexpected issuer: {issuer}"
                    )));
                }
            }
        }

        let status = xmlutil::element_attr(&xml, "StatusCode", "Value");
        if status.as_deref() != Some(SAML_SUCCESS) {
            return Err(EngineError::LogoutValidation(format!(
                "IdP reported status {}",
                status.unwrap_or_else(|| "(none)".into())
            )));
        }

        let in_response_to = xmlutil::element_attr(&xml, "LogoutResponse", "InResponseTo");
        if in_response_to.as_deref() != Some(expected_transaction_id) {
            return Err(EngineError::LogoutValidation(
                "InResponseTo does not match the outstanding logout request".into(),
            ));
        }
        Ok(())
    }

    fn parse_logout_request(&self, raw: &str) -> Result<ParsedLogoutRequest, EngineError> {
        let xml = decode_message(raw)?;
        if !xmlutil::well_formed(&xml) {
            return Err(EngineError::Malformed("LogoutRequest is not valid XML".into()));
        }
        let id = xmlutil::element_attr(&xml, "LogoutRequest", "ID")
            .ok_or_else(|| EngineError::Malformed("LogoutRequest missing ID".into()))?;
        Ok(ParsedLogoutRequest {
            id,
            subject_id: xmlutil::element_text(&xml, "NameID"),
            issuer: xmlutil::element_text(&xml, "Issuer"),
        })
    }

    fn validate_logout_request(&self, parsed: &ParsedLogoutRequest) -> bool {
        if parsed.id.is_empty() {
            return false;
        }
        match (&self.config.idp_entity_id, &parsed.issuer) {
            (Some(expected), Some(actual)) => expected == actual,
            _ => true,
        }
    }

    fn build_logout_request(
        &self,
        name_id: &str,
        relay_state: Option<&str>,
    ) -> Result<LogoutRedirect, EngineError> {
        let slo_url = self
            .config
            .idp_slo_target_url
            .as_deref()
            .ok_or_else(|| EngineError::Build("no IdP SLO endpoint configured".into()))?;

        let transaction_id = format!("_{}", uuid::Uuid::new_v4());
        let issue_instant = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let format_attr = self
            .config
            .name_identifier_format
            .as_deref()
            .map(|f| format!(r#" Format="{}""#, xmlutil::escape(f)))
            .unwrap_or_default();

        let xml = format!(
            r#"<samlp:LogoutRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="{id}" Version="2.0" IssueInstant="{issue_instant}" Destination="{destination}"><saml:Issuer>{issuer}</saml:Issuer><saml:NameID{format_attr}>{name_id}</saml:NameID></samlp:LogoutRequest>"#,
            id = transaction_id,
            destination = xmlutil::escape(slo_url),
            issuer = xmlutil::escape(&self.config.issuer),
            name_id = xmlutil::escape(name_id),
        );

        let url = redirect_binding_url(slo_url, "SAMLRequest", &xml, relay_state)?;
        Ok(LogoutRedirect {
            transaction_id,
            url,
        })
    }

    fn build_logout_response(
        &self,
        in_response_to: &str,
        relay_state: Option<&str>,
    ) -> Result<String, EngineError> {
        let slo_url = self
            .config
            .idp_slo_target_url
            .as_deref()
            .ok_or_else(|| EngineError::Build("no IdP SLO endpoint configured".into()))?;

        let issue_instant = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let xml = format!(
            r#"<samlp:LogoutResponse xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_{id}" Version="2.0" IssueInstant="{issue_instant}" Destination="{destination}" InResponseTo="{in_response_to}"><saml:Issuer>{issuer}</saml:Issuer><samlp:Status><samlp:StatusCode Value="{status}"/></samlp:Status></samlp:LogoutResponse>"#,
            id = uuid::Uuid::new_v4(),
            destination = xmlutil::escape(slo_url),
            in_response_to = xmlutil::escape(in_response_to),
            issuer = xmlutil::escape(&self.config.issuer),
            status = SAML_SUCCESS,
        );

        redirect_binding_url(slo_url, "SAMLResponse", &xml, relay_state)
    }
}

/// Decodes an inbound SAML message parameter: raw XML, base64 XML (POST
/// binding) or base64 deflated XML (redirect binding).
pub(crate) fn decode_message(raw: &str) -> Result<String, EngineError> {
    if raw.trim_start().starts_with('<') {
        return Ok(raw.to_string());
    }
    let stripped: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(&stripped)
        .map_err(|e| EngineError::Malformed(format!("base64 decode failed: {e}")))?;

    if let Ok(xml) = String::from_utf8(bytes.clone()) {
        if xml.trim_start().starts_with('<') {
            return Ok(xml);
        }
    }

    let mut decoder = DeflateDecoder::new(&bytes[..]);
    let mut xml = String::new();
    decoder
        .read_to_string(&mut xml)
        .map_err(|e| EngineError::Malformed(format!("deflate decompress failed: {e}")))?;
    Ok(xml)
}

/// HTTP-Redirect binding: deflate, base64, then URL-encode into the endpoint
/// query string together with the relay state.
fn redirect_binding_url(
    endpoint: &str,
    param: &str,
    xml: &str,
    relay_state: Option<&str>,
) -> Result<String, EngineError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(xml.as_bytes())
        .map_err(|e| EngineError::Build(format!("deflate failed: {e}")))?;
    let deflated = encoder
        .finish()
        .map_err(|e| EngineError::Build(format!("deflate failed: {e}")))?;

    let mut url = Url::parse(endpoint)
        .map_err(|e| EngineError::Build(format!("invalid endpoint URL: {e}")))?;
    url.query_pairs_mut()
        .append_pair(param, &STANDARD.encode(deflated));
    if let Some(relay) = relay_state {
        url.query_pairs_mut().append_pair("RelayState", relay);
    }
    Ok(url.into())
}

/// Appends an AttributeConsumingService block to the SPSSODescriptor when at
/// least one attribute is configured. With zero attributes the document is
/// returned untouched.
fn attach_attribute_consuming_service(xml: &str, config: &SamlConfig) -> String {
    if config.requested_attributes.is_empty() {
        return xml.to_string();
    }

    let mut block = format!(
        r#"<md:AttributeConsumingService xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" index="1" isDefault="true"><md:ServiceName xml:lang="en">{}</md:ServiceName>"#,
        xmlutil::escape(&config.attribute_service_name),
    );
    for attr in &config.requested_attributes {
        block.push_str(&format!(
            r#"<md:RequestedAttribute FriendlyName="{}" Name="{}" NameFormat="{}"/>"#,
            xmlutil::escape(&attr.friendly_name),
            xmlutil::escape(&attr.name),
            xmlutil::escape(&attr.name_format),
        ));
    }
    block.push_str("</md:AttributeConsumingService>");

    for close in ["</md:SPSSODescriptor>", "</SPSSODescriptor>"] {
        if let Some(pos) = xml.rfind(close) {
            let mut out = String::with_capacity(xml.len() + block.len());
            out.push_str(&xml[..pos]);
            out.push_str(&block);
            out.push_str(&xml[pos..]);
            return out;
        }
    }
    xml.to_string()
}

fn fingerprint_eq(a: &str, b: &str) -> bool {
    let normalize = |s: &str| {
        s.chars()
            .filter(|c| c.is_ascii_hexdigit())
            .collect::<String>()
            .to_ascii_uppercase()
    };
    normalize(a) == normalize(b)
}

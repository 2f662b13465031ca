#![allow(dead_code)]

use axum::http::{self, HeaderValue};
use axum::response::Response;
use axum::{Extension, Router};
use saml_sp::engine::{
    EngineError, LogoutRedirect, ParsedLogoutRequest, ProtocolEngine, ResponseOptions,
    ValidatedResponse,
};
use saml_sp::{SamlConfig, SamlIdentity, SamlState};
use std::collections::HashMap;
use std::sync::Arc;

pub const SESSION: &str = "itest-session";

/// Scripted protocol engine. Inbound message parameters are interpreted
/// literally: a `SAMLResponse` on the SLO path is compared against the
/// expected correlator as-is, and a `SAMLRequest` is taken to be the logout
/// subject, so tests control correlation without real XML.
pub struct MockEngine {
    pub principal: Option<String>,
    pub attributes: HashMap<String, String>,
    pub reject_response: bool,
    pub logout_request_valid: bool,
    pub next_transaction_id: String,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self {
            principal: Some("user-42".into()),
            attributes: HashMap::new(),
            reject_response: false,
            logout_request_valid: true,
            next_transaction_id: "T1".into(),
        }
    }
}

impl ProtocolEngine for MockEngine {
    fn build_authn_request(
        &self,
        extra_params: &[(String, String)],
        relay_state: Option<&str>,
    ) -> Result<String, EngineError> {
        let mut url = url::Url::parse("https://idp.test/sso").unwrap();
        url.query_pairs_mut().append_pair("SAMLRequest", "stub");
        for (name, value) in extra_params {
            url.query_pairs_mut().append_pair(name, value);
        }
        if let Some(relay) = relay_state {
            url.query_pairs_mut().append_pair("RelayState", relay);
        }
        Ok(url.into())
    }

    fn validate_response(
        &self,
        raw: &str,
        _opts: &ResponseOptions,
    ) -> Result<ValidatedResponse, EngineError> {
        if self.reject_response {
            return Err(EngineError::ResponseValidation("signature invalid".into()));
        }
        Ok(ValidatedResponse {
            principal_id: self.principal.clone(),
            attributes: self.attributes.clone(),
            xml: raw.to_string(),
        })
    }

    fn build_metadata(&self) -> Result<String, EngineError> {
        Ok("<EntityDescriptor/>".into())
    }

    fn validate_logout_response(
        &self,
        raw: &str,
        expected_transaction_id: &str,
    ) -> Result<(), EngineError> {
        if raw == expected_transaction_id {
            Ok(())
        } else {
            Err(EngineError::LogoutValidation("InResponseTo mismatch".into()))
        }
    }

    fn parse_logout_request(&self, raw: &str) -> Result<ParsedLogoutRequest, EngineError> {
        Ok(ParsedLogoutRequest {
            id: "_idp-req".into(),
            subject_id: Some(raw.to_string()),
            issuer: Some("https://idp.test".into()),
        })
    }

    fn validate_logout_request(&self, _parsed: &ParsedLogoutRequest) -> bool {
        self.logout_request_valid
    }

    fn build_logout_request(
        &self,
        name_id: &str,
        relay_state: Option<&str>,
    ) -> Result<LogoutRedirect, EngineError> {
        let mut url = url::Url::parse("https://idp.test/slo").unwrap();
        url.query_pairs_mut().append_pair("SAMLRequest", "stub");
        url.query_pairs_mut().append_pair("name_id", name_id);
        if let Some(relay) = relay_state {
            url.query_pairs_mut().append_pair("RelayState", relay);
        }
        Ok(LogoutRedirect {
            transaction_id: self.next_transaction_id.clone(),
            url: url.into(),
        })
    }

    fn build_logout_response(
        &self,
        in_response_to: &str,
        relay_state: Option<&str>,
    ) -> Result<String, EngineError> {
        let mut url = url::Url::parse("https://idp.test/slo").unwrap();
        url.query_pairs_mut().append_pair("SAMLResponse", "stub");
        url.query_pairs_mut().append_pair("InResponseTo", in_response_to);
        if let Some(relay) = relay_state {
            url.query_pairs_mut().append_pair("RelayState", relay);
        }
        Ok(url.into())
    }
}

/// A response document carrying a freshly generated signing certificate,
/// returned together with that certificate's SHA-1 fingerprint.
pub fn response_with_embedded_cert() -> (String, String) {
    use base64::Engine as _;
    use openssl::asn1::Asn1Time;
    use openssl::pkey::PKey;
    use openssl::rsa::Rsa;
    use openssl::x509::{X509, X509NameBuilder};

    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", "idp.test").unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(1).unwrap())
        .unwrap();
    builder
        .sign(&key, openssl::hash::MessageDigest::sha256())
        .unwrap();
    let cert = builder.build();

    let fingerprint = saml_sp::fingerprint::fingerprint_of(&cert).unwrap();
    let cert_b64 = base64::engine::general_purpose::STANDARD.encode(cert.to_der().unwrap());
    let xml = format!(
        r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol"><ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:X509Data><ds:X509Certificate>{cert_b64}</ds:X509Certificate></ds:X509Data></ds:Signature></samlp:Response>"#
    );
    (xml, fingerprint)
}

pub fn test_config() -> SamlConfig {
    let mut config = SamlConfig::new(
        "http://sp.test",
        "http://sp.test/metadata",
        "https://idp.test/sso",
    );
    config.base_path = "/auth/saml".into();
    config.idp_slo_target_url = Some("https://idp.test/slo".into());
    config
}

pub fn test_state(config: SamlConfig, engine: MockEngine) -> Arc<SamlState> {
    Arc::new(SamlState::with_engine(config, Arc::new(engine)))
}

async fn echo_identity(identity: Option<Extension<SamlIdentity>>) -> String {
    match identity {
        Some(Extension(identity)) => format!(
            "app:{}:{}",
            identity.principal_id,
            identity.attribute("email").unwrap_or("-"),
        ),
        None => "app:anonymous".to_string(),
    }
}

pub fn app(state: Arc<SamlState>) -> Router {
    saml_sp::attach(Router::new().fallback(echo_identity), state)
}

pub fn get(uri: &str) -> http::Request<axum::body::Body> {
    http::Request::builder()
        .uri(uri)
        .header(
            http::header::COOKIE,
            HeaderValue::from_str(&format!("sp_session={SESSION}")).unwrap(),
        )
        .body(axum::body::Body::empty())
        .unwrap()
}

pub fn post_form(uri: &str, body: &str) -> http::Request<axum::body::Body> {
    http::Request::builder()
        .method(http::Method::POST)
        .uri(uri)
        .header(
            http::header::CONTENT_TYPE,
            "application/x-www-form-urlencoded",
        )
        .header(
            http::header::COOKIE,
            HeaderValue::from_str(&format!("sp_session={SESSION}")).unwrap(),
        )
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

pub fn location(response: &Response) -> &str {
    response
        .headers()
        .get(http::header::LOCATION)
        .expect("missing Location header")
        .to_str()
        .expect("invalid Location header")
}

pub async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

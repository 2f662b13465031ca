use crate::error::Error;
use crate::xmlutil;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use openssl::hash::MessageDigest;
use openssl::x509::X509;

/// SHA-1 fingerprint of the IdP signing certificate embedded in a raw
/// `SAMLResponse`, formatted as uppercase colon-separated hex. This is what a
/// configured fingerprint validator gets to look up.
pub fn response_fingerprint(raw: &str) -> Result<String, Error> {
    let cert = embedded_certificate(raw)?;
    fingerprint_of(&cert)
}

/// The X509 certificate carried in the response's `ds:X509Certificate`
/// element.
pub fn embedded_certificate(raw: &str) -> Result<X509, Error> {
    let xml = decode_response(raw)?;
    let cert_b64 = xmlutil::element_text(&xml, "X509Certificate")
        .ok_or_else(|| Error::Validation("response carries no X509Certificate".into()))?;
    let der = STANDARD
        .decode(strip_whitespace(&cert_b64))
        .map_err(|e| Error::Validation(format!("certificate base64 decode failed: {e}")))?;
    X509::from_der(&der).map_err(|e| Error::Validation(format!("certificate parse failed: {e}")))
}

pub fn fingerprint_of(cert: &X509) -> Result<String, Error> {
    let digest = cert
        .digest(MessageDigest::sha1())
        .map_err(|e| Error::Validation(format!("certificate digest failed: {e}")))?;
    Ok(colon_hex(&digest))
}

/// A `SAMLResponse` parameter arrives raw, base64-encoded or deflated per the
/// redirect binding; decoding is shared with the protocol engine.
pub(crate) fn decode_response(raw: &str) -> Result<String, Error> {
    crate::engine::decode_message(raw).map_err(|e| Error::Validation(e.to_string()))
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

fn colon_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::asn1::Asn1Time;
    use openssl::pkey::PKey;
    use openssl::rsa::Rsa;
    use openssl::x509::X509NameBuilder;

    fn self_signed_cert() -> X509 {
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "idp.example.com").unwrap();
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
        builder.sign(&key, MessageDigest::sha256()).unwrap();
        builder.build()
    }

    fn response_with_cert(cert: &X509) -> String {
        let cert_b64 = STANDARD.encode(cert.to_der().unwrap());
        format!(
            r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol"><ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:KeyInfo><ds:X509Data><ds:X509Certificate>{cert_b64}</ds:X509Certificate></ds:X509Data></ds:KeyInfo></ds:Signature></samlp:Response>"#
        )
    }

    #[test]
    fn fingerprint_matches_certificate_digest() {
        let cert = self_signed_cert();
        let xml = response_with_cert(&cert);

        let expected = fingerprint_of(&cert).unwrap();
        assert_eq!(response_fingerprint(&xml).unwrap(), expected);

        // base64-encoded responses decode first
        let encoded = STANDARD.encode(xml.as_bytes());
        assert_eq!(response_fingerprint(&encoded).unwrap(), expected);
    }

    #[test]
    fn redirect_binding_response_decodes() {
        use flate2::Compression;
        use flate2::write::DeflateEncoder;
        use std::io::Write;

        let cert = self_signed_cert();
        let xml = response_with_cert(&cert);
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(xml.as_bytes()).unwrap();
        let deflated = STANDARD.encode(encoder.finish().unwrap());

        assert_eq!(
            response_fingerprint(&deflated).unwrap(),
            fingerprint_of(&cert).unwrap()
        );
    }

    #[test]
    fn fingerprint_format() {
        let cert = self_signed_cert();
        let fp = fingerprint_of(&cert).unwrap();
        // SHA-1: 20 bytes, 19 separators
        assert_eq!(fp.len(), 20 * 2 + 19);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase() || c == ':'));
    }

    #[test]
    fn missing_certificate_is_rejected() {
        let err = response_fingerprint("<samlp:Response xmlns:samlp=\"urn:x\"/>").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(response_fingerprint("!!not-base64!!").is_err());
    }
}

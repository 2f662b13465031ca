mod common;

use axum::http::{self, StatusCode};
use common::{MockEngine, app, body_string, get, location, post_form, test_config, test_state};
use std::collections::HashMap;
use tower::ServiceExt;

#[tokio::test]
async fn authn_request_redirects_to_idp() {
    let state = test_state(test_config(), MockEngine::default());
    let response = app(state)
        .oneshot(get("/auth/saml"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("https://idp.test/sso?"));
}

#[tokio::test]
async fn only_whitelisted_runtime_parameters_are_forwarded() {
    let mut config = test_config();
    config
        .runtime_request_parameters
        .insert("original_request".into(), "OriginalRequest".into());

    let state = test_state(config, MockEngine::default());
    let response = app(state)
        .oneshot(get("/auth/saml?original_request=%2Fdeep&evil=injected"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = location(&response);
    assert!(
        location.contains("OriginalRequest=%2Fdeep"),
        "whitelisted parameter missing from: {location}"
    );
    assert!(!location.contains("evil"), "injected parameter forwarded: {location}");
}

#[tokio::test]
async fn relay_state_parameter_is_carried_into_the_request() {
    let state = test_state(test_config(), MockEngine::default());
    let response = app(state)
        .oneshot(get("/auth/saml?RelayState=%2Fafter-login"))
        .await
        .unwrap();

    assert!(location(&response).contains("RelayState=%2Fafter-login"));
}

#[tokio::test]
async fn callback_authenticates_and_hands_identity_to_the_app() {
    let engine = MockEngine {
        principal: Some("user-42".into()),
        attributes: HashMap::from([("mail".to_string(), "a@b.com".to_string())]),
        ..MockEngine::default()
    };
    let state = test_state(test_config(), engine);

    let response = app(state.clone())
        .oneshot(post_form("/auth/saml", "SAMLResponse=stub-response"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    // default attribute statements resolve email through the "mail" fallback
    assert_eq!(body_string(response).await, "app:user-42:a@b.com");
    assert_eq!(
        state.sessions.principal_id(common::SESSION).as_deref(),
        Some("user-42")
    );
}

#[tokio::test]
async fn callback_without_principal_fails_even_when_validation_passed() {
    let engine = MockEngine {
        principal: None,
        ..MockEngine::default()
    };
    let state = test_state(test_config(), engine);

    let response = app(state.clone())
        .oneshot(post_form("/auth/saml", "SAMLResponse=stub-response"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_string(response).await, "invalid_ticket");
    assert_eq!(state.sessions.principal_id(common::SESSION), None);
}

#[tokio::test]
async fn callback_with_empty_principal_fails() {
    let engine = MockEngine {
        principal: Some("   ".into()),
        ..MockEngine::default()
    };
    let state = test_state(test_config(), engine);

    let response = app(state.clone())
        .oneshot(post_form("/auth/saml", "SAMLResponse=stub-response"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(state.sessions.principal_id(common::SESSION), None);
}

#[tokio::test]
async fn rejected_response_is_an_invalid_ticket() {
    let engine = MockEngine {
        reject_response: true,
        ..MockEngine::default()
    };
    let state = test_state(test_config(), engine);

    let response = app(state.clone())
        .oneshot(post_form("/auth/saml", "SAMLResponse=stub-response"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_string(response).await, "invalid_ticket");
    assert_eq!(state.sessions.principal_id(common::SESSION), None);
}

#[tokio::test]
async fn unresolvable_fingerprint_is_rejected() {
    let mut config = test_config();
    config.idp_cert_fingerprint_validator = Some(std::sync::Arc::new(|_: &str| None));

    let state = test_state(config, MockEngine::default());
    let (xml, _) = common::response_with_embedded_cert();
    let body = format!("SAMLResponse={}", urlencoding::encode(&xml));

    let response = app(state.clone())
        .oneshot(post_form("/auth/saml", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_string(response).await, "invalid_ticket");
    assert_eq!(state.sessions.principal_id(common::SESSION), None);
}

#[tokio::test]
async fn fingerprint_validator_sees_the_embedded_certificate_fingerprint() {
    let observed: std::sync::Arc<std::sync::Mutex<Option<String>>> =
        std::sync::Arc::new(std::sync::Mutex::new(None));
    let seen = observed.clone();

    let mut config = test_config();
    config.idp_cert_fingerprint_validator = Some(std::sync::Arc::new(move |fp: &str| {
        *seen.lock().unwrap() = Some(fp.to_string());
        Some(fp.to_string())
    }));

    let state = test_state(config, MockEngine::default());
    let (xml, fingerprint) = common::response_with_embedded_cert();
    let body = format!("SAMLResponse={}", urlencoding::encode(&xml));

    let response = app(state.clone())
        .oneshot(post_form("/auth/saml", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(observed.lock().unwrap().as_deref(), Some(fingerprint.as_str()));
    assert_eq!(
        state.sessions.principal_id(common::SESSION).as_deref(),
        Some("user-42")
    );
}

#[tokio::test]
async fn empty_callback_parameter_is_rejected() {
    let state = test_state(test_config(), MockEngine::default());
    let response = app(state)
        .oneshot(post_form("/auth/saml", "SAMLResponse="))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn metadata_is_served_as_xml() {
    let state = test_state(test_config(), MockEngine::default());
    let response = app(state)
        .oneshot(get("/auth/saml/metadata"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(http::header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.contains("application/xml"));
    assert!(body_string(response).await.contains("EntityDescriptor"));
}

#[tokio::test]
async fn unrecognized_subpath_falls_through_to_the_app() {
    let state = test_state(test_config(), MockEngine::default());
    let response = app(state)
        .oneshot(get("/auth/saml/unknown?SAMLResponse=x"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "app:anonymous");
}

#[tokio::test]
async fn foreign_path_falls_through_to_the_app() {
    let state = test_state(test_config(), MockEngine::default());
    let response = app(state).oneshot(get("/app/home")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "app:anonymous");
}

#[tokio::test]
async fn session_cookie_is_issued_when_absent() {
    let state = test_state(test_config(), MockEngine::default());
    let request = http::Request::builder()
        .uri("/auth/saml")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app(state).oneshot(request).await.unwrap();

    let cookie = response
        .headers()
        .get(http::header::SET_COOKIE)
        .expect("missing Set-Cookie")
        .to_str()
        .unwrap();
    assert!(cookie.starts_with("sp_session="));
    assert!(cookie.contains("HttpOnly"));
}

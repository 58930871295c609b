use std::time::Duration;

use keel_setup::{
    InstallationIdentity, InstallationKey,
    license::{InstallationAuthority, LicenseOutcome, RemoteLicenseValidator},
};
use serde_json::json;
use url::Url;
use uuid::Uuid;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

fn identity() -> InstallationIdentity {
    InstallationIdentity {
        id: Uuid::new_v4(),
        key: InstallationKey::new("very-secret-key"),
    }
}

async fn validate_against(
    server: &MockServer,
    identity: &InstallationIdentity,
    timeout: Duration,
) -> LicenseOutcome {
    let validator = RemoteLicenseValidator::new(
        Url::parse(&server.uri()).expect("mock uri"),
        timeout,
    )
    .expect("client");
    validator.validate(identity).await
}

async fn respond_with(template: ResponseTemplate) -> LicenseOutcome {
    let server = MockServer::start().await;
    let identity = identity();
    Mock::given(method("GET"))
        .and(path(format!("/installations/{}", identity.id)))
        .respond_with(template)
        .expect(1)
        .mount(&server)
        .await;
    validate_against(&server, &identity, Duration::from_secs(5)).await
}

#[tokio::test]
async fn enabled_installation_is_valid() {
    let outcome = respond_with(
        ResponseTemplate::new(200).set_body_json(json!({ "Enabled": true })),
    )
    .await;
    assert_eq!(outcome, LicenseOutcome::Valid);
}

#[tokio::test]
async fn disabled_installation_is_reported() {
    let outcome = respond_with(
        ResponseTemplate::new(200).set_body_json(json!({ "enabled": false })),
    )
    .await;
    assert_eq!(outcome, LicenseOutcome::Disabled);
}

#[tokio::test]
async fn unknown_installation_is_not_found() {
    let outcome = respond_with(ResponseTemplate::new(404)).await;
    assert_eq!(outcome, LicenseOutcome::NotFound);
}

#[tokio::test]
async fn server_errors_are_unreachable() {
    let outcome = respond_with(ResponseTemplate::new(503)).await;
    assert_eq!(outcome, LicenseOutcome::Unreachable);
}

#[tokio::test]
async fn unexpected_body_is_unreachable() {
    let outcome = respond_with(
        ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"),
    )
    .await;
    assert_eq!(outcome, LicenseOutcome::Unreachable);

    let outcome = respond_with(
        ResponseTemplate::new(200).set_body_json(json!({ "Enabled": "yes" })),
    )
    .await;
    assert_eq!(outcome, LicenseOutcome::Unreachable);
}

#[tokio::test]
async fn slow_server_times_out_as_unreachable() {
    let server = MockServer::start().await;
    let identity = identity();
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "Enabled": true }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;
    let outcome =
        validate_against(&server, &identity, Duration::from_millis(200)).await;
    assert_eq!(outcome, LicenseOutcome::Unreachable);
}

#[tokio::test]
async fn closed_port_is_unreachable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let validator = RemoteLicenseValidator::new(
        Url::parse(&format!("http://{addr}")).expect("url"),
        Duration::from_secs(2),
    )
    .expect("client");
    assert_eq!(
        validator.validate(&identity()).await,
        LicenseOutcome::Unreachable
    );
}

#[tokio::test]
async fn installation_key_is_never_sent() {
    let server = MockServer::start().await;
    let identity = identity();
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "Enabled": true })),
        )
        .mount(&server)
        .await;
    validate_against(&server, &identity, Duration::from_secs(5)).await;

    let requests = server.received_requests().await.expect("recording on");
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert!(!request.url.as_str().contains(identity.key.expose()));
    assert!(
        request
            .headers
            .values()
            .all(|v| !v.as_bytes().windows(15).any(|w| w == b"very-secret-key"))
    );
    assert!(request.body.is_empty());
}

use broadsheet_common::{CredentialItem, SessionState};
use broadsheet_http::{FetchClient, FetchError, PageOpts};
use chrono::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/story"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/story"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;

    let client = FetchClient::new().unwrap();
    let page = client
        .get_page(&format!("{}/story", server.uri()), PageOpts::default())
        .await
        .unwrap();
    assert_eq!(page.status.as_u16(), 200);
    assert!(page.body.contains("ok"));
}

#[tokio::test]
async fn not_found_is_fatal_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = FetchClient::new().unwrap();
    let err = client
        .get_page(&format!("{}/gone", server.uri()), PageOpts::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Fatal { status, .. } if status.as_u16() == 404));
}

#[tokio::test]
async fn forbidden_maps_to_blocked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/premium"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let client = FetchClient::new().unwrap();
    let err = client
        .get_page(&format!("{}/premium", server.uri()), PageOpts::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Blocked { .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn session_cookies_ride_along() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/paywalled"))
        .and(header("cookie", "sid=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_string("full text"))
        .expect(1)
        .mount(&server)
        .await;

    let session = SessionState::from_harvest(
        "localhost",
        vec![CredentialItem::new("sid", "abc123")],
        Duration::days(7),
    );
    let client = FetchClient::new().unwrap();
    let page = client
        .get_page(
            &format!("{}/paywalled", server.uri()),
            PageOpts {
                session: Some(&session),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.body, "full text");
}

#[tokio::test]
async fn exhausted_retries_surface_as_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = FetchClient::new().unwrap().with_retries(1);
    let err = client
        .get_page(&format!("{}/flaky", server.uri()), PageOpts::default())
        .await
        .unwrap_err();
    assert!(err.is_transient());
}

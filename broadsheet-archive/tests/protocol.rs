use broadsheet_archive::{ArchiveMirror, HttpArchiveClient, PollStatus};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn submit_then_poll_until_ready() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/snapshots"))
        .and(body_partial_json(serde_json::json!({
            "url": "https://news.example/story"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "job_id": "j-1" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/snapshots/j-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": "pending" })),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/snapshots/j-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "ready",
            "snapshot_url": format!("{}/copies/j-1", server.uri()),
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/copies/j-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>archived story</html>"))
        .mount(&server)
        .await;

    let client = HttpArchiveClient::new(&server.uri(), None).unwrap();
    let job = client.submit("https://news.example/story").await.unwrap();

    assert!(matches!(client.poll(&job).await.unwrap(), PollStatus::Pending));
    let snapshot_url = match client.poll(&job).await.unwrap() {
        PollStatus::Ready { snapshot_url } => snapshot_url,
        other => panic!("expected ready, got {other:?}"),
    };
    let body = client.fetch_snapshot(&snapshot_url).await.unwrap();
    assert!(body.contains("archived story"));
}

#[tokio::test]
async fn failed_jobs_carry_the_service_reason() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/snapshots/j-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "failed",
            "error": "origin unreachable",
        })))
        .mount(&server)
        .await;

    let client = HttpArchiveClient::new(&server.uri(), None).unwrap();
    let status = client
        .poll(&broadsheet_archive::JobId("j-2".to_string()))
        .await
        .unwrap();
    assert!(matches!(status, PollStatus::Failed { reason } if reason == "origin unreachable"));
}

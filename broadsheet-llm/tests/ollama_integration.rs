use broadsheet_llm::ollama::OllamaClient;
use broadsheet_llm::synthesis::{propose_selector, SelectorProposal};
use broadsheet_llm::traits::LlmClient;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn generate_round_trips_through_ollama_api() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(serde_json::json!({
            "model": "llama3.2:3b",
            "stream": false,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "model": "llama3.2:3b",
            "response": "hello",
            "eval_count": 7,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(server.uri(), "llama3.2:3b".to_string()).unwrap();
    let resp = client.generate("say hello", None, Some(16), Some(0.0)).await.unwrap();
    assert_eq!(resp.text, "hello");
    assert_eq!(resp.tokens_used, Some(7));
}

#[tokio::test]
async fn synthesis_flows_through_the_client() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "model": "llama3.2:3b",
            "response": "{\"selector\": \"div#article-body\", \"reason\": \"stable id\"}",
        })))
        .mount(&server)
        .await;

    let client = OllamaClient::new(server.uri(), "llama3.2:3b".to_string()).unwrap();
    let got = propose_selector(&client, "<html><body><div id=article-body></div></body></html>")
        .await
        .unwrap();
    assert_eq!(got, SelectorProposal::Selector("div#article-body".to_string()));
}

#[tokio::test]
async fn health_check_reports_unreachable_service() {
    // Point at a closed port; the default health check should degrade to false.
    let client = OllamaClient::new(
        "http://127.0.0.1:9".to_string(),
        "llama3.2:3b".to_string(),
    )
    .unwrap();
    assert!(!client.health_check().await.unwrap());
}

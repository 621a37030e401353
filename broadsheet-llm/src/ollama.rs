use crate::traits::{LlmClient, LlmError, LlmResponse};
use async_trait::async_trait;
use broadsheet_http::{FetchClient, FetchError};
use serde::{Deserialize, Serialize};

pub struct OllamaClient {
    client: FetchClient,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    model: String,
    response: String,
    #[serde(default)]
    eval_count: Option<u32>,
}

impl OllamaClient {
    pub fn new(base_url: String, model: String) -> Result<Self, LlmError> {
        let client = FetchClient::new()
            .map_err(|e| LlmError::Config(format!("FetchClient init failed: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse, LlmError> {
        let req = GenerateRequest {
            model: &self.model,
            prompt,
            system: system_prompt,
            stream: false,
            options: GenerateOptions {
                temperature,
                num_predict: max_tokens,
            },
        };

        let resp: GenerateResponse = self
            .client
            .post_json(&format!("{}/api/generate", self.base_url), None, &req)
            .await
            .map_err(fetch_to_llm)?;

        Ok(LlmResponse {
            text: resp.response,
            model: Some(resp.model),
            tokens_used: resp.eval_count,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn fetch_to_llm(e: FetchError) -> LlmError {
    match e {
        FetchError::Network(msg) => LlmError::Network(msg),
        other => LlmError::Api(other.to_string()),
    }
}

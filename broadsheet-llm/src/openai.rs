use crate::traits::{LlmClient, LlmError, LlmResponse};
use async_trait::async_trait;
use broadsheet_http::{FetchClient, FetchError};
use serde::{Deserialize, Serialize};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

pub struct OpenAiClient {
    client: FetchClient,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ResponsesApiRequest {
    model: String,
    input: String,
    instructions: String,
}

#[derive(Debug, Deserialize)]
struct ResponsesApiResponse {
    pub model: String,
    #[serde(default)]
    pub output: Vec<ResponseMessage>,
}

/// One element in the `output` array
#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    pub content: Vec<ResponseContent>,
}

/// One part of the message `content`
#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String) -> Result<Self, LlmError> {
        Self::with_endpoint(api_key, model, OPENAI_API_BASE.to_string())
    }

    /// Point at an OpenAI-compatible gateway instead of the public API.
    pub fn with_endpoint(
        api_key: String,
        model: String,
        endpoint: String,
    ) -> Result<Self, LlmError> {
        let client = FetchClient::new()
            .map_err(|e| LlmError::Config(format!("FetchClient init failed: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        _max_tokens: Option<u32>,
        _temperature: Option<f32>,
    ) -> Result<LlmResponse, LlmError> {
        let instructions = match system_prompt {
            Some(s) => s.to_string(),
            None => "You are a precise assistant for structural HTML analysis.".to_string(),
        };

        let req = ResponsesApiRequest {
            model: self.model.clone(),
            input: prompt.to_string(),
            instructions,
        };

        let resp: ResponsesApiResponse = self
            .client
            .post_json(
                &format!("{}/responses", self.endpoint),
                Some(&self.api_key),
                &req,
            )
            .await
            .map_err(fetch_to_llm)?;

        let text = resp
            .output
            .iter()
            .flat_map(|msg| &msg.content)
            .find(|c| c.kind == "output_text")
            .map(|c| c.text.clone())
            .unwrap_or_default();

        Ok(LlmResponse {
            text,
            model: Some(resp.model),
            tokens_used: None,
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

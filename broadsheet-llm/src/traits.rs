use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub model: Option<String>,
    pub tokens_used: Option<u32>,
}

#[derive(thiserror::Error, Debug)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a response to the given prompt with optional system prompt
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse, LlmError>;

    /// Get the model name being used
    fn model_name(&self) -> &str;

    /// Check if the LLM service is available
    async fn health_check(&self) -> Result<bool, LlmError> {
        let test_prompt = "Respond with just 'OK'";
        match self.generate(test_prompt, None, Some(5), Some(0.1)).await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!(model=%self.model_name(), error=%e, "llm.health_check.failed");
                Ok(false)
            }
        }
    }
}

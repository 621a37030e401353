//! Provider-agnostic LLM integration for Broadsheet.
//!
//! This crate exposes a common [`traits::LlmClient`] interface, concrete
//! provider implementations for OpenAI and Ollama, and the selector-synthesis
//! request/response protocol used by the extraction cascade
//! ([`synthesis::propose_selector`]).
//!
//! # Examples
//! ```no_run
//! use broadsheet_llm::{ensure_llm_ready, LlmConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), broadsheet_llm::traits::LlmError> {
//! let cfg = LlmConfig::Ollama {
//!     base_url: "http://localhost:11434".to_string(),
//!     model: "llama3.2:3b".to_string(),
//! };
//! let client = ensure_llm_ready(&cfg)?;
//! assert!(!client.model_name().is_empty());
//! # Ok(())
//! # }
//! ```
pub mod ollama;
pub mod openai;
pub mod synthesis;
pub mod traits;

use ollama::OllamaClient;
use openai::OpenAiClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use traits::{LlmClient, LlmError};

/// Default model recommendations for selector synthesis
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2:3b";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Provider configuration, deserialized from the workspace config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum LlmConfig {
    Openai {
        api_key: String,
        model: String,
        #[serde(default)]
        endpoint: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_endpoint")]
        base_url: String,
        model: String,
    },
    None,
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".into()
}

/// Build a ready-to-use client from configuration.
pub fn ensure_llm_ready(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    match config {
        LlmConfig::Openai {
            api_key,
            model,
            endpoint,
        } => {
            let client = match endpoint {
                Some(url) => {
                    OpenAiClient::with_endpoint(api_key.clone(), model.clone(), url.clone())?
                }
                None => OpenAiClient::new(api_key.clone(), model.clone())?,
            };
            Ok(Arc::new(client))
        }
        LlmConfig::Ollama { base_url, model } => {
            let client = OllamaClient::new(base_url.clone(), model.clone())?;
            Ok(Arc::new(client))
        }
        LlmConfig::None => Err(LlmError::Config("No LLM configured".to_string())),
    }
}

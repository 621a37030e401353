use crate::validate::ValidationOutcome;
use broadsheet_http::FetchError;
use thiserror::Error;

/// Error taxonomy of the cascade. Every strategy failure is caught and
/// recorded in the attempt log; only deadline exhaustion or running out of
/// strategies surfaces on the terminal result.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Transient transport failure; the fetch layer already spent its retry
    /// budget, so the cascade advances to the next strategy.
    #[error("network error: {0}")]
    Network(String),

    /// Non-retryable HTTP status or unusable page; advance immediately.
    #[error("fatal fetch error: {0}")]
    FatalFetch(String),

    /// Content was produced but rejected by the validator.
    #[error("content rejected: {0}")]
    Validation(ValidationOutcome),

    /// Renewal failed; degrade to unauthenticated strategies.
    #[error("session renewal failed: {0}")]
    SessionRenewal(String),

    /// The model declined or produced an unusable selector.
    #[error("selector synthesis refused: {0}")]
    SynthesisRefusal(String),

    /// Terminal for the whole request.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl From<FetchError> for ExtractError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Network(msg) => ExtractError::Network(msg),
            // A 401/403 on an article URL is a paywall signal, not a broken
            // strategy: surface it as a validation failure so the orchestrator
            // applies its authenticated-retry rule.
            FetchError::Blocked { .. } => {
                ExtractError::Validation(ValidationOutcome::PaywallDetected)
            }
            other => ExtractError::FatalFetch(other.to_string()),
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

use crate::validate::ValidationOutcome;

/// The four strategies of the cascade, in the tagged-variant form the
/// orchestrator plans over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    CachedSelector,
    Heuristic,
    Synthesis,
    Archival,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::CachedSelector => "cached_selector",
            StrategyKind::Heuristic => "heuristic",
            StrategyKind::Synthesis => "synthesis",
            StrategyKind::Archival => "archival",
        };
        f.write_str(name)
    }
}

/// One article to extract. Immutable once created.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub id: Uuid,
    pub url: Url,
    /// Canonical domain, derived from the URL at construction.
    pub domain: String,
    /// Total budget across every strategy attempt for this request.
    pub deadline: Duration,
    pub allow_authenticated: bool,
}

impl ExtractionRequest {
    pub fn new(url: Url, deadline: Duration, allow_authenticated: bool) -> Option<Self> {
        let domain = broadsheet_common::domain_of(&url)?;
        Some(Self {
            id: Uuid::new_v4(),
            url,
            domain,
            deadline,
            allow_authenticated,
        })
    }
}

/// Outcome of one strategy attempt, as recorded in the result's attempt log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum AttemptOutcome {
    Success,
    ValidationFailed(ValidationOutcome),
    FetchError(String),
    Fatal(String),
}

impl AttemptOutcome {
    /// Short message for the terminal `ExtractionResult.error`.
    pub fn message(&self) -> String {
        match self {
            AttemptOutcome::Success => "success".to_string(),
            AttemptOutcome::ValidationFailed(v) => format!("validation failed: {v}"),
            AttemptOutcome::FetchError(m) | AttemptOutcome::Fatal(m) => m.clone(),
        }
    }
}

/// One entry in a request's ordered, append-only attempt log.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionAttempt {
    pub strategy: StrategyKind,
    pub authenticated: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    pub raw_length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    Success,
    Failed,
}

/// Produced exactly once per request; the caller never sees a raw error.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub url: String,
    pub domain: String,
    pub final_status: FinalStatus,
    pub method_used: Option<StrategyKind>,
    pub content: Option<String>,
    pub word_count: usize,
    /// blake3 of the cleaned text, for downstream deduplication.
    pub fingerprint: Option<String>,
    pub attempts: Vec<ExtractionAttempt>,
    pub error: Option<String>,
}

impl ExtractionResult {
    pub fn failed(request: &ExtractionRequest, attempts: Vec<ExtractionAttempt>, error: String) -> Self {
        Self {
            url: request.url.to_string(),
            domain: request.domain.clone(),
            final_status: FinalStatus::Failed,
            method_used: None,
            content: None,
            word_count: 0,
            fingerprint: None,
            attempts,
            error: Some(error),
        }
    }
}

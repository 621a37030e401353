//! The extraction strategies, one closed set of variants behind a single
//! capability: `attempt(request, context) → extracted text`.
//!
//! Strategies fetch and extract; they never validate their own output and
//! never touch the selector cache or session store directly. The
//! orchestrator owns ordering, validation, and all bookkeeping.
use crate::error::ExtractError;
use crate::types::{ExtractionRequest, StrategyKind};
use async_trait::async_trait;
use broadsheet_common::SessionState;

pub mod archival;
pub mod cached;
pub mod heuristic;
pub mod synthesis;

pub use archival::ArchivalStrategy;
pub use cached::CachedSelectorStrategy;
pub use heuristic::HeuristicStrategy;
pub use synthesis::SynthesisStrategy;

/// Per-attempt inputs supplied by the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct StrategyContext {
    /// Known-good selector for the request's domain, if the cache has one.
    pub cached_selector: Option<String>,
    /// Authenticated session to fetch with; `None` means anonymous.
    pub session: Option<SessionState>,
}

/// Raw extraction output, before validation.
#[derive(Debug, Clone)]
pub struct StrategyYield {
    pub text: String,
    /// The selector that produced the text, when one was involved; the
    /// orchestrator records it in the cache after validation.
    pub selector: Option<String>,
}

#[async_trait]
pub trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn attempt(
        &self,
        request: &ExtractionRequest,
        context: &StrategyContext,
    ) -> Result<StrategyYield, ExtractError>;
}

use crate::error::ExtractError;
use crate::fetch::PageFetcher;
use crate::html::extract_readable;
use crate::strategy::{Strategy, StrategyContext, StrategyYield};
use crate::types::{ExtractionRequest, StrategyKind};
use async_trait::async_trait;
use std::sync::Arc;

/// Boilerplate-removal fallback that needs no per-domain knowledge: works on
/// unfamiliar domains with degraded precision.
pub struct HeuristicStrategy {
    fetcher: Arc<dyn PageFetcher>,
}

impl HeuristicStrategy {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Strategy for HeuristicStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Heuristic
    }

    async fn attempt(
        &self,
        request: &ExtractionRequest,
        context: &StrategyContext,
    ) -> Result<StrategyYield, ExtractError> {
        let page = self
            .fetcher
            .fetch(&request.url, context.session.as_ref())
            .await?;
        if page.looks_like_paywall_redirect() {
            return Err(ExtractError::Validation(
                crate::validate::ValidationOutcome::PaywallDetected,
            ));
        }

        let text = extract_readable(&page.body).ok_or_else(|| {
            ExtractError::FatalFetch("no readable content region found".to_string())
        })?;

        tracing::debug!(
            request_id = %request.id,
            domain = %request.domain,
            chars = text.len(),
            "strategy.heuristic.extracted"
        );
        Ok(StrategyYield {
            text,
            selector: None,
        })
    }
}

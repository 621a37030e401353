use crate::error::ExtractError;
use crate::fetch::PageFetcher;
use crate::html::{apply_selector, SelectorApplyError};
use crate::strategy::{Strategy, StrategyContext, StrategyYield};
use crate::types::{ExtractionRequest, StrategyKind};
use async_trait::async_trait;
use std::sync::Arc;

/// Apply the domain's cached selector to a direct fetch. Fails fast when the
/// context carries no selector; retry logic lives in the fetch layer, not here.
pub struct CachedSelectorStrategy {
    fetcher: Arc<dyn PageFetcher>,
}

impl CachedSelectorStrategy {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Strategy for CachedSelectorStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CachedSelector
    }

    async fn attempt(
        &self,
        request: &ExtractionRequest,
        context: &StrategyContext,
    ) -> Result<StrategyYield, ExtractError> {
        let Some(selector) = context.cached_selector.clone() else {
            return Err(ExtractError::FatalFetch(
                "no cached selector for domain".to_string(),
            ));
        };

        let page = self
            .fetcher
            .fetch(&request.url, context.session.as_ref())
            .await?;
        if page.looks_like_paywall_redirect() {
            return Err(ExtractError::Validation(
                crate::validate::ValidationOutcome::PaywallDetected,
            ));
        }

        let text = apply_selector(&page.body, &selector).map_err(|e| match e {
            SelectorApplyError::Invalid(msg) => {
                ExtractError::FatalFetch(format!("cached selector invalid: {msg}"))
            }
            SelectorApplyError::NoMatch => {
                // The site layout moved out from under the selector.
                ExtractError::FatalFetch(format!("cached selector {selector:?} matched nothing"))
            }
        })?;

        tracing::debug!(
            request_id = %request.id,
            domain = %request.domain,
            selector = %selector,
            chars = text.len(),
            "strategy.cached.extracted"
        );
        Ok(StrategyYield {
            text,
            selector: Some(selector),
        })
    }
}

use crate::error::ExtractError;
use crate::fetch::PageFetcher;
use crate::html::{apply_selector, page_skeleton, SelectorApplyError};
use crate::strategy::{Strategy, StrategyContext, StrategyYield};
use crate::types::{ExtractionRequest, StrategyKind};
use async_trait::async_trait;
use broadsheet_llm::synthesis::{propose_selector, SelectorProposal};
use broadsheet_llm::traits::{LlmClient, LlmError};
use std::sync::Arc;

/// Cap on the skeleton sent to the model; whole pages routinely run to
/// hundreds of kilobytes and the structure alone is enough.
const SKELETON_MAX_LEN: usize = 24 * 1024;

/// Ask the synthesis model for a selector and apply it in-place. The
/// orchestrator schedules this at most once per URL to control cost, and
/// records the selector in the cache only after the result validates.
pub struct SynthesisStrategy {
    fetcher: Arc<dyn PageFetcher>,
    llm: Arc<dyn LlmClient>,
}

impl SynthesisStrategy {
    pub fn new(fetcher: Arc<dyn PageFetcher>, llm: Arc<dyn LlmClient>) -> Self {
        Self { fetcher, llm }
    }
}

#[async_trait]
impl Strategy for SynthesisStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Synthesis
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

        let skeleton = page_skeleton(&page.body, SKELETON_MAX_LEN);
        let proposal = propose_selector(self.llm.as_ref(), &skeleton)
            .await
            .map_err(|e| match e {
                LlmError::Network(msg) => ExtractError::Network(msg),
                other => ExtractError::SynthesisRefusal(other.to_string()),
            })?;

        let selector = match proposal {
            SelectorProposal::Selector(s) => s,
            SelectorProposal::Refusal(reason) => {
                tracing::info!(
                    request_id = %request.id,
                    domain = %request.domain,
                    reason = %reason,
                    "strategy.synthesis.refused"
                );
                return Err(ExtractError::SynthesisRefusal(reason));
            }
        };

        let text = apply_selector(&page.body, &selector).map_err(|e| {
            let detail = match e {
                SelectorApplyError::Invalid(msg) => msg,
                SelectorApplyError::NoMatch => "matched nothing".to_string(),
            };
            ExtractError::SynthesisRefusal(format!(
                "proposed selector {selector:?} unusable: {detail}"
            ))
        })?;

        tracing::info!(
            request_id = %request.id,
            domain = %request.domain,
            selector = %selector,
            chars = text.len(),
            "strategy.synthesis.extracted"
        );
        Ok(StrategyYield {
            text,
            selector: Some(selector),
        })
    }
}

use crate::error::ExtractError;
use crate::html::extract_readable;
use crate::strategy::{Strategy, StrategyContext, StrategyYield};
use crate::types::{ExtractionRequest, StrategyKind};
use async_trait::async_trait;
use broadsheet_archive::{ArchiveError, ArchiveMirror, PollStatus};
use std::sync::Arc;
use std::time::Duration;

/// Last-resort fetch through the archival mirror: submit, poll until a
/// snapshot exists, extract from the snapshot. Slowest strategy with the
/// highest external-dependency risk, so it runs only after the direct
/// strategies are exhausted. The mirror is a different host, exempt from the
/// origin's rate bucket; the request deadline still bounds the polling.
pub struct ArchivalStrategy {
    archive: Arc<dyn ArchiveMirror>,
    poll_interval: Duration,
    max_polls: usize,
}

impl ArchivalStrategy {
    pub fn new(archive: Arc<dyn ArchiveMirror>) -> Self {
        Self {
            archive,
            poll_interval: Duration::from_secs(5),
            max_polls: 24,
        }
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: usize) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls.max(1);
        self
    }
}

#[async_trait]
impl Strategy for ArchivalStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Archival
    }

    async fn attempt(
        &self,
        request: &ExtractionRequest,
        _context: &StrategyContext,
    ) -> Result<StrategyYield, ExtractError> {
        let job = self
            .archive
            .submit(request.url.as_str())
            .await
            .map_err(archive_to_extract)?;

        let mut snapshot_url = None;
        for poll in 0..self.max_polls {
            match self.archive.poll(&job).await.map_err(archive_to_extract)? {
                PollStatus::Ready { snapshot_url: url } => {
                    snapshot_url = Some(url);
                    break;
                }
                PollStatus::Pending => {
                    tracing::debug!(
                        request_id = %request.id,
                        poll,
                        "strategy.archival.pending"
                    );
                    tokio::time::sleep(self.poll_interval).await;
                }
                PollStatus::Failed { reason } => {
                    return Err(ExtractError::FatalFetch(format!(
                        "snapshot job failed: {reason}"
                    )));
                }
            }
        }
        let snapshot_url = snapshot_url.ok_or_else(|| {
            ExtractError::FatalFetch(format!(
                "snapshot not ready after {} polls",
                self.max_polls
            ))
        })?;

        let body = self
            .archive
            .fetch_snapshot(&snapshot_url)
            .await
            .map_err(archive_to_extract)?;
        let text = extract_readable(&body).ok_or_else(|| {
            ExtractError::FatalFetch("snapshot had no readable content region".to_string())
        })?;

        tracing::info!(
            request_id = %request.id,
            domain = %request.domain,
            chars = text.len(),
            "strategy.archival.extracted"
        );
        Ok(StrategyYield {
            text,
            selector: None,
        })
    }
}

fn archive_to_extract(e: ArchiveError) -> ExtractError {
    match e {
        ArchiveError::Network(msg) => ExtractError::Network(msg),
        other => ExtractError::FatalFetch(other.to_string()),
    }
}

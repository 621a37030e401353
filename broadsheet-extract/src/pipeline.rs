//! Bounded worker pool over extraction requests.
//!
//! Requests run concurrently up to the worker cap; each request's strategy
//! sequence stays sequential inside its own task. Results come back in
//! completion order; callers that need input order re-associate by URL.
use crate::orchestrator::Orchestrator;
use crate::types::{ExtractionRequest, ExtractionResult, FinalStatus};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::info;

pub struct Pipeline {
    orchestrator: Arc<Orchestrator>,
    workers: usize,
}

impl Pipeline {
    pub fn new(orchestrator: Arc<Orchestrator>, workers: usize) -> Self {
        Self {
            orchestrator,
            workers: workers.max(1),
        }
    }

    pub async fn run(&self, requests: Vec<ExtractionRequest>) -> Vec<ExtractionResult> {
        let total = requests.len();
        info!(total, workers = self.workers, "pipeline.start");

        let results: Vec<ExtractionResult> = stream::iter(requests)
            .map(|request| {
                let orchestrator = self.orchestrator.clone();
                async move { orchestrator.extract(request).await }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let succeeded = results
            .iter()
            .filter(|r| r.final_status == FinalStatus::Success)
            .count();
        info!(
            total,
            succeeded,
            failed = total - succeeded,
            "pipeline.finished"
        );
        results
    }
}

//! Archival-mirror capability: submit a URL for snapshotting, poll until a
//! snapshot exists, and fetch the snapshot body.
//!
//! The mirror is the cascade's last resort: it serves page copies independent
//! of the origin site's access controls, but it is slow and an external
//! dependency, so callers bound the polling with their own deadline.
pub mod error;

pub use error::{ArchiveError, Result};

use async_trait::async_trait;
use broadsheet_http::{FetchClient, FetchError, PageOpts};
use serde::Deserialize;

/// Opaque handle for a submitted snapshot job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobId(pub String);

#[derive(Debug, Clone)]
pub enum PollStatus {
    Ready { snapshot_url: String },
    Pending,
    Failed { reason: String },
}

/// Submit-and-poll protocol of the archival service.
#[async_trait]
pub trait ArchiveMirror: Send + Sync {
    async fn submit(&self, url: &str) -> Result<JobId>;
    async fn poll(&self, job: &JobId) -> Result<PollStatus>;
    async fn fetch_snapshot(&self, snapshot_url: &str) -> Result<String>;
}

pub struct HttpArchiveClient {
    http: FetchClient,
    base_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct SubmitResponse {
    job_id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    snapshot_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpArchiveClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        let http = FetchClient::new().map_err(fetch_to_archive)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        })
    }
}

#[async_trait]
impl ArchiveMirror for HttpArchiveClient {
    async fn submit(&self, url: &str) -> Result<JobId> {
        let body = serde_json::json!({ "url": url });
        let resp: SubmitResponse = self
            .http
            .post_json(
                &format!("{}/snapshots", self.base_url),
                self.token.as_deref(),
                &body,
            )
            .await
            .map_err(fetch_to_archive)?;
        tracing::info!(url, job_id = %resp.job_id, "archive.submitted");
        Ok(JobId(resp.job_id))
    }

    async fn poll(&self, job: &JobId) -> Result<PollStatus> {
        let resp: StatusResponse = self
            .http
            .get_json(
                &format!("{}/snapshots/{}", self.base_url, job.0),
                self.token.as_deref(),
            )
            .await
            .map_err(fetch_to_archive)?;

        match resp.status.as_str() {
            "ready" => match resp.snapshot_url {
                Some(snapshot_url) => Ok(PollStatus::Ready { snapshot_url }),
                None => Ok(PollStatus::Failed {
                    reason: "ready status without snapshot_url".to_string(),
                }),
            },
            "pending" | "queued" | "in_progress" => {
                tracing::debug!(job_id = %job.0, status = %resp.status, "archive.job_pending");
                Ok(PollStatus::Pending)
            }
            other => Ok(PollStatus::Failed {
                reason: resp
                    .error
                    .unwrap_or_else(|| format!("terminal status {other}")),
            }),
        }
    }

    async fn fetch_snapshot(&self, snapshot_url: &str) -> Result<String> {
        let page = self
            .http
            .get_page(snapshot_url, PageOpts::default())
            .await
            .map_err(fetch_to_archive)?;
        Ok(page.body)
    }
}

fn fetch_to_archive(e: FetchError) -> ArchiveError {
    match e {
        FetchError::Network(msg) => ArchiveError::Network(msg),
        FetchError::Fatal { status, message } => ArchiveError::Api {
            status: status.as_u16(),
            message,
        },
        FetchError::Blocked { status } => ArchiveError::Api {
            status: status.as_u16(),
            message: "blocked".to_string(),
        },
        other => ArchiveError::Network(other.to_string()),
    }
}

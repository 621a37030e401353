use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("network error: {0}")]
    Network(String),

    #[error("archive API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("snapshot job failed: {0}")]
    JobFailed(String),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

//! The content extraction cascade.
//!
//! Given an article URL, try a priority-ordered sequence of extraction
//! strategies (cached selector, heuristic readability, LLM selector
//! synthesis, archival mirror), validating each result and recording every
//! attempt. Working selectors are cached per domain; paywalled domains get
//! one authenticated retry backed by the session manager.
//!
//! Entry points: [`orchestrator::Orchestrator`] for one request,
//! [`pipeline::Pipeline`] for a batch.
pub mod clean;
pub mod error;
pub mod fetch;
pub mod html;
pub mod orchestrator;
pub mod pipeline;
pub mod strategy;
pub mod types;
pub mod validate;

pub use error::ExtractError;
pub use fetch::{HttpPageFetcher, PageFetcher};
pub use orchestrator::{CascadeConfig, Orchestrator};
pub use pipeline::Pipeline;
pub use types::{
    AttemptOutcome, ExtractionAttempt, ExtractionRequest, ExtractionResult, FinalStatus,
    StrategyKind,
};
pub use validate::{ValidationOutcome, Validator};

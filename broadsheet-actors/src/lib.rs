//! Shared-state actors for the extraction cascade.
//!
//! The selector cache and the session manager are the only cross-request
//! mutable state in the system; both live behind single-owner actors so the
//! locking discipline stays local to this crate. The per-domain rate limiter
//! rides the same runtime.
pub mod actor;
pub mod cache;
pub mod rate;
pub mod session;
pub mod store;
pub mod system;

use broadsheet_common::{CredentialItem, SessionState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// One validated extraction selector for a domain.
///
/// `consecutive_failures` resets on every successful use; the cache evicts
/// the entry once it reaches the configured limit.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedSelector {
    pub domain: String,
    pub selector: String,
    pub created_at: DateTime<Utc>,
    pub last_validated_at: DateTime<Utc>,
    pub hit_count: u64,
    pub consecutive_failures: u32,
}

impl CachedSelector {
    pub fn new(domain: impl Into<String>, selector: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            domain: domain.into(),
            selector: selector.into(),
            created_at: now,
            last_validated_at: now,
            hit_count: 0,
            consecutive_failures: 0,
        }
    }
}

pub enum CacheMsg {
    Lookup {
        domain: String,
        reply: oneshot::Sender<Option<CachedSelector>>,
    },
    RecordSuccess {
        domain: String,
        selector: String,
    },
    RecordFailure {
        domain: String,
        selector: String,
    },
    Invalidate {
        domain: String,
    },
    /// TTL sweep plus durable snapshot; `reply` fires once the snapshot is
    /// written (used by shutdown and tests).
    Flush {
        reply: Option<oneshot::Sender<()>>,
    },
}

/// Reply to an `EnsureFresh` request.
#[derive(Clone, Debug)]
pub enum FreshSession {
    /// Current credentials, renewed if they were due.
    Fresh(SessionState),
    /// Renewal failed; the previous credentials are still active and worth
    /// one attempt before degrading to unauthenticated strategies.
    Stale(SessionState),
    /// No usable credentials exist for the domain.
    Unavailable { reason: String },
}

impl FreshSession {
    pub fn state(&self) -> Option<&SessionState> {
        match self {
            FreshSession::Fresh(s) | FreshSession::Stale(s) => Some(s),
            FreshSession::Unavailable { .. } => None,
        }
    }
}

pub enum SessionMsg {
    Get {
        domain: String,
        reply: oneshot::Sender<Option<SessionState>>,
    },
    EnsureFresh {
        domain: String,
        reply: oneshot::Sender<FreshSession>,
    },
    /// Internal: a spawned harvest finished. Never sent by callers.
    RenewalDone {
        domain: String,
        outcome: anyhow::Result<Vec<CredentialItem>>,
    },
}

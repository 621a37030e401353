//! Common types and utilities shared across Broadsheet crates.
//!
//! This crate defines the session/credential model shared by the session
//! manager, the browser driver, and the extraction strategies, plus the
//! centralized `tracing` initialisation. It is intentionally lightweight
//! and dependency-minimal so that all crates can depend on it without
//! introducing heavy transitive costs.
//!
//! # Overview
//!
//! - [`CredentialItem`] / [`SessionState`]: per-domain authenticated state
//! - [`observability`]: centralised tracing/logging initialisation
//! - [`domain_of`]: canonical domain derivation for cache/session keys
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

pub mod observability;

/// One harvested credential (typically a cookie) with an optional expiry.
///
/// The value is opaque to everything except the fetch layer; `Debug` output
/// never includes it so session dumps are safe to log.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialItem {
    pub name: String,
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for CredentialItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialItem")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl CredentialItem {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Items without an expiry are treated as session-scoped and never stale.
    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(when) if when <= now)
    }
}

/// Authenticated state for one domain: the harvested credential set plus
/// bookkeeping for proactive renewal.
///
/// Owned by the session manager; strategies only ever see a cloned snapshot,
/// so a cancelled fetch can never corrupt the stored state.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionState {
    pub domain: String,
    pub credentials: Vec<CredentialItem>,
    pub fetched_at: DateTime<Utc>,
    /// When proactive renewal should kick in. Derived from the earliest
    /// credential expiry minus the configured threshold; absent when no
    /// credential carries an expiry.
    pub renewal_due_at: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Build a session from freshly harvested credentials.
    ///
    /// ```
    /// use broadsheet_common::{CredentialItem, SessionState};
    /// use chrono::{Duration, Utc};
    ///
    /// let soon = Utc::now() + Duration::days(3);
    /// let session = SessionState::from_harvest(
    ///     "example.com",
    ///     vec![CredentialItem::new("sid", "abc").with_expiry(soon)],
    ///     Duration::days(7),
    /// );
    /// assert!(session.renewal_due(Utc::now()));
    /// ```
    pub fn from_harvest(
        domain: impl Into<String>,
        credentials: Vec<CredentialItem>,
        renewal_threshold: Duration,
    ) -> Self {
        let renewal_due_at = credentials
            .iter()
            .filter_map(|c| c.expires_at)
            .min()
            .map(|earliest| earliest - renewal_threshold);
        Self {
            domain: domain.into(),
            credentials,
            fetched_at: Utc::now(),
            renewal_due_at,
        }
    }

    /// True when any credential expiry falls within the renewal threshold.
    pub fn renewal_due(&self, now: DateTime<Utc>) -> bool {
        matches!(self.renewal_due_at, Some(due) if due <= now)
    }

    /// True when at least one credential is still live.
    pub fn usable(&self, now: DateTime<Utc>) -> bool {
        self.credentials.iter().any(|c| !c.expired_at(now))
    }

    /// Render the live credentials as a `Cookie` request header value.
    pub fn cookie_header(&self, now: DateTime<Utc>) -> String {
        self.credentials
            .iter()
            .filter(|c| !c.expired_at(now))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Canonical domain for cache and session keys: lowercased registrable host
/// with any leading `www.` stripped.
///
/// ```
/// use broadsheet_common::domain_of;
/// use url::Url;
///
/// let url = Url::parse("https://www.Example.com/news/article").unwrap();
/// assert_eq!(domain_of(&url).as_deref(), Some("example.com"));
/// ```
pub fn domain_of(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_debug_is_redacted() {
        let item = CredentialItem::new("sid", "super-secret-cookie");
        let dump = format!("{item:?}");
        assert!(!dump.contains("super-secret-cookie"));
        assert!(dump.contains("<redacted>"));
    }

    #[test]
    fn renewal_due_tracks_earliest_expiry() {
        let now = Utc::now();
        let session = SessionState::from_harvest(
            "example.com",
            vec![
                CredentialItem::new("a", "1").with_expiry(now + Duration::days(30)),
                CredentialItem::new("b", "2").with_expiry(now + Duration::days(3)),
            ],
            Duration::days(7),
        );
        assert!(session.renewal_due(now));
        assert!(session.usable(now));
    }

    #[test]
    fn session_without_expiries_never_due() {
        let now = Utc::now();
        let session = SessionState::from_harvest(
            "example.com",
            vec![CredentialItem::new("sid", "x")],
            Duration::days(7),
        );
        assert!(!session.renewal_due(now));
    }

    #[test]
    fn cookie_header_skips_expired_items() {
        let now = Utc::now();
        let session = SessionState::from_harvest(
            "example.com",
            vec![
                CredentialItem::new("live", "1").with_expiry(now + Duration::days(2)),
                CredentialItem::new("dead", "2").with_expiry(now - Duration::days(1)),
            ],
            Duration::days(7),
        );
        assert_eq!(session.cookie_header(now), "live=1");
    }

    #[test]
    fn domain_strips_www_and_lowercases() {
        let url = Url::parse("https://WWW.Tribune.EXAMPLE/story").unwrap();
        assert_eq!(domain_of(&url).as_deref(), Some("tribune.example"));
    }
}

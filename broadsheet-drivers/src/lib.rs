//! Driver layer for browser automation.
//!
//! The session manager never talks to a browser directly; it sees only the
//! [`CredentialHarvester`] capability. The concrete implementation here
//! drives a WebDriver endpoint with stealth arguments, replays the existing
//! credential set, lets the site refresh it, and hands back the harvested
//! cookies.
//!
//! - [`CredentialHarvester`]: narrow capability used by the session manager
//! - [`WebDriverHarvester`]: `fantoccini`-backed implementation
//! - [`stealth`]: stealth profiles, Chrome arguments, and JS evasions
use anyhow::Result;
use async_trait::async_trait;
use broadsheet_common::CredentialItem;

pub mod harvester;
pub mod stealth;

pub use harvester::WebDriverHarvester;
pub use stealth::StealthProfile;

/// Refresh the authenticated credential set for a domain.
///
/// Implementations must be side-effect free on failure: an error return means
/// the caller keeps whatever credentials it already had.
#[async_trait]
pub trait CredentialHarvester: Send + Sync {
    async fn harvest(
        &self,
        domain: &str,
        existing: &[CredentialItem],
    ) -> Result<Vec<CredentialItem>>;
}

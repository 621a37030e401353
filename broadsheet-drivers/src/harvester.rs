use crate::stealth::{build_stealth_arguments, pick_session_profile, StealthProfile, StealthScripts};
use crate::CredentialHarvester;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use broadsheet_common::CredentialItem;
use chrono::{DateTime, Utc};
use fantoccini::cookies::Cookie;
use fantoccini::{Client, ClientBuilder};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use webdriver::capabilities::Capabilities;

/// `fantoccini`-backed credential harvester.
///
/// Connects to a running WebDriver service, seeds the browser with the
/// previously harvested cookies, lets the site refresh them, and reads the
/// resulting cookie jar back.
pub struct WebDriverHarvester {
    webdriver_url: String,
    headless: bool,
    stealth_profile: StealthProfile,
    /// Time the page gets to run its session-refresh scripts.
    dwell: Duration,
}

impl WebDriverHarvester {
    pub fn new(webdriver_url: impl Into<String>, headless: bool, profile: StealthProfile) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
            headless,
            stealth_profile: profile,
            dwell: Duration::from_secs(3),
        }
    }

    pub fn with_dwell(mut self, dwell: Duration) -> Self {
        self.dwell = dwell;
        self
    }

    async fn connect(&self) -> Result<Client> {
        let mut caps = Capabilities::new();
        let mut chrome_opts = HashMap::new();
        let user_profile = pick_session_profile();

        let mut args = build_stealth_arguments(&self.stealth_profile, &user_profile);
        if self.headless {
            args.push("--headless".to_string());
            args.push("--disable-gpu".to_string());
        }
        chrome_opts.insert("args".to_string(), json!(args));
        caps.insert("goog:chromeOptions".to_string(), json!(chrome_opts));

        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&self.webdriver_url)
            .await
            .map_err(|e| anyhow!("webdriver connect failed ({}): {e}", self.webdriver_url))?;
        Ok(client)
    }

    async fn drive(
        &self,
        client: &Client,
        domain: &str,
        existing: &[CredentialItem],
    ) -> Result<Vec<CredentialItem>> {
        let origin = format!("https://{domain}/");
        client.goto(&origin).await?;
        client
            .execute(StealthScripts::get_core_evasions(), vec![])
            .await?;
        if matches!(
            self.stealth_profile,
            StealthProfile::Balanced | StealthProfile::Maximum
        ) {
            client
                .execute(StealthScripts::get_canvas_evasions(), vec![])
                .await?;
        }

        // Replay the stored cookie set so the site sees the old session and
        // can roll it forward instead of demanding a fresh login.
        let mut seeded = 0usize;
        for item in existing {
            let mut cookie = Cookie::new(item.name.clone(), item.value.clone());
            cookie.set_domain(domain.to_string());
            cookie.set_path("/");
            match client.add_cookie(cookie).await {
                Ok(()) => seeded += 1,
                Err(e) => {
                    tracing::debug!(domain, name=%item.name, error=%e, "harvest.seed_cookie.rejected")
                }
            }
        }
        tracing::debug!(domain, seeded, total = existing.len(), "harvest.seeded");

        // Reload with the seeded cookies and give the site time to refresh them.
        client.goto(&origin).await?;
        tokio::time::sleep(self.dwell).await;

        let jar = client.get_all_cookies().await?;
        let harvested: Vec<CredentialItem> = jar.iter().map(map_cookie).collect();
        tracing::info!(domain, count = harvested.len(), "harvest.collected");
        Ok(harvested)
    }
}

#[async_trait]
impl CredentialHarvester for WebDriverHarvester {
    async fn harvest(
        &self,
        domain: &str,
        existing: &[CredentialItem],
    ) -> Result<Vec<CredentialItem>> {
        let client = self.connect().await?;
        // Always close the browser session, success or not.
        let result = self.drive(&client, domain, existing).await;
        if let Err(e) = client.close().await {
            tracing::warn!(domain, error=%e, "harvest.close_failed");
        }
        result
    }
}

fn map_cookie(cookie: &Cookie<'static>) -> CredentialItem {
    let mut item = CredentialItem::new(cookie.name().to_string(), cookie.value().to_string());
    if let Some(expiry) = cookie.expires_datetime().and_then(offset_to_chrono) {
        item = item.with_expiry(expiry);
    }
    item
}

/// WebDriver cookies carry `time` timestamps; everything else in the
/// workspace speaks `chrono`.
fn offset_to_chrono(odt: time::OffsetDateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(odt.unix_timestamp(), odt.nanosecond())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn cookie_expiry_converts_to_chrono() {
        let odt = datetime!(2026-09-01 12:00:00 UTC);
        let got = offset_to_chrono(odt).unwrap();
        assert_eq!(got.timestamp(), odt.unix_timestamp());
    }

    #[test]
    fn session_cookies_map_without_expiry() {
        let cookie = Cookie::new("sid".to_string(), "abc".to_string());
        let item = map_cookie(&cookie);
        assert_eq!(item.name, "sid");
        assert_eq!(item.value, "abc");
        assert!(item.expires_at.is_none());
    }
}

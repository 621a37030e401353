//! Session manager actor: per-domain authenticated state with proactive,
//! single-flighted renewal.
//!
//! Renewal drives the browser harvester in a detached task and reports back
//! through the actor's own mailbox, so concurrent `EnsureFresh` calls for one
//! domain collapse into a single underlying harvest and a cancelled caller
//! can never corrupt the stored state. The previous credential set is
//! persisted to a backup slot before the active row is overwritten; a harvest
//! that yields nothing usable leaves the active state exactly as it was.
use crate::actor::{Actor, Context};
use crate::{store, FreshSession, SessionMsg};
use anyhow::Result;
use broadsheet_common::{CredentialItem, SessionState};
use broadsheet_drivers::CredentialHarvester;
use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Renew once any credential expiry falls within this window.
    pub renewal_threshold: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            renewal_threshold: Duration::days(7),
        }
    }
}

pub struct SessionActor {
    sessions: HashMap<String, SessionState>,
    /// Waiters per in-flight renewal; presence of a key means a harvest is
    /// already running for that domain.
    pending: HashMap<String, Vec<oneshot::Sender<FreshSession>>>,
    harvester: Option<Arc<dyn CredentialHarvester>>,
    pool: Option<SqlitePool>,
    cfg: SessionConfig,
}

impl SessionActor {
    pub fn new(harvester: Option<Arc<dyn CredentialHarvester>>, cfg: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            pending: HashMap::new(),
            harvester,
            pool: None,
            cfg,
        }
    }

    /// Seed with known sessions (startup load, tests).
    pub fn with_sessions(mut self, sessions: Vec<SessionState>) -> Self {
        self.sessions = sessions.into_iter().map(|s| (s.domain.clone(), s)).collect();
        self
    }

    /// Load persisted sessions and keep writing renewals back.
    pub async fn with_store(
        pool: SqlitePool,
        harvester: Option<Arc<dyn CredentialHarvester>>,
        cfg: SessionConfig,
    ) -> Result<Self> {
        let sessions = store::load_sessions(&pool).await?;
        let mut actor = Self::new(harvester, cfg).with_sessions(sessions);
        actor.pool = Some(pool);
        Ok(actor)
    }

    fn degraded_reply(&self, domain: &str, reason: String) -> FreshSession {
        let now = Utc::now();
        match self.sessions.get(domain) {
            Some(prev) if prev.usable(now) => FreshSession::Stale(prev.clone()),
            _ => FreshSession::Unavailable { reason },
        }
    }

    fn harvest_is_usable(items: &[CredentialItem]) -> bool {
        let now = Utc::now();
        !items.is_empty() && items.iter().any(|c| !c.expired_at(now))
    }
}

#[async_trait::async_trait]
impl Actor for SessionActor {
    type Msg = SessionMsg;

    async fn handle(&mut self, msg: Self::Msg, ctx: &mut Context<Self>) -> Result<()> {
        match msg {
            SessionMsg::Get { domain, reply } => {
                if reply.send(self.sessions.get(&domain).cloned()).is_err() {
                    debug!("session.get.reply_dropped");
                }
            }

            SessionMsg::EnsureFresh { domain, reply } => {
                let now = Utc::now();
                if let Some(current) = self.sessions.get(&domain) {
                    if current.usable(now) && !current.renewal_due(now) {
                        let _ = reply.send(FreshSession::Fresh(current.clone()));
                        return Ok(());
                    }
                }

                let Some(harvester) = self.harvester.clone() else {
                    let _ = reply
                        .send(self.degraded_reply(&domain, "no credential harvester".into()));
                    return Ok(());
                };

                let existing: Vec<CredentialItem> = self
                    .sessions
                    .get(&domain)
                    .map(|s| s.credentials.clone())
                    .unwrap_or_default();

                let waiters = self.pending.entry(domain.clone()).or_default();
                waiters.push(reply);
                if waiters.len() > 1 {
                    // A harvest is already in flight; this caller just joins it.
                    debug!(domain = %domain, waiters = waiters.len(), "session.renewal.joined");
                    return Ok(());
                }

                info!(domain = %domain, "session.renewal.start");
                let me = ctx.addr();
                tokio::spawn(async move {
                    let outcome = harvester.harvest(&domain, &existing).await;
                    let _ = me.send(SessionMsg::RenewalDone { domain, outcome }).await;
                });
            }

            SessionMsg::RenewalDone { domain, outcome } => {
                let waiters = self.pending.remove(&domain).unwrap_or_default();
                let previous = self.sessions.get(&domain).cloned();

                let response = match outcome {
                    Ok(items) if Self::harvest_is_usable(&items) => {
                        let next =
                            SessionState::from_harvest(&domain, items, self.cfg.renewal_threshold);
                        let persisted = match &self.pool {
                            Some(pool) => {
                                store::backup_then_replace_session(pool, previous.as_ref(), &next)
                                    .await
                            }
                            None => Ok(()),
                        };
                        match persisted {
                            Ok(()) => {
                                info!(
                                    domain = %domain,
                                    credentials = next.credentials.len(),
                                    "session.renewal.succeeded"
                                );
                                self.sessions.insert(domain.clone(), next.clone());
                                FreshSession::Fresh(next)
                            }
                            Err(err) => {
                                warn!(domain = %domain, error = ?err, "session.persist.failed");
                                self.degraded_reply(&domain, format!("persist failed: {err}"))
                            }
                        }
                    }
                    Ok(_) => {
                        warn!(domain = %domain, "session.renewal.empty_harvest");
                        self.degraded_reply(&domain, "harvest yielded no usable credentials".into())
                    }
                    Err(err) => {
                        warn!(domain = %domain, error = ?err, "session.renewal.failed");
                        self.degraded_reply(&domain, format!("harvest failed: {err}"))
                    }
                };

                for tx in waiters {
                    let _ = tx.send(response.clone());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{spawn_actor, Addr};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    struct FixedHarvester {
        calls: Arc<AtomicUsize>,
        items: Vec<CredentialItem>,
        fail: bool,
        delay: StdDuration,
    }

    #[async_trait]
    impl CredentialHarvester for FixedHarvester {
        async fn harvest(
            &self,
            _domain: &str,
            _existing: &[CredentialItem],
        ) -> Result<Vec<CredentialItem>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                anyhow::bail!("browser session crashed");
            }
            Ok(self.items.clone())
        }
    }

    async fn ensure_fresh(addr: &Addr<SessionActor>, domain: &str) -> FreshSession {
        let (tx, rx) = oneshot::channel();
        addr.send(SessionMsg::EnsureFresh {
            domain: domain.to_string(),
            reply: tx,
        })
        .await
        .map_err(|_| ())
        .unwrap();
        rx.await.unwrap()
    }

    async fn get(addr: &Addr<SessionActor>, domain: &str) -> Option<SessionState> {
        let (tx, rx) = oneshot::channel();
        addr.send(SessionMsg::Get {
            domain: domain.to_string(),
            reply: tx,
        })
        .await
        .map_err(|_| ())
        .unwrap();
        rx.await.unwrap()
    }

    fn expiring_session(domain: &str, days: i64) -> SessionState {
        SessionState::from_harvest(
            domain,
            vec![CredentialItem::new("sid", "old").with_expiry(Utc::now() + Duration::days(days))],
            Duration::days(7),
        )
    }

    #[tokio::test]
    async fn concurrent_ensure_fresh_single_flights() {
        let calls = Arc::new(AtomicUsize::new(0));
        let harvester = Arc::new(FixedHarvester {
            calls: calls.clone(),
            items: vec![CredentialItem::new("sid", "new")
                .with_expiry(Utc::now() + Duration::days(30))],
            fail: false,
            delay: StdDuration::from_millis(50),
        });
        let actor = SessionActor::new(Some(harvester), SessionConfig::default());
        let handle = spawn_actor(actor, 64);

        let mut rxs = Vec::new();
        for _ in 0..5 {
            let (tx, rx) = oneshot::channel();
            handle
                .addr
                .send(SessionMsg::EnsureFresh {
                    domain: "paywalled.example".into(),
                    reply: tx,
                })
                .await
                .map_err(|_| ())
                .unwrap();
            rxs.push(rx);
        }
        for rx in rxs {
            let got = rx.await.unwrap();
            assert!(matches!(got, FreshSession::Fresh(_)));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expiring_credentials_trigger_renewal() {
        let calls = Arc::new(AtomicUsize::new(0));
        let harvester = Arc::new(FixedHarvester {
            calls: calls.clone(),
            items: vec![CredentialItem::new("sid", "refreshed")
                .with_expiry(Utc::now() + Duration::days(30))],
            fail: false,
            delay: StdDuration::from_millis(1),
        });
        let actor = SessionActor::new(Some(harvester), SessionConfig::default())
            .with_sessions(vec![expiring_session("paywalled.example", 3)]);
        let handle = spawn_actor(actor, 64);

        let got = ensure_fresh(&handle.addr, "paywalled.example").await;
        match got {
            FreshSession::Fresh(s) => assert_eq!(s.credentials[0].value, "refreshed"),
            other => panic!("expected fresh session, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn current_session_short_circuits_without_harvest() {
        let calls = Arc::new(AtomicUsize::new(0));
        let harvester = Arc::new(FixedHarvester {
            calls: calls.clone(),
            items: vec![],
            fail: false,
            delay: StdDuration::from_millis(1),
        });
        let actor = SessionActor::new(Some(harvester), SessionConfig::default())
            .with_sessions(vec![expiring_session("healthy.example", 60)]);
        let handle = spawn_actor(actor, 64);

        let got = ensure_fresh(&handle.addr, "healthy.example").await;
        assert!(matches!(got, FreshSession::Fresh(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_harvest_preserves_previous_state() {
        let before = expiring_session("paywalled.example", 3);
        let harvester = Arc::new(FixedHarvester {
            calls: Arc::new(AtomicUsize::new(0)),
            items: vec![],
            fail: false,
            delay: StdDuration::from_millis(1),
        });
        let actor = SessionActor::new(Some(harvester), SessionConfig::default())
            .with_sessions(vec![before.clone()]);
        let handle = spawn_actor(actor, 64);

        let got = ensure_fresh(&handle.addr, "paywalled.example").await;
        match got {
            FreshSession::Stale(s) => assert_eq!(s, before),
            other => panic!("expected stale session, got {other:?}"),
        }
        assert_eq!(get(&handle.addr, "paywalled.example").await.unwrap(), before);
    }

    #[tokio::test]
    async fn missing_harvester_degrades_cleanly() {
        let actor = SessionActor::new(None, SessionConfig::default());
        let handle = spawn_actor(actor, 64);
        let got = ensure_fresh(&handle.addr, "unknown.example").await;
        assert!(matches!(got, FreshSession::Unavailable { .. }));
    }

    #[tokio::test]
    async fn renewal_persists_backup_before_overwrite() {
        let pool = store::open("sqlite::memory:").await.unwrap();
        let before = expiring_session("paywalled.example", 3);
        store::backup_then_replace_session(&pool, None, &before)
            .await
            .unwrap();

        let harvester = Arc::new(FixedHarvester {
            calls: Arc::new(AtomicUsize::new(0)),
            items: vec![CredentialItem::new("sid", "renewed")
                .with_expiry(Utc::now() + Duration::days(30))],
            fail: false,
            delay: StdDuration::from_millis(1),
        });
        let actor = SessionActor::with_store(pool.clone(), Some(harvester), SessionConfig::default())
            .await
            .unwrap();
        let handle = spawn_actor(actor, 64);

        let got = ensure_fresh(&handle.addr, "paywalled.example").await;
        assert!(matches!(got, FreshSession::Fresh(_)));

        // Old credentials live on in the backup slot; the active row is new.
        assert_eq!(
            store::backup_count(&pool, "paywalled.example").await.unwrap(),
            1
        );
        let sessions = store::load_sessions(&pool).await.unwrap();
        assert_eq!(sessions[0].credentials[0].value, "renewed");
    }

    #[tokio::test]
    async fn failed_harvest_leaves_store_untouched() {
        let pool = store::open("sqlite::memory:").await.unwrap();
        let before = expiring_session("paywalled.example", 3);
        store::backup_then_replace_session(&pool, None, &before)
            .await
            .unwrap();

        let harvester = Arc::new(FixedHarvester {
            calls: Arc::new(AtomicUsize::new(0)),
            items: vec![],
            fail: true,
            delay: StdDuration::from_millis(1),
        });
        let actor = SessionActor::with_store(pool.clone(), Some(harvester), SessionConfig::default())
            .await
            .unwrap();
        let handle = spawn_actor(actor, 64);

        let got = ensure_fresh(&handle.addr, "paywalled.example").await;
        assert!(matches!(got, FreshSession::Stale(_)));

        let sessions = store::load_sessions(&pool).await.unwrap();
        assert_eq!(sessions[0].credentials[0].value, "old");
        assert_eq!(
            store::backup_count(&pool, "paywalled.example").await.unwrap(),
            0
        );
    }
}

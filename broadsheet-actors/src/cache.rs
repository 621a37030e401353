//! Per-domain selector cache actor.
//!
//! In-memory map with three eviction rules: a consecutive-failure limit, an
//! LRU bound on entry count, and a TTL sweep for entries no strategy has
//! validated recently. Optional SQLite snapshotting keeps cache warmth across
//! process restarts; the snapshot write happens off-actor so lookups never
//! wait on disk.
use crate::actor::{Actor, Context};
use crate::{store, CacheMsg, CachedSelector};
use anyhow::Result;
use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub ttl: Duration,
    pub failure_limit: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 512,
            ttl: Duration::days(14),
            failure_limit: 3,
        }
    }
}

pub struct SelectorCacheActor {
    entries: HashMap<String, CachedSelector>,
    cfg: CacheConfig,
    pool: Option<SqlitePool>,
    write_limit: Arc<Semaphore>,
}

impl SelectorCacheActor {
    pub fn new(cfg: CacheConfig) -> Self {
        Self::with_snapshot(cfg, Vec::new())
    }

    /// Start from a pre-built entry set (snapshot load, tests).
    pub fn with_snapshot(cfg: CacheConfig, snapshot: Vec<CachedSelector>) -> Self {
        let entries = snapshot
            .into_iter()
            .map(|s| (s.domain.clone(), s))
            .collect();
        Self {
            entries,
            cfg,
            pool: None,
            write_limit: Arc::new(Semaphore::new(1)),
        }
    }

    /// Load the last snapshot from the state database and keep flushing to it.
    pub async fn with_store(pool: SqlitePool, cfg: CacheConfig) -> Result<Self> {
        let snapshot = store::load_selectors(&pool).await?;
        let mut actor = Self::with_snapshot(cfg, snapshot);
        actor.pool = Some(pool);
        Ok(actor)
    }

    fn record_success(&mut self, domain: String, selector: String) {
        let now = Utc::now();
        let renewed = match self.entries.get_mut(&domain) {
            Some(entry) if entry.selector == selector => {
                entry.hit_count += 1;
                entry.consecutive_failures = 0;
                entry.last_validated_at = now;
                true
            }
            _ => false,
        };
        if !renewed {
            // New selector for the domain (first synthesis, or a re-synthesis
            // after a site redesign) starts a fresh entry.
            let mut entry = CachedSelector::new(domain.clone(), selector);
            entry.hit_count = 1;
            debug!(domain = %domain, "cache.insert");
            self.entries.insert(domain, entry);
        }
        self.enforce_bound();
    }

    fn record_failure(&mut self, domain: &str, selector: &str) {
        let limit = self.cfg.failure_limit;
        let evict = match self.entries.get_mut(domain) {
            // A failure against a selector we no longer hold says nothing
            // about the current entry.
            Some(entry) if entry.selector == selector => {
                entry.consecutive_failures += 1;
                entry.consecutive_failures >= limit
            }
            _ => false,
        };
        if evict {
            self.entries.remove(domain);
            info!(domain, reason = "consecutive_failures", "cache.evict");
        }
    }

    /// LRU on `last_validated_at` once the entry bound is exceeded.
    fn enforce_bound(&mut self) {
        while self.entries.len() > self.cfg.max_entries {
            let oldest = self
                .entries
                .values()
                .min_by_key(|e| e.last_validated_at)
                .map(|e| e.domain.clone());
            match oldest {
                Some(domain) => {
                    self.entries.remove(&domain);
                    info!(domain = %domain, reason = "lru", "cache.evict");
                }
                None => break,
            }
        }
    }

    fn sweep_ttl(&mut self) {
        let cutoff = Utc::now() - self.cfg.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, e| e.last_validated_at >= cutoff);
        let dropped = before - self.entries.len();
        if dropped > 0 {
            info!(dropped, reason = "ttl", "cache.evict");
        }
    }
}

#[async_trait::async_trait]
impl Actor for SelectorCacheActor {
    type Msg = CacheMsg;

    async fn handle(&mut self, msg: Self::Msg, _ctx: &mut Context<Self>) -> Result<()> {
        match msg {
            CacheMsg::Lookup { domain, reply } => {
                let hit = self.entries.get(&domain).cloned();
                debug!(domain = %domain, hit = hit.is_some(), "cache.lookup");
                if reply.send(hit).is_err() {
                    debug!("cache.lookup.reply_dropped");
                }
            }
            CacheMsg::RecordSuccess { domain, selector } => {
                self.record_success(domain, selector);
            }
            CacheMsg::RecordFailure { domain, selector } => {
                self.record_failure(&domain, &selector);
            }
            CacheMsg::Invalidate { domain } => {
                if self.entries.remove(&domain).is_some() {
                    info!(domain = %domain, reason = "manual", "cache.evict");
                }
            }
            CacheMsg::Flush { reply } => {
                self.sweep_ttl();
                match &self.pool {
                    Some(pool) => {
                        let pool = pool.clone();
                        let snapshot: Vec<CachedSelector> = self.entries.values().cloned().collect();
                        let permit_src = self.write_limit.clone();
                        tokio::spawn(async move {
                            let _permit = match permit_src.acquire_owned().await {
                                Ok(permit) => permit,
                                Err(err) => {
                                    warn!(error = ?err, "cache.flush.acquire_failed");
                                    return;
                                }
                            };
                            if let Err(err) = store::replace_selectors(&pool, &snapshot).await {
                                warn!(error = ?err, "cache.flush.failed");
                            }
                            if let Some(tx) = reply {
                                let _ = tx.send(());
                            }
                        });
                    }
                    None => {
                        if let Some(tx) = reply {
                            let _ = tx.send(());
                        }
                    }
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
    use tokio::sync::oneshot;

    async fn lookup(addr: &Addr<SelectorCacheActor>, domain: &str) -> Option<CachedSelector> {
        let (tx, rx) = oneshot::channel();
        addr.send(CacheMsg::Lookup {
            domain: domain.to_string(),
            reply: tx,
        })
        .await
        .map_err(|_| ())
        .unwrap();
        rx.await.unwrap()
    }

    async fn flush(addr: &Addr<SelectorCacheActor>) {
        let (tx, rx) = oneshot::channel();
        addr.send(CacheMsg::Flush { reply: Some(tx) })
            .await
            .map_err(|_| ())
            .unwrap();
        rx.await.unwrap();
    }

    #[tokio::test]
    async fn three_consecutive_failures_evict() {
        let handle = spawn_actor(SelectorCacheActor::new(CacheConfig::default()), 32);
        handle
            .addr
            .send(CacheMsg::RecordSuccess {
                domain: "news.example".into(),
                selector: "article".into(),
            })
            .await
            .map_err(|_| ())
            .unwrap();

        for _ in 0..2 {
            handle
                .addr
                .send(CacheMsg::RecordFailure {
                    domain: "news.example".into(),
                    selector: "article".into(),
                })
                .await
                .map_err(|_| ())
                .unwrap();
        }
        let entry = lookup(&handle.addr, "news.example").await.unwrap();
        assert_eq!(entry.consecutive_failures, 2);

        handle
            .addr
            .send(CacheMsg::RecordFailure {
                domain: "news.example".into(),
                selector: "article".into(),
            })
            .await
            .map_err(|_| ())
            .unwrap();
        assert!(lookup(&handle.addr, "news.example").await.is_none());
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let handle = spawn_actor(SelectorCacheActor::new(CacheConfig::default()), 32);
        for msg in [
            CacheMsg::RecordSuccess {
                domain: "d.example".into(),
                selector: "main".into(),
            },
            CacheMsg::RecordFailure {
                domain: "d.example".into(),
                selector: "main".into(),
            },
            CacheMsg::RecordFailure {
                domain: "d.example".into(),
                selector: "main".into(),
            },
            CacheMsg::RecordSuccess {
                domain: "d.example".into(),
                selector: "main".into(),
            },
        ] {
            handle.addr.send(msg).await.map_err(|_| ()).unwrap();
        }
        let entry = lookup(&handle.addr, "d.example").await.unwrap();
        assert_eq!(entry.consecutive_failures, 0);
        assert_eq!(entry.hit_count, 2);
    }

    #[tokio::test]
    async fn stale_failure_for_replaced_selector_is_ignored() {
        let handle = spawn_actor(SelectorCacheActor::new(CacheConfig::default()), 32);
        handle
            .addr
            .send(CacheMsg::RecordSuccess {
                domain: "d.example".into(),
                selector: "div.new".into(),
            })
            .await
            .map_err(|_| ())
            .unwrap();
        handle
            .addr
            .send(CacheMsg::RecordFailure {
                domain: "d.example".into(),
                selector: "div.old".into(),
            })
            .await
            .map_err(|_| ())
            .unwrap();
        let entry = lookup(&handle.addr, "d.example").await.unwrap();
        assert_eq!(entry.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn manual_invalidation_removes_the_entry() {
        let handle = spawn_actor(SelectorCacheActor::new(CacheConfig::default()), 32);
        handle
            .addr
            .send(CacheMsg::RecordSuccess {
                domain: "redesigned.example".into(),
                selector: "article".into(),
            })
            .await
            .map_err(|_| ())
            .unwrap();
        handle
            .addr
            .send(CacheMsg::Invalidate {
                domain: "redesigned.example".into(),
            })
            .await
            .map_err(|_| ())
            .unwrap();
        assert!(lookup(&handle.addr, "redesigned.example").await.is_none());
    }

    #[tokio::test]
    async fn lru_bound_evicts_least_recently_validated() {
        let cfg = CacheConfig {
            max_entries: 2,
            ..Default::default()
        };
        let handle = spawn_actor(SelectorCacheActor::new(cfg), 32);
        for domain in ["a.example", "b.example", "c.example"] {
            handle
                .addr
                .send(CacheMsg::RecordSuccess {
                    domain: domain.into(),
                    selector: "article".into(),
                })
                .await
                .map_err(|_| ())
                .unwrap();
        }
        assert!(lookup(&handle.addr, "a.example").await.is_none());
        assert!(lookup(&handle.addr, "b.example").await.is_some());
        assert!(lookup(&handle.addr, "c.example").await.is_some());
    }

    #[tokio::test]
    async fn ttl_sweep_drops_unused_entries() {
        let mut old = CachedSelector::new("dusty.example", "article");
        old.last_validated_at = Utc::now() - Duration::days(30);
        let handle = spawn_actor(
            SelectorCacheActor::with_snapshot(CacheConfig::default(), vec![old]),
            32,
        );

        assert!(lookup(&handle.addr, "dusty.example").await.is_some());
        flush(&handle.addr).await;
        assert!(lookup(&handle.addr, "dusty.example").await.is_none());
    }

    #[tokio::test]
    async fn snapshot_survives_restart() {
        let pool = store::open("sqlite::memory:").await.unwrap();
        let actor = SelectorCacheActor::with_store(pool.clone(), CacheConfig::default())
            .await
            .unwrap();
        let handle = spawn_actor(actor, 32);
        handle
            .addr
            .send(CacheMsg::RecordSuccess {
                domain: "warm.example".into(),
                selector: "#story".into(),
            })
            .await
            .map_err(|_| ())
            .unwrap();
        flush(&handle.addr).await;

        // "Restart": a fresh actor over the same database sees the entry.
        let reloaded = SelectorCacheActor::with_store(pool, CacheConfig::default())
            .await
            .unwrap();
        let handle2 = spawn_actor(reloaded, 32);
        let entry = lookup(&handle2.addr, "warm.example").await.unwrap();
        assert_eq!(entry.selector, "#story");
    }
}

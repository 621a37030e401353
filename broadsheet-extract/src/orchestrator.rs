//! Cascade orchestrator: drives the strategy sequence for one request.
//!
//! State machine per request: `Start → TryStrategy(i) → Validate →
//! {Success | TryStrategy(i+1)} → … → Exhausted`. The orchestrator owns the
//! domain-aware ordering policy, the per-request deadline, per-domain
//! concurrency caps, rate-limit permits, and all cache/session bookkeeping;
//! strategies only fetch and extract.
use crate::clean::{clean, fingerprint, word_count};
use crate::error::ExtractError;
use crate::fetch::PageFetcher;
use crate::strategy::{
    ArchivalStrategy, CachedSelectorStrategy, HeuristicStrategy, Strategy, StrategyContext,
    StrategyYield, SynthesisStrategy,
};
use crate::types::{
    AttemptOutcome, ExtractionAttempt, ExtractionRequest, ExtractionResult, FinalStatus,
    StrategyKind,
};
use crate::validate::Validator;
use broadsheet_actors::actor::Addr;
use broadsheet_actors::cache::SelectorCacheActor;
use broadsheet_actors::rate::{RateKey, RateLimiter, RateMsg};
use broadsheet_actors::session::SessionActor;
use broadsheet_actors::{CacheMsg, CachedSelector, FreshSession, SessionMsg};
use broadsheet_archive::ArchiveMirror;
use broadsheet_common::SessionState;
use broadsheet_llm::traits::LlmClient;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct CascadeConfig {
    /// Default per-request budget, used by callers that build requests.
    pub request_deadline: Duration,
    /// Concurrent in-flight requests allowed per origin domain.
    pub per_domain_concurrency: usize,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            request_deadline: Duration::from_secs(90),
            per_domain_concurrency: 2,
        }
    }
}

/// Cache bookkeeping decided during the cascade, applied once it settles.
enum CacheEvent {
    Success { selector: String },
    Failure { selector: String },
}

struct CascadeRun {
    attempts: Vec<ExtractionAttempt>,
    success: Option<(StrategyKind, StrategyYield)>,
    error: Option<String>,
    cache_events: Vec<CacheEvent>,
}

pub struct Orchestrator {
    cache: Addr<SelectorCacheActor>,
    sessions: Addr<SessionActor>,
    rate: Addr<RateLimiter>,
    cached: CachedSelectorStrategy,
    heuristic: HeuristicStrategy,
    synthesis: Option<SynthesisStrategy>,
    archival: Option<ArchivalStrategy>,
    validator: Validator,
    domain_slots: DashMap<String, Arc<Semaphore>>,
    cfg: CascadeConfig,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        llm: Option<Arc<dyn LlmClient>>,
        archive: Option<Arc<dyn ArchiveMirror>>,
        cache: Addr<SelectorCacheActor>,
        sessions: Addr<SessionActor>,
        rate: Addr<RateLimiter>,
        validator: Validator,
        cfg: CascadeConfig,
    ) -> Self {
        Self {
            cache,
            sessions,
            rate,
            cached: CachedSelectorStrategy::new(fetcher.clone()),
            heuristic: HeuristicStrategy::new(fetcher.clone()),
            synthesis: llm.map(|llm| SynthesisStrategy::new(fetcher, llm)),
            archival: archive.map(ArchivalStrategy::new),
            validator,
            domain_slots: DashMap::new(),
            cfg,
        }
    }

    /// Run the full cascade for one request. Always returns a well-formed
    /// result; no strategy error ever escapes raw.
    pub async fn extract(&self, request: ExtractionRequest) -> ExtractionResult {
        let deadline = Instant::now() + request.deadline;
        info!(
            request_id = %request.id,
            url = %request.url,
            domain = %request.domain,
            "cascade.start"
        );

        let run = self.run_cascade(&request, deadline).await;

        for event in run.cache_events {
            let msg = match event {
                CacheEvent::Success { selector } => CacheMsg::RecordSuccess {
                    domain: request.domain.clone(),
                    selector,
                },
                CacheEvent::Failure { selector } => CacheMsg::RecordFailure {
                    domain: request.domain.clone(),
                    selector,
                },
            };
            if self.cache.send(msg).await.is_err() {
                warn!(domain = %request.domain, "cascade.cache_unreachable");
            }
        }

        let result = match run.success {
            Some((kind, yielded)) => {
                let cleaned = clean(&yielded.text);
                let words = word_count(&cleaned);
                ExtractionResult {
                    url: request.url.to_string(),
                    domain: request.domain.clone(),
                    final_status: FinalStatus::Success,
                    method_used: Some(kind),
                    fingerprint: Some(fingerprint(&cleaned)),
                    content: Some(cleaned),
                    word_count: words,
                    attempts: run.attempts,
                    error: None,
                }
            }
            None => ExtractionResult::failed(
                &request,
                run.attempts,
                run.error
                    .unwrap_or_else(|| "all strategies exhausted".to_string()),
            ),
        };

        info!(
            request_id = %request.id,
            domain = %request.domain,
            status = ?result.final_status,
            method = ?result.method_used,
            attempts = result.attempts.len(),
            words = result.word_count,
            "cascade.finished"
        );
        result
    }

    async fn run_cascade(&self, request: &ExtractionRequest, deadline: Instant) -> CascadeRun {
        let mut run = CascadeRun {
            attempts: Vec::new(),
            success: None,
            error: None,
            cache_events: Vec::new(),
        };

        // Per-domain concurrency cap; waiting for the slot spends deadline.
        let slot = self.domain_slot(&request.domain);
        let mut permit = match timeout_at(deadline, slot.acquire_owned()).await {
            Ok(Ok(p)) => Some(p),
            Ok(Err(_)) => None, // semaphore closed; proceed uncapped
            Err(_) => {
                run.error = Some("deadline exceeded waiting for domain slot".to_string());
                return run;
            }
        };

        let cached_entry = self.lookup_selector(&request.domain).await;
        let plan = self.build_plan(cached_entry.is_some());
        debug!(
            request_id = %request.id,
            domain = %request.domain,
            cached = cached_entry.is_some(),
            plan = ?plan,
            "cascade.plan"
        );

        'strategies: for kind in plan {
            let Some(strategy) = self.strategy_for(kind) else {
                continue;
            };
            // The mirror is a different host: release the origin slot so
            // siblings can proceed while we wait on snapshots.
            if kind == StrategyKind::Archival {
                permit.take();
            }

            let mut session: Option<SessionState> = None;
            loop {
                let authenticated = session.is_some();
                let context = StrategyContext {
                    cached_selector: cached_entry.as_ref().map(|e| e.selector.clone()),
                    session: session.clone(),
                };

                // Direct fetches respect the origin's token bucket.
                if kind != StrategyKind::Archival
                    && !self.acquire_rate(&request.domain, deadline).await
                {
                    run.error = Some("deadline exceeded waiting for rate permit".to_string());
                    break 'strategies;
                }

                debug!(
                    request_id = %request.id,
                    strategy = %kind,
                    authenticated,
                    "cascade.attempt.start"
                );
                let started_at = Utc::now();
                let attempt = timeout_at(deadline, strategy.attempt(request, &context)).await;
                let ended_at = Utc::now();

                let error = match attempt {
                    Err(_elapsed) => {
                        // In-flight strategy cancelled; terminal for the request.
                        run.attempts.push(ExtractionAttempt {
                            strategy: kind,
                            authenticated,
                            started_at,
                            ended_at,
                            outcome: AttemptOutcome::Fatal("deadline exceeded".to_string()),
                            raw_length: 0,
                        });
                        run.error = Some(ExtractError::DeadlineExceeded.to_string());
                        if kind == StrategyKind::CachedSelector {
                            self.note_cached_failure(&mut run, &cached_entry);
                        }
                        return run;
                    }
                    Ok(Ok(yielded)) => {
                        let verdict = self.validator.validate(&yielded.text);
                        if verdict == crate::validate::ValidationOutcome::Ok {
                            run.attempts.push(ExtractionAttempt {
                                strategy: kind,
                                authenticated,
                                started_at,
                                ended_at,
                                outcome: AttemptOutcome::Success,
                                raw_length: yielded.text.len(),
                            });
                            if let Some(selector) = yielded.selector.clone() {
                                // Validated success via a selector: the cache
                                // learns it (synthesis) or renews it (cached).
                                run.cache_events.push(CacheEvent::Success { selector });
                            }
                            run.success = Some((kind, yielded));
                            return run;
                        }
                        run.attempts.push(ExtractionAttempt {
                            strategy: kind,
                            authenticated,
                            started_at,
                            ended_at,
                            outcome: AttemptOutcome::ValidationFailed(verdict),
                            raw_length: yielded.text.len(),
                        });
                        ExtractError::Validation(verdict)
                    }
                    Ok(Err(err)) => {
                        let outcome = match &err {
                            ExtractError::Network(m) => AttemptOutcome::FetchError(m.clone()),
                            ExtractError::Validation(v) => AttemptOutcome::ValidationFailed(*v),
                            other => AttemptOutcome::Fatal(other.to_string()),
                        };
                        run.attempts.push(ExtractionAttempt {
                            strategy: kind,
                            authenticated,
                            started_at,
                            ended_at,
                            outcome,
                            raw_length: 0,
                        });
                        err
                    }
                };

                debug!(
                    request_id = %request.id,
                    strategy = %kind,
                    authenticated,
                    error = %error,
                    "cascade.attempt.failed"
                );
                run.error = Some(error.to_string());

                // Paywall-shaped failure on an anonymous direct fetch: retry
                // the same strategy once with (possibly renewed) credentials.
                let paywallish = matches!(
                    &error,
                    ExtractError::Validation(v) if v.suggests_paywall()
                );
                let auth_eligible = matches!(
                    kind,
                    StrategyKind::CachedSelector | StrategyKind::Heuristic
                );
                if !authenticated && paywallish && auth_eligible && request.allow_authenticated {
                    match self.ensure_fresh(&request.domain, deadline).await {
                        Some(fresh) => match fresh.state() {
                            Some(state) => {
                                if matches!(fresh, FreshSession::Stale(_)) {
                                    warn!(
                                        request_id = %request.id,
                                        domain = %request.domain,
                                        "cascade.session.stale_retry"
                                    );
                                }
                                session = Some(state.clone());
                                continue;
                            }
                            None => {
                                // Renewal failed and nothing usable remains:
                                // degrade to the next unauthenticated strategy.
                                warn!(
                                    request_id = %request.id,
                                    domain = %request.domain,
                                    "cascade.session.unavailable"
                                );
                            }
                        },
                        None => {
                            run.error =
                                Some("deadline exceeded during session renewal".to_string());
                            break 'strategies;
                        }
                    }
                }

                // Advance to the next strategy.
                if kind == StrategyKind::CachedSelector {
                    self.note_cached_failure(&mut run, &cached_entry);
                }
                break;
            }
        }

        run
    }

    /// Domain-aware ordering policy: cached selector first when one exists,
    /// heuristic otherwise; synthesis only for domains with no cached
    /// selector; archival always last.
    fn build_plan(&self, have_cached: bool) -> Vec<StrategyKind> {
        let mut plan = Vec::new();
        if have_cached {
            plan.push(StrategyKind::CachedSelector);
        }
        plan.push(StrategyKind::Heuristic);
        if !have_cached && self.synthesis.is_some() {
            plan.push(StrategyKind::Synthesis);
        }
        if self.archival.is_some() {
            plan.push(StrategyKind::Archival);
        }
        plan
    }

    fn strategy_for(&self, kind: StrategyKind) -> Option<&dyn Strategy> {
        match kind {
            StrategyKind::CachedSelector => Some(&self.cached),
            StrategyKind::Heuristic => Some(&self.heuristic),
            StrategyKind::Synthesis => self.synthesis.as_ref().map(|s| s as &dyn Strategy),
            StrategyKind::Archival => self.archival.as_ref().map(|s| s as &dyn Strategy),
        }
    }

    /// One cache failure per request, however many passes the cached
    /// strategy made.
    fn note_cached_failure(&self, run: &mut CascadeRun, cached_entry: &Option<CachedSelector>) {
        if let Some(entry) = cached_entry {
            let already = run
                .cache_events
                .iter()
                .any(|e| matches!(e, CacheEvent::Failure { .. }));
            if !already {
                run.cache_events.push(CacheEvent::Failure {
                    selector: entry.selector.clone(),
                });
            }
        }
    }

    fn domain_slot(&self, domain: &str) -> Arc<Semaphore> {
        self.domain_slots
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.cfg.per_domain_concurrency.max(1))))
            .value()
            .clone()
    }

    async fn lookup_selector(&self, domain: &str) -> Option<CachedSelector> {
        let (tx, rx) = oneshot::channel();
        self.cache
            .send(CacheMsg::Lookup {
                domain: domain.to_string(),
                reply: tx,
            })
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    async fn ensure_fresh(&self, domain: &str, deadline: Instant) -> Option<FreshSession> {
        let (tx, rx) = oneshot::channel();
        if self
            .sessions
            .send(SessionMsg::EnsureFresh {
                domain: domain.to_string(),
                reply: tx,
            })
            .await
            .is_err()
        {
            return Some(FreshSession::Unavailable {
                reason: "session manager unavailable".to_string(),
            });
        }
        match timeout_at(deadline, rx).await {
            Ok(Ok(fresh)) => Some(fresh),
            Ok(Err(_)) => Some(FreshSession::Unavailable {
                reason: "session manager dropped the reply".to_string(),
            }),
            Err(_) => None,
        }
    }

    /// Returns false only when the deadline expired while throttled.
    async fn acquire_rate(&self, domain: &str, deadline: Instant) -> bool {
        let (tx, rx) = oneshot::channel();
        if self
            .rate
            .send(RateMsg::Acquire {
                key: RateKey::domain(domain),
                cost: 1,
                reply: tx,
            })
            .await
            .is_err()
        {
            // Limiter gone during shutdown; proceed unthrottled.
            return true;
        }
        matches!(timeout_at(deadline, rx).await, Ok(Ok(_)))
    }
}

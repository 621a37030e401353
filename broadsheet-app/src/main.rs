use anyhow::{bail, Context, Result};
use broadsheet_actors::actor::spawn_actor_with_shutdown;
use broadsheet_actors::cache::{CacheConfig, SelectorCacheActor};
use broadsheet_actors::rate::RateLimiter;
use broadsheet_actors::session::{SessionActor, SessionConfig};
use broadsheet_actors::system::ActorSystem;
use broadsheet_actors::{store, CacheMsg};
use broadsheet_archive::{ArchiveMirror, HttpArchiveClient};
use broadsheet_common::observability::{init_logging, LogConfig};
use broadsheet_config::{BroadsheetConfig, BroadsheetConfigLoader};
use broadsheet_drivers::{CredentialHarvester, WebDriverHarvester};
use broadsheet_extract::{
    CascadeConfig, ExtractionRequest, HttpPageFetcher, Orchestrator, Pipeline, Validator,
};
use broadsheet_http::FetchClient;
use broadsheet_llm::ensure_llm_ready;
use clap::Parser;
use cli::Cli;
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

mod cli;

const ACTOR_MAILBOX: usize = 1024;
const CACHE_FLUSH_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1) Load config (env wins)
    let cfg = BroadsheetConfigLoader::new()
        .with_file(&cli.config)
        .load()
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    let log_path = init_logging(LogConfig {
        emit_stderr: cli.verbose,
        ..Default::default()
    })?;
    info!(log_path = %log_path.display(), "broadsheet.start");

    run(cli, cfg).await
}

async fn run(cli: Cli, cfg: BroadsheetConfig) -> Result<()> {
    let raw_urls = read_urls(&cli)?;
    if raw_urls.is_empty() {
        bail!("no URLs given; pass --url or --urls");
    }

    let pool = store::open(&cfg.state_db)
        .await
        .with_context(|| format!("opening state database {}", cfg.state_db))?;

    let mut system = ActorSystem::new();

    // Shared-state actors: selector cache, session manager, rate limiter.
    let cache_actor = SelectorCacheActor::with_store(
        pool.clone(),
        CacheConfig {
            max_entries: cfg.cache.selector_cache_max_entries,
            ttl: chrono::Duration::days(cfg.cache.selector_cache_ttl_days),
            ..Default::default()
        },
    )
    .await?;
    let cache = spawn_actor_with_shutdown(cache_actor, ACTOR_MAILBOX, Some(system.shutdown_notifier()));
    let cache_addr = cache.addr.clone();
    system.track(async move {
        cache.task.await??;
        Ok(())
    });

    let harvester: Option<Arc<dyn CredentialHarvester>> = cfg.browser.as_ref().map(|b| {
        Arc::new(WebDriverHarvester::new(
            b.webdriver_url.clone(),
            b.headless,
            b.stealth.clone(),
        )) as Arc<dyn CredentialHarvester>
    });
    if harvester.is_none() {
        info!("broadsheet.no_browser_configured");
    }
    let session_actor = SessionActor::with_store(
        pool.clone(),
        harvester,
        SessionConfig {
            renewal_threshold: chrono::Duration::days(cfg.session.session_renewal_threshold_days),
        },
    )
    .await?;
    let session = spawn_actor_with_shutdown(session_actor, ACTOR_MAILBOX, Some(system.shutdown_notifier()));
    let session_addr = session.addr.clone();
    system.track(async move {
        session.task.await??;
        Ok(())
    });

    let rate = spawn_actor_with_shutdown(
        RateLimiter::new(cfg.rate.per_domain_qps, cfg.rate.per_domain_burst),
        ACTOR_MAILBOX,
        Some(system.shutdown_notifier()),
    );
    let rate_addr = rate.addr.clone();
    system.track(async move {
        rate.task.await??;
        Ok(())
    });

    // Periodic snapshot flush keeps cache warmth across hard exits.
    let flush_addr = cache_addr.clone();
    let mut flush_shutdown = system.shutdown_notifier();
    system.track(async move {
        let mut tick = tokio::time::interval(CACHE_FLUSH_INTERVAL);
        tick.tick().await; // immediate first tick is a no-op
        loop {
            tokio::select! {
                _ = flush_shutdown.recv() => break,
                _ = tick.tick() => {
                    let _ = flush_addr.send(CacheMsg::Flush { reply: None }).await;
                }
            }
        }
        Ok(())
    });

    // Operator-requested cache invalidation (site redesigns).
    for domain in &cli.invalidate_domains {
        info!(domain = %domain, "broadsheet.invalidate_selector");
        let _ = cache_addr
            .send(CacheMsg::Invalidate {
                domain: domain.clone(),
            })
            .await;
    }

    // External capabilities.
    let llm = match &cfg.llm {
        Some(llm_cfg) => Some(ensure_llm_ready(llm_cfg).context("building LLM client")?),
        None => None,
    };
    let archive: Option<Arc<dyn ArchiveMirror>> = match &cfg.archive {
        Some(a) => Some(Arc::new(
            HttpArchiveClient::new(&a.endpoint, a.token.as_deref())
                .context("building archive client")?,
        )),
        None => None,
    };

    let fetch_client = FetchClient::new()?.with_retries(cfg.cascade.max_network_retries);
    let fetcher = Arc::new(HttpPageFetcher::new(fetch_client));

    let orchestrator = Arc::new(Orchestrator::new(
        fetcher,
        llm,
        archive,
        cache_addr.clone(),
        session_addr,
        rate_addr,
        Validator::new(cfg.validation.min_word_count),
        CascadeConfig {
            request_deadline: Duration::from_secs(cfg.cascade.request_deadline_seconds),
            per_domain_concurrency: cfg.cascade.per_domain_concurrency_limit,
        },
    ));

    // Build requests; unparseable URLs still produce a failed record.
    let deadline = Duration::from_secs(cfg.cascade.request_deadline_seconds);
    let mut requests = Vec::new();
    let mut rejects = Vec::new();
    for raw in raw_urls {
        match Url::parse(&raw)
            .ok()
            .and_then(|u| ExtractionRequest::new(u, deadline, !cli.no_auth))
        {
            Some(req) => requests.push(req),
            None => {
                warn!(url = %raw, "broadsheet.invalid_url");
                rejects.push(raw);
            }
        }
    }

    let pipeline = Pipeline::new(orchestrator, cfg.pipeline.workers);
    let results = tokio::select! {
        results = pipeline.run(requests) => results,
        _ = tokio::signal::ctrl_c() => {
            warn!("broadsheet.interrupted");
            let (tx, rx) = tokio::sync::oneshot::channel();
            if cache_addr.send(CacheMsg::Flush { reply: Some(tx) }).await.is_ok() {
                let _ = rx.await;
            }
            system.graceful_shutdown().await?;
            bail!("interrupted before the pipeline finished");
        }
    };

    // One JSON record per input URL on stdout; downstream stages re-associate
    // by URL.
    for result in &results {
        println!("{}", serde_json::to_string(result)?);
    }
    for raw in &rejects {
        println!(
            "{}",
            serde_json::json!({
                "url": raw,
                "final_status": "failed",
                "method_used": null,
                "content": null,
                "word_count": 0,
                "attempts": [],
                "error": "invalid URL",
            })
        );
    }

    // Final durable flush before teardown.
    let (tx, rx) = tokio::sync::oneshot::channel();
    if cache_addr.send(CacheMsg::Flush { reply: Some(tx) }).await.is_ok() {
        let _ = rx.await;
    }

    system.graceful_shutdown().await?;
    info!("broadsheet.finished");
    Ok(())
}

fn read_urls(cli: &Cli) -> Result<Vec<String>> {
    let mut urls: Vec<String> = cli.url.clone();
    if let Some(path) = &cli.urls {
        let lines: Vec<String> = if path.as_os_str() == "-" {
            std::io::stdin()
                .lock()
                .lines()
                .collect::<std::io::Result<_>>()?
        } else {
            std::fs::read_to_string(path)
                .with_context(|| format!("reading URL list {}", path.display()))?
                .lines()
                .map(str::to_string)
                .collect()
        };
        urls.extend(lines);
    }
    Ok(urls
        .into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty() && !u.starts_with('#'))
        .collect())
}

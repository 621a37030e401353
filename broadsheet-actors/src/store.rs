//! SQLite persistence for cache snapshots and session state.
//!
//! All writes flow through the owning actor, so the pool is opened with a
//! single connection and runtime queries; there is no cross-process schema
//! migration story here, just `CREATE TABLE IF NOT EXISTS` at open time.
use crate::CachedSelector;
use anyhow::Result;
use broadsheet_common::{CredentialItem, SessionState};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::info;

/// Open (and create if missing) the state database.
pub async fn open(url: &str) -> Result<SqlitePool> {
    let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await?;
    init_schema(&pool).await?;
    Ok(pool)
}

async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS cached_selector (
             domain TEXT PRIMARY KEY,
             selector TEXT NOT NULL,
             created_at TEXT NOT NULL,
             last_validated_at TEXT NOT NULL,
             hit_count INTEGER NOT NULL,
             consecutive_failures INTEGER NOT NULL
           )"#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS session_state (
             domain TEXT PRIMARY KEY,
             credentials TEXT NOT NULL,
             fetched_at TEXT NOT NULL,
             renewal_due_at TEXT
           )"#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS session_backup (
             domain TEXT NOT NULL,
             credentials TEXT NOT NULL,
             fetched_at TEXT NOT NULL,
             replaced_at TEXT NOT NULL
           )"#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

// ==============================
// Selector snapshots
// ==============================

pub async fn load_selectors(pool: &SqlitePool) -> Result<Vec<CachedSelector>> {
    let rows = sqlx::query(
        r#"SELECT domain, selector, created_at, last_validated_at, hit_count, consecutive_failures
           FROM cached_selector"#,
    )
    .fetch_all(pool)
    .await?;

    let selectors = rows
        .into_iter()
        .map(|r| {
            Ok(CachedSelector {
                domain: r.try_get("domain")?,
                selector: r.try_get("selector")?,
                created_at: r.try_get::<DateTime<Utc>, _>("created_at")?,
                last_validated_at: r.try_get::<DateTime<Utc>, _>("last_validated_at")?,
                hit_count: r.try_get::<i64, _>("hit_count")? as u64,
                consecutive_failures: r.try_get::<i64, _>("consecutive_failures")? as u32,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    info!(count = selectors.len(), "store.selectors_loaded");
    Ok(selectors)
}

/// Replace the snapshot wholesale; one transaction keeps load/flush races out.
pub async fn replace_selectors(pool: &SqlitePool, selectors: &[CachedSelector]) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM cached_selector")
        .execute(&mut *tx)
        .await?;
    for s in selectors {
        sqlx::query(
            r#"INSERT INTO cached_selector
               (domain, selector, created_at, last_validated_at, hit_count, consecutive_failures)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
        )
        .bind(s.domain.as_str())
        .bind(s.selector.as_str())
        .bind(s.created_at)
        .bind(s.last_validated_at)
        .bind(s.hit_count as i64)
        .bind(i64::from(s.consecutive_failures))
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    info!(count = selectors.len(), "store.selectors_flushed");
    Ok(())
}

// ==============================
// Session state
// ==============================

pub async fn load_sessions(pool: &SqlitePool) -> Result<Vec<SessionState>> {
    let rows = sqlx::query(
        r#"SELECT domain, credentials, fetched_at, renewal_due_at FROM session_state"#,
    )
    .fetch_all(pool)
    .await?;

    let sessions = rows
        .into_iter()
        .map(|r| {
            let credentials: Vec<CredentialItem> =
                serde_json::from_str(r.try_get::<String, _>("credentials")?.as_str())?;
            Ok(SessionState {
                domain: r.try_get("domain")?,
                credentials,
                fetched_at: r.try_get::<DateTime<Utc>, _>("fetched_at")?,
                renewal_due_at: r.try_get::<Option<DateTime<Utc>>, _>("renewal_due_at")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    info!(count = sessions.len(), "store.sessions_loaded");
    Ok(sessions)
}

/// Persist a renewed session: the previous credential set is copied into the
/// backup table before the active row is overwritten, inside one transaction.
/// On any failure the transaction rolls back and the previous active state
/// (and every earlier backup) survives untouched.
pub async fn backup_then_replace_session(
    pool: &SqlitePool,
    previous: Option<&SessionState>,
    next: &SessionState,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    if let Some(prev) = previous {
        sqlx::query(
            r#"INSERT INTO session_backup (domain, credentials, fetched_at, replaced_at)
               VALUES (?1, ?2, ?3, ?4)"#,
        )
        .bind(prev.domain.as_str())
        .bind(serde_json::to_string(&prev.credentials)?)
        .bind(prev.fetched_at)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        r#"INSERT INTO session_state (domain, credentials, fetched_at, renewal_due_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(domain) DO UPDATE SET
             credentials=excluded.credentials,
             fetched_at=excluded.fetched_at,
             renewal_due_at=excluded.renewal_due_at"#,
    )
    .bind(next.domain.as_str())
    .bind(serde_json::to_string(&next.credentials)?)
    .bind(next.fetched_at)
    .bind(next.renewal_due_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(domain = %next.domain, "store.session_replaced");
    Ok(())
}

pub async fn backup_count(pool: &SqlitePool, domain: &str) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM session_backup WHERE domain = ?1")
        .bind(domain)
        .fetch_one(pool)
        .await?;
    Ok(row.try_get("n")?)
}

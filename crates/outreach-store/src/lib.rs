//! # Outreach Store
//!
//! SQLite implementation of [`OutreachStore`]. Timestamps are stored as
//! RFC 3339 UTC text with fixed millisecond precision, so `<` on the column
//! orders the same way as on the instant.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use outreach_core::traits::store::MAX_LEAD_IDS_PER_LOOKUP;
use outreach_core::{
    Candidate, JobStatus, JobStatusRecord, LeadTask, OutreachError, OutreachStore, Result, Site,
};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

/// SQLite-backed store. Queries run on tokio's blocking pool, so a caller's
/// timeout fires even while SQLite waits on a lock.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the outreach database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| db_err("open", e))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| db_err("pragma", e))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| db_err("open", e))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS sites (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                channels_json TEXT NOT NULL DEFAULT 'null'
            );

            CREATE TABLE IF NOT EXISTS leads (
                id TEXT PRIMARY KEY,
                site_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'new',
                company_id TEXT,
                company_name TEXT,
                assignee_id TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_leads_site_status
                ON leads (site_id, status, created_at, id);

            CREATE TABLE IF NOT EXISTS lead_tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                site_id TEXT NOT NULL,
                lead_id TEXT NOT NULL,
                stage TEXT NOT NULL,
                status TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_lead_tasks_lookup
                ON lead_tasks (site_id, stage, lead_id);

            CREATE TABLE IF NOT EXISTS job_status (
                site_id TEXT NOT NULL,
                job_type TEXT NOT NULL,
                status TEXT NOT NULL,
                last_run TEXT,
                next_run TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                PRIMARY KEY (site_id, job_type)
            );
            ",
            )
            .map_err(|e| db_err("migration", e))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        lock(&self.conn)
    }

    /// Run `op` against the connection on the blocking pool.
    async fn blocking<T, F>(&self, context: &'static str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = lock(&conn)?;
            op(&guard).map_err(|e| db_err(context, e))
        })
        .await
        .map_err(|e| OutreachError::store(format!("{context}: blocking task failed: {e}")))?
    }

    // ── Seeding (CLI import, tests) ──────────────────────────

    pub fn insert_site(&self, site: &Site) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO sites (id, name, active, channels_json) VALUES (?1, ?2, ?3, ?4)",
                params![site.id, site.name, site.active as i32, site.channels.to_string()],
            )
            .map_err(|e| db_err("insert site", e))?;
        Ok(())
    }

    pub fn insert_candidate(&self, c: &Candidate) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO leads
                 (id, site_id, created_at, status, company_id, company_name, assignee_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    c.id,
                    c.site_id,
                    ts(c.created_at),
                    c.status,
                    c.company_id,
                    c.company_name,
                    c.assignee_id,
                ],
            )
            .map_err(|e| db_err("insert lead", e))?;
        Ok(())
    }

    pub fn insert_task(&self, site_id: &str, lead_id: &str, stage: &str, status: &str) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO lead_tasks (site_id, lead_id, stage, status) VALUES (?1, ?2, ?3, ?4)",
                params![site_id, lead_id, stage, status],
            )
            .map_err(|e| db_err("insert task", e))?;
        Ok(())
    }
}

#[async_trait]
impl OutreachStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn list_sites(&self) -> Result<Vec<Site>> {
        self.blocking("list sites", |conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, active, channels_json FROM sites ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                let id: String = row.get(0)?;
                let raw: String = row.get(3)?;
                let channels = serde_json::from_str(&raw).unwrap_or_else(|e| {
                    tracing::warn!("⚠️ Site {id}: unreadable channels_json ({e})");
                    serde_json::Value::Null
                });
                Ok(Site {
                    name: row.get(1)?,
                    active: row.get::<_, i32>(2)? != 0,
                    channels,
                    id,
                })
            })?;
            rows.collect()
        })
        .await
    }

    async fn count_candidates(
        &self,
        site_id: &str,
        status: &str,
        created_before: DateTime<Utc>,
    ) -> Result<u64> {
        let (site_id, status) = (site_id.to_string(), status.to_string());
        let count: i64 = self
            .blocking("count leads", move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM leads WHERE site_id = ?1 AND status = ?2 AND created_at < ?3",
                    params![site_id, status, ts(created_before)],
                    |row| row.get(0),
                )
            })
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn fetch_candidates_page(
        &self,
        site_id: &str,
        status: &str,
        created_before: DateTime<Utc>,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<Candidate>> {
        let (site_id, status) = (site_id.to_string(), status.to_string());
        self.blocking("fetch leads", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, site_id, created_at, status, company_id, company_name, assignee_id
                 FROM leads
                 WHERE site_id = ?1 AND status = ?2 AND created_at < ?3
                 ORDER BY created_at ASC, id ASC
                 LIMIT ?4 OFFSET ?5",
            )?;
            let rows = stmt.query_map(
                params![site_id, status, ts(created_before), limit, offset as i64],
                |row| {
                    Ok(Candidate {
                        id: row.get(0)?,
                        site_id: row.get(1)?,
                        created_at: parse_ts(row, 2)?,
                        status: row.get(3)?,
                        company_id: row.get(4)?,
                        company_name: row.get(5)?,
                        assignee_id: row.get(6)?,
                    })
                },
            )?;
            rows.collect()
        })
        .await
    }

    async fn fetch_tasks_by_lead_ids(
        &self,
        site_id: &str,
        stage: &str,
        lead_ids: &[String],
    ) -> Result<Vec<LeadTask>> {
        if lead_ids.len() > MAX_LEAD_IDS_PER_LOOKUP {
            return Err(OutreachError::invalid(format!(
                "{} lead ids exceed the lookup limit of {MAX_LEAD_IDS_PER_LOOKUP}",
                lead_ids.len()
            )));
        }
        if lead_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (0..lead_ids.len())
            .map(|i| format!("?{}", i + 3))
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            "SELECT lead_id, status FROM lead_tasks
             WHERE site_id = ?1 AND stage = ?2 AND lead_id IN ({placeholders})"
        );
        let mut values = Vec::with_capacity(lead_ids.len() + 2);
        values.push(site_id.to_string());
        values.push(stage.to_string());
        values.extend(lead_ids.iter().cloned());

        self.blocking("fetch tasks", move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), |row| {
                Ok(LeadTask {
                    lead_id: row.get(0)?,
                    status: row.get(1)?,
                })
            })?;
            rows.collect()
        })
        .await
    }

    async fn get_job_status(
        &self,
        site_id: &str,
        job_type: &str,
    ) -> Result<Option<JobStatusRecord>> {
        let (site_id, job_type) = (site_id.to_string(), job_type.to_string());
        self.blocking("get job status", move |conn| {
            conn.query_row(
                "SELECT site_id, job_type, status, last_run, next_run, retry_count, created_at
                 FROM job_status WHERE site_id = ?1 AND job_type = ?2",
                params![site_id, job_type],
                |row| {
                    Ok(JobStatusRecord {
                        site_id: row.get(0)?,
                        job_type: row.get(1)?,
                        status: JobStatus::parse(&row.get::<_, String>(2)?),
                        last_run: parse_opt_ts(row, 3)?,
                        next_run: parse_opt_ts(row, 4)?,
                        retry_count: row.get(5)?,
                        created_at: parse_ts(row, 6)?,
                    })
                },
            )
            .optional()
        })
        .await
    }

    async fn upsert_job_status(&self, record: &JobStatusRecord) -> Result<()> {
        let record = record.clone();
        self.blocking("upsert job status", move |conn| {
            conn.execute(
                "INSERT INTO job_status
                 (site_id, job_type, status, last_run, next_run, retry_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(site_id, job_type) DO UPDATE SET
                    status = excluded.status,
                    last_run = excluded.last_run,
                    next_run = excluded.next_run,
                    retry_count = excluded.retry_count",
                params![
                    record.site_id,
                    record.job_type,
                    record.status.as_str(),
                    record.last_run.map(ts),
                    record.next_run.map(ts),
                    record.retry_count,
                    ts(record.created_at),
                ],
            )
        })
        .await?;
        Ok(())
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| OutreachError::store(format!("connection lock poisoned: {e}")))
}

fn db_err(context: &str, e: rusqlite::Error) -> OutreachError {
    OutreachError::store(format!("{context}: {e}"))
}

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_opt_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(_) => parse_ts(row, idx).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn base() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00.000Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn seeded() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        for i in 0..5 {
            store
                .insert_candidate(&Candidate::new(
                    &format!("l{i}"),
                    "s1",
                    base() - Duration::days(3) + Duration::minutes(i),
                ))
                .unwrap();
        }
        // same instant as l0, sorts after it by id
        store
            .insert_candidate(&Candidate::new("l0b", "s1", base() - Duration::days(3)))
            .unwrap();
        store
            .insert_candidate(&Candidate::new("young", "s1", base() - Duration::hours(1)))
            .unwrap();
        store
            .insert_candidate(&Candidate::new("other", "s2", base() - Duration::days(3)))
            .unwrap();
        store
            .insert_candidate(
                &Candidate::new("won", "s1", base() - Duration::days(5)).with_status("converted"),
            )
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_count_and_page() {
        let store = seeded();
        let cutoff = base() - Duration::hours(48);
        assert_eq!(store.count_candidates("s1", "new", cutoff).await.unwrap(), 6);

        let page = store
            .fetch_candidates_page("s1", "new", cutoff, 0, 3)
            .await
            .unwrap();
        let ids: Vec<_> = page.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["l0", "l0b", "l1"]);

        let page = store
            .fetch_candidates_page("s1", "new", cutoff, 3, 3)
            .await
            .unwrap();
        let ids: Vec<_> = page.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["l2", "l3", "l4"]);
        assert_eq!(page[0].created_at, base() - Duration::days(3) + Duration::minutes(2));
    }

    #[tokio::test]
    async fn test_task_lookup() {
        let store = seeded();
        store.insert_task("s1", "l1", "awareness", "completed").unwrap();
        store.insert_task("s1", "l2", "awareness", "pending").unwrap();
        store.insert_task("s1", "l3", "consideration", "completed").unwrap();
        store.insert_task("s2", "l1", "awareness", "completed").unwrap();

        let ids: Vec<String> = ["l1", "l2", "l3"].iter().map(|s| s.to_string()).collect();
        let mut tasks = store
            .fetch_tasks_by_lead_ids("s1", "awareness", &ids)
            .await
            .unwrap();
        tasks.sort_by(|a, b| a.lead_id.cmp(&b.lead_id));
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].status, "completed");
        assert_eq!(tasks[1].status, "pending");

        let too_many: Vec<String> = (0..101).map(|i| format!("x{i}")).collect();
        assert!(matches!(
            store.fetch_tasks_by_lead_ids("s1", "awareness", &too_many).await,
            Err(OutreachError::InvalidInput(_))
        ));
        assert!(
            store
                .fetch_tasks_by_lead_ids("s1", "awareness", &[])
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_job_status_upsert() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get_job_status("s1", "email_sync").await.unwrap().is_none());

        let mut rec = JobStatusRecord::new("s1", "email_sync", JobStatus::Running, base());
        rec.last_run = Some(base() + Duration::minutes(1));
        store.upsert_job_status(&rec).await.unwrap();

        rec.status = JobStatus::Failed;
        rec.retry_count = 2;
        rec.created_at = base() + Duration::days(1);
        store.upsert_job_status(&rec).await.unwrap();

        let got = store.get_job_status("s1", "email_sync").await.unwrap().unwrap();
        assert_eq!(got.status, JobStatus::Failed);
        assert_eq!(got.retry_count, 2);
        assert_eq!(got.last_run, Some(base() + Duration::minutes(1)));
        assert_eq!(got.next_run, None);
        // creation time is set once
        assert_eq!(got.created_at, base());
    }

    #[tokio::test]
    async fn test_unknown_status_survives() {
        let store = SqliteStore::open_in_memory().unwrap();
        let rec = JobStatusRecord::new("s1", "x", JobStatus::Unknown("PAUSED".into()), base());
        store.upsert_job_status(&rec).await.unwrap();
        let got = store.get_job_status("s1", "x").await.unwrap().unwrap();
        assert_eq!(got.status, JobStatus::Unknown("PAUSED".into()));
    }

    #[tokio::test]
    async fn test_sites_round_trip_channels() {
        let store = SqliteStore::open_in_memory().unwrap();
        let channels = json!({"email": {"from_address": "a@b.co"}});
        store
            .insert_site(&Site::new("s1", "Acme").with_channels(channels.clone()))
            .unwrap();
        let mut off = Site::new("s2", "Dormant");
        off.active = false;
        store.insert_site(&off).unwrap();

        let sites = store.list_sites().await.unwrap();
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].channels, channels);
        assert!(outreach_core::has_valid_channel(&sites[0].channels));
        assert!(!sites[1].active);
    }

    #[tokio::test]
    async fn test_locked_database_honours_caller_timeout() {
        let dir = std::env::temp_dir().join(format!("outreach-lock-{}", std::process::id()));
        let path = dir.join("outreach.db");
        let store = SqliteStore::open(&path).unwrap();

        let locker = Connection::open(&path).unwrap();
        locker.execute_batch("BEGIN EXCLUSIVE").unwrap();

        let rec = JobStatusRecord::new("s1", "email_sync", JobStatus::Running, base());
        let started = std::time::Instant::now();
        let result = outreach_core::timed(
            "upsert_job_status",
            std::time::Duration::from_millis(50),
            store.upsert_job_status(&rec),
        )
        .await;
        assert!(matches!(result, Err(OutreachError::Timeout { .. })), "{result:?}");
        assert!(started.elapsed() < std::time::Duration::from_secs(2));

        // the abandoned write completes once the lock is released
        locker.execute_batch("COMMIT").unwrap();
        drop(locker);
        let got = store.get_job_status("s1", "email_sync").await.unwrap();
        assert!(got.is_some());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_open_file_creates_schema() {
        let dir = std::env::temp_dir().join(format!("outreach-store-{}", std::process::id()));
        let path = dir.join("outreach.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_site(&Site::new("s1", "Acme")).unwrap();
        }
        // reopening runs the idempotent migration again
        assert!(SqliteStore::open(&path).is_ok());
        let _ = std::fs::remove_dir_all(&dir);
    }
}

//! SQLite run store implementation
//!
//! This module provides a SQLite-based implementation of the RunStore trait.

use crate::state::JobStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{RunStore, StoreError, StoreResult};
use crate::storage::{JobKind, JobRecord, LinkRecord, NewPage, NewRun, PageRecord};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

const RUN_COLUMNS: &str = "id, kind, query, config, status, max_depth, pages_crawled, pages_total,
     error_message, created_at, updated_at, completed_at";

const PAGE_COLUMNS: &str =
    "id, run_id, url, title, crawl_depth, content_text, content_html, metadata, scraped_at";

/// SQLite run store
///
/// A single connection behind a mutex; every call holds the lock for one
/// short statement or transaction.
pub struct SqliteRunStore {
    conn: Mutex<Connection>,
}

impl SqliteRunStore {
    /// Opens or creates a run store database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteRunStore)` - Successfully opened/created database
    /// * `Err(StoreError)` - Failed to open database
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn parse_timestamp(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("bad timestamp {:?}: {}", value, e)))
}

fn count_from_db(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn count_to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    let kind: String = row.get(1)?;
    let kind = JobKind::from_db_string(&kind)
        .ok_or_else(|| conversion_error(1, format!("unknown job kind {:?}", kind)))?;

    let config = row
        .get::<_, Option<String>>(3)?
        .map(|raw| serde_json::from_str::<Value>(&raw))
        .transpose()
        .map_err(|e| conversion_error(3, e.to_string()))?;

    let status: String = row.get(4)?;
    let status = JobStatus::from_db_string(&status)
        .ok_or_else(|| conversion_error(4, format!("unknown job status {:?}", status)))?;

    Ok(JobRecord {
        id: row.get(0)?,
        kind,
        query: row.get(2)?,
        config,
        status,
        max_depth: row.get(5)?,
        pages_crawled: count_from_db(row.get(6)?),
        pages_total: count_from_db(row.get(7)?),
        error_message: row.get(8)?,
        created_at: parse_timestamp(9, row.get(9)?)?,
        updated_at: parse_timestamp(10, row.get(10)?)?,
        completed_at: row
            .get::<_, Option<String>>(11)?
            .map(|ts| parse_timestamp(11, ts))
            .transpose()?,
    })
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<PageRecord> {
    let metadata: String = row.get(7)?;
    let metadata = serde_json::from_str::<Map<String, Value>>(&metadata)
        .map_err(|e| conversion_error(7, e.to_string()))?;

    Ok(PageRecord {
        id: row.get(0)?,
        run_id: row.get(1)?,
        url: row.get(2)?,
        title: row.get(3)?,
        crawl_depth: row.get(4)?,
        content_text: row.get(5)?,
        content_html: row.get(6)?,
        metadata,
        scraped_at: parse_timestamp(8, row.get(8)?)?,
    })
}

fn fetch_run(conn: &Connection, run_id: i64) -> StoreResult<JobRecord> {
    conn.query_row(
        &format!("SELECT {} FROM job_runs WHERE id = ?1", RUN_COLUMNS),
        params![run_id],
        run_from_row,
    )
    .optional()?
    .ok_or(StoreError::RunNotFound(run_id))
}

/// Applies a checked status change while the caller holds the connection lock
fn write_status(
    conn: &Connection,
    run_id: i64,
    to: JobStatus,
    error_message: Option<&str>,
) -> StoreResult<JobRecord> {
    let current = fetch_run(conn, run_id)?;

    if current.status == to {
        return Ok(current);
    }

    if !current.status.can_transition_to(to) {
        return Err(StoreError::InvalidTransition {
            run_id,
            from: current.status,
            to,
        });
    }

    let now = Utc::now().to_rfc3339();
    let completed_at = if to.is_terminal() {
        Some(now.clone())
    } else {
        None
    };

    conn.execute(
        "UPDATE job_runs
         SET status = ?1, updated_at = ?2, completed_at = COALESCE(?3, completed_at),
             error_message = COALESCE(?4, error_message)
         WHERE id = ?5",
        params![to.to_db_string(), now, completed_at, error_message, run_id],
    )?;

    fetch_run(conn, run_id)
}

impl RunStore for SqliteRunStore {
    // ===== Run Management =====

    fn create_run(&self, run: &NewRun) -> StoreResult<i64> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let config = run.config.as_ref().map(serde_json::to_string).transpose()?;

        conn.execute(
            "INSERT INTO job_runs (kind, query, config, status, max_depth, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                run.kind.to_db_string(),
                run.query,
                config,
                JobStatus::Pending.to_db_string(),
                run.max_depth,
                now
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StoreResult<JobRecord> {
        fetch_run(&self.conn(), run_id)
    }

    fn list_runs(&self) -> StoreResult<Vec<JobRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {} FROM job_runs ORDER BY id", RUN_COLUMNS))?;
        let runs = stmt
            .query_map([], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    fn list_runs_by_status(&self, status: JobStatus) -> StoreResult<Vec<JobRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM job_runs WHERE status = ?1 ORDER BY id",
            RUN_COLUMNS
        ))?;
        let runs = stmt
            .query_map(params![status.to_db_string()], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    fn transition(&self, run_id: i64, to: JobStatus) -> StoreResult<JobRecord> {
        write_status(&self.conn(), run_id, to, None)
    }

    fn fail_run(&self, run_id: i64, error_message: &str) -> StoreResult<JobRecord> {
        write_status(&self.conn(), run_id, JobStatus::Failed, Some(error_message))
    }

    fn set_pages_crawled(&self, run_id: i64, pages: u64) -> StoreResult<()> {
        let changed = self.conn().execute(
            "UPDATE job_runs SET pages_crawled = ?1, updated_at = ?2 WHERE id = ?3",
            params![count_to_db(pages), Utc::now().to_rfc3339(), run_id],
        )?;
        if changed == 0 {
            return Err(StoreError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn set_pages_total(&self, run_id: i64, pages: u64) -> StoreResult<()> {
        let changed = self.conn().execute(
            "UPDATE job_runs SET pages_total = ?1, updated_at = ?2 WHERE id = ?3",
            params![count_to_db(pages), Utc::now().to_rfc3339(), run_id],
        )?;
        if changed == 0 {
            return Err(StoreError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn delete_run(&self, run_id: i64) -> StoreResult<()> {
        let changed = self
            .conn()
            .execute("DELETE FROM job_runs WHERE id = ?1", params![run_id])?;
        if changed == 0 {
            return Err(StoreError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Page Management =====

    fn insert_page(&self, run_id: i64, page: &NewPage) -> StoreResult<i64> {
        let mut conn = self.conn();
        let metadata = serde_json::to_string(&page.metadata)?;
        let tx = conn.transaction()?;

        let exists: Option<i64> = tx
            .query_row("SELECT id FROM job_runs WHERE id = ?1", params![run_id], |row| {
                row.get(0)
            })
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::RunNotFound(run_id));
        }

        tx.execute(
            "INSERT INTO scraped_pages
             (run_id, url, title, crawl_depth, content_text, content_html, metadata, scraped_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run_id,
                page.url,
                page.title,
                page.crawl_depth,
                page.content_text,
                page.content_html,
                metadata,
                Utc::now().to_rfc3339()
            ],
        )?;
        let page_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO page_links (source_page_id, target_url, anchor_text, is_internal)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for link in &page.links {
                stmt.execute(params![
                    page_id,
                    link.target_url,
                    link.anchor_text,
                    link.is_internal
                ])?;
            }
        }

        tx.commit()?;
        Ok(page_id)
    }

    fn count_pages(&self, run_id: i64) -> StoreResult<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM scraped_pages WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count_from_db(count))
    }

    fn list_pages(&self, run_id: i64) -> StoreResult<Vec<PageRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM scraped_pages WHERE run_id = ?1 ORDER BY id",
            PAGE_COLUMNS
        ))?;
        let pages = stmt
            .query_map(params![run_id], page_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pages)
    }

    // ===== Link Management =====

    fn list_links(&self, page_id: i64) -> StoreResult<Vec<LinkRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT source_page_id, target_url, anchor_text, is_internal
             FROM page_links WHERE source_page_id = ?1 ORDER BY id",
        )?;
        let links = stmt
            .query_map(params![page_id], |row| {
                Ok(LinkRecord {
                    source_page_id: row.get(0)?,
                    target_url: row.get(1)?,
                    anchor_text: row.get(2)?,
                    is_internal: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    fn count_links(&self, run_id: i64) -> StoreResult<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM page_links l
             JOIN scraped_pages p ON p.id = l.source_page_id
             WHERE p.run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count_from_db(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NewLink;

    fn store() -> SqliteRunStore {
        SqliteRunStore::open_in_memory().unwrap()
    }

    fn page(url: &str, depth: u32) -> NewPage {
        NewPage {
            url: url.to_string(),
            title: Some("Title".to_string()),
            crawl_depth: depth,
            content_text: "text".to_string(),
            ..NewPage::default()
        }
    }

    #[test]
    fn test_create_and_get_run() {
        let store = store();
        let id = store
            .create_run(&NewRun::basic_crawl("rust crawlers", 2))
            .unwrap();

        let run = store.get_run(id).unwrap();
        assert_eq!(run.kind, JobKind::BasicCrawl);
        assert_eq!(run.query, "rust crawlers");
        assert_eq!(run.status, JobStatus::Pending);
        assert_eq!(run.max_depth, 2);
        assert_eq!(run.pages_crawled, 0);
        assert!(run.config.is_none());
        assert!(run.completed_at.is_none());
    }

    #[test]
    fn test_get_missing_run() {
        assert!(matches!(store().get_run(42), Err(StoreError::RunNotFound(42))));
    }

    #[test]
    fn test_config_payload_roundtrip() {
        let store = store();
        let run = NewRun {
            kind: JobKind::ConfiguredCrawl,
            query: "q".to_string(),
            config: Some(serde_json::json!({"start_urls": ["https://a.com/"], "max_pages": 3})),
            max_depth: 1,
        };
        let id = store.create_run(&run).unwrap();
        assert_eq!(store.get_run(id).unwrap().config, run.config);
    }

    #[test]
    fn test_status_lifecycle() {
        let store = store();
        let id = store.create_run(&NewRun::basic_crawl("q", 1)).unwrap();

        assert_eq!(store.transition(id, JobStatus::Running).unwrap().status, JobStatus::Running);
        assert_eq!(store.transition(id, JobStatus::Paused).unwrap().status, JobStatus::Paused);
        assert_eq!(store.transition(id, JobStatus::Running).unwrap().status, JobStatus::Running);

        let done = store.transition(id, JobStatus::Completed).unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn test_terminal_status_is_final() {
        let store = store();
        let id = store.create_run(&NewRun::basic_crawl("q", 1)).unwrap();
        store.transition(id, JobStatus::Stopped).unwrap();

        let result = store.transition(id, JobStatus::Running);
        assert!(matches!(
            result,
            Err(StoreError::InvalidTransition {
                from: JobStatus::Stopped,
                to: JobStatus::Running,
                ..
            })
        ));
        assert!(store.fail_run(id, "late failure").is_err());

        // Same-status writes are no-ops
        assert_eq!(store.transition(id, JobStatus::Stopped).unwrap().status, JobStatus::Stopped);
    }

    #[test]
    fn test_fail_run_records_message() {
        let store = store();
        let id = store.create_run(&NewRun::basic_crawl("q", 1)).unwrap();
        store.transition(id, JobStatus::Running).unwrap();

        let failed = store.fail_run(id, "search provider unreachable").unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("search provider unreachable"));
    }

    #[test]
    fn test_list_runs_by_status() {
        let store = store();
        let a = store.create_run(&NewRun::basic_crawl("a", 1)).unwrap();
        let b = store.create_run(&NewRun::basic_crawl("b", 1)).unwrap();
        let c = store.create_run(&NewRun::basic_crawl("c", 1)).unwrap();
        store.transition(b, JobStatus::Running).unwrap();

        let pending: Vec<i64> = store
            .list_runs_by_status(JobStatus::Pending)
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(pending, vec![a, c]);
        assert_eq!(store.list_runs().unwrap().len(), 3);
    }

    #[test]
    fn test_pages_and_links() {
        let store = store();
        let id = store.create_run(&NewRun::basic_crawl("q", 1)).unwrap();

        let mut first = page("https://a.com/", 0);
        first.metadata.insert("word_count".to_string(), Value::from(12));
        first.links = vec![
            NewLink {
                target_url: "https://a.com/b".to_string(),
                anchor_text: "B".to_string(),
                is_internal: true,
            },
            NewLink {
                target_url: "https://c.com/".to_string(),
                anchor_text: "C".to_string(),
                is_internal: false,
            },
        ];
        let page_id = store.insert_page(id, &first).unwrap();
        store.insert_page(id, &page("https://a.com/b", 1)).unwrap();

        assert_eq!(store.count_pages(id).unwrap(), 2);
        assert_eq!(store.count_links(id).unwrap(), 2);

        let pages = store.list_pages(id).unwrap();
        assert_eq!(pages[0].url, "https://a.com/");
        assert_eq!(pages[0].metadata["word_count"], 12);
        assert_eq!(pages[1].crawl_depth, 1);

        let links = store.list_links(page_id).unwrap();
        assert_eq!(links.len(), 2);
        assert!(links[0].is_internal);
        assert_eq!(links[1].target_url, "https://c.com/");
    }

    #[test]
    fn test_insert_page_for_missing_run() {
        let result = store().insert_page(9, &page("https://a.com/", 0));
        assert!(matches!(result, Err(StoreError::RunNotFound(9))));
    }

    #[test]
    fn test_delete_run_cascades() {
        let store = store();
        let id = store.create_run(&NewRun::basic_crawl("q", 1)).unwrap();
        store.insert_page(id, &page("https://a.com/", 0)).unwrap();

        store.delete_run(id).unwrap();
        assert!(store.get_run(id).is_err());
        assert_eq!(store.count_pages(id).unwrap(), 0);
    }

    #[test]
    fn test_page_counters() {
        let store = store();
        let id = store.create_run(&NewRun::basic_crawl("q", 1)).unwrap();
        store.set_pages_crawled(id, 4).unwrap();
        store.set_pages_total(id, 9).unwrap();

        let run = store.get_run(id).unwrap();
        assert_eq!(run.pages_crawled, 4);
        assert_eq!(run.pages_total, 9);
        assert!(store.set_pages_crawled(99, 1).is_err());
    }

    #[test]
    fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.db");

        let id = {
            let store = SqliteRunStore::open(&path).unwrap();
            store.create_run(&NewRun::basic_crawl("q", 1)).unwrap()
        };

        let reopened = SqliteRunStore::open(&path).unwrap();
        assert_eq!(reopened.get_run(id).unwrap().query, "q");
    }
}

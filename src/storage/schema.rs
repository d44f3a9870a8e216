//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the WebIntel run store.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track job runs
CREATE TABLE IF NOT EXISTS job_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    query TEXT NOT NULL,
    config TEXT,
    status TEXT NOT NULL,
    max_depth INTEGER NOT NULL DEFAULT 0,
    pages_crawled INTEGER NOT NULL DEFAULT 0,
    pages_total INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_job_runs_status ON job_runs(status);
CREATE INDEX IF NOT EXISTS idx_job_runs_kind ON job_runs(kind);

-- Pages scraped by a run
CREATE TABLE IF NOT EXISTS scraped_pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES job_runs(id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    title TEXT,
    crawl_depth INTEGER NOT NULL DEFAULT 0,
    content_text TEXT NOT NULL DEFAULT '',
    content_html TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    scraped_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_scraped_pages_run ON scraped_pages(run_id);
CREATE INDEX IF NOT EXISTS idx_scraped_pages_url ON scraped_pages(url);

-- Outgoing links of scraped pages
CREATE TABLE IF NOT EXISTS page_links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_page_id INTEGER NOT NULL REFERENCES scraped_pages(id) ON DELETE CASCADE,
    target_url TEXT NOT NULL,
    anchor_text TEXT NOT NULL DEFAULT '',
    is_internal INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_page_links_source ON page_links(source_page_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

//! Schema creation for the scouting tables.
//!
//! All CREATE TABLE statements live here.

use crate::error::{Result, StoreError};
use sqlx::SqliteConnection;

const SCHEMA: &[&str] = &[
    // Item catalog: owned by operators, read by aggregation
    r#"CREATE TABLE IF NOT EXISTS items (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        datatype TEXT NOT NULL,
        active INTEGER NOT NULL DEFAULT 1
    )"#,
    // Reports: one row per form header
    r#"CREATE TABLE IF NOT EXISTS reports (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        form_type INTEGER NOT NULL,
        tablet_num INTEGER NOT NULL,
        flag INTEGER,
        scout_name TEXT NOT NULL,
        team_num INTEGER NOT NULL,
        match_num INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_reports_team_type ON reports(team_num, form_type)",
    // Records: item values, not checked against the catalog
    r#"CREATE TABLE IF NOT EXISTS records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        report_id INTEGER NOT NULL REFERENCES reports(id),
        item_id INTEGER NOT NULL,
        value TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_records_report ON records(report_id)",
    "CREATE INDEX IF NOT EXISTS idx_records_item ON records(item_id)",
];

/// Ensure all tables exist.
pub(crate) async fn ensure_schema(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("PRAGMA journal_mode=WAL")
        .execute(&mut *conn)
        .await
        .map_err(|e| StoreError::operation("schema", e))?;

    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(&mut *conn)
            .await
            .map_err(|e| StoreError::operation("schema", e))?;
    }

    tracing::debug!("Store schema verified");
    Ok(())
}

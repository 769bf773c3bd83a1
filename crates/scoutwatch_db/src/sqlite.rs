//! SQLite backend.
//!
//! Each [`SqliteSession`] owns exactly one `SqliteConnection`; there is no
//! pool, so closing the session closes the connection.

use crate::error::{Result, StoreError};
use crate::schema;
use crate::types::*;
use crate::{StoreConnector, StoreSession};
use chrono::{DateTime, Utc};
use scoutwatch_protocol::{Form, FormType};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{ConnectOptions, Connection, Row};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Connector for a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    options: SqliteConnectOptions,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    ///
    /// Creates all tables if they don't exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let mut conn = options.connect().await.map_err(StoreError::unavailable)?;
        schema::ensure_schema(&mut conn).await?;
        conn.close()
            .await
            .map_err(|e| StoreError::operation("close", e))?;

        info!(path = %path.display(), "Store opened");

        Ok(Self {
            path: path.to_path_buf(),
            options,
        })
    }

    /// Connector for an existing store. Nothing is touched until
    /// [`StoreConnector::connect`]; a missing file makes every connect fail.
    pub fn existing(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(false)
            .foreign_keys(true);
        Self {
            path: path.to_path_buf(),
            options,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or update a catalog item.
    pub async fn upsert_item(&self, item: &Item) -> Result<()> {
        let mut session = self.connect().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO items (id, name, datatype, active)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                datatype = excluded.datatype,
                active = excluded.active
            "#,
        )
        .bind(item.id)
        .bind(&item.name)
        .bind(item.datatype.as_str())
        .bind(item.active)
        .execute(&mut session.conn)
        .await
        .map_err(|e| StoreError::operation("upsert_item", e));

        session.close().await?;
        result.map(|_| ())
    }
}

impl StoreConnector for SqliteStore {
    type Session = SqliteSession;

    async fn connect(&self) -> Result<SqliteSession> {
        let conn = self
            .options
            .connect()
            .await
            .map_err(StoreError::unavailable)?;
        Ok(SqliteSession { conn })
    }
}

/// One open SQLite connection.
pub struct SqliteSession {
    conn: SqliteConnection,
}

impl StoreSession for SqliteSession {
    async fn insert_report(&mut self, form: &Form) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO reports (form_type, tablet_num, flag, scout_name, team_num, match_num, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(i64::from(form.form_type.ordinal()))
        .bind(form.tablet_num)
        .bind(form.flag)
        .bind(&form.scout_name)
        .bind(form.team_num)
        .bind(form.match_num)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut self.conn)
        .await
        .map_err(|e| StoreError::operation("insert_report", e))?;

        Ok(result.last_insert_rowid())
    }

    async fn insert_record(&mut self, value: &str, form_id: i64, item_id: i32) -> Result<()> {
        sqlx::query("INSERT INTO records (report_id, item_id, value) VALUES (?, ?, ?)")
            .bind(form_id)
            .bind(item_id)
            .bind(value)
            .execute(&mut self.conn)
            .await
            .map_err(|e| StoreError::operation("insert_record", e))?;
        Ok(())
    }

    async fn query_headers_by_team_and_type(
        &mut self,
        team_num: i32,
        form_type: FormType,
    ) -> Result<Vec<HeaderRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, form_type, tablet_num, flag, scout_name, team_num, match_num, created_at
            FROM reports
            WHERE team_num = ? AND form_type = ?
            ORDER BY id DESC
            "#,
        )
        .bind(team_num)
        .bind(i64::from(form_type.ordinal()))
        .fetch_all(&mut self.conn)
        .await
        .map_err(|e| StoreError::operation("query_headers", e))?;

        rows.iter().map(row_to_header).collect()
    }

    async fn query_records_by_form_id(&mut self, form_id: i64) -> Result<Vec<RecordRow>> {
        let rows = sqlx::query(
            "SELECT id, report_id, item_id, value FROM records WHERE report_id = ? ORDER BY id",
        )
        .bind(form_id)
        .fetch_all(&mut self.conn)
        .await
        .map_err(|e| StoreError::operation("query_records", e))?;

        rows.iter()
            .map(|row| {
                Ok(RecordRow {
                    record_id: get(row, "id", "query_records")?,
                    form_id: get(row, "report_id", "query_records")?,
                    item_id: get(row, "item_id", "query_records")?,
                    value: get(row, "value", "query_records")?,
                })
            })
            .collect()
    }

    async fn query_active_items(&mut self) -> Result<Vec<Item>> {
        let rows =
            sqlx::query("SELECT id, name, datatype, active FROM items WHERE active = 1 ORDER BY id")
                .fetch_all(&mut self.conn)
                .await
                .map_err(|e| StoreError::operation("query_items", e))?;

        rows.iter()
            .map(|row| {
                let datatype: String = get(row, "datatype", "query_items")?;
                Ok(Item {
                    id: get(row, "id", "query_items")?,
                    name: get(row, "name", "query_items")?,
                    datatype: datatype
                        .parse()
                        .map_err(|e: String| StoreError::operation("query_items", e))?,
                    active: get(row, "active", "query_items")?,
                })
            })
            .collect()
    }

    async fn aggregate_averages(&mut self, team_num: i32) -> Result<Vec<AverageRow>> {
        const OP: &str = "aggregate_averages";
        let rows = sqlx::query(
            r#"
            SELECT r.item_id AS item_id, r.value AS value
            FROM records r
            JOIN reports p ON p.id = r.report_id
            JOIN items i ON i.id = r.item_id
            WHERE p.team_num = ? AND i.datatype = 'numeric' AND i.active = 1
              AND trim(r.value) <> ''
            ORDER BY r.item_id, r.id
            "#,
        )
        .bind(team_num)
        .fetch_all(&mut self.conn)
        .await
        .map_err(|e| StoreError::operation(OP, e))?;

        // SQLite casts "n/a" to 0.0, so values are parsed here instead.
        let mut by_item: BTreeMap<i32, Moments> = BTreeMap::new();
        for row in &rows {
            let item_id: i32 = get(row, "item_id", OP)?;
            let value: String = get(row, "value", OP)?;
            by_item.entry(item_id).or_default().add(&value);
        }

        Ok(by_item
            .into_iter()
            .filter_map(|(item_id, moments)| {
                if moments.skipped > 0 {
                    warn!(
                        team_num,
                        item_id,
                        skipped = moments.skipped,
                        "Non-numeric values left out of average"
                    );
                }
                moments.into_row(item_id)
            })
            .collect())
    }

    async fn aggregate_proportions(&mut self, team_num: i32) -> Result<Vec<ProportionRow>> {
        let rows = sqlx::query(
            r#"
            SELECT r.item_id AS item_id,
                   SUM(CASE WHEN lower(trim(r.value)) IN ('1', 'true', 'yes', 'y')
                       THEN 1.0 ELSE 0.0 END) AS total,
                   COUNT(*) AS n
            FROM records r
            JOIN reports p ON p.id = r.report_id
            JOIN items i ON i.id = r.item_id
            WHERE p.team_num = ? AND i.datatype = 'boolean' AND i.active = 1
            GROUP BY r.item_id
            ORDER BY r.item_id
            "#,
        )
        .bind(team_num)
        .fetch_all(&mut self.conn)
        .await
        .map_err(|e| StoreError::operation("aggregate_proportions", e))?;

        rows.iter()
            .map(|row| {
                let sum: f64 = get(row, "total", "aggregate_proportions")?;
                let count: i64 = get(row, "n", "aggregate_proportions")?;
                Ok(ProportionRow {
                    item_id: get(row, "item_id", "aggregate_proportions")?,
                    sum,
                    count,
                    rate: if count == 0 { 0.0 } else { sum / count as f64 },
                })
            })
            .collect()
    }

    async fn query_comments(&mut self, team_num: i32) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT r.value AS value
            FROM records r
            JOIN reports p ON p.id = r.report_id
            JOIN items i ON i.id = r.item_id
            WHERE p.team_num = ? AND i.datatype = 'text' AND i.active = 1
              AND trim(r.value) <> ''
            ORDER BY p.id, r.id
            "#,
        )
        .bind(team_num)
        .fetch_all(&mut self.conn)
        .await
        .map_err(|e| StoreError::operation("query_comments", e))?;

        rows.iter()
            .map(|row| get(row, "value", "query_comments"))
            .collect()
    }

    async fn close(self) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| StoreError::operation("close", e))
    }
}

/// Running sums for one numeric item.
#[derive(Debug, Default)]
struct Moments {
    count: i64,
    sum: f64,
    sum_sq: f64,
    skipped: i64,
}

impl Moments {
    fn add(&mut self, value: &str) {
        match value.trim().parse::<f64>() {
            Ok(x) if x.is_finite() => {
                self.count += 1;
                self.sum += x;
                self.sum_sq += x * x;
            }
            _ => self.skipped += 1,
        }
    }

    fn into_row(self, item_id: i32) -> Option<AverageRow> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        let average = self.sum / n;
        let mean_square = self.sum_sq / n;
        Some(AverageRow {
            item_id,
            average,
            std_dev: (mean_square - average * average).max(0.0).sqrt(),
            count: self.count,
            skipped: self.skipped,
        })
    }
}

fn get<'r, T>(row: &'r SqliteRow, column: &str, operation: &'static str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column)
        .map_err(|e| StoreError::operation(operation, e))
}

fn row_to_header(row: &SqliteRow) -> Result<HeaderRow> {
    let ordinal: i64 = get(row, "form_type", "query_headers")?;
    let form_type = u32::try_from(ordinal)
        .ok()
        .and_then(FormType::from_ordinal)
        .ok_or_else(|| {
            StoreError::operation("query_headers", format!("unknown form type {}", ordinal))
        })?;
    let created_at: i64 = get(row, "created_at", "query_headers")?;

    Ok(HeaderRow {
        form_id: get(row, "id", "query_headers")?,
        form_type,
        tablet_num: get(row, "tablet_num", "query_headers")?,
        scout_name: get(row, "scout_name", "query_headers")?,
        team_num: get(row, "team_num", "query_headers")?,
        match_num: get(row, "match_num", "query_headers")?,
        flag: get(row, "flag", "query_headers")?,
        created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
    })
}

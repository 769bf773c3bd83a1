//! Scouting store layer
//!
//! The store is reached through two traits:
//!
//! - [`StoreConnector`] opens a fresh [`StoreSession`]; callers open one per
//!   form and close it when the form is done.
//! - [`StoreSession`] carries the insert, query and aggregate operations the
//!   ingestion pipeline and the reverse path need.
//!
//! [`SqliteStore`] is the bundled backend. Its schema and SQL stand in for
//! the report/record procedures of the scouting database.
//!
//! # Usage
//!
//! ```rust,ignore
//! use scoutwatch_db::{SqliteStore, StoreConnector, StoreSession};
//!
//! let store = SqliteStore::open("~/.scoutwatch/scouting.sqlite3").await?;
//! let mut session = store.connect().await?;
//! let form_id = session.insert_report(&form).await?;
//! session.insert_record("3", form_id, 5).await?;
//! session.close().await?;
//! ```

// Single-threaded runtime; the returned futures need not be Send.
#![allow(async_fn_in_trait)]

mod error;
mod schema;
mod sqlite;
mod types;

pub use error::{Result, StoreError};
pub use sqlite::{SqliteSession, SqliteStore};
pub use types::*;

use scoutwatch_protocol::{Form, FormType};

/// Opens store sessions.
pub trait StoreConnector {
    type Session: StoreSession;

    /// Open a new session. Failure here is [`StoreError::Unavailable`].
    async fn connect(&self) -> Result<Self::Session>;
}

/// One open connection to the store.
pub trait StoreSession {
    /// Insert a form header; returns the store-generated form id.
    async fn insert_report(&mut self, form: &Form) -> Result<i64>;

    /// Insert one record under an existing form id.
    async fn insert_record(&mut self, value: &str, form_id: i64, item_id: i32) -> Result<()>;

    /// Headers for a team and form type, newest first.
    async fn query_headers_by_team_and_type(
        &mut self,
        team_num: i32,
        form_type: FormType,
    ) -> Result<Vec<HeaderRow>>;

    /// Records for one form id, in insertion order.
    async fn query_records_by_form_id(&mut self, form_id: i64) -> Result<Vec<RecordRow>>;

    async fn query_active_items(&mut self) -> Result<Vec<Item>>;

    /// Average / std dev / count per numeric item for a team.
    async fn aggregate_averages(&mut self, team_num: i32) -> Result<Vec<AverageRow>>;

    /// Sum / count / rate per boolean item for a team.
    async fn aggregate_proportions(&mut self, team_num: i32) -> Result<Vec<ProportionRow>>;

    /// Free-text comment values for a team, oldest form first.
    async fn query_comments(&mut self, team_num: i32) -> Result<Vec<String>>;

    /// Release the connection.
    async fn close(self) -> Result<()>
    where
        Self: Sized;
}

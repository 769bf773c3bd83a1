//! Shared fixtures: an in-memory store that records every call.

#![allow(dead_code)]

use scoutwatch::{
    CancellationToken, IngestContext, PersistenceOrchestrator, RetryPolicy, VolumeLocator,
};
use scoutwatch_db::{
    AverageRow, HeaderRow, Item, ProportionRow, RecordRow, Result, StoreConnector, StoreError,
    StoreSession,
};
use scoutwatch_logging::OperatorLog;
use scoutwatch_protocol::{Form, FormType, HeaderLayout};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    InsertReport { team_num: i32 },
    InsertRecord { form_id: i64, item_id: i32 },
    Close,
}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    next_id: i64,
    fail_connect: bool,
    /// connects allowed before `fail_connect` kicks in
    connect_budget: Option<usize>,
    fail_report_teams: HashSet<i32>,
    /// item id -> failures left before inserts succeed
    record_failures: HashMap<i32, u32>,
    reports: Vec<(i64, Form)>,
    records: Vec<RecordRow>,
}

#[derive(Clone, Default)]
pub struct MockStore {
    state: Rc<RefCell<MockState>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_connect(&self) {
        self.state.borrow_mut().fail_connect = true;
    }

    /// Let `connects` sessions open, then refuse every connection.
    pub fn fail_connect_after(&self, connects: usize) {
        let mut state = self.state.borrow_mut();
        state.fail_connect = true;
        state.connect_budget = Some(connects);
    }

    pub fn restore_connect(&self) {
        let mut state = self.state.borrow_mut();
        state.fail_connect = false;
        state.connect_budget = None;
    }

    pub fn fail_report_for_team(&self, team_num: i32) {
        self.state.borrow_mut().fail_report_teams.insert(team_num);
    }

    pub fn fail_record(&self, item_id: i32, times: u32) {
        self.state
            .borrow_mut()
            .record_failures
            .insert(item_id, times);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|c| matches(c)).count()
    }

    /// Teams in the order their headers were inserted.
    pub fn stored_teams(&self) -> Vec<i32> {
        self.state
            .borrow()
            .reports
            .iter()
            .map(|(_, form)| form.team_num)
            .collect()
    }

    pub fn stored_records(&self) -> Vec<(i64, i32, String)> {
        self.state
            .borrow()
            .records
            .iter()
            .map(|r| (r.form_id, r.item_id, r.value.clone()))
            .collect()
    }
}

impl StoreConnector for MockStore {
    type Session = MockSession;

    async fn connect(&self) -> Result<MockSession> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Connect);
        if state.fail_connect {
            match state.connect_budget.as_mut() {
                Some(left) if *left > 0 => *left -= 1,
                _ => return Err(StoreError::unavailable("connection refused")),
            }
        }
        Ok(MockSession {
            state: self.state.clone(),
        })
    }
}

pub struct MockSession {
    state: Rc<RefCell<MockState>>,
}

impl StoreSession for MockSession {
    async fn insert_report(&mut self, form: &Form) -> Result<i64> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::InsertReport {
            team_num: form.team_num,
        });
        if state.fail_report_teams.contains(&form.team_num) {
            return Err(StoreError::operation("insert_report", "constraint failed"));
        }
        state.next_id += 1;
        let id = state.next_id;
        state.reports.push((id, form.clone()));
        Ok(id)
    }

    async fn insert_record(&mut self, value: &str, form_id: i64, item_id: i32) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::InsertRecord { form_id, item_id });
        if let Some(left) = state.record_failures.get_mut(&item_id) {
            if *left > 0 {
                *left -= 1;
                return Err(StoreError::operation("insert_record", "database is locked"));
            }
        }
        let record_id = state.records.len() as i64 + 1;
        state.records.push(RecordRow {
            record_id,
            form_id,
            item_id,
            value: value.to_string(),
        });
        Ok(())
    }

    async fn query_headers_by_team_and_type(
        &mut self,
        team_num: i32,
        form_type: FormType,
    ) -> Result<Vec<HeaderRow>> {
        let state = self.state.borrow();
        let mut rows: Vec<HeaderRow> = state
            .reports
            .iter()
            .filter(|(_, f)| f.team_num == team_num && f.form_type == form_type)
            .map(|(id, f)| HeaderRow {
                form_id: *id,
                form_type: f.form_type,
                tablet_num: f.tablet_num,
                scout_name: f.scout_name.clone(),
                team_num: f.team_num,
                match_num: f.match_num,
                flag: f.flag,
                created_at: chrono::Utc::now(),
            })
            .collect();
        rows.sort_by(|a, b| b.form_id.cmp(&a.form_id));
        Ok(rows)
    }

    async fn query_records_by_form_id(&mut self, form_id: i64) -> Result<Vec<RecordRow>> {
        Ok(self
            .state
            .borrow()
            .records
            .iter()
            .filter(|r| r.form_id == form_id)
            .cloned()
            .collect())
    }

    async fn query_active_items(&mut self) -> Result<Vec<Item>> {
        Ok(Vec::new())
    }

    async fn aggregate_averages(&mut self, _team_num: i32) -> Result<Vec<AverageRow>> {
        Ok(Vec::new())
    }

    async fn aggregate_proportions(&mut self, _team_num: i32) -> Result<Vec<ProportionRow>> {
        Ok(Vec::new())
    }

    async fn query_comments(&mut self, _team_num: i32) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn close(self) -> Result<()> {
        self.state.borrow_mut().calls.push(Call::Close);
        Ok(())
    }
}

/// Always reports the same volume, or none.
pub struct FixedVolume(pub Option<PathBuf>);

impl VolumeLocator for FixedVolume {
    fn locate(&self) -> Option<PathBuf> {
        self.0.clone()
    }
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_secs(2))
}

pub fn orchestrator(store: &MockStore) -> PersistenceOrchestrator<MockStore> {
    PersistenceOrchestrator::new(store.clone(), fast_retry(3), 2)
}

pub fn context(store: &MockStore) -> IngestContext<MockStore, FixedVolume> {
    IngestContext::new(
        HeaderLayout::A,
        orchestrator(store),
        OperatorLog::new(64),
        CancellationToken::new(),
    )
}

//! Reverse path: stored rows back to protocol text and team summaries.
//!
//! Read-only. Each call opens its own session and closes it before
//! returning, exactly like ingestion does per form.

use crate::error::Result;
use scoutwatch_db::{AverageRow, Item, ProportionRow, StoreConnector, StoreSession};
use scoutwatch_protocol::{encode_form, FormType, HeaderLayout, RECORD_DELIMITER};
use std::fmt::Write;

/// Separates the numeric group from the boolean group in a summary.
pub const SUMMARY_GROUP_MARKER: &str = "##";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeamAggregates {
    pub averages: Vec<AverageRow>,
    pub proportions: Vec<ProportionRow>,
}

impl TeamAggregates {
    pub fn is_empty(&self) -> bool {
        self.averages.is_empty() && self.proportions.is_empty()
    }

    pub fn encode(&self) -> String {
        encode_summary(&self.averages, &self.proportions)
    }
}

pub struct Reconstructor<C> {
    connector: C,
    layout: HeaderLayout,
}

impl<C: StoreConnector> Reconstructor<C> {
    pub fn new(connector: C, layout: HeaderLayout) -> Self {
        Self { connector, layout }
    }

    /// Newest prescouting form for a team as protocol text.
    pub async fn reconstruct(&self, team_num: i32) -> Result<Option<String>> {
        self.reconstruct_form(team_num, FormType::Prescouting).await
    }

    /// Newest form of `form_type` for a team, or `None` if there is none.
    pub async fn reconstruct_form(
        &self,
        team_num: i32,
        form_type: FormType,
    ) -> Result<Option<String>> {
        let mut session = self.connector.connect().await?;
        let result = reconstruct_in(&mut session, team_num, form_type, self.layout).await;
        close(session).await;
        result
    }

    /// `itemID,avg,std,n|...##itemID,sum,n,rate|...`
    pub async fn summarize(&self, team_num: i32) -> Result<String> {
        Ok(self.aggregates(team_num).await?.encode())
    }

    /// Both aggregate groups for a team, unencoded.
    pub async fn aggregates(&self, team_num: i32) -> Result<TeamAggregates> {
        let mut session = self.connector.connect().await?;
        let result = aggregates_in(&mut session, team_num).await;
        close(session).await;
        result
    }

    pub async fn comments(&self, team_num: i32) -> Result<Vec<String>> {
        let mut session = self.connector.connect().await?;
        let result: Result<Vec<String>> =
            session.query_comments(team_num).await.map_err(Into::into);
        close(session).await;
        result
    }

    pub async fn active_items(&self) -> Result<Vec<Item>> {
        let mut session = self.connector.connect().await?;
        let result: Result<Vec<Item>> =
            session.query_active_items().await.map_err(Into::into);
        close(session).await;
        result
    }
}

async fn reconstruct_in<S: StoreSession>(
    session: &mut S,
    team_num: i32,
    form_type: FormType,
    layout: HeaderLayout,
) -> Result<Option<String>> {
    let headers = session
        .query_headers_by_team_and_type(team_num, form_type)
        .await?;
    // Newest first; pick the highest id even if a backend ignores the order.
    let Some(header) = headers.into_iter().max_by_key(|h| h.form_id) else {
        return Ok(None);
    };

    let records = session.query_records_by_form_id(header.form_id).await?;
    tracing::debug!(
        team_num,
        form_id = header.form_id,
        records = records.len(),
        "Reconstructing form"
    );
    Ok(Some(encode_form(&header.into_form(records), layout)))
}

async fn aggregates_in<S: StoreSession>(
    session: &mut S,
    team_num: i32,
) -> Result<TeamAggregates> {
    Ok(TeamAggregates {
        averages: session.aggregate_averages(team_num).await?,
        proportions: session.aggregate_proportions(team_num).await?,
    })
}

async fn close<S: StoreSession>(session: S) {
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "Failed to close store session");
    }
}

/// Encode both aggregate groups, numeric first.
pub fn encode_summary(averages: &[AverageRow], proportions: &[ProportionRow]) -> String {
    let mut out = String::new();
    for (i, row) in averages.iter().enumerate() {
        if i > 0 {
            out.push(RECORD_DELIMITER);
        }
        let _ = write!(
            out,
            "{},{:.2},{:.2},{}",
            row.item_id, row.average, row.std_dev, row.count
        );
    }
    out.push_str(SUMMARY_GROUP_MARKER);
    for (i, row) in proportions.iter().enumerate() {
        if i > 0 {
            out.push(RECORD_DELIMITER);
        }
        let _ = write!(
            out,
            "{},{:.0},{},{:.2}",
            row.item_id, row.sum, row.count, row.rate
        );
    }
    out
}

pub fn render_comments(comments: &[String]) -> String {
    comments.join("\n")
}

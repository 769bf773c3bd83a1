//! Row types returned by store queries.

use chrono::{DateTime, Utc};
use scoutwatch_protocol::{Form, FormType, Record};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Item Catalog
// ============================================================================

/// Declared interpretation of a record value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemDatatype {
    /// Averaged (mean / std dev / n).
    Numeric,
    /// Counted as a success rate.
    Boolean,
    /// Free-text comment.
    Text,
}

impl ItemDatatype {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemDatatype::Numeric => "numeric",
            ItemDatatype::Boolean => "boolean",
            ItemDatatype::Text => "text",
        }
    }
}

impl fmt::Display for ItemDatatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ItemDatatype {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "numeric" => Ok(ItemDatatype::Numeric),
            "boolean" => Ok(ItemDatatype::Boolean),
            "text" => Ok(ItemDatatype::Text),
            _ => Err(format!(
                "Invalid item datatype: '{}'. Expected: numeric, boolean, or text",
                s
            )),
        }
    }
}

/// Store-owned item metadata. Ingestion never writes these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i32,
    pub name: String,
    pub datatype: ItemDatatype,
    pub active: bool,
}

// ============================================================================
// Report Rows
// ============================================================================

/// A persisted form header.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderRow {
    pub form_id: i64,
    pub form_type: FormType,
    pub tablet_num: i32,
    pub scout_name: String,
    pub team_num: i32,
    pub match_num: i32,
    pub flag: Option<bool>,
    pub created_at: DateTime<Utc>,
}

impl HeaderRow {
    /// Rebuild the form this header was stored from.
    pub fn into_form(self, records: Vec<RecordRow>) -> Form {
        let mut form = Form::new(
            self.form_type,
            self.tablet_num,
            self.scout_name,
            self.team_num,
            self.match_num,
        )
        .with_records(records.into_iter().map(RecordRow::into_record).collect());
        form.flag = self.flag;
        form.assign_id(self.form_id);
        form
    }
}

/// A persisted record belonging to one header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRow {
    pub record_id: i64,
    pub form_id: i64,
    pub item_id: i32,
    pub value: String,
}

impl RecordRow {
    pub fn into_record(self) -> Record {
        Record::new(self.item_id, self.value)
    }
}

// ============================================================================
// Aggregates
// ============================================================================

/// Per-item statistics over numeric items.
#[derive(Debug, Clone, PartialEq)]
pub struct AverageRow {
    pub item_id: i32,
    pub average: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    pub count: i64,
    /// Stored values that are not numbers, left out of the statistics.
    pub skipped: i64,
}

/// Per-item success statistics over boolean items.
#[derive(Debug, Clone, PartialEq)]
pub struct ProportionRow {
    pub item_id: i32,
    pub sum: f64,
    pub count: i64,
    pub rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_row_into_form() {
        let header = HeaderRow {
            form_id: 17,
            form_type: FormType::Match,
            tablet_num: 2,
            scout_name: "Lee".to_string(),
            team_num: 118,
            match_num: 31,
            flag: Some(true),
            created_at: Utc::now(),
        };
        let records = vec![RecordRow {
            record_id: 1,
            form_id: 17,
            item_id: 5,
            value: "3".to_string(),
        }];

        let form = header.into_form(records);
        assert_eq!(form.form_id(), Some(17));
        assert_eq!(form.flag, Some(true));
        assert_eq!(form.records, vec![Record::new(5, "3")]);
    }

    #[test]
    fn test_datatype_parse() {
        assert_eq!("Numeric".parse::<ItemDatatype>().unwrap(), ItemDatatype::Numeric);
        assert!("blob".parse::<ItemDatatype>().is_err());
    }
}

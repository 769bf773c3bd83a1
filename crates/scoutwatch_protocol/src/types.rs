//! Form payload types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Canonical Enums
// ============================================================================

/// Form variant discriminator, encoded on the wire as its ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum FormType {
    /// Pre-event scouting; carries no real match number.
    #[default]
    Prescouting = 0,
    Match = 1,
    Pit = 2,
}

impl FormType {
    pub const ALL: [FormType; 3] = [FormType::Prescouting, FormType::Match, FormType::Pit];

    pub fn from_ordinal(value: u32) -> Option<Self> {
        match value {
            0 => Some(FormType::Prescouting),
            1 => Some(FormType::Match),
            2 => Some(FormType::Pit),
            _ => None,
        }
    }

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FormType::Prescouting => "prescouting",
            FormType::Match => "match",
            FormType::Pit => "pit",
        }
    }
}

impl fmt::Display for FormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FormType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(ordinal) = s.parse::<u32>() {
            return FormType::from_ordinal(ordinal)
                .ok_or_else(|| format!("Unknown form type ordinal: {}", ordinal));
        }
        match s.to_lowercase().as_str() {
            "prescouting" => Ok(FormType::Prescouting),
            "match" => Ok(FormType::Match),
            "pit" => Ok(FormType::Pit),
            _ => Err(format!(
                "Invalid form type: '{}'. Expected: prescouting, match, pit or an ordinal",
                s
            )),
        }
    }
}

/// Header layout marker. Selects which tablet software revision produced
/// the payload; never inferred from field positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HeaderLayout {
    /// `type | tablet | scout | team | match`
    #[default]
    A,
    /// `type | flag | tablet | scout | team | match`
    B,
}

impl HeaderLayout {
    /// Number of `|`-separated header fields, including the form type.
    pub fn header_len(self) -> usize {
        match self {
            HeaderLayout::A => 5,
            HeaderLayout::B => 6,
        }
    }
}

impl FromStr for HeaderLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "a" => Ok(HeaderLayout::A),
            "b" => Ok(HeaderLayout::B),
            _ => Err(format!("Invalid header layout: '{}'. Expected: a or b", s)),
        }
    }
}

// ============================================================================
// Payload Types
// ============================================================================

/// One item/value pair. The value is kept as raw text; its datatype lives
/// in the store's item catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub item_id: i32,
    pub value: String,
}

impl Record {
    pub fn new(item_id: i32, value: impl Into<String>) -> Self {
        Self {
            item_id,
            value: value.into(),
        }
    }
}

/// One scouting submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    pub form_type: FormType,
    pub tablet_num: i32,
    pub scout_name: String,
    pub team_num: i32,
    pub match_num: i32,
    /// Layout B flag bit; `None` for Layout A payloads.
    pub flag: Option<bool>,
    pub records: Vec<Record>,
    form_id: Option<i64>,
}

impl Form {
    pub fn new(
        form_type: FormType,
        tablet_num: i32,
        scout_name: impl Into<String>,
        team_num: i32,
        match_num: i32,
    ) -> Self {
        Self {
            form_type,
            tablet_num,
            scout_name: scout_name.into(),
            team_num,
            match_num,
            flag: None,
            records: Vec::new(),
            form_id: None,
        }
    }

    pub fn with_flag(mut self, flag: bool) -> Self {
        self.flag = Some(flag);
        self
    }

    pub fn with_records(mut self, records: Vec<Record>) -> Self {
        self.records = records;
        self
    }

    /// Store-generated identifier, set once the header is persisted.
    pub fn form_id(&self) -> Option<i64> {
        self.form_id
    }

    /// Record the store-generated identifier. Returns `false` and leaves the
    /// form untouched if an identifier was already assigned.
    pub fn assign_id(&mut self, id: i64) -> bool {
        if self.form_id.is_some() {
            return false;
        }
        self.form_id = Some(id);
        true
    }
}

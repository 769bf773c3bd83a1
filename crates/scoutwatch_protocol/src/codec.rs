//! Text codec for tablet form payloads.
//!
//! Decoding is split into independent stages so each can be tested alone:
//! [`split_forms`] → [`split_fields`] → [`parse_header`] / [`parse_record`].
//! [`decode`] strings them together and collects errors per form instead of
//! aborting the whole payload.

use crate::error::{DecodeError, Result};
use crate::types::{Form, FormType, HeaderLayout, Record};
use std::fmt::Write;

/// Separates forms within a payload.
pub const FORM_DELIMITER: &str = "||";

/// Separates fields within a form.
pub const RECORD_DELIMITER: char = '|';

/// Separates item id from value within a record field.
pub const VALUE_SEPARATOR: char = ',';

/// Result of decoding one payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeOutcome {
    /// Successfully decoded forms, in payload order.
    pub forms: Vec<Form>,
    /// Header errors (form discarded) and record errors (record dropped).
    pub errors: Vec<DecodeError>,
}

impl DecodeOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of forms discarded because of header errors.
    pub fn discarded_forms(&self) -> usize {
        self.errors.iter().filter(|e| e.is_header_error()).count()
    }
}

/// Split a payload into non-empty form segments.
///
/// Whitespace-only segments count as empty. The segment after the last
/// delimiter is kept when non-empty.
pub fn split_forms(payload: &str) -> Vec<&str> {
    payload
        .split(FORM_DELIMITER)
        .filter(|segment| !segment.trim().is_empty())
        .collect()
}

/// Split one form segment into its flat field sequence.
pub fn split_fields(segment: &str) -> Vec<&str> {
    segment.split(RECORD_DELIMITER).collect()
}

/// Parse the header fields of one form under the given layout.
///
/// Returns a form with no records; record fields start at
/// `layout.header_len()`.
pub fn parse_header(fields: &[&str], layout: HeaderLayout, form: usize) -> Result<Form> {
    let type_raw = header_field(fields, 0, "type", form)?;
    let ordinal = type_raw
        .trim()
        .parse::<u32>()
        .map_err(|_| DecodeError::InvalidNumber {
            form,
            field: "type",
            value: type_raw.to_string(),
        })?;
    let form_type =
        FormType::from_ordinal(ordinal).ok_or(DecodeError::UnknownFormType { form, ordinal })?;

    let (flag, base) = match layout {
        HeaderLayout::A => (None, 1),
        HeaderLayout::B => {
            let raw = header_field(fields, 1, "flag", form)?;
            (Some(parse_number(raw, "flag", form)? != 0), 2)
        }
    };

    let tablet_num = parse_number(header_field(fields, base, "tablet", form)?, "tablet", form)?;
    let scout_name = header_field(fields, base + 1, "scout", form)?;
    let team_num = parse_number(header_field(fields, base + 2, "team", form)?, "team", form)?;
    let match_num = parse_number(header_field(fields, base + 3, "match", form)?, "match", form)?;

    let mut decoded = Form::new(form_type, tablet_num, scout_name, team_num, match_num);
    decoded.flag = flag;
    Ok(decoded)
}

/// Parse one `itemID,value` record field.
///
/// Everything after the first comma is the value, commas included.
pub fn parse_record(raw: &str, form: usize, field: usize) -> Result<Record> {
    let (id, value) =
        raw.split_once(VALUE_SEPARATOR)
            .ok_or_else(|| DecodeError::MissingRecordSeparator {
                form,
                field,
                raw: raw.to_string(),
            })?;
    let item_id = id
        .trim()
        .parse::<i32>()
        .map_err(|_| DecodeError::InvalidItemId {
            form,
            field,
            raw: raw.to_string(),
        })?;
    Ok(Record::new(item_id, value))
}

/// Decode a raw payload into forms.
///
/// A header error discards only its own form; a record error drops only that
/// record. Forms decoded before a failure are always kept.
pub fn decode(payload: &str, layout: HeaderLayout) -> DecodeOutcome {
    let mut outcome = DecodeOutcome::default();

    for (index, segment) in split_forms(payload).into_iter().enumerate() {
        let fields = split_fields(segment);
        let mut form = match parse_header(&fields, layout, index) {
            Ok(form) => form,
            Err(err) => {
                outcome.errors.push(err);
                continue;
            }
        };

        let header_len = layout.header_len();
        for (offset, raw) in fields.iter().enumerate().skip(header_len) {
            // Header-only forms end with a trailing delimiter.
            if raw.is_empty() {
                continue;
            }
            match parse_record(raw, index, offset) {
                Ok(record) => form.records.push(record),
                Err(err) => outcome.errors.push(err),
            }
        }

        outcome.forms.push(form);
    }

    outcome
}

/// Encode one form back into protocol text.
///
/// Every header field is followed by `|`, so a form without records ends
/// right after its trailing delimiter.
pub fn encode_form(form: &Form, layout: HeaderLayout) -> String {
    let mut out = String::new();
    let _ = write!(out, "{}{}", form.form_type.ordinal(), RECORD_DELIMITER);
    if layout == HeaderLayout::B {
        let bit = u8::from(form.flag.unwrap_or(false));
        let _ = write!(out, "{}{}", bit, RECORD_DELIMITER);
    }
    let _ = write!(
        out,
        "{tablet}{d}{scout}{d}{team}{d}{match_num}{d}",
        tablet = form.tablet_num,
        scout = form.scout_name,
        team = form.team_num,
        match_num = form.match_num,
        d = RECORD_DELIMITER,
    );

    for (i, record) in form.records.iter().enumerate() {
        if i > 0 {
            out.push(RECORD_DELIMITER);
        }
        let _ = write!(out, "{}{}{}", record.item_id, VALUE_SEPARATOR, record.value);
    }

    out
}

/// Encode a sequence of forms as one payload, each terminated by `||`.
pub fn encode_payload(forms: &[Form], layout: HeaderLayout) -> String {
    let mut out = String::new();
    for form in forms {
        let encoded = encode_form(form, layout);
        // A trailing `|` would merge with the form delimiter.
        out.push_str(encoded.trim_end_matches(RECORD_DELIMITER));
        out.push_str(FORM_DELIMITER);
    }
    out
}

fn header_field<'a>(
    fields: &[&'a str],
    index: usize,
    name: &'static str,
    form: usize,
) -> Result<&'a str> {
    fields
        .get(index)
        .copied()
        .ok_or(DecodeError::MissingHeaderField { form, field: name })
}

fn parse_number(raw: &str, field: &'static str, form: usize) -> Result<i32> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| DecodeError::InvalidNumber {
            form,
            field,
            value: raw.to_string(),
        })
}

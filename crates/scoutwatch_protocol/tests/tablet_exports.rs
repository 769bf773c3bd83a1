//! Decoding of payloads shaped like real tablet exports.

use scoutwatch_protocol::{decode, encode_payload, DecodeError, FormType, HeaderLayout, Record};

/// A full export: one prescouting form, two match forms, trailing delimiter.
const EXPORT_A: &str = "0|3|Priya|1678|-1|40,swerve|41,6 motors, 2 spare|42,1||\
1|3|Priya|1678|12|1,4|2,0|3,1|90,fast on defense||\
1|3|Priya|254|13|1,2|2,1|3,0||";

#[test]
fn test_full_export_layout_a() -> anyhow::Result<()> {
    let outcome = decode(EXPORT_A, HeaderLayout::A);
    assert!(outcome.is_clean(), "{:?}", outcome.errors);
    assert_eq!(outcome.forms.len(), 3);

    let prescout = &outcome.forms[0];
    assert_eq!(prescout.form_type, FormType::Prescouting);
    assert_eq!(prescout.match_num, -1);
    assert_eq!(prescout.records[1], Record::new(41, "6 motors, 2 spare"));

    let teams: Vec<i32> = outcome.forms.iter().map(|f| f.team_num).collect();
    assert_eq!(teams, vec![1678, 1678, 254]);

    let reencoded = encode_payload(&outcome.forms, HeaderLayout::A);
    assert_eq!(reencoded, EXPORT_A);
    Ok(())
}

#[test]
fn test_layout_b_export_read_as_b_only() {
    let export_b = "1|1|3|Priya|1678|12|1,4||1|0|4|Jo|971|12|1,2||";

    let as_b = decode(export_b, HeaderLayout::B);
    assert!(as_b.is_clean());
    assert_eq!(as_b.forms.len(), 2);
    assert_eq!(as_b.forms[1].scout_name, "Jo");
    assert_eq!(as_b.forms[1].flag, Some(false));

    // Under layout A the flag column shifts every field; "Priya" lands in the
    // team slot and the header is rejected.
    let as_a = decode(export_b, HeaderLayout::A);
    assert!(as_a.forms.is_empty());
    assert!(as_a
        .errors
        .iter()
        .all(|e| matches!(e, DecodeError::InvalidNumber { field: "team", .. })));
}

#[test]
fn test_damaged_middle_form_keeps_neighbours() {
    let payload = "1|3|Priya|1678|12|1,4||1|3|Priya||1|3|Priya|254|13|1,2|broken";
    let outcome = decode(payload, HeaderLayout::A);

    assert_eq!(outcome.forms.len(), 2);
    assert_eq!(outcome.forms[0].match_num, 12);
    assert_eq!(outcome.forms[1].match_num, 13);
    assert_eq!(outcome.forms[1].records, vec![Record::new(1, "2")]);
    assert_eq!(outcome.discarded_forms(), 1);
    assert_eq!(outcome.errors.len(), 2);
}

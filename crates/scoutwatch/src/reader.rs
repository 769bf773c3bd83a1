use crate::error::{IngestError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Read a tablet export as one payload string.
///
/// Line terminators are stripped and the lines concatenated, since a
/// payload is one logical line however the tablet wrapped it. The file
/// handle is closed before returning on every path.
pub fn read_payload(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| IngestError::io(path, e))?;
    let mut payload = String::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| IngestError::io(path, e))?;
        payload.push_str(&line);
    }
    Ok(payload)
}

/// Whether a payload is plain ASCII text, as tablet exports are.
pub fn is_plain_text(payload: &str) -> bool {
    payload
        .chars()
        .all(|c| c.is_ascii() && (!c.is_ascii_control() || c == '\t'))
}

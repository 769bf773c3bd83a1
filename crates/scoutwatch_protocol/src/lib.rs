//! Tablet Form Protocol
//!
//! Text format exported by the scouting tablets. A file holds one logical line
//! carrying any number of forms.
//!
//! # Wire Format
//!
//! ```text
//! form || form || form
//! form   = header | record | record | ...
//! record = itemID,value
//! ```
//!
//! Two header layouts exist across tablet software revisions. The active one
//! is always chosen explicitly through [`HeaderLayout`]:
//!
//! - Layout A: `type | tablet | scout | team | match`
//! - Layout B: `type | flag | tablet | scout | team | match`
//!
//! Decoding never touches the filesystem or the store; every function in
//! [`codec`] is pure.

pub mod codec;
pub mod error;
pub mod types;

pub use codec::{
    decode, encode_form, encode_payload, parse_header, parse_record, split_fields, split_forms,
    DecodeOutcome, FORM_DELIMITER, RECORD_DELIMITER, VALUE_SEPARATOR,
};
pub use error::{DecodeError, Result};
pub use types::{Form, FormType, HeaderLayout, Record};

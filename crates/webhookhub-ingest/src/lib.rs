//! Turns heterogeneous webhook payloads into [`DraftRecord`]s.
//!
//! [`decode_body`] converts the raw request body into JSON, a [`Parser`]
//! picked from the [`ParserRegistry`] extracts the canonical fields, and the
//! [`Normalizer`] applies query-string overrides and defaults.
//!
//! [`DraftRecord`]: webhookhub_types::models::DraftRecord

pub mod body;
pub mod normalize;
pub mod parser;

pub use body::{DecodeError, decode_body};
pub use normalize::{Normalizer, Overrides};
pub use parser::{GenericParser, ParsedFields, Parser, ParserRegistry, TautulliParser};

//! SQL dump row extraction for georef
//!
//! Pulls typed rows out of `INSERT INTO ... VALUES (...), (...);` statements
//! in a database export without evaluating SQL:
//! - [`TupleLexer`]: raw tuple substrings from one VALUES clause
//! - [`decode_tuple`]: scalar values from one raw tuple
//! - [`DumpIndex`] / [`extract_table`]: every statement for a table, in
//!   document order, concatenated into one row set
//!
//! Parsing is resilient rather than strict: malformed input is skipped and
//! counted in [`ParseDiagnostics`], never reported as an error.

pub mod decode;
pub mod extract;
pub mod lexer;

pub use decode::{decode_tuple, decode_value, DecodedRow, Value};
pub use extract::{extract_table, DumpIndex, InsertStatement, ParseDiagnostics, TableRows};
pub use lexer::{LexStats, TupleLexer};

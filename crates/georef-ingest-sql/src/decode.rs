//! Value decoding for raw tuple text.
//!
//! Splits a tuple at top-level commas and normalizes each field. Values stay
//! strings: `'42'` and `42` both decode to `Text("42")`, only the bare word
//! `NULL` decodes to [`Value::Null`]. Type coercion belongs to the caller.

use serde::{Deserialize, Serialize};

/// One scalar from a dump tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Null,
    Text(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

/// Position-indexed values of one row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedRow {
    values: Vec<Value>,
    unterminated_quotes: usize,
}

impl DecodedRow {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values,
            unterminated_quotes: 0,
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Text at `index`; `None` for NULL or a missing column.
    pub fn text(&self, index: usize) -> Option<&str> {
        self.values.get(index).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Quoted fields that ran to the end of the tuple without closing.
    pub fn unterminated_quotes(&self) -> usize {
        self.unterminated_quotes
    }
}

/// Decode the text between a tuple's outer parentheses.
pub fn decode_tuple(raw: &str) -> DecodedRow {
    let mut row = DecodedRow::default();
    if raw.trim().is_empty() {
        return row;
    }
    for field in split_fields(raw) {
        let (value, closed) = decode_field(field);
        if !closed {
            row.unterminated_quotes += 1;
        }
        row.values.push(value);
    }
    row
}

/// Decode a single field (already split from its tuple).
pub fn decode_value(field: &str) -> Value {
    decode_field(field).0
}

fn split_fields(raw: &str) -> Vec<&str> {
    let bytes = raw.as_bytes();
    let mut fields = Vec::new();
    let mut quote: Option<u8> = None;
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                if bytes.get(i + 1) == Some(&q) {
                    i += 2;
                    continue;
                }
                quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'\'' | b'"' => quote = Some(b),
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                fields.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    fields.push(&raw[start..]);
    fields
}

/// Returns the value and whether any opening quote was closed.
fn decode_field(field: &str) -> (Value, bool) {
    let field = field.trim();
    if field.eq_ignore_ascii_case("NULL") {
        return (Value::Null, true);
    }
    match field.chars().next() {
        Some(q @ ('\'' | '"')) => {
            let (text, closed) = unquote(&field[1..], q);
            (Value::Text(text), closed)
        }
        _ => (Value::Text(field.to_string()), true),
    }
}

/// Unescape quoted content starting after the opening quote. Anything after
/// the closing quote is ignored.
fn unquote(body: &str, quote: char) -> (String, bool) {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some('0') => out.push('\0'),
                Some('Z') => out.push('\x1a'),
                Some(other) => out.push(other),
                None => {
                    out.push('\\');
                    return (out, false);
                }
            }
        } else if c == quote {
            if chars.peek() == Some(&quote) {
                chars.next();
                out.push(quote);
            } else {
                return (out, true);
            }
        } else {
            out.push(c);
        }
    }
    (out, false)
}

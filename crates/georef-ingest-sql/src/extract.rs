//! Table extraction across a whole dump.
//!
//! A dump tool may split one table's data over many INSERT statements placed
//! anywhere in the document. [`DumpIndex`] finds them all in one scan and
//! [`DumpIndex::extract`] concatenates their rows in document order.

use crate::decode::{decode_tuple, DecodedRow};
use crate::lexer::{LexStats, TupleLexer};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::{AddAssign, Range};
use std::sync::OnceLock;

fn insert_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)\bINSERT\s+(?:IGNORE\s+)?INTO\s+(?:(?:`[^`]*`|"[^"]*"|\w+)\s*\.\s*)?(?:`(?P<bt>[^`]*)`|"(?P<dq>[^"]*)"|(?P<bare>\w+))\s*(?:\((?P<cols>[^)]*)\))?\s*VALUES\b"#,
        )
        .expect("INSERT pattern is valid")
    })
}

/// Counters for one table's statements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseDiagnostics {
    pub statements: usize,
    pub tuples: usize,
    pub skipped_chars: usize,
    pub unterminated_tuples: usize,
    pub unterminated_quotes: usize,
    /// Statements cut off at the next INSERT line because no `;` closed them.
    pub truncated_statements: usize,
}

impl ParseDiagnostics {
    /// Anything other than well-formed input was seen.
    pub fn has_anomalies(&self) -> bool {
        self.skipped_chars > 0
            || self.unterminated_tuples > 0
            || self.unterminated_quotes > 0
            || self.truncated_statements > 0
    }
}

impl AddAssign<LexStats> for ParseDiagnostics {
    fn add_assign(&mut self, rhs: LexStats) {
        self.tuples += rhs.tuples;
        self.skipped_chars += rhs.skipped_chars;
        self.unterminated_tuples += rhs.unterminated_tuples;
    }
}

/// One `INSERT INTO ... VALUES ...;` statement located in the dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    /// Table name as written (quotes and schema qualifier removed).
    pub table: String,
    /// Explicit column list, when the statement has one.
    pub columns: Option<Vec<String>>,
    /// Byte range of the statement in the dump.
    pub span: Range<usize>,
    /// Byte range of the VALUES clause, terminator included.
    pub values: Range<usize>,
    /// Lexer counters from the indexing scan.
    pub stats: LexStats,
    /// No terminator was found before the next INSERT line or end of input.
    pub truncated: bool,
}

/// Rows of one table gathered from every statement that inserts into it.
#[derive(Debug, Clone, Default)]
pub struct TableRows {
    pub table: String,
    /// Column list of the first statement that declares one.
    pub columns: Option<Vec<String>>,
    pub rows: Vec<DecodedRow>,
    pub diagnostics: ParseDiagnostics,
}

impl TableRows {
    /// Position of a named column, compared case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .as_ref()?
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }
}

/// Index of every INSERT statement in a dump, grouped by table.
#[derive(Debug, Clone)]
pub struct DumpIndex<'a> {
    dump: &'a str,
    statements: Vec<InsertStatement>,
    by_table: HashMap<String, Vec<usize>>,
    table_order: Vec<String>,
}

impl<'a> DumpIndex<'a> {
    /// Scan the dump once. The end of each statement is found by lexing its
    /// VALUES clause, so a `;` or `INSERT INTO` inside a quoted value never
    /// confuses the scan. Lexing stops at the next INSERT that begins a
    /// line, so an unbalanced quote damages only its own statement.
    pub fn build(dump: &'a str) -> Self {
        let mut statements = Vec::new();
        let mut by_table: HashMap<String, Vec<usize>> = HashMap::new();
        let mut table_order = Vec::new();
        let mut pos = 0;

        while let Some(caps) = insert_re().captures_at(dump, pos) {
            let Some(head) = caps.get(0) else { break };
            let table = caps
                .name("bt")
                .or_else(|| caps.name("dq"))
                .or_else(|| caps.name("bare"))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            let columns = caps.name("cols").map(|m| parse_column_list(m.as_str()));

            let values_start = head.end();
            let limit = next_line_insert(dump, values_start).unwrap_or(dump.len());
            let mut lexer = TupleLexer::new(&dump[values_start..limit]);
            lexer.by_ref().for_each(drop);
            let end = values_start + lexer.consumed();
            let truncated = !lexer.is_terminated();
            if truncated && limit < dump.len() {
                tracing::warn!(
                    table = %table,
                    offset = head.start(),
                    "statement not terminated before next INSERT, cut off"
                );
            }

            let key = table.to_ascii_lowercase();
            let slots = by_table.entry(key.clone()).or_insert_with(|| {
                table_order.push(key);
                Vec::new()
            });
            slots.push(statements.len());
            statements.push(InsertStatement {
                table,
                columns,
                span: head.start()..end,
                values: values_start..end,
                stats: lexer.stats(),
                truncated,
            });

            pos = end;
        }

        tracing::debug!(
            statements = statements.len(),
            tables = table_order.len(),
            "indexed dump"
        );

        Self {
            dump,
            statements,
            by_table,
            table_order,
        }
    }

    pub fn statements(&self) -> &[InsertStatement] {
        &self.statements
    }

    /// Table names in order of first appearance.
    pub fn tables(&self) -> Vec<&str> {
        self.table_order
            .iter()
            .filter_map(|key| self.by_table.get(key))
            .filter_map(|idx| idx.first())
            .map(|&i| self.statements[i].table.as_str())
            .collect()
    }

    pub fn statement_count(&self, table: &str) -> usize {
        self.by_table
            .get(&table.to_ascii_lowercase())
            .map_or(0, Vec::len)
    }

    /// Decode every row of `table`, in document order. A table with no
    /// statements yields an empty row set and a warning.
    pub fn extract(&self, table: &str) -> TableRows {
        let mut out = TableRows {
            table: table.to_string(),
            ..Default::default()
        };

        let Some(indices) = self.by_table.get(&table.to_ascii_lowercase()) else {
            tracing::warn!(table, "no INSERT statements found for table");
            return out;
        };

        for &i in indices {
            let stmt = &self.statements[i];
            if out.columns.is_none() {
                out.columns = stmt.columns.clone();
            }
            out.diagnostics.statements += 1;
            if stmt.truncated {
                out.diagnostics.truncated_statements += 1;
            }

            let mut lexer = TupleLexer::new(&self.dump[stmt.values.clone()]);
            for raw in lexer.by_ref() {
                let row = decode_tuple(raw);
                out.diagnostics.unterminated_quotes += row.unterminated_quotes();
                out.rows.push(row);
            }
            out.diagnostics += lexer.stats();
        }

        if out.diagnostics.has_anomalies() {
            tracing::warn!(
                table,
                skipped_chars = out.diagnostics.skipped_chars,
                unterminated_tuples = out.diagnostics.unterminated_tuples,
                unterminated_quotes = out.diagnostics.unterminated_quotes,
                truncated_statements = out.diagnostics.truncated_statements,
                "recovered from malformed input"
            );
        }
        tracing::debug!(
            table,
            statements = out.diagnostics.statements,
            rows = out.rows.len(),
            "extracted table"
        );
        out
    }
}

/// Extract one table without keeping the index around.
pub fn extract_table(dump: &str, table: &str) -> TableRows {
    DumpIndex::build(dump).extract(table)
}

/// Start of the first INSERT at or after `from` with only whitespace before it
/// on its line.
fn next_line_insert(dump: &str, from: usize) -> Option<usize> {
    let mut at = from;
    while let Some(m) = insert_re().find_at(dump, at) {
        let line_start = dump[..m.start()].rfind('\n').map_or(0, |i| i + 1);
        if dump[line_start..m.start()].trim().is_empty() {
            return Some(m.start());
        }
        at = m.end();
    }
    None
}

fn parse_column_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|c| c.trim().trim_matches(['`', '"', '\'']).to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

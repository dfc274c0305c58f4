//! Tuple lexer for a single `VALUES (...), (...);` clause.
//!
//! The lexer is a single byte scan over the clause text with three pieces of
//! state: the open quote character (if any), the parenthesis depth, and the
//! offset where the current tuple started. Quote
//! and paren characters are all ASCII, so scanning bytes never splits a UTF-8
//! sequence and every emitted slice lands on a char boundary.

use serde::{Deserialize, Serialize};

/// Counters collected while lexing one VALUES clause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexStats {
    /// Tuples emitted, including a best-effort trailing tuple.
    pub tuples: usize,
    /// Non-whitespace, non-comma characters found outside any tuple.
    pub skipped_chars: usize,
    /// Tuples still open when the text ran out.
    pub unterminated_tuples: usize,
}

/// Lazily yields the contents of each top-level parenthesized tuple.
///
/// Emitted slices exclude the outer parentheses. Lexing stops at the first
/// `;` outside any tuple or quote, which ends the INSERT statement; text
/// after it is never inspected. Restart by constructing a new lexer.
#[derive(Debug, Clone)]
pub struct TupleLexer<'a> {
    text: &'a str,
    pos: usize,
    done: bool,
    terminated: bool,
    stats: LexStats,
}

impl<'a> TupleLexer<'a> {
    pub fn new(values_clause: &'a str) -> Self {
        Self {
            text: values_clause,
            pos: 0,
            done: false,
            terminated: false,
            stats: LexStats::default(),
        }
    }

    pub fn stats(&self) -> LexStats {
        self.stats
    }

    /// Byte offset just past the statement terminator, or the text length
    /// when no terminator was found. Meaningful once iteration finished.
    pub fn consumed(&self) -> usize {
        self.pos
    }

    /// Whether lexing stopped at a `;` rather than at end of text.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

impl<'a> Iterator for TupleLexer<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.done {
            return None;
        }

        let bytes = self.text.as_bytes();
        let mut depth = 0usize;
        let mut start = self.pos;
        let mut quote: Option<u8> = None;
        let mut i = self.pos;

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
                b'(' => {
                    if depth == 0 {
                        start = i + 1;
                    }
                    depth += 1;
                }
                b')' if depth > 0 => {
                    depth -= 1;
                    if depth == 0 {
                        self.pos = i + 1;
                        self.stats.tuples += 1;
                        return Some(&self.text[start..i]);
                    }
                }
                b'\'' | b'"' if depth > 0 => quote = Some(b),
                b';' if depth == 0 => {
                    self.pos = i + 1;
                    self.done = true;
                    self.terminated = true;
                    return None;
                }
                b',' if depth == 0 => {}
                _ if depth == 0 => {
                    // Count characters, not UTF-8 continuation bytes.
                    if !b.is_ascii_whitespace() && (b & 0xC0) != 0x80 {
                        self.stats.skipped_chars += 1;
                    }
                }
                _ => {}
            }
            i += 1;
        }

        self.pos = bytes.len();
        self.done = true;
        if depth > 0 {
            self.stats.tuples += 1;
            self.stats.unterminated_tuples += 1;
            return Some(&self.text[start..]);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(text: &str) -> (Vec<&str>, LexStats) {
        let mut lexer = TupleLexer::new(text);
        let tuples: Vec<&str> = lexer.by_ref().collect();
        (tuples, lexer.stats())
    }

    #[test]
    fn test_splits_simple_tuples() {
        let (tuples, stats) = lex("(1,'Lagos State','LA'),(2,'Ogun State','OG');");
        assert_eq!(tuples, vec!["1,'Lagos State','LA'", "2,'Ogun State','OG'"]);
        assert_eq!(stats.tuples, 2);
        assert_eq!(stats.skipped_chars, 0);
    }

    #[test]
    fn test_quoted_parens_and_commas_do_not_split() {
        let (tuples, _) = lex("(1, 'a),(b', 'x;y'), (2, \"c(\", 'd')");
        assert_eq!(tuples, vec!["1, 'a),(b', 'x;y'", "2, \"c(\", 'd'"]);
    }

    #[test]
    fn test_escaped_quotes_stay_inside_string() {
        let (tuples, _) = lex(r"(2, 'O\'Brien Ward', 'OBW'), (3, 'it''s', 'X')");
        assert_eq!(tuples, vec![r"2, 'O\'Brien Ward', 'OBW'", "3, 'it''s', 'X'"]);
    }

    #[test]
    fn test_escaped_backslash_before_closing_quote() {
        let (tuples, _) = lex(r"(1, 'C:\\', 'X'), (2, 'y', 'Y')");
        assert_eq!(tuples.len(), 2);
        assert_eq!(tuples[0], r"1, 'C:\\', 'X'");
    }

    #[test]
    fn test_nested_unquoted_parens_tracked_by_depth() {
        let (tuples, _) = lex("(1, POINT(3 4), 'x'),(2, f(g(1)), 'y')");
        assert_eq!(tuples, vec!["1, POINT(3 4), 'x'", "2, f(g(1)), 'y'"]);
    }

    #[test]
    fn test_stops_at_statement_terminator() {
        let text = "(1,'a');\nINSERT INTO `other` VALUES (9,'z');";
        let mut lexer = TupleLexer::new(text);
        let tuples: Vec<&str> = lexer.by_ref().collect();
        assert_eq!(tuples, vec!["1,'a'"]);
        assert!(lexer.is_terminated());
        assert_eq!(&text[lexer.consumed()..], "\nINSERT INTO `other` VALUES (9,'z');");
    }

    #[test]
    fn test_counts_stray_characters_outside_tuples() {
        let (tuples, stats) = lex("(1,'a') junk ,(2,'b')");
        assert_eq!(tuples.len(), 2);
        assert_eq!(stats.skipped_chars, 4);
    }

    #[test]
    fn test_unterminated_tuple_is_emitted_best_effort() {
        let (tuples, stats) = lex("(1,'a'),(2,'unfinished");
        assert_eq!(tuples, vec!["1,'a'", "2,'unfinished"]);
        assert_eq!(stats.unterminated_tuples, 1);
        assert_eq!(stats.tuples, 2);
    }

    #[test]
    fn test_empty_clause_yields_nothing() {
        let (tuples, stats) = lex("   ;");
        assert!(tuples.is_empty());
        assert_eq!(stats, LexStats::default());
    }

    #[test]
    fn test_multibyte_text_outside_tuples_counts_chars() {
        let (tuples, stats) = lex("(1,'Ìbàdàn') é (2,'Ọ̀yọ́')");
        assert_eq!(tuples, vec!["1,'Ìbàdàn'", "2,'Ọ̀yọ́'"]);
        assert_eq!(stats.skipped_chars, 1);
    }
}

//! Terminal rendering of import summaries.

use colored::Colorize;
use georef_import::{ImportConfig, ImportSummary, LevelSummary};
use georef_ingest_sql::{ParseDiagnostics, TableRows};

const HEADER: [&str; 10] = [
    "level",
    "table",
    "seen",
    "created",
    "updated",
    "unchanged",
    "orphan",
    "malformed",
    "failed",
    "collisions",
];

pub fn print_summary(summary: &ImportSummary, config: &ImportConfig) {
    println!();
    println!("{}", header_line().bold());
    for line in level_lines(summary, config) {
        println!("{line}");
    }
    println!(
        "  {} seen {}, imported {}, created {}, updated {}, skipped {}",
        "totals:".bold(),
        summary.total_seen(),
        summary.total_imported(),
        summary.total_created(),
        summary.total_updated(),
        summary.total_skipped()
    );
    for level in &summary.levels {
        if level.source_missing() {
            println!(
                "  {} no INSERT statements for `{}`",
                "warning:".yellow().bold(),
                level.table
            );
        } else if level.parse.has_anomalies() {
            println!(
                "  {} `{}`: {}",
                "warning:".yellow().bold(),
                level.table,
                diagnostics_text(&level.parse)
            );
        }
    }
    if summary.cancelled {
        println!("{} re-run to resume", "Cancelled;".red().bold());
    } else {
        println!("{}", "✓ Import complete".green().bold());
    }
}

fn header_line() -> String {
    format!(
        "  {:<11} {:<16} {:>8} {:>8} {:>8} {:>9} {:>7} {:>9} {:>7} {:>10}",
        HEADER[0],
        HEADER[1],
        HEADER[2],
        HEADER[3],
        HEADER[4],
        HEADER[5],
        HEADER[6],
        HEADER[7],
        HEADER[8],
        HEADER[9]
    )
}

/// One row per configured level; levels the run never reached read `not run`.
pub fn level_lines(summary: &ImportSummary, config: &ImportConfig) -> Vec<String> {
    config
        .levels
        .iter()
        .map(|descriptor| match summary.level(descriptor.level) {
            Some(level) => level_line(level),
            None => format!(
                "  {:<11} {:<16} not run",
                descriptor.level.as_str(),
                descriptor.table
            ),
        })
        .collect()
}

fn level_line(s: &LevelSummary) -> String {
    let mut line = format!(
        "  {:<11} {:<16} {:>8} {:>8} {:>8} {:>9} {:>7} {:>9} {:>7} {:>10}",
        s.level.as_str(),
        s.table,
        s.seen,
        s.created,
        s.updated,
        s.unchanged,
        s.skipped_orphan,
        s.skipped_malformed,
        s.skipped_write_error,
        s.collisions
    );
    if !s.completed {
        line.push_str("  (incomplete)");
    }
    line
}

/// `inspect` output for one table.
pub fn inspect_line(rows: &TableRows) -> String {
    let d = &rows.diagnostics;
    let mut line = format!(
        "  {:<24} {:>4} statement(s) {:>8} row(s)",
        rows.table, d.statements, d.tuples
    );
    if let Some(columns) = &rows.columns {
        line.push_str(&format!("  [{}]", columns.join(", ")));
    }
    if d.has_anomalies() {
        line.push_str(&format!("  {}", diagnostics_text(d)));
    }
    line
}

fn diagnostics_text(d: &ParseDiagnostics) -> String {
    let mut parts = Vec::new();
    if d.skipped_chars > 0 {
        parts.push(format!("{} stray char(s) skipped", d.skipped_chars));
    }
    if d.unterminated_tuples > 0 {
        parts.push(format!("{} unterminated tuple(s)", d.unterminated_tuples));
    }
    if d.unterminated_quotes > 0 {
        parts.push(format!("{} unterminated quote(s)", d.unterminated_quotes));
    }
    if d.truncated_statements > 0 {
        parts.push(format!("{} unterminated statement(s)", d.truncated_statements));
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use georef_ingest_sql::extract_table;
    use georef_storage::Level;

    #[test]
    fn test_unreached_levels_read_not_run() {
        let config = ImportConfig::default();
        let mut summary = ImportSummary::start();
        let mut states = LevelSummary::new(Level::Region, "states");
        states.seen = 2;
        states.created = 2;
        states.imported = 2;
        states.completed = true;
        summary.levels.push(states);
        summary.cancelled = true;

        let lines = level_lines(&summary, &config);
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("states"));
        assert!(!lines[0].contains("not run"));
        assert!(lines[1].contains("lgas") && lines[1].ends_with("not run"));
        assert!(lines[3].contains("polling_units") && lines[3].ends_with("not run"));
    }

    #[test]
    fn test_incomplete_level_is_marked() {
        let config = ImportConfig::default();
        let mut summary = ImportSummary::start();
        summary.levels.push(LevelSummary::new(Level::Region, "states"));
        let lines = level_lines(&summary, &config);
        assert!(lines[0].ends_with("(incomplete)"));
    }

    #[test]
    fn test_inspect_line_reports_anomalies() {
        let rows = extract_table(
            "INSERT INTO `wards` (`id`,`lga_id`,`name`,`code`) VALUES (1,2,'A','X') junk;",
            "wards",
        );
        let line = inspect_line(&rows);
        assert!(line.contains("wards"));
        assert!(line.contains("[id, lga_id, name, code]"));
        assert!(line.contains("stray char(s) skipped"));
    }

    #[test]
    fn test_clean_table_has_no_diagnostics() {
        let rows = extract_table("INSERT INTO states VALUES (1,'Lagos','LA');", "states");
        assert_eq!(diagnostics_text(&rows.diagnostics), "");
        assert!(!inspect_line(&rows).contains("skipped"));
    }
}

//! Human-readable output formatting.

use sitepack_core::RunReport;
use sitepack_engine::PreviewLine;

/// Format the run report for the terminal
///
/// Non-verbose output shows counts only; verbose output lists every entry.
pub fn format_report(report: &RunReport, verbose: bool) -> String {
    let errors = report.errors().count();
    let warnings = report.warnings().count();

    let mut out = String::new();
    if report.is_success() {
        out.push_str(&format!("OK ({warnings} warning(s))\n"));
    } else {
        out.push_str(&format!("FAILED ({errors} error(s), {warnings} warning(s))\n"));
    }
    if verbose {
        for entry in report.entries() {
            out.push_str(&format!("  {entry}\n"));
        }
    }
    out
}

/// Format preview lines as an indented tree
pub fn format_preview(lines: &[PreviewLine]) -> String {
    let mut out = String::new();
    for line in lines {
        let indent = "  ".repeat(line.indent);
        let marker = if line.is_page { "*" } else { "-" };
        out.push_str(&format!("{indent}{marker} [{}] {}", line.id, line.title));
        if line.relation_level > 0 {
            out.push_str(&format!(" (relation level {})", line.relation_level));
        }
        for warning in &line.warnings {
            out.push_str(&format!(" !{warning}"));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitepack_core::RecordId;

    #[test]
    fn test_format_report_success() {
        let mut report = RunReport::new();
        report.warn_global("minor");
        let text = format_report(&report, false);
        assert!(text.starts_with("OK"));
        assert!(text.contains("1 warning"));
        assert!(!text.contains("minor"));
    }

    #[test]
    fn test_format_report_verbose_failure() {
        let mut report = RunReport::new();
        report.error(RecordId::new("content", 3), "lost relation");
        let text = format_report(&report, true);
        assert!(text.starts_with("FAILED"));
        assert!(text.contains("content:3"));
    }

    #[test]
    fn test_format_preview() {
        let lines = vec![PreviewLine {
            indent: 1,
            id: RecordId::new("pages", 2),
            title: "About".to_string(),
            is_page: true,
            relation_level: 0,
            warnings: vec![],
        }];
        let text = format_preview(&lines);
        assert_eq!(text, "  * [pages:2] About\n");
    }
}

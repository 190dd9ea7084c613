//! End-of-run summary printed with `--summary`.
//!
//! The per-file log lines remain the record of a run; this is only a
//! human-friendly recap grouped by extension.

use crate::file_organizer::RunReport;
use colored::*;
use std::collections::BTreeMap;
use std::fmt::Write;

pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints the summary table, then any failures.
    pub fn summary(report: &RunReport) {
        println!("{}", Self::render_summary(report));

        if !report.failed.is_empty() {
            eprintln!(
                "{} {} could not be moved:",
                "✗".red(),
                plural(report.failed.len())
            );
            for failed in &report.failed {
                eprintln!("    - {}: {}", failed.path.display(), failed.reason);
            }
        }
    }

    /// Renders the per-extension table and the trailing notices.
    pub fn render_summary(report: &RunReport) -> String {
        let title = if report.dry_run {
            "DRY RUN SUMMARY"
        } else {
            "SUMMARY"
        };
        let mut out = Self::render_table(title, &report.counts_by_extension(), report.moved.len());

        if report.skipped > 0 {
            let _ = write!(
                out,
                "\n{} {} left untouched by filters",
                "⚠".yellow(),
                plural(report.skipped)
            );
        }
        if report.cancelled {
            let _ = write!(out, "\n{} Run interrupted before all files were processed", "⚠".yellow());
        }
        if report.dry_run {
            let _ = write!(out, "\n{}", "[DRY RUN] No files were modified.".yellow());
        }
        out
    }

    fn render_table(title: &str, counts: &BTreeMap<String, usize>, total: usize) -> String {
        let width = counts
            .keys()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max("Extension".len());

        let mut out = String::new();
        let _ = writeln!(out, "\n{}", title.bold());
        let _ = writeln!(
            out,
            "{:<width$} | {}",
            "Extension".bold(),
            "Files".bold(),
            width = width
        );
        let _ = writeln!(out, "{}", "-".repeat(width + 10));

        for (extension, count) in counts {
            let _ = writeln!(
                out,
                "{:<width$} | {}",
                extension,
                count.to_string().green(),
                width = width
            );
        }

        let _ = writeln!(out, "{}", "-".repeat(width + 10));
        let _ = write!(
            out,
            "{:<width$} | {}",
            "Total".bold(),
            plural(total).green().bold(),
            width = width
        );
        out
    }
}

fn plural(count: usize) -> String {
    if count == 1 {
        "1 file".to_string()
    } else {
        format!("{} files", count)
    }
}

//! Terminal output helpers.
//!
//! Everything user-facing goes through [`Output`] so colors and layout stay
//! consistent between commands. Logs go through tracing instead.

use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, CellAlignment, Table};
use ferry_core::StageReport;
use owo_colors::OwoColorize;

#[derive(Debug, Clone, Default)]
pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", "✓".bright_green(), message.bold());
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "✗".bright_red(), message.bright_red());
    }

    pub fn warning(&self, message: &str) {
        eprintln!("{} {}", "!".bright_yellow(), message.yellow());
    }

    pub fn status(&self, message: &str) {
        println!("  {}", message.dimmed());
    }

    pub fn info(&self, label: &str, value: &str) {
        println!("{} {}", label.bright_cyan(), value);
    }

    pub fn section(&self, title: &str) {
        println!();
        println!("{}", title.bold().underline());
    }

    pub fn kv(&self, key: &str, value: &str) {
        println!("  {:<18} {}", format!("{key}:").dimmed(), value);
    }

    pub fn list_item(&self, item: &str) {
        println!("  {} {}", "•".dimmed(), item);
    }

    /// Print a converted body verbatim between rules.
    pub fn markup(&self, body: &str) {
        println!("{}", "─".repeat(40).dimmed());
        println!("{body}");
        println!("{}", "─".repeat(40).dimmed());
    }

    /// One row per stage.
    pub fn reports(&self, reports: &[StageReport]) {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED).set_header(vec![
            "stage",
            "seen",
            "created",
            "already imported",
            "duplicates",
            "fallbacks",
            "inspected",
            "skipped",
        ]);

        for report in reports {
            let number = |n: usize| Cell::new(n).set_alignment(CellAlignment::Right);
            let mut stage = report.stage.to_string();
            if report.stopped {
                stage.push_str(" (stopped)");
            }
            table.add_row(vec![
                Cell::new(stage),
                number(report.seen),
                number(report.created),
                number(report.already_imported),
                number(report.duplicates),
                number(report.fallbacks),
                number(report.inspected),
                number(report.skipped.len()),
            ]);
        }

        println!("{table}");
    }

    /// Skipped records, capped at `limit` per stage.
    pub fn skipped(&self, reports: &[StageReport], limit: usize) {
        for report in reports.iter().filter(|r| !r.skipped.is_empty()) {
            self.section(&format!("Skipped {}", report.stage));
            for skipped in report.skipped.iter().take(limit) {
                self.list_item(&format!("{}: {}", skipped.source_id.bright_white(), skipped.reason));
            }
            if report.skipped.len() > limit {
                self.status(&format!("... and {} more", report.skipped.len() - limit));
            }
        }
    }
}

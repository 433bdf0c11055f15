//! Cargo-style pass summary for one-shot syncs
//!
//! ```text
//!      Synced 3 copied, 1 updated, 2 deleted, 12 up to date (1.21 MiB) in 14ms
//!   Unchanged 12 files up to date in 2ms
//!    Finished 3 copied, 0 updated, 0 deleted, 12 up to date, 1 failed in 9ms
//! ```

use std::io::Write as _;
use std::time::Instant;

use treemirror_core::SyncReport;

/// Status verbs for cargo-style output (right-aligned to 12 chars)
struct Status;

impl Status {
    const SYNCED: &str = "Synced";
    const UNCHANGED: &str = "Unchanged";
    const FINISHED: &str = "Finished";
}

/// Print a cargo-style status line
fn print_status(status: &str, style: &console::Style, message: &str) {
    let mut term = console::Term::stderr();
    let _ = writeln!(term, "{:>12} {}", style.apply_to(status), message);
}

/// Times one pass and prints its outcome
pub struct PassSummary {
    start: Instant,
}

impl PassSummary {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    fn elapsed(&self) -> String {
        let elapsed = self.start.elapsed();
        if elapsed.as_secs() >= 1 {
            format!("{:.2}s", elapsed.as_secs_f64())
        } else {
            format!("{}ms", elapsed.as_millis())
        }
    }

    /// Show the final summary; `failures` is the number of entries that failed
    pub fn finish(&self, report: &SyncReport, failures: usize) {
        let elapsed = self.elapsed();
        let message = describe(report, failures);

        if failures > 0 {
            let style = console::Style::new().yellow().bold();
            print_status(Status::FINISHED, &style, &format!("{message} in {elapsed}"));
        } else if report.mutations() == 0 {
            let style = console::Style::new().green().bold();
            print_status(
                Status::UNCHANGED,
                &style,
                &format!("{} files up to date in {elapsed}", report.up_to_date),
            );
        } else {
            let style = console::Style::new().green().bold();
            print_status(Status::SYNCED, &style, &format!("{message} in {elapsed}"));
        }
    }
}

impl Default for PassSummary {
    fn default() -> Self {
        Self::new()
    }
}

/// One-line description of a report
fn describe(report: &SyncReport, failures: usize) -> String {
    let copied = report.files_copied + report.directories_copied;
    let deleted = report.files_deleted + report.directories_deleted;
    let mut message = format!(
        "{copied} copied, {} updated, {deleted} deleted",
        report.files_updated
    );
    if report.entries_replaced > 0 {
        message.push_str(&format!(", {} replaced", report.entries_replaced));
    }
    message.push_str(&format!(", {} up to date", report.up_to_date));
    if failures > 0 {
        message.push_str(&format!(", {failures} failed"));
    }
    if report.bytes_copied > 0 {
        let size = humansize::format_size(report.bytes_copied, humansize::BINARY);
        message.push_str(&format!(" ({size})"));
    }
    message
}

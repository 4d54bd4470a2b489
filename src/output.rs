//! Output formatting and styling module.
//!
//! Provides a centralized interface for all CLI output: colored status
//! messages, plan previews, the execution progress bar and summary tables.
//! Diagnostics do not belong here; they go through `tracing`.

use crate::plan::{Operation, OperationKind, Plan};
use crate::transaction::{ExecutionObserver, TxState};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::Path;

/// Manages all CLI output with consistent styling and formatting.
///
/// This struct provides methods for:
/// - Success messages (green with ✓)
/// - Error messages (red with ✗)
/// - Warning messages (yellow with ⚠)
/// - Info messages (cyan)
/// - Plan previews and progress bars
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tidyplan::output::OutputFormatter;
    /// OutputFormatter::success("Transaction committed");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints a notice that nothing was changed on disk.
    pub fn preview_notice(message: &str) {
        println!("{}", format!("[PREVIEW] {}", message).yellow());
    }

    /// Prints the banner shown when a rollback could not complete.
    pub fn manual_recovery(message: &str) {
        eprintln!();
        eprintln!("{}", "MANUAL INTERVENTION REQUIRED".red().bold());
        eprintln!("{}", message.red());
        eprintln!(
            "{}",
            "Compare the directory against the audit log before running anything else.".red()
        );
    }

    /// Creates and returns a progress bar for plan execution.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tidyplan::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(100);
    /// pb.inc(1);
    /// pb.finish_with_message("Completed!");
    /// ```
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb
    }

    /// Prints every operation of `plan`, with paths shown relative to `root`.
    pub fn plan_preview(plan: &Plan, root: &Path) {
        Self::header(&format!("PLAN {}", plan.plan_id()));

        if let Some(reason) = plan.reason() {
            Self::error(&format!("Plan aborted: {}", reason));
            return;
        }
        if plan.is_empty() {
            Self::info("Nothing to do: no file matched the intent.");
            return;
        }

        for (index, operation) in plan.operations().iter().enumerate() {
            println!(
                "{:>4}. {}",
                (index + 1).to_string().dimmed(),
                Self::describe(operation, root)
            );
        }

        Self::summary_table(&plan.summary(), plan.operations().len());
    }

    fn describe(operation: &Operation, root: &Path) -> String {
        let shown = |path: &Path| {
            path.strip_prefix(root)
                .unwrap_or(path)
                .display()
                .to_string()
        };
        let label = format!("{:<6}", operation.kind.name()).bold();

        let mut line = match &operation.kind {
            OperationKind::Mkdir { destination } => {
                format!("{} {}/", label.blue(), shown(destination))
            }
            OperationKind::Move {
                source,
                destination,
            }
            | OperationKind::Copy {
                source,
                destination,
            }
            | OperationKind::Rename {
                source,
                destination,
            } => format!("{} {} → {}", label.green(), shown(source), shown(destination)),
        };

        if !operation.risk_flags.is_empty() {
            let flags: Vec<&str> = operation.risk_flags.iter().map(String::as_str).collect();
            line.push_str(&format!(" {}", format!("[{}]", flags.join(", ")).yellow()));
        }
        line
    }

    /// Prints a summary table of operation counts per type.
    pub fn summary_table(counts: &BTreeMap<&'static str, usize>, total: usize) {
        Self::header("SUMMARY");

        let width = counts
            .keys()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max(9);

        println!("{:<width$} | {}", "Operation".bold(), "Count".bold(), width = width);
        println!("{}", "-".repeat(width + 10));
        for (name, count) in counts {
            println!("{:<width$} | {}", name, count.to_string().green(), width = width);
        }
        println!("{}", "-".repeat(width + 10));
        println!(
            "{:<width$} | {}",
            "Total".bold(),
            total.to_string().green().bold(),
            width = width
        );
    }
}

/// Drives a progress bar from transaction callbacks.
#[derive(Default)]
pub struct ProgressObserver {
    bar: Option<ProgressBar>,
}

impl ProgressObserver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutionObserver for ProgressObserver {
    fn started(&mut self, total: usize) {
        self.bar = Some(OutputFormatter::create_progress_bar(total as u64));
    }

    fn operation_done(&mut self, _index: usize, operation: &Operation) {
        if let Some(bar) = &self.bar {
            bar.set_message(operation.kind.name());
            bar.inc(1);
        }
    }

    fn state_changed(&mut self, state: TxState) {
        let Some(bar) = &self.bar else {
            return;
        };
        match state {
            TxState::Committed => bar.finish_with_message("committed"),
            TxState::RollingBack => bar.set_message("rolling back"),
            TxState::Failed => bar.abandon_with_message("rolled back"),
            _ => {}
        }
    }
}

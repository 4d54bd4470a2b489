//! Command-line interface module for tidyplan.
//!
//! This module handles all CLI-related functionality including:
//! - Argument parsing
//! - Logging setup
//! - Plan preview and confirmation
//! - Dispatch into the planning and execution pipeline

use crate::audit::AuditLogger;
use crate::config::Settings;
use crate::error::{Abort, Error};
use crate::output::{OutputFormatter, ProgressObserver};
use crate::pipeline::{self, AutoApprove, ConfirmGate, ExecutionOutcome, Intent, RunOutcome};
use crate::plan::Plan;
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use dialoguer::console::Term;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "TIDYPLAN_LOG";

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to .tidyplanrc.toml, then ~/.config/tidyplan/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Audit log file, overriding the configured one
    #[arg(long, global = true)]
    pub audit_log: Option<PathBuf>,

    /// Increase diagnostic output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build and preview a plan without changing anything
    Plan {
        /// Approved root directory
        root: PathBuf,
        /// Intent JSON file
        #[arg(short, long)]
        intent: PathBuf,
        /// Save the plan as JSON for a later `apply`
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Execute a previously saved plan
    Apply {
        root: PathBuf,
        /// Plan JSON file written by `plan --out`
        #[arg(short, long)]
        plan: PathBuf,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Plan, preview, confirm and execute in one go
    Run {
        root: PathBuf,
        #[arg(short, long)]
        intent: PathBuf,
        #[arg(short, long)]
        yes: bool,
    },
}

/// Installs the stderr `tracing` subscriber.
///
/// `-v` flags take precedence over the environment filter.
pub fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// Runs the parsed command line.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use tidyplan::cli::{Cli, run};
///
/// let cli = Cli::parse_from(["tidyplan", "plan", "/home/me/Downloads", "--intent", "intent.json"]);
/// if let Err(e) = run(cli) {
///     eprintln!("Error: {}", e);
/// }
/// ```
pub fn run(cli: Cli) -> Result<(), Error> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(audit_log) = cli.audit_log {
        settings.audit.path = audit_log;
    }

    match cli.command {
        Command::Plan { root, intent, out } => {
            let plan = plan_and_preview(&root, &intent, &settings)?;
            match out {
                Some(out) => {
                    let json = plan.to_json_pretty().map_err(|e| Error::Io {
                        action: "serialize plan to",
                        path: out.clone(),
                        source: e.into(),
                    })?;
                    fs::write(&out, json).map_err(|source| Error::Io {
                        action: "write",
                        path: out.clone(),
                        source,
                    })?;
                    OutputFormatter::success(&format!("Plan saved to {}", out.display()));
                }
                None => OutputFormatter::preview_notice("No changes were made."),
            }
            Ok(())
        }
        Command::Apply { root, plan, yes } => {
            let json = fs::read_to_string(&plan).map_err(|source| Error::Io {
                action: "read",
                path: plan.clone(),
                source,
            })?;
            let plan = Plan::from_json(&json)?;
            OutputFormatter::plan_preview(&plan, &display_root(&root));
            execute(&plan, &root, yes, &settings)
        }
        Command::Run { root, intent, yes } => {
            let plan = plan_and_preview(&root, &intent, &settings)?;
            execute(&plan, &root, yes, &settings)
        }
    }
}

fn plan_and_preview(root: &Path, intent_path: &Path, settings: &Settings) -> Result<Plan, Error> {
    let json = fs::read_to_string(intent_path).map_err(|source| Error::Io {
        action: "read",
        path: intent_path.to_path_buf(),
        source,
    })?;
    let intent = Intent::from_json(&json)?;

    match pipeline::plan(root, &intent, settings)? {
        RunOutcome::Planned(plan) => {
            OutputFormatter::plan_preview(&plan, &display_root(root));
            Ok(plan)
        }
        RunOutcome::Aborted { aborted, reason } => {
            let json = serde_json::json!({ "aborted": aborted, "reason": reason });
            OutputFormatter::plain(&json.to_string());
            Err(Abort::new(reason).into())
        }
    }
}

/// Canonical root for stripping plan paths in previews.
fn display_root(root: &Path) -> PathBuf {
    fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf())
}

fn execute(plan: &Plan, root: &Path, yes: bool, settings: &Settings) -> Result<(), Error> {
    if plan.is_empty() && !plan.is_aborted() {
        return Ok(());
    }

    let mut audit = AuditLogger::open(&settings.audit.path)?;
    let mut observer = ProgressObserver::new();
    let mut gate: Box<dyn ConfirmGate> = if yes {
        Box::new(AutoApprove)
    } else {
        Box::new(TerminalGate::new())
    };

    match pipeline::execute(plan, root, gate.as_mut(), &mut audit, &mut observer, settings)? {
        ExecutionOutcome::Committed { applied } => {
            OutputFormatter::success(&format!(
                "Committed {} operation{}. Audit log: {}",
                applied,
                if applied == 1 { "" } else { "s" },
                audit.path().display()
            ));
        }
        ExecutionOutcome::Cancelled => {
            OutputFormatter::warning("Cancelled. No changes were made.");
        }
    }
    Ok(())
}

/// Asks on the terminal, defaulting to no.
///
/// Anything but an explicit yes cancels, including a missing terminal.
struct TerminalGate {
    term: Term,
}

impl TerminalGate {
    fn new() -> Self {
        Self {
            term: Term::stderr(),
        }
    }
}

impl ConfirmGate for TerminalGate {
    fn confirm(&mut self, plan: &Plan) -> bool {
        Confirm::new()
            .with_prompt(format!("Apply {} operation(s)?", plan.operations().len()))
            .default(false)
            .interact_on(&self.term)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_subcommands_and_global_flags() {
        let cli = Cli::parse_from([
            "tidyplan",
            "-vv",
            "run",
            "/data",
            "--intent",
            "intent.json",
            "--yes",
            "--audit-log",
            "/logs/audit.jsonl",
        ]);

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.audit_log, Some(PathBuf::from("/logs/audit.jsonl")));
        match cli.command {
            Command::Run { root, intent, yes } => {
                assert_eq!(root, PathBuf::from("/data"));
                assert_eq!(intent, PathBuf::from("intent.json"));
                assert!(yes);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_terminal_gate_cancels_without_a_terminal() {
        let input = tempfile::tempfile().unwrap();
        let output = tempfile::tempfile().unwrap();
        let mut gate = TerminalGate {
            term: Term::read_write_pair(input, output),
        };

        let plan = Plan::new("snap", vec![crate::plan::Operation::mkdir("/data/Pics")]);
        assert!(!gate.confirm(&plan));
    }

    #[test]
    fn test_apply_requires_plan_file() {
        assert!(Cli::try_parse_from(["tidyplan", "apply", "/data"]).is_err());
    }
}

//! tidyplan - safe, reviewable and reversible file organization
//!
//! This library snapshots an approved directory, turns a declarative intent
//! (classification rules or high-level actions) into a plan of filesystem
//! operations, and applies that plan as a single transaction: every step is
//! audited, and any failure rolls the tree back to where it started.
//! System directories are refused at every stage.

pub mod actions;
pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod guard;
pub mod output;
pub mod pipeline;
pub mod plan;
pub mod rollback;
pub mod rules;
pub mod snapshot;
pub mod transaction;
pub mod validator;

pub use actions::{Action, ActionTranslator};
pub use audit::{AuditLogger, AuditRecord, AuditStatus};
pub use config::{CompiledFilters, FilterRules, Settings};
pub use error::{
    Abort, AuditError, ConfigError, Error, ExecutionError, IntentError, Result, RollbackError,
    ValidationRejection,
};
pub use executor::{Executor, UndoAction, UndoStep};
pub use guard::PathGuard;
pub use pipeline::{AutoApprove, ConfirmGate, ExecutionOutcome, Intent, RunOutcome};
pub use plan::{Operation, OperationKind, Plan, Planner};
pub use rollback::RollbackEngine;
pub use rules::{PrefixMatch, Rule, RuleEngine};
pub use snapshot::{FileMeta, Snapshot, SnapshotBuilder};
pub use transaction::{ExecutionObserver, TransactionController, TxState};
pub use validator::{PlanValidator, SafetyGatekeeper};

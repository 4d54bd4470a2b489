//! Runs a validated plan as one all-or-nothing transaction.
//!
//! ```text
//! Validating -> SafetyChecking -> Executing -> Committed
//!                                     |
//!                                     +-> RollingBack -> Failed
//! ```
//!
//! A controller is consumed by [`TransactionController::execute`], so a
//! transaction can never be re-entered or resumed.

use crate::audit::{AuditLogger, AuditRecord, AuditStatus};
use crate::error::Error;
use crate::executor::{Executor, UndoAction};
use crate::plan::{Operation, Plan};
use crate::rollback::RollbackEngine;
use crate::validator::{PlanValidator, SafetyGatekeeper};
use std::fmt;
use tracing::{debug, error, info, warn};

/// Stage of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Validating,
    SafetyChecking,
    Executing,
    RollingBack,
    Committed,
    Failed,
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxState::Validating => "validating",
            TxState::SafetyChecking => "safety checking",
            TxState::Executing => "executing",
            TxState::RollingBack => "rolling back",
            TxState::Committed => "committed",
            TxState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Receives progress while a transaction runs. Every method defaults to a no-op.
pub trait ExecutionObserver {
    fn state_changed(&mut self, _state: TxState) {}

    /// Called once execution starts, with the number of operations.
    fn started(&mut self, _total: usize) {}

    /// Called after operation `index` completed.
    fn operation_done(&mut self, _index: usize, _operation: &Operation) {}
}

impl ExecutionObserver for () {}

/// Drives one plan through validation, execution and, if needed, rollback.
pub struct TransactionController<'a> {
    validator: PlanValidator,
    audit: &'a mut AuditLogger,
    observer: &'a mut dyn ExecutionObserver,
    state: TxState,
    undo_stack: Vec<UndoAction>,
}

impl<'a> TransactionController<'a> {
    pub fn new(
        validator: PlanValidator,
        audit: &'a mut AuditLogger,
        observer: &'a mut dyn ExecutionObserver,
    ) -> Self {
        Self {
            validator,
            audit,
            observer,
            state: TxState::Validating,
            undo_stack: Vec::new(),
        }
    }

    /// Executes `plan` and returns the number of operations applied.
    ///
    /// Validation and safety failures are returned before anything is
    /// written. A failure during execution rolls back every completed
    /// operation, appends a FAILED record and returns the original error,
    /// or [`Error::RollbackFailed`] when the rollback could not finish.
    pub fn execute(mut self, plan: &Plan) -> Result<usize, Error> {
        self.transition(TxState::Validating);
        self.validator.validate(plan)?;

        self.transition(TxState::SafetyChecking);
        SafetyGatekeeper::check(plan)?;

        self.transition(TxState::Executing);
        self.observer.started(plan.operations().len());
        info!(plan_id = %plan.plan_id(), operations = plan.operations().len(), "transaction started");

        for (index, operation) in plan.operations().iter().enumerate() {
            if let Err(cause) = self.apply_logged(plan, index, operation) {
                return Err(self.fail(plan, index, operation, cause));
            }
        }

        self.transition(TxState::Committed);
        info!(plan_id = %plan.plan_id(), applied = self.undo_stack.len(), "transaction committed");
        Ok(self.undo_stack.len())
    }

    fn apply_logged(
        &mut self,
        plan: &Plan,
        index: usize,
        operation: &Operation,
    ) -> Result<(), Error> {
        self.audit.log(&record(plan, index, operation, AuditStatus::Pending))?;

        let undo = Executor::apply(operation).map_err(|source| Error::Execution { index, source })?;
        self.undo_stack.push(undo);

        self.audit.log(&record(plan, index, operation, AuditStatus::Done))?;
        debug!(plan_id = %plan.plan_id(), index, kind = operation.kind.name(), "operation done");
        self.observer.operation_done(index, operation);
        Ok(())
    }

    fn fail(mut self, plan: &Plan, index: usize, operation: &Operation, cause: Error) -> Error {
        error!(plan_id = %plan.plan_id(), index, error = %cause, "operation failed");

        self.transition(TxState::RollingBack);
        let undo_stack = std::mem::take(&mut self.undo_stack);
        let outcome = match RollbackEngine::rollback(undo_stack) {
            Ok(()) => cause,
            Err(rollback) => {
                error!(plan_id = %plan.plan_id(), error = %rollback, "rollback failed");
                Error::RollbackFailed {
                    cause: Box::new(cause),
                    rollback,
                }
            }
        };

        self.transition(TxState::Failed);
        let failed = record(plan, index, operation, AuditStatus::Failed).error(&outcome);
        if let Err(e) = self.audit.log(&failed) {
            warn!(plan_id = %plan.plan_id(), error = %e, "could not record failure in audit log");
        }
        outcome
    }

    fn transition(&mut self, state: TxState) {
        debug!(from = %self.state, to = %state, "transaction state");
        self.state = state;
        self.observer.state_changed(state);
    }
}

fn record(plan: &Plan, index: usize, operation: &Operation, status: AuditStatus) -> AuditRecord {
    AuditRecord::new(plan.plan_id(), status).operation(
        index,
        operation.source(),
        operation.destination(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        states: Vec<TxState>,
        done: Vec<usize>,
    }

    impl ExecutionObserver for Recorder {
        fn state_changed(&mut self, state: TxState) {
            self.states.push(state);
        }

        fn operation_done(&mut self, index: usize, _operation: &Operation) {
            self.done.push(index);
        }
    }

    struct Setup {
        root_dir: TempDir,
        log_dir: TempDir,
    }

    impl Setup {
        fn new(files: &[&str]) -> Self {
            let root_dir = TempDir::new().expect("Failed to create temp directory");
            for name in files {
                fs::write(root_dir.path().join(name), name).unwrap();
            }
            Self {
                root_dir,
                log_dir: TempDir::new().expect("Failed to create temp directory"),
            }
        }

        fn root(&self) -> std::path::PathBuf {
            fs::canonicalize(self.root_dir.path()).unwrap()
        }

        fn run(&self, plan: &Plan, observer: &mut dyn ExecutionObserver) -> Result<usize, Error> {
            let mut audit = AuditLogger::open(self.log_dir.path().join("audit.jsonl")).unwrap();
            let validator = PlanValidator::new(self.root_dir.path()).unwrap();
            TransactionController::new(validator, &mut audit, observer).execute(plan)
        }

        fn audit(&self) -> Vec<AuditRecord> {
            AuditLogger::read(&self.log_dir.path().join("audit.jsonl")).unwrap_or_default()
        }
    }

    #[test]
    fn test_commit_walks_states_in_order() {
        let setup = Setup::new(&["a.txt"]);
        let root = setup.root();
        let plan = Plan::new(
            "snap",
            vec![
                Operation::mkdir(root.join("Docs")),
                Operation::move_file(root.join("a.txt"), root.join("Docs/a.txt")),
            ],
        );

        let mut recorder = Recorder::default();
        let applied = setup.run(&plan, &mut recorder).unwrap();

        assert_eq!(applied, 2);
        assert_eq!(
            recorder.states,
            vec![
                TxState::Validating,
                TxState::SafetyChecking,
                TxState::Executing,
                TxState::Committed
            ]
        );
        assert_eq!(recorder.done, vec![0, 1]);
        assert!(root.join("Docs/a.txt").exists());

        let statuses: Vec<_> = setup.audit().iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                AuditStatus::Pending,
                AuditStatus::Done,
                AuditStatus::Pending,
                AuditStatus::Done
            ]
        );
    }

    #[test]
    fn test_failure_rolls_back_and_records_failed() {
        let setup = Setup::new(&["a.txt"]);
        let root = setup.root();
        let plan = Plan::new(
            "snap",
            vec![
                Operation::move_file(root.join("a.txt"), root.join("Docs/a.txt")),
                Operation::move_file(root.join("ghost.txt"), root.join("Docs/ghost.txt")),
            ],
        );

        let mut recorder = Recorder::default();
        let err = setup.run(&plan, &mut recorder).unwrap_err();

        assert!(matches!(err, Error::Execution { index: 1, .. }));
        assert_eq!(
            &recorder.states[2..],
            &[TxState::Executing, TxState::RollingBack, TxState::Failed]
        );
        assert!(root.join("a.txt").exists());
        assert!(!root.join("Docs").exists());

        let records = setup.audit();
        let statuses: Vec<_> = records.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                AuditStatus::Pending,
                AuditStatus::Done,
                AuditStatus::Pending,
                AuditStatus::Failed
            ]
        );
        assert_eq!(records[3].operation_index, Some(1));
        assert!(records[3].error.as_deref().unwrap().contains("ghost.txt"));
    }

    #[test]
    fn test_rejection_writes_nothing() {
        let setup = Setup::new(&["a.txt", "b.txt"]);
        let root = setup.root();
        let plan = Plan::new(
            "snap",
            vec![
                Operation::move_file(root.join("a.txt"), root.join("x.txt")),
                Operation::move_file(root.join("b.txt"), root.join("x.txt")),
            ],
        );

        let err = setup.run(&plan, &mut ()).unwrap_err();
        assert!(matches!(err, Error::Rejected(_)));
        assert!(root.join("a.txt").exists());
        assert!(setup.audit().is_empty());
    }

    struct Saboteur(std::path::PathBuf);

    impl ExecutionObserver for Saboteur {
        fn operation_done(&mut self, index: usize, _operation: &Operation) {
            if index == 1 {
                fs::remove_file(&self.0).unwrap();
            }
        }
    }

    #[test]
    fn test_rollback_failure_surfaces_both_errors() {
        let setup = Setup::new(&["a.txt", "d.txt"]);
        let root = setup.root();
        let plan = Plan::new(
            "snap",
            vec![
                Operation::copy(root.join("d.txt"), root.join("e.txt")),
                Operation::rename(root.join("a.txt"), root.join("f.txt")),
                Operation::mkdir(root.join("e.txt")),
            ],
        );

        // f.txt disappears behind the transaction's back, so undoing the
        // rename fails and rollback stops before the copy is removed.
        let err = setup
            .run(&plan, &mut Saboteur(root.join("f.txt")))
            .unwrap_err();

        assert!(err.needs_manual_recovery());
        let Error::RollbackFailed { cause, rollback } = &err else {
            panic!("expected a rollback failure, got {err}");
        };
        assert!(matches!(**cause, Error::Execution { index: 2, .. }));
        assert!(matches!(rollback, crate::error::RollbackError::SourceMissing { .. }));
        assert!(root.join("e.txt").exists());

        let last = setup.audit().pop().unwrap();
        assert_eq!(last.status, AuditStatus::Failed);
        assert!(last.error.unwrap().contains("manual inspection"));
    }
}

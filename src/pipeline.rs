//! End-to-end entry points: intent to plan, plan to committed changes.
//!
//! [`plan`] never writes. [`execute`] asks a [`ConfirmGate`] before handing
//! the plan to a [`TransactionController`].

use crate::actions::Action;
use crate::audit::AuditLogger;
use crate::config::Settings;
use crate::error::{Error, IntentError};
use crate::plan::{Plan, Planner};
use crate::rules::{Rule, rules_from_targets};
use crate::snapshot::SnapshotBuilder;
use crate::transaction::{ExecutionObserver, TransactionController};
use crate::validator::PlanValidator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// What the intent producer asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// High-level actions (`{"actions": [...]}`).
    Actions(Vec<Action>),
    /// Explicit classification rules (`{"rules": [...]}`).
    Rules(Vec<Rule>),
    /// Extension to target directory map (`{"targets": {...}}`), scoped to the root.
    Targets(BTreeMap<String, String>),
}

impl Intent {
    /// Parses an intent document.
    ///
    /// `actions` wins when present; otherwise `rules`, then `targets`, select
    /// rule mode.
    ///
    /// # Examples
    ///
    /// ```
    /// use tidyplan::pipeline::Intent;
    ///
    /// let intent = Intent::from_json(
    ///     r#"{"actions": [{"type": "mkdir", "path": "Pics"}]}"#,
    /// ).unwrap();
    /// assert!(matches!(intent, Intent::Actions(ref a) if a.len() == 1));
    /// ```
    pub fn from_json(json: &str) -> Result<Self, IntentError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| IntentError::Malformed(e.to_string()))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, IntentError> {
        let Value::Object(fields) = value else {
            return Err(IntentError::Malformed(
                "intent must be a JSON object".to_string(),
            ));
        };

        if let Some(actions) = fields.get("actions") {
            return Action::list_from_value(actions).map(Intent::Actions);
        }

        if let Some(rules) = fields.get("rules") {
            let rules: Vec<Rule> = serde_json::from_value(rules.clone())
                .map_err(|e| IntentError::Malformed(format!("invalid rules: {}", e)))?;
            if rules.is_empty() {
                return Err(IntentError::Malformed("'rules' must not be empty".to_string()));
            }
            return Ok(Intent::Rules(rules.into_iter().map(Rule::normalized).collect()));
        }

        if let Some(targets) = fields.get("targets") {
            let targets = serde_json::from_value(targets.clone())
                .map_err(|e| IntentError::Malformed(format!("invalid targets: {}", e)))?;
            return Ok(Intent::Targets(targets));
        }

        Err(IntentError::Malformed(
            "intent needs 'actions', 'rules' or 'targets'".to_string(),
        ))
    }
}

/// Result of the planning stage.
///
/// Serializes as the plan itself, or as `{"aborted": true, "reason": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunOutcome {
    Planned(Plan),
    Aborted { aborted: bool, reason: String },
}

impl RunOutcome {
    pub fn aborted(reason: impl Into<String>) -> Self {
        RunOutcome::Aborted {
            aborted: true,
            reason: reason.into(),
        }
    }

    pub fn plan(&self) -> Option<&Plan> {
        match self {
            RunOutcome::Planned(plan) => Some(plan),
            RunOutcome::Aborted { .. } => None,
        }
    }

    pub fn into_plan(self) -> Option<Plan> {
        match self {
            RunOutcome::Planned(plan) => Some(plan),
            RunOutcome::Aborted { .. } => None,
        }
    }
}

/// Snapshots `root` and turns `intent` into a plan.
///
/// Safety aborts (forbidden or escaping paths, ambiguous classification) come
/// back as [`RunOutcome::Aborted`]. Malformed intents and bad filter
/// configuration are errors.
pub fn plan(root: &Path, intent: &Intent, settings: &Settings) -> Result<RunOutcome, Error> {
    let snapshot = match SnapshotBuilder::build(root) {
        Ok(snapshot) => snapshot,
        Err(abort) => {
            warn!(root = %root.display(), reason = %abort, "snapshot aborted");
            return Ok(RunOutcome::aborted(abort.reason));
        }
    };

    let planner = Planner::new()
        .with_filters(settings.filters.compile()?)
        .with_prefix_match(settings.classification.prefix_match);

    let generated = match intent {
        Intent::Actions(actions) => Ok(planner.from_actions(&snapshot, actions)?),
        Intent::Rules(rules) => planner.generate(&snapshot, rules),
        Intent::Targets(targets) => {
            let rules = rules_from_targets(targets, snapshot.root())?;
            planner.generate(&snapshot, &rules)
        }
    };

    match generated {
        Ok(plan) => Ok(RunOutcome::Planned(plan)),
        Err(abort) => {
            warn!(snapshot_id = %snapshot.snapshot_id(), reason = %abort, "planning aborted");
            Ok(RunOutcome::aborted(abort.reason))
        }
    }
}

/// The human decision between preview and execution.
pub trait ConfirmGate {
    /// Returns true to proceed with `plan`.
    fn confirm(&mut self, plan: &Plan) -> bool;
}

impl<F> ConfirmGate for F
where
    F: FnMut(&Plan) -> bool,
{
    fn confirm(&mut self, plan: &Plan) -> bool {
        self(plan)
    }
}

/// Approves every plan. For `--yes` and tests.
pub struct AutoApprove;

impl ConfirmGate for AutoApprove {
    fn confirm(&mut self, _plan: &Plan) -> bool {
        true
    }
}

/// How an execution request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Committed { applied: usize },
    Cancelled,
}

/// Validates `plan`, asks `gate`, then runs it as a transaction.
///
/// A plan that fails validation is rejected before the gate is asked.
/// Cancelling leaves the filesystem and the audit log untouched.
pub fn execute(
    plan: &Plan,
    root: &Path,
    gate: &mut dyn ConfirmGate,
    audit: &mut AuditLogger,
    observer: &mut dyn ExecutionObserver,
    settings: &Settings,
) -> Result<ExecutionOutcome, Error> {
    let validator =
        PlanValidator::new(root)?.refuse_risk_flags(settings.validation.refuse_risk_flags);
    validator.validate(plan)?;

    if !gate.confirm(plan) {
        info!(plan_id = %plan.plan_id(), "execution cancelled");
        return Ok(ExecutionOutcome::Cancelled);
    }

    let applied = TransactionController::new(validator, audit, observer).execute(plan)?;
    Ok(ExecutionOutcome::Committed { applied })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_intent_modes() {
        let actions = Intent::from_json(r#"{"actions": [{"type": "MKDIR", "path": "A"}]}"#).unwrap();
        assert!(matches!(actions, Intent::Actions(_)));

        let rules = Intent::from_json(
            r#"{"rules": [{"rule_id": "pdf", "extensions": ["PDF"], "path_prefix": "/x", "target": "Docs"}]}"#,
        )
        .unwrap();
        let Intent::Rules(rules) = rules else {
            panic!("expected rule mode");
        };
        assert!(rules[0].extensions.contains(".pdf"));

        let targets = Intent::from_json(r#"{"targets": {"pdf": "Documents/PDF"}}"#).unwrap();
        assert!(matches!(targets, Intent::Targets(ref t) if t.len() == 1));
    }

    #[test]
    fn test_malformed_intents() {
        assert!(Intent::from_json("not json").is_err());
        assert!(Intent::from_json("[]").is_err());
        assert!(Intent::from_json("{}").is_err());
        assert!(Intent::from_json(r#"{"actions": []}"#).is_err());
        assert!(Intent::from_json(r#"{"rules": []}"#).is_err());
        assert_eq!(
            Intent::from_json(r#"{"actions": [{"type": "DELETE"}]}"#).unwrap_err(),
            IntentError::UnknownAction("DELETE".to_string())
        );
    }

    #[test]
    fn test_aborted_outcome_serializes_flat() {
        let value = serde_json::to_value(RunOutcome::aborted("Forbidden system path: /etc")).unwrap();
        assert_eq!(
            value,
            json!({"aborted": true, "reason": "Forbidden system path: /etc"})
        );
    }

    #[test]
    fn test_missing_root_is_an_aborted_outcome() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let intent = Intent::Targets(BTreeMap::from([("pdf".to_string(), "Docs".to_string())]));

        let outcome = plan(&temp_dir.path().join("missing"), &intent, &Settings::default()).unwrap();
        assert!(outcome.plan().is_none());
    }

    #[test]
    fn test_cancel_changes_nothing() {
        let root = TempDir::new().expect("Failed to create temp directory");
        let logs = TempDir::new().expect("Failed to create temp directory");
        fs::write(root.path().join("a.pdf"), "a").unwrap();
        let intent = Intent::Targets(BTreeMap::from([("pdf".to_string(), "Docs".to_string())]));
        let settings = Settings::default();

        let planned = plan(root.path(), &intent, &settings).unwrap().into_plan().unwrap();
        let audit_path = logs.path().join("audit.jsonl");
        let mut audit = AuditLogger::open(&audit_path).unwrap();
        let mut deny = |_: &Plan| false;

        let outcome = execute(&planned, root.path(), &mut deny, &mut audit, &mut (), &settings).unwrap();

        assert_eq!(outcome, ExecutionOutcome::Cancelled);
        assert!(root.path().join("a.pdf").exists());
        assert!(!root.path().join("Docs").exists());
        assert!(AuditLogger::read(&audit_path).unwrap().is_empty());
    }
}

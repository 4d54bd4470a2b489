//! Plans: ordered, reviewable lists of filesystem operations.
//!
//! A [`Plan`] is produced by the [`Planner`] from a fresh snapshot and is
//! read-only afterwards. Operation order is execution order.

use crate::actions::{Action, ActionTranslator};
use crate::config::CompiledFilters;
use crate::error::{Abort, IntentError, ValidationRejection};
use crate::rules::{PrefixMatch, Rule, RuleEngine};
use crate::snapshot::Snapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// The concrete filesystem mutation an [`Operation`] performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum OperationKind {
    Mkdir { destination: PathBuf },
    Move { source: PathBuf, destination: PathBuf },
    Copy { source: PathBuf, destination: PathBuf },
    Rename { source: PathBuf, destination: PathBuf },
}

impl OperationKind {
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Mkdir { .. } => "MKDIR",
            OperationKind::Move { .. } => "MOVE",
            OperationKind::Copy { .. } => "COPY",
            OperationKind::Rename { .. } => "RENAME",
        }
    }

    pub fn source(&self) -> Option<&Path> {
        match self {
            OperationKind::Mkdir { .. } => None,
            OperationKind::Move { source, .. }
            | OperationKind::Copy { source, .. }
            | OperationKind::Rename { source, .. } => Some(source),
        }
    }

    pub fn destination(&self) -> &Path {
        match self {
            OperationKind::Mkdir { destination }
            | OperationKind::Move { destination, .. }
            | OperationKind::Copy { destination, .. }
            | OperationKind::Rename { destination, .. } => destination,
        }
    }
}

/// One planned filesystem mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(flatten)]
    pub kind: OperationKind,
    #[serde(default)]
    pub meta: BTreeMap<String, Value>,
    /// Markers asking for extra scrutiny. Empty unless an upstream producer sets them.
    #[serde(default)]
    pub risk_flags: BTreeSet<String>,
}

impl Operation {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            meta: BTreeMap::new(),
            risk_flags: BTreeSet::new(),
        }
    }

    pub fn mkdir(destination: impl Into<PathBuf>) -> Self {
        Self::new(OperationKind::Mkdir {
            destination: destination.into(),
        })
    }

    pub fn move_file(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self::new(OperationKind::Move {
            source: source.into(),
            destination: destination.into(),
        })
    }

    pub fn copy(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self::new(OperationKind::Copy {
            source: source.into(),
            destination: destination.into(),
        })
    }

    pub fn rename(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self::new(OperationKind::Rename {
            source: source.into(),
            destination: destination.into(),
        })
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn with_risk_flag(mut self, flag: impl Into<String>) -> Self {
        self.risk_flags.insert(flag.into());
        self
    }

    pub fn source(&self) -> Option<&Path> {
        self.kind.source()
    }

    pub fn destination(&self) -> &Path {
        self.kind.destination()
    }
}

/// An ordered set of pending operations derived from one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    plan_id: String,
    snapshot_id: String,
    generated_at: DateTime<Utc>,
    operations: Vec<Operation>,
    #[serde(default)]
    aborted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl Plan {
    /// Creates an executable plan with a fresh id and timestamp.
    pub fn new(snapshot_id: impl Into<String>, operations: Vec<Operation>) -> Self {
        Self {
            plan_id: Uuid::new_v4().to_string(),
            snapshot_id: snapshot_id.into(),
            generated_at: Utc::now(),
            operations,
            aborted: false,
            reason: None,
        }
    }

    /// Creates a plan that must never be executed.
    pub fn aborted(snapshot_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            aborted: true,
            reason: Some(reason.into()),
            ..Self::new(snapshot_id, Vec::new())
        }
    }

    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    pub fn snapshot_id(&self) -> &str {
        &self.snapshot_id
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Operation counts per type, for previews.
    pub fn summary(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for operation in &self.operations {
            *counts.entry(operation.kind.name()).or_insert(0) += 1;
        }
        counts
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Parses a plan produced elsewhere.
    ///
    /// Unknown operation types and missing fields are rejected here, before
    /// any validator sees the plan.
    pub fn from_json(json: &str) -> Result<Self, ValidationRejection> {
        serde_json::from_str(json)
            .map_err(|e| ValidationRejection::new(format!("malformed plan: {}", e)))
    }
}

/// Turns classification results into plans.
#[derive(Default)]
pub struct Planner {
    filters: CompiledFilters,
    prefix_match: PrefixMatch,
}

impl Planner {
    /// A planner that considers every snapshot file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Excludes files rejected by `filters` from every plan.
    pub fn with_filters(mut self, filters: CompiledFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_prefix_match(mut self, prefix_match: PrefixMatch) -> Self {
        self.prefix_match = prefix_match;
        self
    }

    /// Builds a MOVE plan from classification rules.
    ///
    /// Files no rule claims are left out. Each operation moves the file to
    /// `root/<rule target>/<file name>` and records the rule in `meta`.
    ///
    /// # Errors
    ///
    /// Aborts on the first ambiguously classified file.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tidyplan::plan::Planner;
    /// use tidyplan::rules::Rule;
    /// use tidyplan::snapshot::SnapshotBuilder;
    /// use std::path::Path;
    ///
    /// let snapshot = SnapshotBuilder::build(Path::new("/home/me/Downloads")).unwrap();
    /// let root = snapshot.root().to_string_lossy().to_string();
    /// let rules = vec![Rule::new("pdf_docs", ["pdf"], root, "Documents/PDF")];
    ///
    /// let plan = Planner::new().generate(&snapshot, &rules).unwrap();
    /// println!("{} operations", plan.operations().len());
    /// ```
    pub fn generate(&self, snapshot: &Snapshot, rules: &[Rule]) -> Result<Plan, Abort> {
        let engine = RuleEngine::new(rules.to_vec(), self.prefix_match);
        let mut operations = Vec::new();

        for file in snapshot.files() {
            if !self.filters.should_include(snapshot.relative_path(file)) {
                continue;
            }
            let Some(rule) = engine.classify(file)? else {
                continue;
            };

            let destination = snapshot.root().join(&rule.target).join(file.file_name());
            operations.push(
                Operation::move_file(file.path(), destination)
                    .with_meta("rule_id", rule.rule_id.clone())
                    .with_meta(
                        "classification_reason",
                        format!("extension == {}", file.extension()),
                    ),
            );
        }

        let plan = Plan::new(snapshot.snapshot_id(), operations);
        info!(plan_id = %plan.plan_id, operations = plan.operations.len(), "rule plan generated");
        Ok(plan)
    }

    /// Builds a plan from declarative actions.
    pub fn from_actions(&self, snapshot: &Snapshot, actions: &[Action]) -> Result<Plan, IntentError> {
        let operations = ActionTranslator::new(&self.filters).translate(snapshot, actions)?;
        let plan = Plan::new(snapshot.snapshot_id(), operations);
        info!(plan_id = %plan.plan_id, operations = plan.operations.len(), "action plan generated");
        Ok(plan)
    }
}

//! Pre-execution checks on a finished plan.
//!
//! [`PlanValidator`] re-verifies the structure and containment of a plan just
//! before a transaction starts. [`SafetyGatekeeper`] re-applies the system path
//! guard to every endpoint. Neither trusts any earlier pass.

use crate::error::{Abort, ValidationRejection};
use crate::guard::{PathGuard, resolve_lenient};
use crate::plan::{Operation, Plan};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Structural and containment checks against one approved root.
#[derive(Debug, Clone)]
pub struct PlanValidator {
    root: PathBuf,
    refuse_risk_flags: bool,
}

impl PlanValidator {
    /// Creates a validator for `approved_root`, which must exist.
    pub fn new(approved_root: &Path) -> Result<Self, Abort> {
        let root = fs::canonicalize(approved_root).map_err(|_| {
            Abort::new(format!(
                "Approved root does not exist or cannot be resolved: {}",
                approved_root.display()
            ))
        })?;
        Ok(Self {
            root,
            refuse_risk_flags: true,
        })
    }

    /// Whether operations carrying risk flags are rejected. On by default.
    pub fn refuse_risk_flags(mut self, refuse: bool) -> Self {
        self.refuse_risk_flags = refuse;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Checks `plan` and returns the first defect found.
    ///
    /// Rejected are: aborted plans, empty or relative endpoints, endpoints
    /// that are the root itself or resolve outside it, operations whose
    /// source equals their destination, repeated destinations, and (unless
    /// disabled) operations with risk flags.
    pub fn validate(&self, plan: &Plan) -> Result<(), ValidationRejection> {
        if plan.is_aborted() {
            return Err(ValidationRejection::new(format!(
                "plan {} was aborted: {}",
                plan.plan_id(),
                plan.reason().unwrap_or("no reason given")
            )));
        }

        let mut destinations: HashMap<PathBuf, usize> = HashMap::new();

        for (index, operation) in plan.operations().iter().enumerate() {
            let destination = self.contained(index, "destination", operation.destination())?;

            if let Some(source) = operation.source() {
                let source = self.contained(index, "source", source)?;
                if source == destination {
                    return Err(ValidationRejection::new(format!(
                        "operation {} ({}) has identical source and destination: {}",
                        index,
                        operation.kind.name(),
                        destination.display()
                    )));
                }
            }

            if let Some(first) = destinations.insert(destination.clone(), index) {
                return Err(ValidationRejection::new(format!(
                    "operations {} and {} share destination {}",
                    first,
                    index,
                    destination.display()
                )));
            }

            self.check_risk_flags(index, operation)?;
        }

        debug!(plan_id = %plan.plan_id(), operations = plan.operations().len(), "plan validated");
        Ok(())
    }

    /// Resolves `path` and requires it strictly inside the root.
    fn contained(
        &self,
        index: usize,
        role: &str,
        path: &Path,
    ) -> Result<PathBuf, ValidationRejection> {
        if path.as_os_str().is_empty() {
            return Err(ValidationRejection::new(format!(
                "operation {} has an empty {}",
                index, role
            )));
        }
        if !path.is_absolute() {
            return Err(ValidationRejection::new(format!(
                "operation {} {} is not absolute: {}",
                index,
                role,
                path.display()
            )));
        }

        let resolved = resolve_lenient(path).map_err(|e| {
            ValidationRejection::new(format!(
                "operation {} {} cannot be resolved ({}): {}",
                index,
                role,
                e,
                path.display()
            ))
        })?;

        if resolved == self.root || !resolved.starts_with(&self.root) {
            return Err(ValidationRejection::new(format!(
                "operation {} {} is outside approved root {}: {}",
                index,
                role,
                self.root.display(),
                path.display()
            )));
        }
        Ok(resolved)
    }

    fn check_risk_flags(
        &self,
        index: usize,
        operation: &Operation,
    ) -> Result<(), ValidationRejection> {
        if self.refuse_risk_flags && !operation.risk_flags.is_empty() {
            let flags: Vec<&str> = operation.risk_flags.iter().map(String::as_str).collect();
            return Err(ValidationRejection::new(format!(
                "operation {} carries risk flags: {}",
                index,
                flags.join(", ")
            )));
        }
        Ok(())
    }
}

/// Re-applies [`PathGuard`] to every operation endpoint.
pub struct SafetyGatekeeper;

impl SafetyGatekeeper {
    pub fn check(plan: &Plan) -> Result<(), Abort> {
        for operation in plan.operations() {
            if let Some(source) = operation.source() {
                PathGuard::check_endpoint(source)?;
            }
            PathGuard::check_endpoint(operation.destination())?;
        }
        debug!(plan_id = %plan.plan_id(), "safety check passed");
        Ok(())
    }
}

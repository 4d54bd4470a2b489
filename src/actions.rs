//! Declarative actions and their translation into concrete operations.
//!
//! Actions arrive from an external intent producer as JSON objects tagged with
//! a `type`. Translation does not touch the filesystem and does not judge
//! safety; it only expands intent against a snapshot.

use crate::config::CompiledFilters;
use crate::error::IntentError;
use crate::plan::Operation;
use crate::rules::normalize_extension;
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const KNOWN_ACTIONS: &[&str] = &["MKDIR", "MOVE", "COPY", "RENAME"];

/// A high-level request from the intent producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Action {
    Mkdir {
        #[serde(default)]
        path: String,
    },
    Move {
        #[serde(rename = "ext", default)]
        extensions: Vec<String>,
        #[serde(default)]
        target: String,
    },
    Copy {
        #[serde(rename = "ext", default)]
        extensions: Vec<String>,
        #[serde(default)]
        target: String,
    },
    Rename {
        #[serde(default)]
        from: String,
        #[serde(default)]
        to: String,
    },
}

impl Action {
    /// Parses one action object, matching its `type` case-insensitively.
    pub fn from_value(value: &Value) -> Result<Self, IntentError> {
        let Value::Object(fields) = value else {
            return Err(IntentError::Malformed(
                "action is not an object".to_string(),
            ));
        };

        let kind = fields
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| IntentError::Malformed("action missing 'type'".to_string()))?
            .trim()
            .to_uppercase();

        if !KNOWN_ACTIONS.contains(&kind.as_str()) {
            return Err(IntentError::UnknownAction(kind));
        }

        let mut normalized = fields.clone();
        normalized.insert("type".to_string(), Value::String(kind));
        serde_json::from_value(Value::Object(normalized))
            .map_err(|e| IntentError::Malformed(e.to_string()))
    }

    /// Parses a list of actions. The list must not be empty.
    pub fn list_from_value(value: &Value) -> Result<Vec<Self>, IntentError> {
        let items = value
            .as_array()
            .filter(|items| !items.is_empty())
            .ok_or_else(|| {
                IntentError::Malformed("'actions' must be a non-empty list".to_string())
            })?;
        items.iter().map(Self::from_value).collect()
    }
}

/// Expands actions into operations relative to a snapshot's root.
pub struct ActionTranslator<'a> {
    filters: &'a CompiledFilters,
}

impl<'a> ActionTranslator<'a> {
    pub fn new(filters: &'a CompiledFilters) -> Self {
        Self { filters }
    }

    /// Translates every action in order.
    ///
    /// MOVE and COPY expand to one operation per snapshot file whose extension
    /// is listed; the other actions yield exactly one operation each.
    ///
    /// # Errors
    ///
    /// Any action with missing fields fails the whole translation.
    pub fn translate(
        &self,
        snapshot: &Snapshot,
        actions: &[Action],
    ) -> Result<Vec<Operation>, IntentError> {
        let root = snapshot.root();
        let mut operations = Vec::new();

        for action in actions {
            match action {
                Action::Mkdir { path } => {
                    if path.trim().is_empty() {
                        return Err(IntentError::MissingField {
                            action: "MKDIR",
                            field: "path",
                        });
                    }
                    operations.push(Operation::mkdir(root.join(path)));
                }
                Action::Move { extensions, target } | Action::Copy { extensions, target } => {
                    let name = if matches!(action, Action::Move { .. }) {
                        "MOVE"
                    } else {
                        "COPY"
                    };
                    if extensions.is_empty() {
                        return Err(IntentError::MissingField {
                            action: name,
                            field: "ext",
                        });
                    }
                    if target.trim().is_empty() {
                        return Err(IntentError::MissingField {
                            action: name,
                            field: "target",
                        });
                    }

                    let wanted: Vec<String> =
                        extensions.iter().map(|e| normalize_extension(e)).collect();
                    let target_dir = root.join(target);

                    for file in snapshot.files() {
                        if !wanted.iter().any(|ext| ext == file.extension())
                            || !self.filters.should_include(snapshot.relative_path(file))
                        {
                            continue;
                        }
                        let destination = target_dir.join(file.file_name());
                        let operation = if name == "MOVE" {
                            Operation::move_file(file.path(), destination)
                        } else {
                            Operation::copy(file.path(), destination)
                        };
                        operations.push(operation);
                    }
                }
                Action::Rename { from, to } => {
                    if from.trim().is_empty() || to.trim().is_empty() {
                        return Err(IntentError::MissingField {
                            action: "RENAME",
                            field: "from/to",
                        });
                    }
                    operations.push(Operation::rename(root.join(from), root.join(to)));
                }
            }
        }

        Ok(operations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::OperationKind;
    use crate::snapshot::SnapshotBuilder;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn snapshot_with(files: &[&str]) -> (TempDir, Snapshot) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        for name in files {
            fs::write(temp_dir.path().join(name), name).unwrap();
        }
        let snapshot = SnapshotBuilder::build(temp_dir.path()).unwrap();
        (temp_dir, snapshot)
    }

    #[test]
    fn test_action_types_are_case_insensitive() {
        let action = Action::from_value(&json!({"type": " mkdir ", "path": "Pics"})).unwrap();
        assert_eq!(action, Action::Mkdir { path: "Pics".to_string() });

        let action =
            Action::from_value(&json!({"type": "Move", "ext": ["jpg"], "target": "Pics"})).unwrap();
        assert!(matches!(action, Action::Move { .. }));
    }

    #[test]
    fn test_unknown_action_is_an_error() {
        let err = Action::from_value(&json!({"type": "DELETE", "path": "x"})).unwrap_err();
        assert_eq!(err, IntentError::UnknownAction("DELETE".to_string()));

        let actions = json!([{"type": "MKDIR", "path": "A"}, {"type": "CHMOD"}]);
        assert!(Action::list_from_value(&actions).is_err());
    }

    #[test]
    fn test_action_list_must_be_non_empty() {
        assert!(Action::list_from_value(&json!([])).is_err());
        assert!(Action::list_from_value(&json!({"type": "MKDIR"})).is_err());
        assert!(Action::from_value(&json!("MKDIR")).is_err());
        assert!(Action::from_value(&json!({"path": "A"})).is_err());
    }

    #[test]
    fn test_scenario_mkdir_then_move() {
        let (_dir, snapshot) = snapshot_with(&["x.jpg", "notes.txt"]);
        let root = snapshot.root().to_path_buf();
        let actions = Action::list_from_value(&json!([
            {"type": "MKDIR", "path": "Pics"},
            {"type": "MOVE", "ext": ["jpg"], "target": "Pics"}
        ]))
        .unwrap();

        let filters = CompiledFilters::default();
        let operations = ActionTranslator::new(&filters)
            .translate(&snapshot, &actions)
            .unwrap();

        assert_eq!(
            operations.into_iter().map(|op| op.kind).collect::<Vec<_>>(),
            vec![
                OperationKind::Mkdir {
                    destination: root.join("Pics"),
                },
                OperationKind::Move {
                    source: root.join("x.jpg"),
                    destination: root.join("Pics").join("x.jpg"),
                },
            ]
        );
    }

    #[test]
    fn test_copy_matches_extensions_case_insensitively() {
        let (_dir, snapshot) = snapshot_with(&["a.JPG", "b.png", "c.txt"]);
        let actions = vec![Action::Copy {
            extensions: vec![".jpg".to_string(), "PNG".to_string()],
            target: "Backup".to_string(),
        }];

        let filters = CompiledFilters::default();
        let operations = ActionTranslator::new(&filters)
            .translate(&snapshot, &actions)
            .unwrap();

        assert_eq!(operations.len(), 2);
        assert!(operations
            .iter()
            .all(|op| matches!(op.kind, OperationKind::Copy { .. })));
    }

    #[test]
    fn test_rename_yields_single_operation() {
        let (_dir, snapshot) = snapshot_with(&["old.txt"]);
        let root = snapshot.root().to_path_buf();
        let actions = vec![Action::Rename {
            from: "old.txt".to_string(),
            to: "new.txt".to_string(),
        }];

        let filters = CompiledFilters::default();
        let operations = ActionTranslator::new(&filters)
            .translate(&snapshot, &actions)
            .unwrap();

        assert_eq!(
            operations[0].kind,
            OperationKind::Rename {
                source: root.join("old.txt"),
                destination: root.join("new.txt"),
            }
        );
    }

    #[test]
    fn test_missing_fields_fail_translation() {
        let (_dir, snapshot) = snapshot_with(&["a.jpg"]);
        let filters = CompiledFilters::default();
        let translator = ActionTranslator::new(&filters);

        let cases = vec![
            Action::Mkdir { path: String::new() },
            Action::Move {
                extensions: vec![],
                target: "Pics".to_string(),
            },
            Action::Copy {
                extensions: vec!["jpg".to_string()],
                target: String::new(),
            },
            Action::Rename {
                from: "a.jpg".to_string(),
                to: String::new(),
            },
        ];

        for action in cases {
            let result = translator.translate(&snapshot, &[Action::Mkdir { path: "Ok".into() }, action]);
            assert!(matches!(result, Err(IntentError::MissingField { .. })));
        }
    }
}

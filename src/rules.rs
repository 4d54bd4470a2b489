//! Deterministic rule-based classification.
//!
//! A rule claims a file when the file's extension is in the rule's set and the
//! file lives under the rule's path prefix. Exactly one claim sends the file to
//! the rule's target, none leaves it alone, and two or more abort the whole
//! pass: ambiguity is never resolved silently.

use crate::error::{Abort, IntentError};
use crate::snapshot::FileMeta;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// How a rule's `path_prefix` is compared with a file path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefixMatch {
    /// Whole path components must match: `/data/Doc` does not claim `/data/Docs/x`.
    #[default]
    Segment,
    /// Plain string prefix: `/data/Doc` also claims `/data/Docs/x`.
    Raw,
}

impl PrefixMatch {
    fn matches(self, path: &Path, prefix: &str) -> bool {
        match self {
            PrefixMatch::Segment => path.starts_with(prefix),
            PrefixMatch::Raw => path.to_string_lossy().starts_with(prefix),
        }
    }
}

/// A single classification rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub rule_id: String,
    /// Lowercased extensions with a leading dot, e.g. `.pdf`.
    #[serde(alias = "extension")]
    pub extensions: BTreeSet<String>,
    pub path_prefix: String,
    /// Destination directory, relative to the approved root.
    pub target: String,
}

impl Rule {
    /// Creates a rule, normalizing extensions to the `.ext` lowercase form.
    pub fn new<I, S>(
        rule_id: impl Into<String>,
        extensions: I,
        path_prefix: impl Into<String>,
        target: impl Into<String>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            rule_id: rule_id.into(),
            extensions: extensions
                .into_iter()
                .map(|ext| normalize_extension(ext.as_ref()))
                .collect(),
            path_prefix: path_prefix.into(),
            target: target.into(),
        }
    }

    /// Returns the rule with its extensions normalized.
    pub fn normalized(self) -> Self {
        let extensions = self.extensions;
        Self::new(self.rule_id, extensions, self.path_prefix, self.target)
    }
}

/// `"PDF"`, `".pdf"` and `"pdf"` all become `".pdf"`.
pub fn normalize_extension(ext: &str) -> String {
    format!(".{}", ext.trim().trim_start_matches('.').to_lowercase())
}

/// Classifies files against a rule set.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: Vec<Rule>,
    prefix_match: PrefixMatch,
}

impl RuleEngine {
    pub fn new(rules: Vec<Rule>, prefix_match: PrefixMatch) -> Self {
        Self {
            rules: rules.into_iter().map(Rule::normalized).collect(),
            prefix_match,
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Returns the single rule claiming `file`, if any.
    ///
    /// # Errors
    ///
    /// Aborts when more than one rule claims the file.
    pub fn classify(&self, file: &FileMeta) -> Result<Option<&Rule>, Abort> {
        let mut matches = self.rules.iter().filter(|rule| {
            rule.extensions.contains(file.extension())
                && self.prefix_match.matches(file.path(), &rule.path_prefix)
        });

        let first = matches.next();
        if let Some(second) = matches.next() {
            let first_id = first.map(|r| r.rule_id.as_str()).unwrap_or_default();
            return Err(Abort::new(format!(
                "Ambiguous classification for file: {} (rules '{}' and '{}')",
                file.path().display(),
                first_id,
                second.rule_id
            )));
        }
        Ok(first)
    }
}

/// Builds rules from a legacy `{extension: target}` map.
///
/// Each entry becomes a rule `<ext>_docs` scoped to `approved_root`.
///
/// # Errors
///
/// Returns an error for an empty extension or target, or an empty map.
pub fn rules_from_targets(
    targets: &BTreeMap<String, String>,
    approved_root: &Path,
) -> Result<Vec<Rule>, IntentError> {
    let mut rules = Vec::with_capacity(targets.len());

    for (ext, target) in targets {
        let ext = ext.trim().trim_start_matches('.').to_lowercase();
        if ext.is_empty() {
            return Err(IntentError::Malformed(
                "empty file extension in targets".to_string(),
            ));
        }
        if target.trim().is_empty() {
            return Err(IntentError::Malformed(format!(
                "empty target for extension '{}'",
                ext
            )));
        }

        rules.push(Rule::new(
            format!("{}_docs", ext),
            [ext.as_str()],
            approved_root.to_string_lossy(),
            target.clone(),
        ));
    }

    if rules.is_empty() {
        return Err(IntentError::Malformed("no rules in targets".to_string()));
    }
    Ok(rules)
}

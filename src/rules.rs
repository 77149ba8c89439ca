//! Destination rules and filename matching.
//!
//! A rule sends a file to its target directory when the file name starts with
//! the rule's prefix and/or ends with its suffix. Rules are evaluated in the
//! order they are configured and the first match wins.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A single destination rule as written in the configuration file.
///
/// An absent `prefix`/`suffix` and an empty string mean the same thing: the
/// condition is not part of the rule. A rule with neither condition set never
/// matches anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationRule {
    /// Directory the matching files are moved into.
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

impl DestinationRule {
    /// Creates a rule with the given conditions. Empty strings are treated as unset.
    pub fn new(path: impl Into<PathBuf>, prefix: Option<&str>, suffix: Option<&str>) -> Self {
        Self {
            path: path.into(),
            prefix: prefix.map(str::to_string),
            suffix: suffix.map(str::to_string),
        }
    }

    fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref().filter(|p| !p.is_empty())
    }

    fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref().filter(|s| !s.is_empty())
    }

    /// Returns true when every configured condition holds for `file_name`.
    ///
    /// # Examples
    ///
    /// ```
    /// use dumpsort::rules::DestinationRule;
    ///
    /// let rule = DestinationRule::new("/archive", Some("report_"), Some(".csv"));
    /// assert!(rule.matches("report_2024.csv"));
    /// assert!(!rule.matches("report_2024.pdf"));
    /// ```
    pub fn matches(&self, file_name: &str) -> bool {
        match (self.prefix(), self.suffix()) {
            (Some(prefix), Some(suffix)) => {
                file_name.starts_with(prefix) && file_name.ends_with(suffix)
            }
            (Some(prefix), None) => file_name.starts_with(prefix),
            (None, Some(suffix)) => file_name.ends_with(suffix),
            (None, None) => false,
        }
    }

    /// True when the rule has no prefix and no suffix, i.e. it can never match.
    pub fn is_inert(&self) -> bool {
        self.prefix().is_none() && self.suffix().is_none()
    }

    /// Short human-readable description of the rule's conditions.
    pub fn describe(&self) -> String {
        match (self.prefix(), self.suffix()) {
            (Some(prefix), Some(suffix)) => format!("prefix {:?} + suffix {:?}", prefix, suffix),
            (Some(prefix), None) => format!("prefix {:?}", prefix),
            (None, Some(suffix)) => format!("suffix {:?}", suffix),
            (None, None) => "never matches".to_string(),
        }
    }
}

/// Finds the first rule, in list order, that matches `file_name`.
///
/// Returns the rule's index alongside the rule itself.
pub fn first_match<'a>(
    rules: &'a [DestinationRule],
    file_name: &str,
) -> Option<(usize, &'a DestinationRule)> {
    rules
        .iter()
        .enumerate()
        .find(|(_, rule)| rule.matches(file_name))
}

//! Rule Evaluator
//!
//! A rule is satisfied when every mutation it requires was detected. The
//! test is a plain subset check, so growing the detected set can only add
//! satisfied rules.

use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::reference::{MutationRule, Severity};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SatisfiedRule {
    pub name: String,
    pub severity: Severity,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_url: Option<String>,
}

/// Returns the satisfied rules in catalog order.
pub fn evaluate(rules: &[MutationRule], detected: &[String]) -> Vec<SatisfiedRule> {
    let detected: FxHashSet<&str> = detected.iter().map(String::as_str).collect();

    rules
        .iter()
        .filter(|rule| rule.mutations.iter().all(|m| detected.contains(m.as_str())))
        .map(|rule| SatisfiedRule {
            name: rule.name.clone(),
            severity: rule.severity,
            description: rule.description.clone(),
            reference_url: rule.reference_url.clone(),
        })
        .collect()
}

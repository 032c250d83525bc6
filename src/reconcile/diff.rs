//! Desired/observed rule set difference

use std::collections::BTreeSet;

/// The minimal mutation set carrying the observed rule state to the
/// desired one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleDiff {
    /// Desired but not observed
    pub to_add: BTreeSet<String>,
    /// Observed but not desired
    pub to_remove: BTreeSet<String>,
}

impl RuleDiff {
    /// True when both sides already agree.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Compute the symmetric difference between the desired and observed rule
/// sets. Entries present on both sides are untouched; equal sets produce an
/// empty diff.
pub fn diff(desired: &BTreeSet<String>, observed: &BTreeSet<String>) -> RuleDiff {
    RuleDiff {
        to_add: desired.difference(observed).cloned().collect(),
        to_remove: observed.difference(desired).cloned().collect(),
    }
}

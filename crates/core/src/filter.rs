//! Family-name allow/deny predicate.

use regex::RegexSet;

use crate::Error;

/// Decides whether a metric family (by name) is exposed.
pub trait FamilyFilter: Send + Sync {
    fn is_included(&self, family: &str) -> bool;

    fn is_excluded(&self, family: &str) -> bool {
        !self.is_included(family)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Allow,
    Deny,
}

/// Either an allowlist or a denylist of anchored regex patterns, never both.
/// An empty denylist admits every family.
#[derive(Debug, Clone)]
pub struct AllowDenyList {
    mode: Mode,
    patterns: Vec<String>,
    set: RegexSet,
}

impl AllowDenyList {
    pub fn new<A, D>(allow: A, deny: D) -> Result<Self, Error>
    where
        A: IntoIterator,
        A::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        let allow: Vec<String> = normalize(allow);
        let deny: Vec<String> = normalize(deny);
        if !allow.is_empty() && !deny.is_empty() {
            return Err(Error::ConflictingFamilyFilters);
        }
        let (mode, patterns) = if allow.is_empty() { (Mode::Deny, deny) } else { (Mode::Allow, allow) };
        for p in &patterns {
            regex::Regex::new(&anchor(p))
                .map_err(|source| Error::InvalidFamilyPattern { pattern: p.clone(), source })?;
        }
        let set = RegexSet::new(patterns.iter().map(|p| anchor(p)))
            .map_err(|source| Error::InvalidFamilyPattern { pattern: patterns.join(","), source })?;
        Ok(Self { mode, patterns, set })
    }

    /// Filter that admits every family.
    pub fn allow_all() -> Self {
        Self { mode: Mode::Deny, patterns: Vec::new(), set: RegexSet::empty() }
    }

    /// Human readable summary for startup logs.
    pub fn status(&self) -> String {
        match (self.mode, self.patterns.is_empty()) {
            (Mode::Deny, true) => "all metric families enabled".to_string(),
            (Mode::Deny, false) => format!("excluding metric families matching: {}", self.patterns.join(", ")),
            (Mode::Allow, _) => format!("including only metric families matching: {}", self.patterns.join(", ")),
        }
    }
}

impl FamilyFilter for AllowDenyList {
    fn is_included(&self, family: &str) -> bool {
        let matched = self.set.is_match(family);
        match self.mode {
            Mode::Allow => matched,
            Mode::Deny => !matched,
        }
    }
}

fn normalize<I>(items: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    let mut out: Vec<String> = items
        .into_iter()
        .map(Into::into)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

fn anchor(pattern: &str) -> String {
    format!("^(?:{})$", pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowlist_includes_only_matches() {
        let l = AllowDenyList::new(["kube_cloneset_status_.*"], Vec::<String>::new()).unwrap();
        assert!(l.is_included("kube_cloneset_status_replicas"));
        assert!(!l.is_included("kube_cloneset_labels"));
        assert!(l.is_excluded("kube_cloneset_created"));
    }

    #[test]
    fn denylist_is_anchored() {
        let l = AllowDenyList::new(Vec::<String>::new(), ["kube_cloneset_status_replicas"]).unwrap();
        assert!(l.is_excluded("kube_cloneset_status_replicas"));
        assert!(l.is_included("kube_cloneset_status_replicas_available"));
    }

    #[test]
    fn both_lists_conflict() {
        let err = AllowDenyList::new(["a"], ["b"]).unwrap_err();
        assert!(matches!(err, Error::ConflictingFamilyFilters));
    }

    #[test]
    fn blank_entries_are_ignored() {
        let l = AllowDenyList::new(["", "  "], ["kube_cloneset_labels"]).unwrap();
        assert!(l.is_excluded("kube_cloneset_labels"));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = AllowDenyList::new(["kube_(unclosed"], Vec::<String>::new()).unwrap_err();
        match err {
            Error::InvalidFamilyPattern { pattern, .. } => assert_eq!(pattern, "kube_(unclosed"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn allow_all_admits_everything() {
        let l = AllowDenyList::allow_all();
        assert!(l.is_included("anything"));
        assert_eq!(l.status(), "all metric families enabled");
    }
}

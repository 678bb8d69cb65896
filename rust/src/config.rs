//! Configuration types for the rota engine.

use pyo3::prelude::*;
use std::collections::{HashMap, HashSet};

use crate::models::normalize_worker_id;

// Note: We use std collections here for PyO3 interface compatibility

/// Role a category plays in the adjacency rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CategoryRole {
    /// Forbids a blocked category on the following day.
    HardSource,
    /// Prefers to avoid a blocked category on the following day.
    SoftSource,
    /// May not follow a source category.
    BlockedNextDay,
}

/// Named, versioned category membership sets plus worker restrictions.
#[pyclass]
#[derive(Clone, Debug, Default)]
pub struct CategoryRules {
    /// Free-form version tag, echoed in reports and logs
    #[pyo3(get, set)]
    pub version: String,
    #[pyo3(get, set)]
    pub hard_source: HashSet<String>,
    #[pyo3(get, set)]
    pub soft_source: HashSet<String>,
    #[pyo3(get, set)]
    pub blocked_next_day: HashSet<String>,
    /// Worker id -> categories that worker may never receive
    #[pyo3(get, set)]
    pub hard_excluded: HashMap<String, HashSet<String>>,
}

impl CategoryRules {
    /// Build rules from (category, role) pairs.
    pub fn from_roles<'a, I>(version: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, CategoryRole)>,
    {
        let mut rules = Self {
            version: version.to_string(),
            ..Self::default()
        };
        for (category, role) in roles {
            let category = category.trim().to_string();
            match role {
                CategoryRole::HardSource => rules.hard_source.insert(category),
                CategoryRole::SoftSource => rules.soft_source.insert(category),
                CategoryRole::BlockedNextDay => rules.blocked_next_day.insert(category),
            };
        }
        rules
    }

    /// Forbid a worker from ever receiving a category.
    pub fn exclude_worker(mut self, worker: &str, category: &str) -> Self {
        self.hard_excluded
            .entry(normalize_worker_id(worker))
            .or_default()
            .insert(category.trim().to_string());
        self
    }

    #[inline]
    pub fn is_hard_source(&self, category: &str) -> bool {
        self.hard_source.contains(category)
    }

    #[inline]
    pub fn is_soft_source(&self, category: &str) -> bool {
        self.soft_source.contains(category)
    }

    #[inline]
    pub fn is_blocked(&self, category: &str) -> bool {
        self.blocked_next_day.contains(category)
    }

    /// Whether `worker` is hard-excluded from `category`.
    pub fn is_excluded(&self, worker: &str, category: &str) -> bool {
        self.hard_excluded
            .get(&normalize_worker_id(worker))
            .is_some_and(|cats| cats.contains(category))
    }
}

#[pymethods]
impl CategoryRules {
    #[new]
    #[pyo3(signature = (
        version=None,
        hard_source=None,
        soft_source=None,
        blocked_next_day=None,
        hard_excluded=None
    ))]
    fn new(
        version: Option<String>,
        hard_source: Option<HashSet<String>>,
        soft_source: Option<HashSet<String>>,
        blocked_next_day: Option<HashSet<String>>,
        hard_excluded: Option<HashMap<String, HashSet<String>>>,
    ) -> Self {
        Self {
            version: version.unwrap_or_default(),
            hard_source: hard_source.unwrap_or_default(),
            soft_source: soft_source.unwrap_or_default(),
            blocked_next_day: blocked_next_day.unwrap_or_default(),
            hard_excluded: hard_excluded
                .unwrap_or_default()
                .into_iter()
                .map(|(w, cats)| (normalize_worker_id(&w), cats))
                .collect(),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "CategoryRules(version={:?}, hard_source={}, soft_source={}, \
             blocked_next_day={}, restricted_workers={})",
            self.version,
            self.hard_source.len(),
            self.soft_source.len(),
            self.blocked_next_day.len(),
            self.hard_excluded.len()
        )
    }
}

/// How many scarce grants a cycle hands out.
///
/// The default encodes a staffing assumption (eligible headcount minus 11)
/// that has never been written down anywhere; keep it injectable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuotaFormula {
    /// `clamp(eligible - offset, min, max)`
    EligibleOffset { offset: i64, min: usize, max: usize },
    /// Always the same quota.
    Fixed(usize),
}

impl Default for QuotaFormula {
    fn default() -> Self {
        Self::EligibleOffset {
            offset: 11,
            min: 0,
            max: usize::MAX,
        }
    }
}

impl QuotaFormula {
    /// Quota for a given number of eligible workers.
    pub fn quota(&self, eligible: usize) -> usize {
        match *self {
            Self::EligibleOffset { offset, min, max } => {
                let raw = (eligible as i64).saturating_sub(offset).max(0) as usize;
                raw.clamp(min, max.max(min))
            }
            Self::Fixed(q) => q,
        }
    }
}

/// Engine-wide knobs.
#[pyclass]
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Verbosity level: 0=silent, 1=changes, 2=checks, 3=debug.
    #[pyo3(get, set)]
    pub verbosity: u8,
    /// Explicit seed for run-to-run variety in tie-breaks (None = by identifier)
    #[pyo3(get, set)]
    pub tie_break_seed: Option<u64>,
    /// Rest days each worker receives per rest cycle
    #[pyo3(get, set)]
    pub rest_days_per_cycle: usize,
    /// Periods added to last_grant_period when a worker is granted twice in a row
    #[pyo3(get, set)]
    pub repeat_grant_penalty: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            tie_break_seed: None,
            rest_days_per_cycle: 2,
            repeat_grant_penalty: 1,
        }
    }
}

#[pymethods]
impl EngineConfig {
    #[new]
    #[pyo3(signature = (
        verbosity=None,
        tie_break_seed=None,
        rest_days_per_cycle=None,
        repeat_grant_penalty=None
    ))]
    fn new(
        verbosity: Option<u8>,
        tie_break_seed: Option<u64>,
        rest_days_per_cycle: Option<usize>,
        repeat_grant_penalty: Option<i64>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            verbosity: verbosity.unwrap_or(defaults.verbosity),
            tie_break_seed,
            rest_days_per_cycle: rest_days_per_cycle.unwrap_or(defaults.rest_days_per_cycle),
            repeat_grant_penalty: repeat_grant_penalty.unwrap_or(defaults.repeat_grant_penalty),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "EngineConfig(verbosity={}, tie_break_seed={:?}, rest_days_per_cycle={})",
            self.verbosity, self.tie_break_seed, self.rest_days_per_cycle
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_from_roles() {
        let rules = CategoryRules::from_roles(
            "v1",
            [
                ("N", CategoryRole::HardSource),
                ("N", CategoryRole::BlockedNextDay),
                ("E", CategoryRole::SoftSource),
                ("M", CategoryRole::BlockedNextDay),
            ],
        );
        assert!(rules.is_hard_source("N"));
        assert!(rules.is_blocked("N"));
        assert!(rules.is_soft_source("E"));
        assert!(!rules.is_hard_source("M"));
        assert_eq!(rules.version, "v1");
    }

    #[test]
    fn test_worker_exclusion_is_case_insensitive() {
        let rules = CategoryRules::default().exclude_worker("ana", "WR");
        assert!(rules.is_excluded("ANA", "WR"));
        assert!(!rules.is_excluded("ANA", "R"));
        assert!(!rules.is_excluded("BEA", "WR"));
    }

    #[test]
    fn test_default_quota_formula() {
        let formula = QuotaFormula::default();
        assert_eq!(formula.quota(5), 0);
        assert_eq!(formula.quota(11), 0);
        assert_eq!(formula.quota(14), 3);
    }

    #[test]
    fn test_quota_formula_clamped() {
        let formula = QuotaFormula::EligibleOffset {
            offset: 11,
            min: 1,
            max: 2,
        };
        assert_eq!(formula.quota(3), 1);
        assert_eq!(formula.quota(20), 2);
        assert_eq!(QuotaFormula::Fixed(4).quota(0), 4);
    }
}

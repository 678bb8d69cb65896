//! Tier computation, quota cascade and merit check for one scarce category.

use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::config::{CategoryRules, QuotaFormula};
use crate::models::normalize_worker_id;
use crate::{log_changes, log_checks, log_debug};

use super::state::{PriorityRecord, PriorityState, MAX_TIER, MIN_TIER};

/// Errors that abort a scarce category.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PriorityError {
    #[error("No eligible workers for {0}")]
    NoEligibleWorkers(String),
    #[error("Rest cycle for {category} is outside the horizon: {detail}")]
    CycleOutsideHorizon { category: String, detail: String },
}

/// One scarce category, rationed by tier.
#[derive(Clone, Debug)]
pub struct ScarceCategory {
    /// Label written on the special day, e.g. weekend rest
    pub category: String,
    /// Workers who may receive it, in a stable order
    pub eligible: Vec<String>,
    pub quota: QuotaFormula,
}

impl ScarceCategory {
    pub fn new<I, S>(category: &str, eligible: I, quota: QuotaFormula) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = FxHashSet::default();
        let eligible = eligible
            .into_iter()
            .map(|w| normalize_worker_id(w.as_ref()))
            .filter(|w| seen.insert(w.clone()))
            .collect();
        Self {
            category: category.trim().to_string(),
            eligible,
            quota,
        }
    }
}

/// Workers picked by the quota cascade.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CascadeSelection {
    pub quota: usize,
    /// In selection order: highest tier first, alphabetical within a tier
    pub selected: Vec<String>,
    /// Tier of every candidate this period
    pub tiers: BTreeMap<String, i32>,
    /// Quota minus selected, when positive
    pub shortfall: Option<usize>,
}

impl CascadeSelection {
    pub fn is_selected(&self, worker: &str) -> bool {
        self.selected.iter().any(|w| w == worker)
    }
}

/// Verdict on a worker who landed on the scarce day without being selected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MeritVerdict {
    /// No competitor has a strictly higher tier.
    Qualifies,
    /// Higher-tier competitors, best first.
    Outranked { by: Vec<String> },
}

/// Priority tier engine for a single scarce category and period.
pub struct TierEngine<'a> {
    category: &'a ScarceCategory,
    rules: &'a CategoryRules,
    record: &'a PriorityRecord,
    omit: FxHashSet<String>,
    current_period: i64,
    verbosity: u8,
}

impl<'a> TierEngine<'a> {
    pub fn new(
        category: &'a ScarceCategory,
        rules: &'a CategoryRules,
        record: &'a PriorityRecord,
        current_period: i64,
    ) -> Self {
        Self {
            category,
            rules,
            record,
            omit: FxHashSet::default(),
            current_period,
            verbosity: 0,
        }
    }

    pub fn with_omit(mut self, omit: &FxHashSet<String>) -> Self {
        self.omit = omit.iter().map(|w| normalize_worker_id(w)).collect();
        self
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn category(&self) -> &ScarceCategory {
        self.category
    }

    pub fn current_period(&self) -> i64 {
        self.current_period
    }

    /// Eligible workers minus the omit set, in configured order.
    pub fn participants(&self) -> Vec<&str> {
        self.category
            .eligible
            .iter()
            .filter(|w| !self.omit.contains(w.as_str()))
            .map(|w| w.as_str())
            .collect()
    }

    pub fn is_hard_excluded(&self, worker: &str) -> bool {
        self.rules.is_excluded(worker, &self.category.category)
    }

    pub fn states(&self) -> Vec<PriorityState> {
        self.participants()
            .into_iter()
            .map(|w| self.record.state(w, self.is_hard_excluded(w)))
            .collect()
    }

    pub fn tier(&self, worker: &str) -> i32 {
        self.record
            .state(worker, false)
            .tier(self.current_period)
    }

    /// Participants that may receive the category, with their tiers.
    pub fn candidates(&self) -> Vec<(String, i32)> {
        self.states()
            .into_iter()
            .filter(|s| !s.hard_excluded)
            .map(|s| {
                let tier = s.tier(self.current_period);
                (s.worker, tier)
            })
            .collect()
    }

    /// Fill the quota from the highest tier down.
    pub fn cascade(&self) -> Result<CascadeSelection, PriorityError> {
        let candidates = self.candidates();
        if candidates.is_empty() {
            return Err(PriorityError::NoEligibleWorkers(
                self.category.category.clone(),
            ));
        }

        let quota = self.category.quota.quota(candidates.len());
        let tiers: BTreeMap<String, i32> = candidates.iter().cloned().collect();
        log_debug!(self.verbosity, "{} tiers: {:?}", self.category.category, tiers);

        let mut selected: Vec<String> = Vec::with_capacity(quota);
        for tier in (MIN_TIER..=MAX_TIER).rev() {
            if selected.len() >= quota {
                break;
            }
            let mut in_tier: Vec<&String> = candidates
                .iter()
                .filter(|(_, t)| *t == tier)
                .map(|(w, _)| w)
                .collect();
            in_tier.sort();
            for worker in in_tier {
                if selected.len() >= quota {
                    break;
                }
                log_changes!(
                    self.verbosity,
                    "{}: selected {} (tier {})",
                    self.category.category,
                    worker,
                    tier
                );
                selected.push(worker.clone());
            }
        }

        let shortfall = (selected.len() < quota).then(|| quota - selected.len());
        if let Some(missing) = shortfall {
            log_changes!(
                self.verbosity,
                "{}: quota {} short by {}",
                self.category.category,
                quota,
                missing
            );
        }

        Ok(CascadeSelection {
            quota,
            selected,
            tiers,
            shortfall,
        })
    }

    /// Decide whether `worker` deserves a scarce day it landed on incidentally.
    ///
    /// `holders` are workers already holding the scarce day this cycle; they
    /// do not compete.
    pub fn merit(
        &self,
        worker: &str,
        selection: &CascadeSelection,
        holders: &FxHashSet<String>,
    ) -> MeritVerdict {
        let own = selection
            .tiers
            .get(worker)
            .copied()
            .unwrap_or_else(|| self.tier(worker));

        let mut better: Vec<(&String, i32)> = selection
            .tiers
            .iter()
            .filter(|(w, t)| w.as_str() != worker && !holders.contains(w.as_str()) && **t > own)
            .map(|(w, t)| (w, *t))
            .collect();

        if better.is_empty() {
            log_checks!(
                self.verbosity,
                "{}: {} (tier {}) qualifies",
                self.category.category,
                worker,
                own
            );
            return MeritVerdict::Qualifies;
        }

        better.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        log_checks!(
            self.verbosity,
            "{}: {} (tier {}) outranked by {}",
            self.category.category,
            worker,
            own,
            better.len()
        );
        MeritVerdict::Outranked {
            by: better.into_iter().map(|(w, _)| w.clone()).collect(),
        }
    }
}

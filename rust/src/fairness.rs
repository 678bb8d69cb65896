//! Fairness queue rotation.
//!
//! Workers are kept in a min-heap keyed by
//! (last assigned date, total assigned, tie-break). "Never assigned" sorts
//! before every real date. Each target date pops the minimal worker, assigns
//! it, and pushes it back with the updated key, so nobody is picked twice
//! before everyone else had a turn (as long as dates <= workers).

use chrono::NaiveDate;
use rustc_hash::{FxHashSet, FxHasher};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::hash::{Hash, Hasher};
use thiserror::Error;

use crate::log_checks;
use crate::models::{normalize_worker_id, Worker};

/// Errors raised by the rotation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RotationError {
    #[error("No eligible workers after exclusions")]
    NoEligibleWorkers,
}

/// Last component of every ordering key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TieBreak {
    /// Alphabetical by identifier.
    #[default]
    Identifier,
    /// Seeded hash of the identifier, identifier as final fallback.
    Seeded(u64),
}

impl TieBreak {
    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map_or(Self::Identifier, Self::Seeded)
    }

    /// Rank of an identifier; ties fall through to the identifier itself.
    pub fn rank(&self, id: &str) -> u64 {
        match self {
            Self::Identifier => 0,
            Self::Seeded(seed) => {
                let mut hasher = FxHasher::default();
                seed.hash(&mut hasher);
                id.hash(&mut hasher);
                hasher.finish()
            }
        }
    }
}

/// Ordering key for one worker. Field order is comparison order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct QueueKey {
    pub last_assigned: Option<NaiveDate>,
    pub total_assigned: usize,
    pub rank: u64,
    pub worker: String,
}

/// Output of one rotation run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RotationResult {
    pub by_date: BTreeMap<NaiveDate, String>,
    pub by_worker: BTreeMap<String, Vec<NaiveDate>>,
    /// Dates ignored because they appeared earlier in the input
    pub duplicate_dates: Vec<NaiveDate>,
}

impl RotationResult {
    /// Drop the assignment for `date`, returning the worker it went to.
    pub fn unassign(&mut self, date: NaiveDate) -> Option<String> {
        let worker = self.by_date.remove(&date)?;
        if let Some(dates) = self.by_worker.get_mut(&worker) {
            dates.retain(|d| *d != date);
            if dates.is_empty() {
                self.by_worker.remove(&worker);
            }
        }
        Some(worker)
    }
}

/// Min-heap of workers by fairness key.
#[derive(Clone, Debug)]
pub struct FairnessQueue {
    heap: BinaryHeap<Reverse<QueueKey>>,
    tie_break: TieBreak,
    verbosity: u8,
}

impl FairnessQueue {
    /// Build the queue from workers minus the omit set (ids compared normalized).
    pub fn build(
        workers: &[Worker],
        omit: &FxHashSet<String>,
        tie_break: TieBreak,
    ) -> Result<Self, RotationError> {
        let omit: FxHashSet<String> = omit.iter().map(|w| normalize_worker_id(w)).collect();
        let heap: BinaryHeap<Reverse<QueueKey>> = workers
            .iter()
            .filter(|w| !omit.contains(w.id()))
            .map(|w| {
                Reverse(QueueKey {
                    last_assigned: w.last_assigned_date(),
                    total_assigned: w.total_assigned(),
                    rank: tie_break.rank(w.id()),
                    worker: w.id().to_string(),
                })
            })
            .collect();

        if heap.is_empty() {
            return Err(RotationError::NoEligibleWorkers);
        }

        Ok(Self {
            heap,
            tie_break,
            verbosity: 0,
        })
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Worker ids in current pop order.
    pub fn order(&self) -> Vec<String> {
        let mut keys: Vec<&QueueKey> = self.heap.iter().map(|Reverse(k)| k).collect();
        keys.sort();
        keys.into_iter().map(|k| k.worker.clone()).collect()
    }

    /// Assign each date, in input order, to the worker with the smallest key.
    pub fn assign(&mut self, dates: &[NaiveDate]) -> RotationResult {
        let mut result = RotationResult::default();
        let mut seen: FxHashSet<NaiveDate> = FxHashSet::default();

        for &date in dates {
            if !seen.insert(date) {
                log_checks!(self.verbosity, "Rotation: duplicate date {} skipped", date);
                result.duplicate_dates.push(date);
                continue;
            }

            let Some(Reverse(key)) = self.heap.pop() else {
                break;
            };

            log_checks!(
                self.verbosity,
                "Rotation: {} -> {} (last={:?}, total={})",
                date,
                key.worker,
                key.last_assigned,
                key.total_assigned
            );

            result.by_date.insert(date, key.worker.clone());
            result
                .by_worker
                .entry(key.worker.clone())
                .or_default()
                .push(date);

            let last_assigned = key.last_assigned.map_or(date, |last| last.max(date));
            self.heap.push(Reverse(QueueKey {
                last_assigned: Some(last_assigned),
                total_assigned: key.total_assigned + 1,
                rank: self.tie_break.rank(&key.worker),
                worker: key.worker,
            }));
        }

        result
    }
}

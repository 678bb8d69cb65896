//! Per-worker grant state for a scarce category and its persisted record.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::models::normalize_worker_id;

pub const MAX_TIER: i32 = 4;
pub const MIN_TIER: i32 = -2;

/// Elapsed periods reported for a worker never granted.
pub const NEVER_ELAPSED: i64 = i64::MAX / 2;

/// Errors loading or saving a priority record.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Failed to access priority record: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed priority record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tier for a last grant period as seen from `current_period`.
pub fn tier_for(last_grant_period: Option<i64>, current_period: i64) -> i32 {
    let elapsed = match last_grant_period {
        Some(last) => current_period.saturating_sub(last),
        None => NEVER_ELAPSED,
    };
    elapsed.clamp(MIN_TIER as i64, MAX_TIER as i64) as i32
}

/// Week index of a date, counted from Monday 1970-01-05.
pub fn period_of(date: NaiveDate) -> i64 {
    let base = NaiveDate::from_ymd_opt(1970, 1, 5).unwrap_or(NaiveDate::MIN);
    (date - base).num_days().div_euclid(7)
}

/// Priority view of one worker for one scarce category.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PriorityState {
    pub worker: String,
    pub last_grant_period: Option<i64>,
    pub hard_excluded: bool,
}

impl PriorityState {
    pub fn elapsed(&self, current_period: i64) -> i64 {
        match self.last_grant_period {
            Some(last) => current_period.saturating_sub(last),
            None => NEVER_ELAPSED,
        }
    }

    pub fn tier(&self, current_period: i64) -> i32 {
        tier_for(self.last_grant_period, current_period)
    }
}

/// Flat worker -> last grant period record, `null` meaning never.
///
/// Workers absent from the record are treated as never granted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriorityRecord {
    entries: BTreeMap<String, Option<i64>>,
}

impl PriorityRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_grant(&self, worker: &str) -> Option<i64> {
        self.entries
            .get(&normalize_worker_id(worker))
            .copied()
            .flatten()
    }

    pub fn set(&mut self, worker: &str, period: Option<i64>) {
        self.entries.insert(normalize_worker_id(worker), period);
    }

    /// Record a grant in `period`.
    ///
    /// A worker already granted in the previous period (or later) is pushed
    /// `repeat_penalty` periods ahead, which drives its tier negative.
    /// Returns the stored value.
    pub fn grant(&mut self, worker: &str, period: i64, repeat_penalty: i64) -> i64 {
        let stored = match self.last_grant(worker) {
            Some(last) if period - last <= 1 => period + repeat_penalty.max(0),
            _ => period,
        };
        self.set(worker, Some(stored));
        stored
    }

    pub fn state(&self, worker: &str, hard_excluded: bool) -> PriorityState {
        PriorityState {
            worker: normalize_worker_id(worker),
            last_grant_period: self.last_grant(worker),
            hard_excluded,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<i64>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn from_json(text: &str) -> Result<Self, RecordError> {
        let raw: BTreeMap<String, Option<i64>> = serde_json::from_str(text)?;
        Ok(Self {
            entries: raw
                .into_iter()
                .map(|(k, v)| (normalize_worker_id(&k), v))
                .collect(),
        })
    }

    pub fn to_json(&self) -> Result<String, RecordError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a record from disk; a missing file is an empty record.
    pub fn load(path: &Path) -> Result<Self, RecordError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn save(&self, path: &Path) -> Result<(), RecordError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

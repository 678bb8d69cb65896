//! Core data types for the rota engine.

use chrono::{Datelike, NaiveDate};
use pyo3::prelude::*;
use std::collections::BTreeSet;
use std::fmt;

/// Normalize a worker identifier: trimmed and case-folded to upper case.
pub fn normalize_worker_id(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Canonical column label for a date, e.g. `THU-07`.
pub fn column_label(date: NaiveDate) -> String {
    format!(
        "{}-{:02}",
        date.weekday().to_string().to_uppercase(),
        date.day()
    )
}

/// A worker and the dates already assigned to them.
///
/// History is append-only and kept sorted and deduplicated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Worker {
    id: String,
    history: BTreeSet<NaiveDate>,
}

impl Worker {
    pub fn new(id: &str) -> Self {
        Self {
            id: normalize_worker_id(id),
            history: BTreeSet::new(),
        }
    }

    pub fn with_history<I>(id: &str, dates: I) -> Self
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        Self {
            id: normalize_worker_id(id),
            history: dates.into_iter().collect(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn history(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.history.iter().copied()
    }

    /// Record an assignment. Returns false if the date was already present.
    pub fn record(&mut self, date: NaiveDate) -> bool {
        self.history.insert(date)
    }

    /// Most recent assigned date; `None` means never assigned and sorts first.
    pub fn last_assigned_date(&self) -> Option<NaiveDate> {
        self.history.iter().next_back().copied()
    }

    pub fn total_assigned(&self) -> usize {
        self.history.len()
    }
}

/// A request that a worker receive a category on or near a date.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DemandRequest {
    #[pyo3(get, set)]
    pub category: String,
    #[pyo3(get, set)]
    pub worker: String,
    #[pyo3(get, set)]
    pub requested_date: NaiveDate,
}

impl DemandRequest {
    pub fn of(category: &str, worker: &str, requested_date: NaiveDate) -> Self {
        Self {
            category: category.trim().to_string(),
            worker: normalize_worker_id(worker),
            requested_date,
        }
    }
}

#[pymethods]
impl DemandRequest {
    #[new]
    fn new(category: String, worker: String, requested_date: NaiveDate) -> Self {
        Self::of(&category, &worker, requested_date)
    }

    fn __repr__(&self) -> String {
        format!(
            "DemandRequest(category={:?}, worker={:?}, requested_date={})",
            self.category, self.worker, self.requested_date
        )
    }
}

/// How a demand was resolved.
///
/// Variant order is report order: most attention-worthy first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Outcome {
    Unassigned,
    ForcedHard,
    Soft,
    Exchanged,
    Direct,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unassigned => "unassigned",
            Self::ForcedHard => "forced_hard",
            Self::Soft => "soft",
            Self::Exchanged => "exchanged",
            Self::Direct => "direct",
        }
    }

    /// Report rank; unassigned and forced placements share the top rank.
    pub fn report_rank(&self) -> u8 {
        match self {
            Self::Unassigned | Self::ForcedHard => 0,
            Self::Soft => 1,
            Self::Exchanged => 2,
            Self::Direct => 3,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of resolving one demand.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssignmentRecord {
    #[pyo3(get)]
    pub category: String,
    #[pyo3(get)]
    pub worker: String,
    #[pyo3(get)]
    pub requested_date: NaiveDate,
    #[pyo3(get)]
    pub resolved_date: Option<NaiveDate>,
    pub outcome: Outcome,
    #[pyo3(get)]
    pub reason: Option<String>,
}

impl AssignmentRecord {
    pub fn unassigned(demand: &DemandRequest, reason: impl Into<String>) -> Self {
        Self {
            category: demand.category.clone(),
            worker: demand.worker.clone(),
            requested_date: demand.requested_date,
            resolved_date: None,
            outcome: Outcome::Unassigned,
            reason: Some(reason.into()),
        }
    }

    pub fn resolved(
        demand: &DemandRequest,
        date: NaiveDate,
        outcome: Outcome,
        reason: Option<String>,
    ) -> Self {
        Self {
            category: demand.category.clone(),
            worker: demand.worker.clone(),
            requested_date: demand.requested_date,
            resolved_date: Some(date),
            outcome,
            reason,
        }
    }
}

#[pymethods]
impl AssignmentRecord {
    #[getter(outcome)]
    fn py_outcome(&self) -> &'static str {
        self.outcome.as_str()
    }

    fn __repr__(&self) -> String {
        format!(
            "AssignmentRecord(category={:?}, worker={:?}, requested={}, resolved={:?}, outcome={})",
            self.category, self.worker, self.requested_date, self.resolved_date, self.outcome
        )
    }
}

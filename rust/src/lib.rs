//! Rota assignment engine.
//!
//! Fills a worker x date grid in three passes: fairness rotations, scarce
//! category rationing by priority tier, and conflict-aware matching of
//! worker demands. Exposed to Python as the `rota_engine` module.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use chrono::NaiveDate;
use pyo3::prelude::*;
use rustc_hash::FxHashSet;
use std::collections::{BTreeMap, HashMap, HashSet};

mod config;
pub mod constraint;
pub mod engine;
pub mod fairness;
pub mod grid;
mod interner;
pub mod logging;
pub mod matching;
mod models;
pub mod priority;
pub mod warnings;

pub use config::{CategoryRole, CategoryRules, EngineConfig, QuotaFormula};
pub use constraint::{ConstraintPredicate, PendingPlacements, Verdict};
pub use engine::{
    EngineError, RosterEngine, RosterPlan, RotationRequest, RunReport, ScarceRequest,
};
pub use fairness::{FairnessQueue, RotationError, RotationResult, TieBreak};
pub use grid::{CellWrite, Column, GridError, SlotGrid};
pub use interner::{WorkerInterner, WorkerRow};
pub use matching::{report_string, write_report, MatchingResolver, ReportError, ResolveOutcome};
pub use models::{
    column_label, normalize_worker_id, AssignmentRecord, DemandRequest, Outcome, Worker,
};
pub use priority::{
    apply_rest_cycle, period_of, tier_for, CycleOutcome, PriorityRecord, RestCycle,
    ScarceCategory, TierEngine,
};
pub use warnings::EngineWarning;

fn value_error(e: impl std::fmt::Display) -> PyErr {
    pyo3::exceptions::PyValueError::new_err(e.to_string())
}

/// Assign each date to the worker who waited longest.
///
/// # Arguments
/// * `histories` - Dict mapping worker ID to previously assigned dates
/// * `dates` - Target dates, in assignment order (duplicates skipped)
/// * `omit` - Worker IDs excluded from this run
/// * `seed` - Optional tie-break seed (default: alphabetical)
///
/// # Returns
/// * Dict mapping each date to its worker ID
///
/// # Raises
/// * ValueError if no worker is left after exclusions
#[pyfunction]
#[pyo3(signature = (histories, dates, omit=None, seed=None, verbosity=0))]
fn fairness_rotation(
    histories: HashMap<String, Vec<NaiveDate>>,
    dates: Vec<NaiveDate>,
    omit: Option<HashSet<String>>,
    seed: Option<u64>,
    verbosity: u8,
) -> PyResult<BTreeMap<NaiveDate, String>> {
    let mut workers: Vec<Worker> = histories
        .into_iter()
        .map(|(id, history)| Worker::with_history(&id, history))
        .collect();
    workers.sort_by(|a, b| a.id().cmp(b.id()));
    let omit: FxHashSet<String> = omit.unwrap_or_default().into_iter().collect();

    let mut queue = FairnessQueue::build(&workers, &omit, TieBreak::from_seed(seed))
        .map_err(value_error)?
        .with_verbosity(verbosity);
    Ok(queue.assign(&dates).by_date)
}

/// Priority tier for a worker last granted in `last_grant_period`.
///
/// `None` means never granted and always yields the top tier.
#[pyfunction]
#[pyo3(signature = (last_grant_period, current_period))]
fn worker_tier(last_grant_period: Option<i64>, current_period: i64) -> i32 {
    tier_for(last_grant_period, current_period)
}

/// Week index used as the priority period for a date.
#[pyfunction]
fn period_index(date: NaiveDate) -> i64 {
    period_of(date)
}

/// Resolve demands against a prefilled grid.
///
/// # Arguments
/// * `workers` - Worker IDs, one grid row each
/// * `start`, `end` - Inclusive horizon
/// * `prefilled` - (worker, date, category) cells loaded before the run
/// * `demands` - Demands in priority order
/// * `rules` - Category adjacency rules
/// * `config` - Engine configuration (verbosity, seed)
///
/// # Returns
/// * (records in demand order, written cells as (worker, date, category))
///
/// # Raises
/// * ValueError for an invalid horizon or a prefilled cell that does not fit
#[pyfunction]
#[pyo3(signature = (workers, start, end, prefilled, demands, rules, config=None))]
#[allow(clippy::too_many_arguments)]
#[allow(clippy::type_complexity)]
fn resolve_demands(
    workers: Vec<String>,
    start: NaiveDate,
    end: NaiveDate,
    prefilled: Vec<(String, NaiveDate, String)>,
    demands: Vec<DemandRequest>,
    rules: CategoryRules,
    config: Option<EngineConfig>,
) -> PyResult<(Vec<AssignmentRecord>, Vec<(String, NaiveDate, String)>)> {
    let config = config.unwrap_or_default();
    let mut grid = SlotGrid::new(start, end, &workers).map_err(value_error)?;
    for (worker, date, category) in &prefilled {
        grid.prefill(worker, *date, category).map_err(value_error)?;
    }

    let engine = RosterEngine::new(config, rules);
    let plan = RosterPlan {
        demands,
        ..RosterPlan::default()
    };
    let report = engine.run(&mut grid, &plan, &mut PriorityRecord::new());
    for warning in &report.warnings {
        crate::log_checks!(engine.config().verbosity, "{}", warning);
    }

    let written = grid
        .mutations()
        .iter()
        .map(|m| (m.worker.clone(), m.date, m.category.clone()))
        .collect();
    Ok((report.records, written))
}

/// Render records as a tab-separated report, most urgent first.
#[pyfunction]
fn format_report(records: Vec<AssignmentRecord>) -> PyResult<String> {
    report_string(&records).map_err(value_error)
}

/// The rota_engine Python module.
#[pymodule]
fn rota_engine(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Data types
    m.add_class::<DemandRequest>()?;
    m.add_class::<AssignmentRecord>()?;

    // Config types
    m.add_class::<CategoryRules>()?;
    m.add_class::<EngineConfig>()?;

    // Algorithms
    m.add_function(wrap_pyfunction!(fairness_rotation, m)?)?;
    m.add_function(wrap_pyfunction!(worker_tier, m)?)?;
    m.add_function(wrap_pyfunction!(period_index, m)?)?;
    m.add_function(wrap_pyfunction!(resolve_demands, m)?)?;
    m.add_function(wrap_pyfunction!(format_report, m)?)?;

    Ok(())
}

//! Orchestration of one roster run.
//!
//! Order is fixed: fairness rotations first, then scarce-category rest
//! cycles, then demand matching on whatever the grid looks like by then.
//! A category with no eligible workers is dropped before it writes anything;
//! every other problem ends up as a warning or a record outcome.

use chrono::NaiveDate;
use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::config::{CategoryRules, EngineConfig};
use crate::constraint::ConstraintPredicate;
use crate::fairness::{FairnessQueue, RotationError, RotationResult, TieBreak};
use crate::grid::SlotGrid;
use crate::matching::MatchingResolver;
use crate::models::{AssignmentRecord, DemandRequest, Worker};
use crate::priority::{
    apply_rest_cycle, period_of, CycleOutcome, PriorityError, PriorityRecord, RestCycle,
    ScarceCategory, TierEngine,
};
use crate::warnings::EngineWarning;
use crate::{log_changes, log_checks};

/// A category that was skipped entirely.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Rotation {category} aborted: {source}")]
    Rotation {
        category: String,
        #[source]
        source: RotationError,
    },
    #[error(transparent)]
    Priority(#[from] PriorityError),
}

/// Rotate `category` over `dates` among `workers`.
#[derive(Clone, Debug)]
pub struct RotationRequest {
    pub category: String,
    pub workers: Vec<Worker>,
    pub dates: Vec<NaiveDate>,
    pub omit: FxHashSet<String>,
}

/// Ration a scarce category over one rest cycle.
#[derive(Clone, Debug)]
pub struct ScarceRequest {
    pub category: ScarceCategory,
    pub cycle: RestCycle,
    pub omit: FxHashSet<String>,
    /// Defaults to the week of the special day
    pub period: Option<i64>,
}

impl ScarceRequest {
    pub fn period(&self) -> i64 {
        self.period.unwrap_or_else(|| period_of(self.cycle.special_day))
    }
}

/// Everything a run should place.
#[derive(Clone, Debug, Default)]
pub struct RosterPlan {
    pub rotations: Vec<RotationRequest>,
    pub scarce: Vec<ScarceRequest>,
    pub demands: Vec<DemandRequest>,
}

#[derive(Clone, Debug, Default)]
pub struct RunReport {
    pub rotations: Vec<(String, RotationResult)>,
    pub cycles: Vec<CycleOutcome>,
    /// One per demand, in demand order
    pub records: Vec<AssignmentRecord>,
    pub warnings: Vec<EngineWarning>,
    pub aborted: Vec<EngineError>,
}

pub struct RosterEngine {
    config: EngineConfig,
    rules: CategoryRules,
}

impl RosterEngine {
    pub fn new(config: EngineConfig, rules: CategoryRules) -> Self {
        Self { config, rules }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rules(&self) -> &CategoryRules {
        &self.rules
    }

    fn tie_break(&self) -> TieBreak {
        TieBreak::from_seed(self.config.tie_break_seed)
    }

    /// Run the plan against `grid`, updating `record` with this run's grants.
    pub fn run(
        &self,
        grid: &mut SlotGrid,
        plan: &RosterPlan,
        record: &mut PriorityRecord,
    ) -> RunReport {
        let verbosity = self.config.verbosity;
        if let Some(seed) = self.config.tie_break_seed {
            log_changes!(verbosity, "Tie-break seed {}", seed);
        }
        log_checks!(verbosity, "Category rules version {:?}", self.rules.version);

        let mut report = RunReport::default();

        for request in &plan.rotations {
            match self.rotate(grid, request, &mut report.warnings) {
                Ok(result) => report.rotations.push((request.category.clone(), result)),
                Err(e) => {
                    log_changes!(verbosity, "{}", e);
                    report.aborted.push(e);
                }
            }
        }

        for request in &plan.scarce {
            let period = request.period();
            let result = {
                let engine = TierEngine::new(&request.category, &self.rules, record, period)
                    .with_omit(&request.omit)
                    .with_verbosity(verbosity);
                apply_rest_cycle(
                    grid,
                    &engine,
                    &request.cycle,
                    self.config.rest_days_per_cycle,
                    verbosity,
                )
            };
            match result {
                Ok(outcome) => {
                    outcome.apply_grants(record, period, self.config.repeat_grant_penalty);
                    report.warnings.extend(outcome.warnings.iter().cloned());
                    report.cycles.push(outcome);
                }
                Err(e) => {
                    log_changes!(verbosity, "{}", e);
                    report.aborted.push(e.into());
                }
            }
        }

        let resolved = MatchingResolver::new(ConstraintPredicate::new(&self.rules))
            .with_tie_break(self.tie_break())
            .with_verbosity(verbosity)
            .resolve(grid, &plan.demands);
        report.records = resolved.records;
        report.warnings.extend(resolved.warnings);

        report
    }

    fn rotate(
        &self,
        grid: &mut SlotGrid,
        request: &RotationRequest,
        warnings: &mut Vec<EngineWarning>,
    ) -> Result<RotationResult, EngineError> {
        let verbosity = self.config.verbosity;
        let mut queue = FairnessQueue::build(&request.workers, &request.omit, self.tie_break())
            .map_err(|source| EngineError::Rotation {
                category: request.category.clone(),
                source,
            })?
            .with_verbosity(verbosity);
        let mut result = queue.assign(&request.dates);

        // Dates that never reach the grid are dropped from the result.
        let mut unwritten: Vec<NaiveDate> = Vec::new();
        for (&date, worker) in &result.by_date {
            let Some(col) = grid.column_index(date) else {
                warnings.push(EngineWarning::DateOutsideHorizon {
                    category: request.category.clone(),
                    date,
                });
                unwritten.push(date);
                continue;
            };
            let Some(row) = grid.row(worker) else {
                warnings.push(EngineWarning::UnknownWorker {
                    category: request.category.clone(),
                    worker: worker.clone(),
                });
                unwritten.push(date);
                continue;
            };
            match grid.write_exclusive(row, col, &request.category) {
                Ok(()) => log_changes!(verbosity, "{}: {} -> {}", request.category, worker, date),
                Err(e) => {
                    warnings.push(EngineWarning::CellNotWritten {
                        category: request.category.clone(),
                        worker: worker.clone(),
                        date,
                        detail: e.to_string(),
                    });
                    unwritten.push(date);
                }
            }
        }
        for date in unwritten {
            result.unassign(date);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CategoryRole, QuotaFormula};
    use crate::models::Outcome;

    fn d(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    // Mon 2025-03-03 .. Sun 2025-03-09
    fn grid() -> SlotGrid {
        SlotGrid::new(d(2025, 3, 3), d(2025, 3, 9), ["a", "b", "c"]).unwrap()
    }

    fn rules() -> CategoryRules {
        CategoryRules::from_roles(
            "v1",
            [
                ("D", CategoryRole::HardSource),
                ("X", CategoryRole::BlockedNextDay),
            ],
        )
    }

    fn rotation() -> RotationRequest {
        RotationRequest {
            category: "D".to_string(),
            workers: vec![
                Worker::with_history("a", [d(2025, 2, 1)]),
                Worker::new("b"),
                Worker::new("c"),
            ],
            dates: vec![d(2025, 3, 3), d(2025, 3, 4)],
            omit: FxHashSet::default(),
        }
    }

    fn scarce(omit: &[&str]) -> ScarceRequest {
        ScarceRequest {
            category: ScarceCategory::new("WR", ["a", "b", "c"], QuotaFormula::Fixed(1)),
            cycle: RestCycle::new(d(2025, 3, 3), d(2025, 3, 9), d(2025, 3, 9), "R"),
            omit: omit.iter().map(|w| w.to_string()).collect(),
            period: None,
        }
    }

    #[test]
    fn test_full_run() {
        let engine = RosterEngine::new(EngineConfig::default(), rules());
        let mut g = grid();
        let mut record = PriorityRecord::new();
        let plan = RosterPlan {
            rotations: vec![rotation()],
            scarce: vec![scarce(&[])],
            demands: vec![DemandRequest::of("P", "a", d(2025, 3, 5))],
        };

        let report = engine.run(&mut g, &plan, &mut record);
        assert!(report.aborted.is_empty());

        // Rotation: never-assigned b and c first
        assert_eq!(g.cell_at("b", d(2025, 3, 3)), Some("D"));
        assert_eq!(g.cell_at("c", d(2025, 3, 4)), Some("D"));

        // Cascade: everyone tier 4, a first alphabetically
        assert_eq!(report.cycles[0].granted, vec!["A"]);
        assert_eq!(g.cell_at("a", d(2025, 3, 9)), Some("WR"));
        assert_eq!(g.cell_at("a", d(2025, 3, 3)), Some("R"));
        assert_eq!(g.cell_at("b", d(2025, 3, 4)), Some("R"));
        assert_eq!(g.cell_at("b", d(2025, 3, 5)), Some("R"));
        assert_eq!(g.cell_at("b", d(2025, 3, 9)), None);
        assert_eq!(record.last_grant("a"), Some(period_of(d(2025, 3, 9))));
        assert_eq!(record.last_grant("b"), None);

        // Matching runs last, on the filled grid
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].outcome, Outcome::Direct);
        assert_eq!(g.cell_at("a", d(2025, 3, 5)), Some("P"));
    }

    #[test]
    fn test_no_eligible_aborts_only_that_category() {
        let engine = RosterEngine::new(EngineConfig::default(), rules());
        let mut g = grid();
        let mut record = PriorityRecord::new();
        let plan = RosterPlan {
            rotations: vec![rotation()],
            scarce: vec![scarce(&["a", "b", "c"])],
            demands: vec![DemandRequest::of("P", "a", d(2025, 3, 5))],
        };

        let report = engine.run(&mut g, &plan, &mut record);
        assert_eq!(
            report.aborted,
            vec![EngineError::Priority(PriorityError::NoEligibleWorkers(
                "WR".to_string()
            ))]
        );
        assert!(report.cycles.is_empty());
        assert!(g.mutations().iter().all(|m| m.category != "WR" && m.category != "R"));
        assert!(record.is_empty());
        assert_eq!(report.rotations.len(), 1);
        assert_eq!(report.records[0].outcome, Outcome::Direct);
    }

    #[test]
    fn test_rotation_without_workers_aborts() {
        let engine = RosterEngine::new(EngineConfig::default(), rules());
        let mut g = grid();
        let mut request = rotation();
        request.omit = ["a", "b", "c"].iter().map(|w| w.to_string()).collect();
        let plan = RosterPlan {
            rotations: vec![request],
            ..RosterPlan::default()
        };

        let report = engine.run(&mut g, &plan, &mut PriorityRecord::new());
        assert!(matches!(
            report.aborted[0],
            EngineError::Rotation {
                source: RotationError::NoEligibleWorkers,
                ..
            }
        ));
        assert!(g.mutations().is_empty());
    }

    #[test]
    fn test_rotation_skips_occupied_and_outside_cells() {
        let engine = RosterEngine::new(EngineConfig::default(), rules());
        let mut g = grid();
        g.prefill("b", d(2025, 3, 3), "N").unwrap();
        let mut request = rotation();
        request.dates = vec![d(2025, 3, 3), d(2025, 4, 1)];
        let plan = RosterPlan {
            rotations: vec![request],
            ..RosterPlan::default()
        };

        let report = engine.run(&mut g, &plan, &mut PriorityRecord::new());
        assert_eq!(g.cell_at("b", d(2025, 3, 3)), Some("N"));
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, EngineWarning::CellNotWritten { .. })));
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, EngineWarning::DateOutsideHorizon { .. })));

        let (_, result) = &report.rotations[0];
        assert!(result.by_date.is_empty());
        assert!(result.by_worker.is_empty());
    }

    #[test]
    fn test_demand_respects_rotation_writes() {
        let engine = RosterEngine::new(EngineConfig::default(), rules());
        let mut g = grid();
        let plan = RosterPlan {
            rotations: vec![rotation()],
            // b holds D (hard source) on the 3rd, so X on the 4th is out
            demands: vec![DemandRequest::of("X", "b", d(2025, 3, 4))],
            ..RosterPlan::default()
        };

        // One-week horizon: no other Tuesday, so the placement is forced
        let report = engine.run(&mut g, &plan, &mut PriorityRecord::new());
        let rec = &report.records[0];
        assert_eq!(rec.outcome, Outcome::ForcedHard);
        assert!(rec.reason.as_deref().unwrap().contains("D on MON-03"));
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, EngineWarning::HardConstraintForced { .. })));
    }
}

//! Rest-cycle placement around a scarce special day.
//!
//! Every participant gets `rest_days` rest days inside the cycle. Workers the
//! cascade selected get the scarce category on the special day; everyone else
//! must avoid it, unless they landed on it incidentally and pass the merit
//! check (or nobody better can take it over).

use chrono::NaiveDate;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;

use crate::grid::SlotGrid;
use crate::interner::WorkerRow;
use crate::models::normalize_worker_id;
use crate::warnings::EngineWarning;
use crate::{log_changes, log_checks};

use super::cascade::{CascadeSelection, MeritVerdict, PriorityError, TierEngine};
use super::state::PriorityRecord;

/// One rest cycle: a contiguous column range with a designated special day.
#[derive(Clone, Debug)]
pub struct RestCycle {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub special_day: NaiveDate,
    /// Category written on non-special rest days
    pub rest_category: String,
    /// Proposed rest days per worker, e.g. from a fairness rotation
    pub tentative: BTreeMap<String, Vec<NaiveDate>>,
}

impl RestCycle {
    pub fn new(
        start: NaiveDate,
        end: NaiveDate,
        special_day: NaiveDate,
        rest_category: &str,
    ) -> Self {
        Self {
            start,
            end,
            special_day,
            rest_category: rest_category.trim().to_string(),
            tentative: BTreeMap::new(),
        }
    }

    pub fn with_tentative<I>(mut self, worker: &str, dates: I) -> Self
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        self.tentative
            .entry(normalize_worker_id(worker))
            .or_default()
            .extend(dates);
        self
    }
}

/// What happened to a worker who landed on the special day unselected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MeritDecision {
    /// Tier was good enough; keeps the scarce day.
    Deserved { worker: String, tier: i32 },
    /// Gave the scarce day to a higher-tier worker and took `day` instead.
    Swapped {
        from: String,
        to: String,
        day: NaiveDate,
    },
    /// Outranked but nobody could take over; kept as a documented exception.
    Exception { worker: String, tier: i32 },
    /// Hard-excluded from the category; moved off the special day.
    Excluded { worker: String },
}

/// Result of placing one rest cycle.
#[derive(Clone, Debug, Default)]
pub struct CycleOutcome {
    pub category: String,
    pub selection: CascadeSelection,
    /// Workers written onto the special day this run, in decision order
    pub granted: Vec<String>,
    pub merit: Vec<MeritDecision>,
    /// Rest days written per worker (special day included for holders)
    pub rest_days: BTreeMap<String, Vec<NaiveDate>>,
    pub warnings: Vec<EngineWarning>,
}

impl CycleOutcome {
    /// Store this cycle's grants in the persisted record.
    pub fn apply_grants(&self, record: &mut PriorityRecord, period: i64, repeat_penalty: i64) {
        for worker in &self.granted {
            record.grant(worker, period, repeat_penalty);
        }
    }
}

struct Participant {
    worker: String,
    row: WorkerRow,
    plan: Vec<usize>,
    /// Rest days still wanted after counting prefilled rest cells
    wanted: usize,
}

/// Place one rest cycle onto the grid.
///
/// Fails before writing anything when the cycle does not fit the grid or the
/// category has no eligible workers.
pub fn apply_rest_cycle(
    grid: &mut SlotGrid,
    engine: &TierEngine<'_>,
    cycle: &RestCycle,
    rest_days: usize,
    verbosity: u8,
) -> Result<CycleOutcome, PriorityError> {
    let category = engine.category().category.clone();
    let outside = |detail: String| PriorityError::CycleOutsideHorizon {
        category: category.clone(),
        detail,
    };

    let first = grid
        .column_index(cycle.start)
        .ok_or_else(|| outside(format!("start {}", cycle.start)))?;
    let last = grid
        .column_index(cycle.end)
        .ok_or_else(|| outside(format!("end {}", cycle.end)))?;
    let special = grid
        .column_index(cycle.special_day)
        .filter(|c| (first..=last).contains(c))
        .ok_or_else(|| outside(format!("special day {}", cycle.special_day)))?;
    if first > last {
        return Err(outside(format!("{} after {}", cycle.start, cycle.end)));
    }

    let selection = engine.cascade()?;
    let mut outcome = CycleOutcome {
        category: category.clone(),
        ..CycleOutcome::default()
    };
    if let Some(missing) = selection.shortfall {
        outcome.warnings.push(EngineWarning::QuotaShortfall {
            category: category.clone(),
            quota: selection.quota,
            filled: selection.quota - missing,
        });
    }

    let mut people: Vec<Participant> = Vec::new();
    for worker in engine.participants() {
        let Some(row) = grid.row(worker) else {
            outcome.warnings.push(EngineWarning::UnknownWorker {
                category: category.clone(),
                worker: worker.to_string(),
            });
            continue;
        };
        let prefilled = (first..=last)
            .filter(|&c| {
                grid.cell(row, c)
                    .is_some_and(|v| v == category || v == cycle.rest_category)
            })
            .count();
        let wanted = rest_days.saturating_sub(prefilled);

        let mut plan: Vec<usize> = Vec::new();
        for date in cycle.tentative.get(worker).into_iter().flatten() {
            if let Some(col) = grid.column_index(*date) {
                if (first..=last).contains(&col)
                    && grid.is_empty(row, col)
                    && !plan.contains(&col)
                {
                    plan.push(col);
                }
            }
        }
        plan.truncate(wanted);

        people.push(Participant {
            worker: worker.to_string(),
            row,
            plan,
            wanted,
        });
    }
    let index: FxHashMap<String, usize> = people
        .iter()
        .enumerate()
        .map(|(i, p)| (p.worker.clone(), i))
        .collect();

    // Prefilled holders and the cascade's picks hold the special day.
    let mut holders: FxHashSet<String> = people
        .iter()
        .filter(|p| grid.cell(p.row, special) == Some(category.as_str()))
        .map(|p| p.worker.clone())
        .collect();
    let mut forced: Vec<usize> = Vec::new();
    for worker in &selection.selected {
        let Some(&i) = index.get(worker) else {
            continue;
        };
        match grid.cell(people[i].row, special) {
            None if people[i].wanted == 0 => {
                log_checks!(verbosity, "{}: {} has no rest day left to grant", category, worker);
                outcome.warnings.push(EngineWarning::RestDaysAlreadyPlaced {
                    category: category.clone(),
                    worker: worker.clone(),
                    date: cycle.special_day,
                });
            }
            None => {
                holders.insert(worker.clone());
                forced.push(i);
            }
            Some(existing) if existing == category => {}
            Some(existing) => outcome.warnings.push(EngineWarning::ForcedGrantBlocked {
                category: category.clone(),
                worker: worker.clone(),
                date: cycle.special_day,
                existing: existing.to_string(),
            }),
        }
    }
    let mut granted: Vec<String> = forced.iter().map(|&i| people[i].worker.clone()).collect();

    // Merit check for incidental placements, alphabetical for determinism.
    let mut incidental: Vec<usize> = people
        .iter()
        .enumerate()
        .filter(|(_, p)| p.plan.contains(&special) && !holders.contains(&p.worker))
        .map(|(i, _)| i)
        .collect();
    incidental.sort_by(|a, b| people[*a].worker.cmp(&people[*b].worker));

    for i in incidental {
        let worker = people[i].worker.clone();
        // Already took the day over from an earlier incidental worker
        if holders.contains(&worker) {
            continue;
        }
        if engine.is_hard_excluded(&worker) {
            log_checks!(verbosity, "{}: {} is excluded, moved off special day", category, worker);
            outcome.merit.push(MeritDecision::Excluded { worker });
            continue;
        }

        let tier = engine.tier(&worker);
        match engine.merit(&worker, &selection, &holders) {
            MeritVerdict::Qualifies => {
                holders.insert(worker.clone());
                granted.push(worker.clone());
                outcome.merit.push(MeritDecision::Deserved { worker, tier });
            }
            MeritVerdict::Outranked { by } => {
                let mut swapped = false;
                for taker in by {
                    let Some(&j) = index.get(&taker) else {
                        continue;
                    };
                    if !grid.is_empty(people[j].row, special) {
                        continue;
                    }
                    let giver_row = people[i].row;
                    let swap_day = people[j].plan.iter().copied().find(|&c| {
                        c != special && grid.is_empty(giver_row, c) && !people[i].plan.contains(&c)
                    });

                    let given = match swap_day {
                        // Taker landed on the special day too; nothing to give back
                        _ if people[j].plan.contains(&special) => {
                            people[i].plan.retain(|&c| c != special);
                            None
                        }
                        Some(day) => {
                            people[j].plan.retain(|&c| c != day);
                            people[j].plan.push(special);
                            people[i].plan.retain(|&c| c != special);
                            people[i].plan.push(day);
                            Some(day)
                        }
                        None if people[j].plan.len() < people[j].wanted => {
                            people[j].plan.push(special);
                            people[i].plan.retain(|&c| c != special);
                            None
                        }
                        None => continue,
                    };

                    let day_date = given
                        .and_then(|c| grid.column(c))
                        .map(|c| c.date)
                        .unwrap_or(cycle.special_day);
                    log_changes!(
                        verbosity,
                        "{}: {} (tier {}) hands {} to {}",
                        category,
                        worker,
                        tier,
                        cycle.special_day,
                        taker
                    );
                    holders.insert(taker.clone());
                    granted.push(taker.clone());
                    outcome.merit.push(MeritDecision::Swapped {
                        from: worker.clone(),
                        to: taker,
                        day: day_date,
                    });
                    swapped = true;
                    break;
                }

                if !swapped {
                    log_changes!(
                        verbosity,
                        "{}: {} (tier {}) keeps {} as an exception",
                        category,
                        worker,
                        tier,
                        cycle.special_day
                    );
                    holders.insert(worker.clone());
                    granted.push(worker.clone());
                    outcome.warnings.push(EngineWarning::MeritException {
                        category: category.clone(),
                        worker: worker.clone(),
                        tier,
                        date: cycle.special_day,
                    });
                    outcome.merit.push(MeritDecision::Exception { worker, tier });
                }
            }
        }
    }

    // Selected workers: special day plus independently chosen other days.
    for &i in &forced {
        let p = &mut people[i];
        p.plan.retain(|&c| c != special);
        p.plan.truncate(p.wanted.saturating_sub(1));
        p.plan.push(special);
    }

    // Everyone else stays off the special day.
    for p in people.iter_mut() {
        if !holders.contains(&p.worker) {
            p.plan.retain(|&c| c != special);
        }
    }

    // Top up with the earliest free days of the cycle.
    for p in people.iter_mut() {
        for col in first..=last {
            if p.plan.len() >= p.wanted {
                break;
            }
            if col != special && grid.is_empty(p.row, col) && !p.plan.contains(&col) {
                p.plan.push(col);
            }
        }
        if p.plan.len() < p.wanted {
            outcome.warnings.push(EngineWarning::RestDaysShort {
                worker: p.worker.clone(),
                wanted: p.wanted,
                placed: p.plan.len(),
            });
        }
        p.plan.sort_unstable();
        p.plan.dedup();
    }

    // Commit.
    for p in &people {
        let mut written: Vec<NaiveDate> = Vec::with_capacity(p.plan.len());
        for &col in &p.plan {
            let value = if col == special {
                category.as_str()
            } else {
                cycle.rest_category.as_str()
            };
            let date = grid.column(col).map(|c| c.date).unwrap_or(cycle.start);
            match grid.write(p.row, col, value) {
                Ok(()) => {
                    log_changes!(verbosity, "{}: {} -> {} {}", category, p.worker, date, value);
                    written.push(date);
                }
                Err(e) => {
                    if col == special && grid.cell(p.row, col) != Some(category.as_str()) {
                        granted.retain(|w| w != &p.worker);
                    }
                    outcome.warnings.push(EngineWarning::CellNotWritten {
                        category: category.clone(),
                        worker: p.worker.clone(),
                        date,
                        detail: e.to_string(),
                    });
                }
            }
        }
        if !written.is_empty() {
            outcome.rest_days.insert(p.worker.clone(), written);
        }
    }

    let mut seen = FxHashSet::default();
    granted.retain(|w| seen.insert(w.clone()));
    outcome.granted = granted;
    outcome.selection = selection;
    Ok(outcome)
}

//! Adjacency predicate for placing a category in a worker's calendar.
//!
//! The predicate is pure: it reads the grid and the pending placements and
//! never mutates either, so evaluating it twice on the same state gives the
//! same verdict.

use rustc_hash::FxHashMap;

use crate::config::CategoryRules;
use crate::grid::SlotGrid;
use crate::interner::WorkerRow;

/// Classification of a candidate placement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Clean,
    Soft(String),
    Hard(String),
}

impl Verdict {
    pub fn hard_violation(&self) -> bool {
        matches!(self, Self::Hard(_))
    }

    pub fn soft_violation(&self) -> bool {
        matches!(self, Self::Soft(_))
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Clean => None,
            Self::Soft(r) | Self::Hard(r) => Some(r),
        }
    }

    /// 0 = clean, 1 = soft, 2 = hard. Lower is better.
    pub fn severity(&self) -> u8 {
        match self {
            Self::Clean => 0,
            Self::Soft(_) => 1,
            Self::Hard(_) => 2,
        }
    }
}

/// Placements planned but not yet written to the grid.
///
/// Consulted for a neighbor day only when the grid cell itself is empty.
#[derive(Clone, Debug, Default)]
pub struct PendingPlacements {
    cells: FxHashMap<(WorkerRow, usize), String>,
}

impl PendingPlacements {
    pub fn insert(&mut self, row: WorkerRow, col: usize, category: &str) {
        self.cells.insert((row, col), category.to_string());
    }

    pub fn remove(&mut self, row: WorkerRow, col: usize) -> Option<String> {
        self.cells.remove(&(row, col))
    }

    pub fn get(&self, row: WorkerRow, col: usize) -> Option<&str> {
        self.cells.get(&(row, col)).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Checks a placement against the configured adjacency rules.
#[derive(Clone, Copy, Debug)]
pub struct ConstraintPredicate<'a> {
    rules: &'a CategoryRules,
}

impl<'a> ConstraintPredicate<'a> {
    pub fn new(rules: &'a CategoryRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &'a CategoryRules {
        self.rules
    }

    fn neighbor<'g>(
        grid: &'g SlotGrid,
        pending: &'g PendingPlacements,
        row: WorkerRow,
        col: usize,
    ) -> Option<&'g str> {
        grid.cell(row, col).or_else(|| pending.get(row, col))
    }

    fn label(grid: &SlotGrid, col: usize) -> &str {
        grid.column(col).map(|c| c.label.as_str()).unwrap_or("?")
    }

    /// Classify placing `category` for the worker in `row` at `col`.
    ///
    /// Grid boundaries are not checked: a missing neighbor column never
    /// violates anything.
    pub fn check(
        &self,
        grid: &SlotGrid,
        pending: &PendingPlacements,
        row: WorkerRow,
        col: usize,
        category: &str,
    ) -> Verdict {
        let rules = self.rules;
        let worker = grid.worker_at(row).unwrap_or_default();

        if rules.is_excluded(worker, category) {
            return Verdict::Hard(format!("{} is excluded from {}", worker, category));
        }

        let next = if col + 1 < grid.num_columns() {
            Self::neighbor(grid, pending, row, col + 1)
        } else {
            None
        };
        let prev = if col > 0 {
            Self::neighbor(grid, pending, row, col - 1)
        } else {
            None
        };
        let here = Self::label(grid, col);

        if rules.is_hard_source(category) {
            if let Some(n) = next.filter(|n| rules.is_blocked(n)) {
                return Verdict::Hard(format!(
                    "{} on {} is followed by {} on {}",
                    category,
                    here,
                    n,
                    Self::label(grid, col + 1)
                ));
            }
            if rules.is_blocked(category) {
                if let Some(p) = prev.filter(|p| rules.is_blocked(p)) {
                    return Verdict::Hard(format!(
                        "{} on {} is preceded by {} on {}",
                        category,
                        here,
                        p,
                        Self::label(grid, col - 1)
                    ));
                }
            }
        }

        if rules.is_blocked(category) {
            if let Some(p) = prev.filter(|p| rules.is_hard_source(p)) {
                return Verdict::Hard(format!(
                    "{} on {} follows {} on {}",
                    category,
                    here,
                    p,
                    Self::label(grid, col - 1)
                ));
            }
        }

        if rules.is_soft_source(category) {
            if let Some(n) = next.filter(|n| rules.is_blocked(n)) {
                return Verdict::Soft(format!(
                    "{} on {} is followed by {} on {}",
                    category,
                    here,
                    n,
                    Self::label(grid, col + 1)
                ));
            }
        }

        if rules.is_blocked(category) {
            if let Some(p) = prev.filter(|p| rules.is_soft_source(p)) {
                return Verdict::Soft(format!(
                    "{} on {} follows {} on {}",
                    category,
                    here,
                    p,
                    Self::label(grid, col - 1)
                ));
            }
        }

        Verdict::Clean
    }
}

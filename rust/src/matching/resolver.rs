//! Conflict-aware resolution of demands against the grid.

use chrono::NaiveDate;
use rustc_hash::FxHashMap;

use crate::constraint::{ConstraintPredicate, PendingPlacements, Verdict};
use crate::fairness::TieBreak;
use crate::grid::SlotGrid;
use crate::interner::WorkerRow;
use crate::models::{column_label, AssignmentRecord, DemandRequest, Outcome};
use crate::warnings::EngineWarning;
use crate::{log_changes, log_checks, log_debug};

use super::graph::{two_pass_matching, DemandGraph, EdgeKind};

/// Records for a demand batch plus the warnings raised on the way.
#[derive(Clone, Debug, Default)]
pub struct ResolveOutcome {
    /// One record per demand, in input order
    pub records: Vec<AssignmentRecord>,
    pub warnings: Vec<EngineWarning>,
}

/// A demand whose worker exists in the grid.
struct Placeable<'d> {
    index: usize,
    demand: &'d DemandRequest,
    row: WorkerRow,
}

/// Resolves demands category by category.
pub struct MatchingResolver<'a> {
    predicate: ConstraintPredicate<'a>,
    tie_break: TieBreak,
    verbosity: u8,
}

impl<'a> MatchingResolver<'a> {
    pub fn new(predicate: ConstraintPredicate<'a>) -> Self {
        Self {
            predicate,
            tie_break: TieBreak::Identifier,
            verbosity: 0,
        }
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    fn tracks_pending(&self, category: &str) -> bool {
        let rules = self.predicate.rules();
        rules.is_blocked(category)
            || rules.is_hard_source(category)
            || rules.is_soft_source(category)
    }

    /// Resolve every demand, writing accepted placements into the grid.
    ///
    /// Categories are processed in order of first appearance. Never fails:
    /// problems end up as `unassigned` or `forced_hard` records.
    pub fn resolve(&self, grid: &mut SlotGrid, demands: &[DemandRequest]) -> ResolveOutcome {
        let mut categories: Vec<&str> = Vec::new();
        for d in demands {
            if !categories.contains(&d.category.as_str()) {
                categories.push(&d.category);
            }
        }

        // Placements of later categories are not in the grid yet.
        let mut pending = PendingPlacements::default();
        let mut pending_by_category: FxHashMap<&str, Vec<(WorkerRow, usize)>> =
            FxHashMap::default();
        for d in demands.iter().filter(|d| self.tracks_pending(&d.category)) {
            let Some(row) = grid.row(&d.worker) else {
                continue;
            };
            if let Some(&col) = grid.resolve_date(d.requested_date).first() {
                if grid.is_empty(row, col) && pending.get(row, col).is_none() {
                    pending.insert(row, col, &d.category);
                    pending_by_category
                        .entry(d.category.as_str())
                        .or_default()
                        .push((row, col));
                }
            }
        }

        let mut records: Vec<Option<AssignmentRecord>> = vec![None; demands.len()];
        let mut warnings = Vec::new();

        for category in categories {
            for (row, col) in pending_by_category.remove(category).unwrap_or_default() {
                pending.remove(row, col);
            }

            let mut placeable: Vec<Placeable> = Vec::new();
            for (index, demand) in demands.iter().enumerate() {
                if demand.category != category {
                    continue;
                }
                match grid.row(&demand.worker) {
                    Some(row) => placeable.push(Placeable { index, demand, row }),
                    None => {
                        log_checks!(
                            self.verbosity,
                            "{}: unknown worker {}",
                            category,
                            demand.worker
                        );
                        warnings.push(EngineWarning::UnknownWorker {
                            category: category.to_string(),
                            worker: demand.worker.clone(),
                        });
                        records[index] =
                            Some(AssignmentRecord::unassigned(demand, "worker not found"));
                    }
                }
            }

            self.resolve_category(
                grid,
                &pending,
                category,
                &placeable,
                &mut records,
                &mut warnings,
            );
        }

        ResolveOutcome {
            records: records.into_iter().flatten().collect(),
            warnings,
        }
    }

    /// Best admissible column among `cols` for this placement, as of now.
    ///
    /// Skips occupied cells and columns where someone already holds the
    /// category. Ties go to the column nearest the requested date.
    fn best_column(
        &self,
        grid: &SlotGrid,
        pending: &PendingPlacements,
        row: WorkerRow,
        cols: &[usize],
        category: &str,
        requested: NaiveDate,
    ) -> Option<(usize, Verdict)> {
        cols.iter()
            .copied()
            .filter(|&c| grid.is_empty(row, c) && grid.category_holder(c, category).is_none())
            .map(|c| (c, self.predicate.check(grid, pending, row, c, category)))
            .min_by_key(|(c, v)| {
                let distance = grid
                    .column(*c)
                    .map(|col| (col.date - requested).num_days().abs())
                    .unwrap_or(i64::MAX);
                (v.severity(), distance, *c)
            })
    }

    fn resolve_category(
        &self,
        grid: &mut SlotGrid,
        pending: &PendingPlacements,
        category: &str,
        placeable: &[Placeable],
        records: &mut [Option<AssignmentRecord>],
        warnings: &mut Vec<EngineWarning>,
    ) {
        // One slot per distinct requested date.
        let mut slot_dates: Vec<NaiveDate> = Vec::new();
        for p in placeable {
            if !slot_dates.contains(&p.demand.requested_date) {
                slot_dates.push(p.demand.requested_date);
            }
        }
        let slot_cols: Vec<Vec<usize>> = slot_dates.iter().map(|d| grid.resolve_date(*d)).collect();

        let mut graph = DemandGraph::new(placeable.len(), slot_dates.len());
        for (i, p) in placeable.iter().enumerate() {
            let requested = p.demand.requested_date;
            let mut slots: Vec<usize> = (0..slot_dates.len()).collect();
            slots.sort_by_key(|&j| {
                (
                    slot_dates[j] != requested,
                    (slot_dates[j] - requested).num_days().abs(),
                    j,
                )
            });
            for j in slots {
                let Some((_, verdict)) =
                    self.best_column(grid, pending, p.row, &slot_cols[j], category, requested)
                else {
                    continue;
                };
                let kind = match verdict {
                    Verdict::Clean => EdgeKind::Strong,
                    Verdict::Soft(_) => EdgeKind::Weak,
                    Verdict::Hard(_) => continue,
                };
                log_debug!(
                    self.verbosity,
                    "{}: edge {} -> {} {:?}",
                    category,
                    p.demand.worker,
                    slot_dates[j],
                    kind
                );
                graph.add_edge(i, j, kind);
            }
        }

        let mut order: Vec<usize> = (0..placeable.len()).collect();
        if let TieBreak::Seeded(_) = self.tie_break {
            order.sort_by_key(|&i| (self.tie_break.rank(&placeable[i].demand.worker), i));
        }
        let matching = two_pass_matching(&graph, &order, self.verbosity);

        // Commit matched demands on their best column; anything that no
        // longer fits joins the forced list.
        let mut leftovers: Vec<usize> = Vec::new();
        for (i, p) in placeable.iter().enumerate() {
            let Some(j) = matching.demand_to_slot[i] else {
                leftovers.push(i);
                continue;
            };
            let requested = p.demand.requested_date;
            match self.best_column(grid, pending, p.row, &slot_cols[j], category, requested) {
                Some((col, verdict)) if !verdict.hard_violation() => {
                    if let Some(record) = self.commit(grid, p, col, verdict, category, warnings) {
                        records[p.index] = Some(record);
                    } else {
                        leftovers.push(i);
                    }
                }
                _ => leftovers.push(i),
            }
        }

        for i in leftovers {
            let p = &placeable[i];
            let requested = p.demand.requested_date;
            let mut cols = grid.resolve_date(requested);
            if cols.is_empty() {
                warnings.push(EngineWarning::DateOutsideHorizon {
                    category: category.to_string(),
                    date: requested,
                });
            }
            for c in grid.same_weekday_columns(requested) {
                if !cols.contains(&c) {
                    cols.push(c);
                }
            }

            // First column of minimal severity in scan order.
            let mut best: Option<(usize, Verdict)> = None;
            for c in cols {
                if !grid.is_empty(p.row, c) || grid.category_holder(c, category).is_some() {
                    continue;
                }
                let verdict = self.predicate.check(grid, pending, p.row, c, category);
                if best
                    .as_ref()
                    .map_or(true, |(_, b)| verdict.severity() < b.severity())
                {
                    let clean = verdict.is_clean();
                    best = Some((c, verdict));
                    if clean {
                        break;
                    }
                }
            }

            let record = best
                .and_then(|(col, verdict)| self.commit(grid, p, col, verdict, category, warnings));
            records[p.index] = Some(record.unwrap_or_else(|| {
                log_changes!(
                    self.verbosity,
                    "{}: {} unassigned near {}",
                    category,
                    p.demand.worker,
                    requested
                );
                AssignmentRecord::unassigned(p.demand, format!("no empty cell for {}", category))
            }));
        }
    }

    /// Write one placement and build its record. `None` if the write failed.
    fn commit(
        &self,
        grid: &mut SlotGrid,
        p: &Placeable,
        col: usize,
        verdict: Verdict,
        category: &str,
        warnings: &mut Vec<EngineWarning>,
    ) -> Option<AssignmentRecord> {
        let date = grid.column(col)?.date;
        let requested = p.demand.requested_date;
        // A request outside the horizon is met by any column with its label
        let direct = date == requested
            || (grid.column_index(requested).is_none()
                && column_label(date) == column_label(requested));
        if let Err(e) = grid.write_exclusive(p.row, col, category) {
            log_checks!(self.verbosity, "{}: write refused: {}", category, e);
            return None;
        }

        let outcome = match &verdict {
            Verdict::Clean if direct => Outcome::Direct,
            Verdict::Clean => Outcome::Exchanged,
            Verdict::Soft(_) => Outcome::Soft,
            Verdict::Hard(reason) => {
                warnings.push(EngineWarning::HardConstraintForced {
                    category: category.to_string(),
                    worker: p.demand.worker.clone(),
                    date,
                    reason: reason.clone(),
                });
                Outcome::ForcedHard
            }
        };
        log_changes!(
            self.verbosity,
            "{}: {} -> {} ({})",
            category,
            p.demand.worker,
            date,
            outcome
        );
        Some(AssignmentRecord::resolved(
            p.demand,
            date,
            outcome,
            verdict.reason().map(str::to_string),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CategoryRole, CategoryRules};

    fn d(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn rules() -> CategoryRules {
        CategoryRules::from_roles(
            "test",
            [
                ("X", CategoryRole::BlockedNextDay),
                ("Y", CategoryRole::HardSource),
                ("E", CategoryRole::SoftSource),
            ],
        )
    }

    // Mon 2025-01-06 .. Sun 2025-01-19
    fn grid() -> SlotGrid {
        SlotGrid::new(d(2025, 1, 6), d(2025, 1, 19), ["a", "b", "c"]).unwrap()
    }

    fn outcomes(out: &ResolveOutcome) -> Vec<Outcome> {
        out.records.iter().map(|r| r.outcome).collect()
    }

    #[test]
    fn test_clean_demands_are_direct() {
        let rules = rules();
        let mut g = grid();
        let demands = vec![
            DemandRequest::of("P", "a", d(2025, 1, 7)),
            DemandRequest::of("P", "b", d(2025, 1, 8)),
        ];
        let out = MatchingResolver::new(ConstraintPredicate::new(&rules)).resolve(&mut g, &demands);
        assert_eq!(outcomes(&out), vec![Outcome::Direct, Outcome::Direct]);
        assert_eq!(g.cell_at("a", d(2025, 1, 7)), Some("P"));
        assert_eq!(g.cell_at("b", d(2025, 1, 8)), Some("P"));
    }

    #[test]
    fn test_hard_conflict_exchanges_date() {
        let rules = rules();
        let mut g = grid();
        // a cannot take Y on the 9th: X follows on the 10th
        g.prefill("a", d(2025, 1, 10), "X").unwrap();
        let demands = vec![
            DemandRequest::of("Y", "a", d(2025, 1, 9)),
            DemandRequest::of("Y", "b", d(2025, 1, 13)),
        ];
        let out = MatchingResolver::new(ConstraintPredicate::new(&rules)).resolve(&mut g, &demands);
        assert_eq!(outcomes(&out), vec![Outcome::Exchanged, Outcome::Exchanged]);
        assert_eq!(out.records[0].resolved_date, Some(d(2025, 1, 13)));
        assert_eq!(out.records[1].resolved_date, Some(d(2025, 1, 9)));
        assert_eq!(g.cell_at("a", d(2025, 1, 9)), None);
    }

    #[test]
    fn test_soft_conflict_is_soft() {
        let rules = rules();
        let mut g = grid();
        g.prefill("a", d(2025, 1, 10), "X").unwrap();
        let demands = vec![DemandRequest::of("E", "a", d(2025, 1, 9))];
        let out = MatchingResolver::new(ConstraintPredicate::new(&rules)).resolve(&mut g, &demands);
        assert_eq!(outcomes(&out), vec![Outcome::Soft]);
        assert!(out.records[0].reason.as_deref().unwrap().contains("FRI-10"));
        assert_eq!(g.cell_at("a", d(2025, 1, 9)), Some("E"));
    }

    #[test]
    fn test_forced_hard_when_nothing_else_fits() {
        let rules = rules();
        let mut g = grid();
        // Every Thursday of the horizon is followed by X for a
        g.prefill("a", d(2025, 1, 10), "X").unwrap();
        g.prefill("a", d(2025, 1, 17), "X").unwrap();
        let demands = vec![DemandRequest::of("Y", "a", d(2025, 1, 9))];
        let out = MatchingResolver::new(ConstraintPredicate::new(&rules)).resolve(&mut g, &demands);
        assert_eq!(outcomes(&out), vec![Outcome::ForcedHard]);
        assert_eq!(out.records[0].resolved_date, Some(d(2025, 1, 9)));
        assert!(out
            .warnings
            .iter()
            .any(|w| matches!(w, EngineWarning::HardConstraintForced { .. })));
    }

    #[test]
    fn test_forced_fallback_on_same_weekday_can_be_clean() {
        let rules = rules();
        let mut g = grid();
        g.prefill("a", d(2025, 1, 10), "X").unwrap();
        let demands = vec![DemandRequest::of("Y", "a", d(2025, 1, 9))];
        let out = MatchingResolver::new(ConstraintPredicate::new(&rules)).resolve(&mut g, &demands);
        assert_eq!(outcomes(&out), vec![Outcome::Exchanged]);
        assert_eq!(out.records[0].resolved_date, Some(d(2025, 1, 16)));
    }

    #[test]
    fn test_unknown_worker_is_unassigned() {
        let rules = rules();
        let mut g = grid();
        let demands = vec![
            DemandRequest::of("P", "zed", d(2025, 1, 7)),
            DemandRequest::of("P", "a", d(2025, 1, 7)),
        ];
        let out = MatchingResolver::new(ConstraintPredicate::new(&rules)).resolve(&mut g, &demands);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].outcome, Outcome::Unassigned);
        assert_eq!(out.records[0].reason.as_deref(), Some("worker not found"));
        assert_eq!(out.records[1].outcome, Outcome::Direct);
    }

    #[test]
    fn test_same_date_goes_to_one_worker_only() {
        let rules = rules();
        let mut g = grid();
        let demands = vec![
            DemandRequest::of("P", "a", d(2025, 1, 7)),
            DemandRequest::of("P", "b", d(2025, 1, 7)),
        ];
        let out = MatchingResolver::new(ConstraintPredicate::new(&rules)).resolve(&mut g, &demands);
        assert_eq!(out.records[0].outcome, Outcome::Direct);
        // b falls back to the next Tuesday
        assert_eq!(out.records[1].resolved_date, Some(d(2025, 1, 14)));
        assert_eq!(out.records[1].outcome, Outcome::Exchanged);
    }

    #[test]
    fn test_unassigned_when_no_cell_left() {
        let rules = rules();
        let mut g = SlotGrid::new(d(2025, 1, 6), d(2025, 1, 12), ["a", "b"]).unwrap();
        let demands = vec![
            DemandRequest::of("P", "a", d(2025, 1, 7)),
            DemandRequest::of("P", "b", d(2025, 1, 7)),
        ];
        let out = MatchingResolver::new(ConstraintPredicate::new(&rules)).resolve(&mut g, &demands);
        assert_eq!(out.records[1].outcome, Outcome::Unassigned);
        assert_eq!(out.records[1].resolved_date, None);
    }

    #[test]
    fn test_pending_later_category_is_respected() {
        let rules = rules();
        let mut g = grid();
        // Y for a on the 9th would precede the pending X on the 10th
        let demands = vec![
            DemandRequest::of("Y", "a", d(2025, 1, 9)),
            DemandRequest::of("Y", "b", d(2025, 1, 11)),
            DemandRequest::of("X", "a", d(2025, 1, 10)),
        ];
        let out = MatchingResolver::new(ConstraintPredicate::new(&rules)).resolve(&mut g, &demands);
        assert_eq!(out.records[0].resolved_date, Some(d(2025, 1, 11)));
        assert_eq!(out.records[1].resolved_date, Some(d(2025, 1, 9)));
        assert_eq!(out.records[2].outcome, Outcome::Direct);
    }

    #[test]
    fn test_prior_cells_untouched() {
        let rules = rules();
        let mut g = grid();
        g.prefill("a", d(2025, 1, 7), "N").unwrap();
        let before = g.occupied_cells();
        let demands = vec![DemandRequest::of("P", "a", d(2025, 1, 7))];
        let out = MatchingResolver::new(ConstraintPredicate::new(&rules)).resolve(&mut g, &demands);
        assert_eq!(out.records[0].resolved_date, Some(d(2025, 1, 14)));
        for cell in before {
            assert!(g.occupied_cells().contains(&cell));
        }
    }

    #[test]
    fn test_label_match_outside_horizon_is_direct() {
        let rules = rules();
        let mut g = grid();
        // MON-13 in October resolves to MON-13 in January
        let demands = vec![DemandRequest::of("P", "a", d(2025, 10, 13))];
        let out = MatchingResolver::new(ConstraintPredicate::new(&rules)).resolve(&mut g, &demands);
        assert_eq!(out.records[0].resolved_date, Some(d(2025, 1, 13)));
        assert_eq!(out.records[0].outcome, Outcome::Direct);
    }

    #[test]
    fn test_weak_demand_does_not_displace_clean_match() {
        let rules = rules();
        let mut g = SlotGrid::new(d(2025, 1, 6), d(2025, 1, 12), ["a", "b", "c"]).unwrap();
        // E for b on Tuesday is soft (X on Wednesday); b's own Friday is taken
        g.prefill("b", d(2025, 1, 8), "X").unwrap();
        g.prefill("b", d(2025, 1, 10), "N").unwrap();
        let demands = vec![
            DemandRequest::of("E", "a", d(2025, 1, 7)),
            DemandRequest::of("E", "b", d(2025, 1, 10)),
        ];
        let out = MatchingResolver::new(ConstraintPredicate::new(&rules)).resolve(&mut g, &demands);
        assert_eq!(out.records[0].outcome, Outcome::Direct);
        assert_eq!(out.records[0].resolved_date, Some(d(2025, 1, 7)));
        assert_eq!(out.records[1].outcome, Outcome::Unassigned);
        assert_eq!(g.cell_at("a", d(2025, 1, 7)), Some("E"));
        assert_eq!(g.cell_at("b", d(2025, 1, 7)), None);
    }
}

use chrono::{Duration, NaiveDate};
use proptest::collection::{btree_map, btree_set, vec};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

use rota_engine::{
    tier_for, CategoryRole, CategoryRules, ConstraintPredicate, DemandRequest, EngineConfig,
    FairnessQueue, MatchingResolver, Outcome, PriorityRecord, QuotaFormula, RestCycle,
    RosterEngine, RosterPlan, RotationRequest, ScarceCategory, ScarceRequest, SlotGrid, TieBreak,
    Worker,
};

const DAYS: i64 = 28;
const CATEGORIES: [&str; 4] = ["X", "Y", "E", "P"];

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 6).unwrap()
}

fn day(offset: u32) -> NaiveDate {
    start() + Duration::days(offset as i64)
}

fn worker_ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("W{:02}", i)).collect()
}

fn grid(workers: &[String]) -> SlotGrid {
    SlotGrid::new(start(), start() + Duration::days(DAYS - 1), workers).unwrap()
}

fn rules() -> CategoryRules {
    CategoryRules::from_roles(
        "props",
        [
            ("X", CategoryRole::BlockedNextDay),
            ("Y", CategoryRole::HardSource),
            ("E", CategoryRole::SoftSource),
        ],
    )
}

fn week_day(offset: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 3).unwrap() + Duration::days(offset as i64)
}

fn run_rules() -> CategoryRules {
    CategoryRules::from_roles(
        "run",
        [
            ("D", CategoryRole::HardSource),
            ("X", CategoryRole::BlockedNextDay),
            ("Y", CategoryRole::HardSource),
        ],
    )
}

proptest! {
    #[test]
    fn test_no_double_booking_and_prior_cells_kept(
        prefilled in vec((0usize..5, 0u32..28, 0usize..4), 0..20),
        demands in vec((0usize..4, 0usize..6, 0u32..35), 0..25),
        seed in proptest::option::of(any::<u64>()),
    ) {
        let rules = rules();
        let workers = worker_ids(5);
        let mut g = grid(&workers);
        for (w, offset, c) in &prefilled {
            // Collisions among generated prefills are simply skipped
            let _ = g.prefill(&workers[*w], day(*offset), CATEGORIES[*c]);
        }
        let before = g.occupied_cells();

        // Worker index 5 is not in the grid; offsets past 27 fall outside it
        let demands: Vec<DemandRequest> = demands
            .iter()
            .map(|(c, w, offset)| {
                DemandRequest::of(CATEGORIES[*c], &format!("W{:02}", w), day(*offset))
            })
            .collect();

        let out = MatchingResolver::new(ConstraintPredicate::new(&rules))
            .with_tie_break(TieBreak::from_seed(seed))
            .resolve(&mut g, &demands);
        prop_assert_eq!(out.records.len(), demands.len());

        let mut taken = HashSet::new();
        for r in &out.records {
            if let Some(date) = r.resolved_date {
                prop_assert!(taken.insert((r.category.clone(), date)));
                prop_assert_eq!(g.cell_at(&r.worker, date), Some(r.category.as_str()));
            } else {
                prop_assert_eq!(r.outcome, Outcome::Unassigned);
            }
        }

        let after = g.occupied_cells();
        for cell in &before {
            prop_assert!(after.contains(cell));
        }
    }

    #[test]
    fn test_rotation_covers_distinct_workers(
        histories in vec(proptest::option::of(0u32..60), 3..8),
        dates in btree_set(0u32..28, 1..4),
    ) {
        let base = NaiveDate::from_ymd_opt(2024, 11, 1).unwrap();
        let workers: Vec<Worker> = histories
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let id = format!("W{:02}", i);
                match h {
                    Some(offset) => {
                        Worker::with_history(&id, [base + Duration::days(*offset as i64)])
                    }
                    None => Worker::new(&id),
                }
            })
            .collect();
        let dates: Vec<NaiveDate> = dates.iter().map(|o| day(*o)).collect();

        let mut queue =
            FairnessQueue::build(&workers, &Default::default(), TieBreak::Identifier).unwrap();
        let result = queue.assign(&dates);

        let assigned: HashSet<&String> = result.by_date.values().collect();
        prop_assert_eq!(assigned.len(), dates.len());

        let key = |w: &Worker| (w.last_assigned_date(), w.total_assigned(), w.id().to_string());
        let worst_assigned = workers
            .iter()
            .filter(|w| assigned.contains(&w.id().to_string()))
            .map(key)
            .max()
            .unwrap();
        for w in workers.iter().filter(|w| !assigned.contains(&w.id().to_string())) {
            prop_assert!(key(w) > worst_assigned);
        }
    }

    #[test]
    fn test_clean_demands_never_degrade(
        demands in btree_map(0u32..28, 0usize..5, 1..15),
    ) {
        let rules = CategoryRules::default();
        let workers = worker_ids(5);
        let mut g = grid(&workers);
        let demands: Vec<DemandRequest> = demands
            .iter()
            .map(|(offset, w)| DemandRequest::of("P", &workers[*w], day(*offset)))
            .collect();

        let out = MatchingResolver::new(ConstraintPredicate::new(&rules)).resolve(&mut g, &demands);
        for r in &out.records {
            prop_assert!(matches!(r.outcome, Outcome::Direct | Outcome::Exchanged));
        }
    }

    #[test]
    fn test_tier_monotone_and_reset_by_grant(
        last in proptest::option::of(-50i64..50),
        current in -50i64..50,
    ) {
        prop_assert!(tier_for(last, current) <= tier_for(last, current + 1));

        let mut record = PriorityRecord::new();
        record.set("w", last);
        record.grant("w", current, 1);
        prop_assert!(record.state("w", false).tier(current) <= 0);
    }

    #[test]
    fn test_full_run_keeps_grid_consistent(
        prefilled in vec((0usize..5, 0u32..7), 0..8),
        rotation_days in btree_set(0u32..7, 0..4),
        tentative in vec(btree_set(0u32..7, 0..3), 5),
        last_grants in vec(proptest::option::of(0i64..12), 5),
        quota in 0usize..3,
        demands in vec((0usize..3, 0usize..5, 0u32..7), 0..10),
    ) {
        let workers = worker_ids(5);
        let sunday = week_day(6);
        let mut g = SlotGrid::new(week_day(0), sunday, &workers).unwrap();
        for (w, offset) in &prefilled {
            let _ = g.prefill(&workers[*w], week_day(*offset), "N");
        }
        let before = g.occupied_cells();

        let mut record = PriorityRecord::new();
        let mut cycle = RestCycle::new(week_day(0), sunday, sunday, "R");
        for (i, w) in workers.iter().enumerate() {
            record.set(w, last_grants[i]);
            cycle = cycle.with_tentative(w, tentative[i].iter().map(|o| week_day(*o)));
        }

        let plan = RosterPlan {
            rotations: vec![RotationRequest {
                category: "D".to_string(),
                workers: workers.iter().map(|w| Worker::new(w)).collect(),
                dates: rotation_days.iter().map(|o| week_day(*o)).collect(),
                omit: Default::default(),
            }],
            scarce: vec![ScarceRequest {
                category: ScarceCategory::new("WR", &workers, QuotaFormula::Fixed(quota)),
                cycle,
                omit: Default::default(),
                period: Some(10),
            }],
            demands: demands
                .iter()
                .map(|(c, w, offset)| {
                    DemandRequest::of(["P", "X", "Y"][*c], &workers[*w], week_day(*offset))
                })
                .collect(),
        };

        let engine = RosterEngine::new(EngineConfig::default(), run_rules());
        let report = engine.run(&mut g, &plan, &mut record);
        prop_assert!(report.aborted.is_empty());
        prop_assert_eq!(report.records.len(), plan.demands.len());

        let after = g.occupied_cells();
        for cell in &before {
            prop_assert!(after.contains(cell));
        }

        let mut holders: HashMap<(NaiveDate, &str), usize> = HashMap::new();
        for (_, date, value) in &after {
            if ["D", "P", "X", "Y"].contains(&value.as_str()) {
                *holders.entry((*date, value.as_str())).or_default() += 1;
            }
        }
        prop_assert!(holders.values().all(|n| *n == 1));

        let on_special: HashSet<&String> = after
            .iter()
            .filter(|(_, date, value)| *date == sunday && value == "WR")
            .map(|(w, _, _)| w)
            .collect();
        let granted: HashSet<&String> = report.cycles[0].granted.iter().collect();
        prop_assert_eq!(on_special, granted);

        let (_, rotation) = &report.rotations[0];
        for (date, worker) in &rotation.by_date {
            prop_assert_eq!(g.cell_at(worker, *date), Some("D"));
        }
    }
}

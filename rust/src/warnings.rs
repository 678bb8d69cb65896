//! Non-fatal conditions collected during a run.

use chrono::NaiveDate;
use thiserror::Error;

/// A condition the engine recorded and continued past.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineWarning {
    #[error("{category}: demand for unknown worker {worker}")]
    UnknownWorker { category: String, worker: String },
    #[error("{category}: quota {quota} only filled to {filled}")]
    QuotaShortfall {
        category: String,
        quota: usize,
        filled: usize,
    },
    #[error("{category}: {worker} forced onto {date} ({reason})")]
    HardConstraintForced {
        category: String,
        worker: String,
        date: NaiveDate,
        reason: String,
    },
    #[error("{category}: {worker} selected but {date} already holds {existing}")]
    ForcedGrantBlocked {
        category: String,
        worker: String,
        date: NaiveDate,
        existing: String,
    },
    #[error("{category}: {worker} (tier {tier}) kept {date} with no higher-tier taker")]
    MeritException {
        category: String,
        worker: String,
        tier: i32,
        date: NaiveDate,
    },
    #[error("{worker}: only {placed} of {wanted} rest days placed")]
    RestDaysShort {
        worker: String,
        wanted: usize,
        placed: usize,
    },
    #[error("{category}: {worker} selected but all rest days before {date} are already placed")]
    RestDaysAlreadyPlaced {
        category: String,
        worker: String,
        date: NaiveDate,
    },
    #[error("{category}: cell {worker}/{date} not written ({detail})")]
    CellNotWritten {
        category: String,
        worker: String,
        date: NaiveDate,
        detail: String,
    },
    #[error("{category}: {date} is outside the horizon")]
    DateOutsideHorizon { category: String, date: NaiveDate },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_messages() {
        let w = EngineWarning::QuotaShortfall {
            category: "WR".to_string(),
            quota: 3,
            filled: 1,
        };
        assert_eq!(w.to_string(), "WR: quota 3 only filled to 1");

        let w = EngineWarning::UnknownWorker {
            category: "X".to_string(),
            worker: "ZED".to_string(),
        };
        assert!(w.to_string().contains("ZED"));
    }
}

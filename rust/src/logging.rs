//! Verbosity-gated logging for the rota engine.
//!
//! Nothing is formatted when the level is below the threshold, so a run with
//! verbosity 0 pays only for the comparison.
//! - 0: SILENT (nothing)
//! - 1: CHANGES (grid writes, grants, aborted categories)
//! - 2: CHECKS (eligibility, skipped dates, edge classification)
//! - 3: DEBUG (augmenting paths, tier tables)

pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_CHANGES: u8 = 1;
pub const VERBOSITY_CHECKS: u8 = 2;
pub const VERBOSITY_DEBUG: u8 = 3;

/// Log at CHANGES level (verbosity >= 1).
///
/// Used for: cell writes, scarce grants, swaps, category aborts.
#[macro_export]
macro_rules! log_changes {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHANGES {
            eprintln!("[rota] {}", format_args!($($arg)*));
        }
    };
}

/// Log at CHECKS level (verbosity >= 2).
///
/// Used for: rejected placements, skipped duplicates, merit verdicts.
#[macro_export]
macro_rules! log_checks {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHECKS {
            eprintln!("[rota:check] {}", format_args!($($arg)*));
        }
    };
}

/// Log at DEBUG level (verbosity >= 3).
#[macro_export]
macro_rules! log_debug {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_DEBUG {
            eprintln!("[rota:debug] {}", format_args!($($arg)*));
        }
    };
}

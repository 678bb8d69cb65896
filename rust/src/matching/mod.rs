//! Demand matching: bipartite graph, resolver and report.

mod graph;
mod report;
mod resolver;

pub use graph::{two_pass_matching, DemandGraph, EdgeKind, Matching};
pub use report::{report_string, sort_for_report, write_report, ReportError};
pub use resolver::{MatchingResolver, ResolveOutcome};

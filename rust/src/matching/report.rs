//! Tab-separated assignment report.

use std::io;
use thiserror::Error;

use crate::models::AssignmentRecord;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write report: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to flush report: {0}")]
    Io(#[from] io::Error),
}

const HEADER: [&str; 6] = ["category", "worker", "requested", "resolved", "outcome", "reason"];

/// Records most in need of attention first. Stable within a rank.
pub fn sort_for_report(records: &[AssignmentRecord]) -> Vec<&AssignmentRecord> {
    let mut sorted: Vec<&AssignmentRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.outcome.report_rank());
    sorted
}

pub fn write_report<W: io::Write>(records: &[AssignmentRecord], out: W) -> Result<(), ReportError> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(out);
    writer.write_record(HEADER)?;
    for r in sort_for_report(records) {
        let requested = r.requested_date.to_string();
        let resolved = r.resolved_date.map(|d| d.to_string()).unwrap_or_default();
        writer.write_record([
            r.category.as_str(),
            r.worker.as_str(),
            requested.as_str(),
            resolved.as_str(),
            r.outcome.as_str(),
            r.reason.as_deref().unwrap_or(""),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn report_string(records: &[AssignmentRecord]) -> Result<String, ReportError> {
    let mut buf = Vec::new();
    write_report(records, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

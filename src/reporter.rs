use crate::types::{CycleReport, EventRecord};

/// Emit a dispatched change event as a single JSON line to stdout.
///
/// Logs go to stderr; stdout carries the machine-readable audit trail.
pub fn report_event(record: &EventRecord) {
    if let Ok(json) = serde_json::to_string(record) {
        println!("{json}");
    }
}

/// Emit a completed cycle summary as a single JSON line to stdout.
pub fn report_cycle(report: &CycleReport) {
    if let Ok(json) = serde_json::to_string(report) {
        println!("{json}");
    }
}

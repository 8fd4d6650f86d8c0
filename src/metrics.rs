use chrono::{DateTime, Utc};

use crate::error::{RowError, SkipKind};
use crate::inventory::CommitRecord;

/// A row the joiner dropped, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    pub project: String,
    pub commit_id: String,
    pub kind: SkipKind,
    pub error: String,
}

/// Counters for one join run.
#[derive(Debug, Clone, Default)]
pub struct JoinStats {
    /// Inventory rows consumed so far.
    pub rows: usize,
    /// Rows that fetched and parsed cleanly (possibly with zero units).
    pub joined_rows: usize,
    pub records: usize,
    pub fetch_failures: usize,
    pub parse_failures: usize,
    pub skipped: Vec<SkippedRow>,
}

impl JoinStats {
    pub(crate) fn record_joined(&mut self, records: usize) {
        self.joined_rows += 1;
        self.records += records;
    }

    pub(crate) fn record_skip(&mut self, row: &CommitRecord, err: &RowError) {
        let kind = err.kind();
        match kind {
            SkipKind::Fetch => self.fetch_failures += 1,
            SkipKind::Parse => self.parse_failures += 1,
        }
        self.skipped.push(SkippedRow {
            project: row.project.clone(),
            commit_id: row.commit_id.clone(),
            kind,
            error: err.to_string(),
        });
    }

    pub fn skipped_count(&self) -> usize {
        self.fetch_failures + self.parse_failures
    }

    pub fn merge(&mut self, other: JoinStats) {
        self.rows += other.rows;
        self.joined_rows += other.joined_rows;
        self.records += other.records;
        self.fetch_failures += other.fetch_failures;
        self.parse_failures += other.parse_failures;
        self.skipped.extend(other.skipped);
    }

    pub fn print(&self) {
        println!(
            "Joined {} of {} rows into {} records ({} skipped: {} fetch, {} parse).",
            self.joined_rows,
            self.rows,
            self.records,
            self.skipped_count(),
            self.fetch_failures,
            self.parse_failures,
        );
    }
}

/// Identity and timing of one run, as stored alongside its records.
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub inventory: String,
}

impl RunInfo {
    pub fn start(inventory: &str) -> Self {
        let started_at = Utc::now();
        RunInfo {
            run_id: new_run_id(started_at),
            started_at,
            inventory: inventory.to_string(),
        }
    }
}

pub fn new_run_id(at: DateTime<Utc>) -> String {
    format!("run-{}", at.format("%Y%m%d-%H%M%S%.3f"))
}

// ── Tests ──

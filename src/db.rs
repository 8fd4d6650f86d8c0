use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::joiner::JoinedRecord;
use crate::metrics::{JoinStats, RunInfo};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS runs (
            run_id          TEXT PRIMARY KEY,
            inventory       TEXT NOT NULL,
            started_at      TEXT NOT NULL,
            finished_at     TEXT,
            total_rows      INTEGER NOT NULL DEFAULT 0,
            joined_rows     INTEGER NOT NULL DEFAULT 0,
            records         INTEGER NOT NULL DEFAULT 0,
            fetch_failures  INTEGER NOT NULL DEFAULT 0,
            parse_failures  INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS joined_records (
            id          INTEGER PRIMARY KEY,
            run_id      TEXT NOT NULL REFERENCES runs(run_id),
            repo_source TEXT NOT NULL,
            commit_id   TEXT NOT NULL,
            file_path   TEXT NOT NULL,
            label       TEXT NOT NULL,
            unit_kind   TEXT NOT NULL,
            unit_name   TEXT,
            code        TEXT NOT NULL,
            flags       TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_records_run ON joined_records(run_id);
        CREATE INDEX IF NOT EXISTS idx_records_commit ON joined_records(repo_source, commit_id);
        CREATE INDEX IF NOT EXISTS idx_records_label ON joined_records(label);

        CREATE TABLE IF NOT EXISTS skipped_rows (
            id          INTEGER PRIMARY KEY,
            run_id      TEXT NOT NULL REFERENCES runs(run_id),
            repo_source TEXT NOT NULL,
            commit_id   TEXT NOT NULL,
            kind        TEXT NOT NULL CHECK(kind IN ('fetch','parse')),
            error       TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_skipped_run ON skipped_rows(run_id);
        ",
    )?;
    Ok(())
}

// ── Runs ──

/// Register a run before any of its records are saved.
pub fn begin_run(conn: &Connection, run: &RunInfo) -> Result<()> {
    conn.execute(
        "INSERT INTO runs (run_id, inventory, started_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![run.run_id, run.inventory, run.started_at.to_rfc3339()],
    )?;
    Ok(())
}

/// Store the final counters and skipped rows of a run.
pub fn finish_run(conn: &Connection, run: &RunInfo, stats: &JoinStats) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE runs SET finished_at = ?2, total_rows = ?3, joined_rows = ?4, records = ?5,
                fetch_failures = ?6, parse_failures = ?7
         WHERE run_id = ?1",
        rusqlite::params![
            run.run_id,
            chrono::Utc::now().to_rfc3339(),
            stats.rows,
            stats.joined_rows,
            stats.records,
            stats.fetch_failures,
            stats.parse_failures,
        ],
    )?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO skipped_rows (run_id, repo_source, commit_id, kind, error)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for s in &stats.skipped {
            stmt.execute(rusqlite::params![
                run.run_id,
                s.project,
                s.commit_id,
                s.kind.as_str(),
                s.error,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

// ── Records ──

pub fn save_records(conn: &Connection, run_id: &str, records: &[JoinedRecord]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO joined_records
             (run_id, repo_source, commit_id, file_path, label, unit_kind, unit_name, code, flags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for r in records {
            stmt.execute(rusqlite::params![
                run_id,
                r.repo_source,
                r.commit_id,
                r.file_path,
                r.label,
                r.unit_kind,
                r.unit_name,
                r.code,
                flags_json(&r.flags),
            ])?;
        }
    }
    tx.commit()?;
    Ok(records.len())
}

fn flags_json(flags: &[(String, String)]) -> String {
    let map: serde_json::Map<String, serde_json::Value> = flags
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
        .collect();
    serde_json::Value::Object(map).to_string()
}

// ── Stats ──

pub struct RunRow {
    pub run_id: String,
    pub inventory: String,
    pub started_at: String,
    pub finished: bool,
    pub rows: usize,
    pub records: usize,
    pub fetch_failures: usize,
    pub parse_failures: usize,
}

pub struct Stats {
    pub runs: usize,
    pub records: usize,
    pub skipped: usize,
    pub labels: Vec<(String, usize)>,
    pub recent: Vec<RunRow>,
}

pub fn get_stats(conn: &Connection, recent: usize) -> Result<Stats> {
    let runs: usize = conn.query_row("SELECT COUNT(*) FROM runs", [], |r| r.get(0))?;
    let records: usize = conn.query_row("SELECT COUNT(*) FROM joined_records", [], |r| r.get(0))?;
    let skipped: usize = conn.query_row("SELECT COUNT(*) FROM skipped_rows", [], |r| r.get(0))?;

    let mut stmt = conn.prepare(
        "SELECT label, COUNT(*) FROM joined_records GROUP BY label ORDER BY COUNT(*) DESC, label",
    )?;
    let labels = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(&format!(
        "SELECT run_id, inventory, started_at, finished_at IS NOT NULL,
                total_rows, records, fetch_failures, parse_failures
         FROM runs ORDER BY started_at DESC LIMIT {}",
        recent
    ))?;
    let recent = stmt
        .query_map([], |row| {
            Ok(RunRow {
                run_id: row.get(0)?,
                inventory: row.get(1)?,
                started_at: row.get(2)?,
                finished: row.get(3)?,
                rows: row.get(4)?,
                records: row.get(5)?,
                fetch_failures: row.get(6)?,
                parse_failures: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Stats {
        runs,
        records,
        skipped,
        labels,
        recent,
    })
}

// ── Tests ──

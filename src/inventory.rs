use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};

pub const COMMIT_ID_COLUMN: &str = "commitId";
pub const PROJECT_COLUMN: &str = "project";
pub const LABEL_COLUMN: &str = "label";

/// Keyword-presence columns every inventory must carry.
pub const KEYWORD_COLUMNS: [&str; 20] = [
    "add", "allow", "bug", "chang", "error", "fail", "fix", "implement", "improv", "issu",
    "method", "new", "npe", "refactor", "remov", "report", "set", "support", "test", "use",
];

/// One labeled commit from the inventory.
///
/// `flags` keeps every non-core column in header order, with the cell text
/// exactly as read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub commit_id: String,
    pub project: String,
    pub label: String,
    pub flags: Vec<(String, String)>,
}

impl CommitRecord {
    pub fn flag(&self, name: &str) -> Option<&str> {
        self.flags
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A fully loaded inventory.
#[derive(Debug, Clone)]
pub struct Inventory {
    pub flag_columns: Vec<String>,
    pub rows: Vec<CommitRecord>,
}

#[derive(Debug, Clone)]
struct Columns {
    commit_id: usize,
    project: usize,
    label: usize,
    flags: Vec<(String, usize)>,
}

impl Columns {
    fn from_header(header: &csv::StringRecord) -> Result<Self> {
        let names: Vec<&str> = header.iter().map(str::trim).collect();
        let find = |name: &str| names.iter().position(|h| *h == name);

        let mut missing: Vec<&str> = [COMMIT_ID_COLUMN, PROJECT_COLUMN, LABEL_COLUMN]
            .into_iter()
            .chain(KEYWORD_COLUMNS)
            .filter(|c| find(*c).is_none())
            .collect();
        if !missing.is_empty() {
            missing.sort_unstable();
            bail!("inventory header is missing columns: {}", missing.join(", "));
        }

        let core = [COMMIT_ID_COLUMN, PROJECT_COLUMN, LABEL_COLUMN];
        let flags = names
            .iter()
            .enumerate()
            .filter(|(_, name)| !core.contains(*name))
            .map(|(i, name)| (name.to_string(), i))
            .collect();

        Ok(Columns {
            commit_id: find(COMMIT_ID_COLUMN).unwrap_or_default(),
            project: find(PROJECT_COLUMN).unwrap_or_default(),
            label: find(LABEL_COLUMN).unwrap_or_default(),
            flags,
        })
    }

    fn build(&self, record: &csv::StringRecord) -> Result<CommitRecord> {
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let cell = |idx: usize| {
            record
                .get(idx)
                .map(str::to_string)
                .ok_or_else(|| anyhow!("inventory line {}: missing field {}", line, idx + 1))
        };
        let commit_id = cell(self.commit_id)?;
        let project = cell(self.project)?;
        let label = cell(self.label)?;
        let flags = self
            .flags
            .iter()
            .map(|(name, idx)| -> Result<(String, String)> { Ok((name.clone(), cell(*idx)?)) })
            .collect::<Result<Vec<_>>>()?;
        Ok(CommitRecord {
            commit_id,
            project,
            label,
            flags,
        })
    }
}

/// Streams `CommitRecord`s out of a delimited table.
pub struct InventoryReader<R: Read> {
    records: csv::StringRecordsIntoIter<R>,
    columns: Columns,
}

impl<R: Read> InventoryReader<R> {
    pub fn new(reader: R, delimiter: u8) -> Result<Self> {
        if delimiter == b',' {
            bail!("inventory delimiter must not be a comma");
        }
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .from_reader(reader);
        let header = csv_reader
            .headers()
            .context("Failed to read inventory header")?
            .clone();
        let columns = Columns::from_header(&header)?;
        Ok(InventoryReader {
            records: csv_reader.into_records(),
            columns,
        })
    }

    /// Flag column names in header order.
    pub fn flag_columns(&self) -> Vec<String> {
        self.columns.flags.iter().map(|(n, _)| n.clone()).collect()
    }
}

impl<R: Read> Iterator for InventoryReader<R> {
    type Item = Result<CommitRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        Some(
            record
                .context("Malformed inventory record")
                .and_then(|r| self.columns.build(&r)),
        )
    }
}

pub fn load_inventory(path: &Path, delimiter: u8) -> Result<Inventory> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    read_inventory(file, delimiter).with_context(|| format!("Failed to load {:?}", path))
}

pub fn read_inventory<R: Read>(reader: R, delimiter: u8) -> Result<Inventory> {
    let rows = InventoryReader::new(reader, delimiter)?;
    let flag_columns = rows.flag_columns();
    let rows = rows.collect::<Result<Vec<_>>>()?;
    Ok(Inventory { flag_columns, rows })
}

// ── Tests ──

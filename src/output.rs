use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::joiner::JoinedRecord;

/// Writes joined records as a delimited table:
/// `code, label, repoSource, <flag columns...>`.
pub struct TableWriter<W: Write> {
    writer: csv::Writer<W>,
    flag_columns: Vec<String>,
    rows: usize,
}

impl TableWriter<File> {
    pub fn create(path: &Path, delimiter: u8, flag_columns: &[String]) -> Result<Self> {
        let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
        TableWriter::from_writer(file, delimiter, flag_columns)
    }
}

impl<W: Write> TableWriter<W> {
    pub fn from_writer(inner: W, delimiter: u8, flag_columns: &[String]) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(inner);
        let header = ["code", "label", "repoSource"]
            .into_iter()
            .chain(flag_columns.iter().map(String::as_str));
        writer.write_record(header).context("Failed to write table header")?;
        Ok(TableWriter {
            writer,
            flag_columns: flag_columns.to_vec(),
            rows: 0,
        })
    }

    pub fn write(&mut self, record: &JoinedRecord) -> Result<()> {
        let flag_values = self.flag_columns.iter().map(|col| {
            record
                .flags
                .iter()
                .find(|(k, _)| k == col)
                .map(|(_, v)| v.as_str())
                .unwrap_or("")
        });
        let fields = [
            record.code.as_str(),
            record.label.as_str(),
            record.repo_source.as_str(),
        ]
        .into_iter()
        .chain(flag_values);
        self.writer
            .write_record(fields)
            .context("Failed to write table row")?;
        self.rows += 1;
        Ok(())
    }

    /// Flush and return the number of data rows written.
    pub fn finish(mut self) -> Result<usize> {
        self.writer.flush().context("Failed to flush table")?;
        Ok(self.rows)
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(inner) => inner,
            Err(e) => panic!("flush failed: {}", e.error()),
        }
    }
}

// ── Tests ──

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::error::RowError;
use crate::fetcher::DocumentSource;
use crate::inventory::CommitRecord;
use crate::metrics::JoinStats;
use crate::normalize::normalize;
use crate::parser::{self, Representation, StructuralUnit};

#[derive(Debug, Clone, Copy, Default)]
pub struct JoinOptions {
    pub representation: Representation,
}

/// One structural unit carrying its commit's labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedRecord {
    pub code: String,
    pub label: String,
    pub repo_source: String,
    pub commit_id: String,
    pub file_path: String,
    pub unit_kind: String,
    pub unit_name: Option<String>,
    pub flags: Vec<(String, String)>,
}

impl JoinedRecord {
    fn new(row: &CommitRecord, file_path: &str, unit: StructuralUnit, opts: &JoinOptions) -> Self {
        let unit_kind = unit.kind.clone();
        let unit_name = unit.name.clone();
        JoinedRecord {
            code: opts.representation.render(unit),
            label: row.label.clone(),
            repo_source: row.project.clone(),
            commit_id: row.commit_id.clone(),
            file_path: file_path.to_string(),
            unit_kind,
            unit_name,
            flags: row.flags.clone(),
        }
    }
}

/// Fetch, normalize and parse one row; all of its records or an error.
pub fn process_row<S>(
    source: &S,
    row: &CommitRecord,
    opts: &JoinOptions,
) -> Result<Vec<JoinedRecord>, RowError>
where
    S: DocumentSource + ?Sized,
{
    let documents = source.fetch(&row.project, &row.commit_id)?;

    // Parse every document before emitting anything so a row is all-or-nothing.
    let mut trees = Vec::with_capacity(documents.len());
    for doc in documents {
        let normalized = normalize(&doc.text);
        let tree = parser::parse(&normalized).map_err(|source| RowError::Parse {
            path: doc.path.clone(),
            source,
        })?;
        trees.push((doc.path, tree));
    }

    let mut records = Vec::new();
    for (path, tree) in trees {
        for unit in tree.units {
            records.push(JoinedRecord::new(row, &path, unit, opts));
        }
    }
    Ok(records)
}

/// Lazily joins inventory rows with the units of their commits' source.
///
/// Rows are handled one at a time, in order. A row whose fetch or parse
/// fails yields nothing and is noted in [`JoinStats`].
pub struct Join<'a, I, S: ?Sized> {
    rows: I,
    source: &'a S,
    opts: JoinOptions,
    pending: VecDeque<JoinedRecord>,
    stats: JoinStats,
}

pub fn join<'a, I, S>(rows: I, source: &'a S, opts: JoinOptions) -> Join<'a, I::IntoIter, S>
where
    I: IntoIterator<Item = CommitRecord>,
    S: DocumentSource + ?Sized,
{
    Join {
        rows: rows.into_iter(),
        source,
        opts,
        pending: VecDeque::new(),
        stats: JoinStats::default(),
    }
}

impl<I, S: ?Sized> Join<'_, I, S> {
    pub fn stats(&self) -> &JoinStats {
        &self.stats
    }

    pub fn into_stats(self) -> JoinStats {
        self.stats
    }
}

impl<I, S> Iterator for Join<'_, I, S>
where
    I: Iterator<Item = CommitRecord>,
    S: DocumentSource + ?Sized,
{
    type Item = JoinedRecord;

    fn next(&mut self) -> Option<JoinedRecord> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(record);
            }
            let row = self.rows.next()?;
            self.stats.rows += 1;
            let result = process_row(self.source, &row, &self.opts);
            absorb(&mut self.stats, &row, result, |records| self.pending.extend(records));
        }
    }
}

/// Process rows on a worker pool, `chunk_size` rows at a time.
///
/// Each row stays all-or-nothing and the output keeps inventory order.
#[cfg(feature = "rayon")]
pub fn join_parallel<S>(
    rows: &[CommitRecord],
    source: &S,
    opts: JoinOptions,
    chunk_size: usize,
) -> (Vec<JoinedRecord>, JoinStats)
where
    S: DocumentSource + ?Sized,
{
    use rayon::prelude::*;

    let mut out = Vec::new();
    let mut stats = JoinStats::default();
    for chunk in rows.chunks(chunk_size.max(1)) {
        let results: Vec<_> = chunk
            .par_iter()
            .map(|row| process_row(source, row, &opts))
            .collect();
        for (row, result) in chunk.iter().zip(results) {
            stats.rows += 1;
            absorb(&mut stats, row, result, |records| out.extend(records));
        }
    }
    (out, stats)
}

fn absorb(
    stats: &mut JoinStats,
    row: &CommitRecord,
    result: Result<Vec<JoinedRecord>, RowError>,
    emit: impl FnOnce(Vec<JoinedRecord>),
) {
    match result {
        Ok(records) => {
            debug!(
                project = %row.project,
                commit = %row.commit_id,
                units = records.len(),
                "joined row"
            );
            stats.record_joined(records.len());
            emit(records);
        }
        Err(err) => {
            warn!(
                project = %row.project,
                commit = %row.commit_id,
                kind = err.kind().as_str(),
                "skipping row: {}",
                err
            );
            stats.record_skip(row, &err);
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, SkipKind};
    use crate::fetcher::FetchedDocument;
    use crate::inventory::KEYWORD_COLUMNS;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TWO_UNITS: &str = "package org.example;\n\n/** U1 */\npublic class U1 {\n    // counter\n    int n;\n}\n\nenum U2 { A, B }\n";

    /// Serves fixed documents keyed by (project, commit); anything else is a fetch failure.
    #[derive(Default)]
    struct FakeSource {
        docs: HashMap<(String, String), Vec<FetchedDocument>>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn with(mut self, project: &str, commit: &str, files: &[(&str, &str)]) -> Self {
            let docs = files
                .iter()
                .map(|(path, text)| FetchedDocument {
                    path: path.to_string(),
                    text: text.to_string(),
                })
                .collect();
            self.docs.insert((project.to_string(), commit.to_string()), docs);
            self
        }
    }

    impl DocumentSource for FakeSource {
        fn fetch(&self, project: &str, commit_id: &str) -> Result<Vec<FetchedDocument>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.docs
                .get(&(project.to_string(), commit_id.to_string()))
                .cloned()
                .ok_or_else(|| FetchError::NoMatchingFile {
                    location: format!("{}@{}", project, commit_id),
                    suffix: ".java".into(),
                })
        }
    }

    fn row(commit: &str, project: &str, label: &str) -> CommitRecord {
        let flags = KEYWORD_COLUMNS
            .iter()
            .map(|k| {
                let v = if *k == "use" { "1" } else { "0" };
                (k.to_string(), v.to_string())
            })
            .collect();
        CommitRecord {
            commit_id: commit.into(),
            project: project.into(),
            label: label.into(),
            flags,
        }
    }

    #[test]
    fn empty_inventory_yields_nothing() {
        let source = FakeSource::default();
        let mut joined = join(Vec::new(), &source, JoinOptions::default());
        assert!(joined.next().is_none());
        assert_eq!(joined.stats().rows, 0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn two_units_two_records_same_labels() {
        let source = FakeSource::default().with("org-repo", "abc123", &[("src/U.java", TWO_UNITS)]);
        let input = row("abc123", "org-repo", "bugfix");
        let records: Vec<_> = join(vec![input.clone()], &source, JoinOptions::default()).collect();

        assert_eq!(records.len(), 2);
        for r in &records {
            assert_eq!(r.label, "bugfix");
            assert_eq!(r.repo_source, "org-repo");
            assert_eq!(r.commit_id, "abc123");
            assert_eq!(r.flags, input.flags);
            assert_eq!(r.file_path, "src/U.java");
        }
        assert!(records[0].code.starts_with("public class U1"));
        assert!(!records[0].code.contains("counter"));
        assert_eq!(records[0].unit_name.as_deref(), Some("U1"));
        assert_eq!(records[1].code, "enum U2 { A, B }");
        assert_ne!(records[0].code, records[1].code);
    }

    #[test]
    fn fetch_failure_skips_row_and_continues() {
        let source = FakeSource::default().with("org-repo", "good", &[("A.java", "class A {}")]);
        let rows = vec![
            row("missing", "org-repo", "feature"),
            row("good", "org-repo", "refactor"),
        ];
        let mut joined = join(rows, &source, JoinOptions::default());
        let records: Vec<_> = joined.by_ref().collect();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].commit_id, "good");
        assert_eq!(records[0].label, "refactor");

        let stats = joined.into_stats();
        assert_eq!(stats.rows, 2);
        assert_eq!(stats.fetch_failures, 1);
        assert_eq!(stats.parse_failures, 0);
        assert_eq!(stats.skipped[0].commit_id, "missing");
        assert_eq!(stats.skipped[0].kind, SkipKind::Fetch);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn parse_failure_skips_row() {
        let source = FakeSource::default()
            .with("o-r", "bad", &[("Bad.java", "class Bad { void f( }")])
            .with("o-r", "ok", &[("Ok.java", "interface Ok {}")]);
        let rows = vec![row("bad", "o-r", "bugfix"), row("ok", "o-r", "bugfix")];
        let mut joined = join(rows, &source, JoinOptions::default());
        let records: Vec<_> = joined.by_ref().collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].commit_id, "ok");
        assert_eq!(joined.stats().parse_failures, 1);
        assert!(joined.stats().skipped[0].error.starts_with("Bad.java:"));
    }

    #[test]
    fn empty_file_yields_no_records_but_counts_as_joined() {
        let source = FakeSource::default().with("o-r", "c", &[("Empty.java", "")]);
        let mut joined = join(vec![row("c", "o-r", "test")], &source, JoinOptions::default());
        assert!(joined.next().is_none());
        assert_eq!(joined.stats().joined_rows, 1);
        assert_eq!(joined.stats().skipped_count(), 0);
    }

    #[test]
    fn comment_only_file_yields_no_records() {
        let source = FakeSource::default().with("o-r", "c", &[("C.java", "/* nothing */\n// here\n")]);
        let records: Vec<_> =
            join(vec![row("c", "o-r", "test")], &source, JoinOptions::default()).collect();
        assert!(records.is_empty());
    }

    #[test]
    fn same_commit_twice_is_not_deduplicated() {
        let source = FakeSource::default().with("o-r", "c", &[("A.java", "class A {} class B {}")]);
        let rows = vec![row("c", "o-r", "bugfix"), row("c", "o-r", "feature")];
        let records: Vec<_> = join(rows, &source, JoinOptions::default()).collect();
        assert_eq!(records.len(), 4);
        let labels: Vec<&str> = records.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["bugfix", "bugfix", "feature", "feature"]);
    }

    #[test]
    fn records_never_exceed_unit_count() {
        let text = "class A {} interface B {} enum C { X }";
        let units = parser::parse(text).unwrap().len();
        let source = FakeSource::default().with("o-r", "c", &[("A.java", text)]);
        let records: Vec<_> =
            join(vec![row("c", "o-r", "bugfix")], &source, JoinOptions::default()).collect();
        let for_commit = records
            .iter()
            .filter(|r| r.repo_source == "o-r" && r.commit_id == "c")
            .count();
        assert!(for_commit <= units);
        assert_eq!(for_commit, 3);
    }

    #[test]
    fn multi_file_row_is_all_or_nothing() {
        let source = FakeSource::default().with(
            "o-r",
            "c",
            &[("A.java", "class A {}"), ("B.java", "class B {")],
        );
        let mut joined = join(vec![row("c", "o-r", "bugfix")], &source, JoinOptions::default());
        assert!(joined.next().is_none());
        assert_eq!(joined.stats().parse_failures, 1);
    }

    #[test]
    fn multi_file_row_emits_in_file_then_unit_order() {
        let source = FakeSource::default().with(
            "o-r",
            "c",
            &[("A.java", "class A1 {} class A2 {}"), ("B.java", "class B1 {}")],
        );
        let records: Vec<_> =
            join(vec![row("c", "o-r", "bugfix")], &source, JoinOptions::default()).collect();
        let names: Vec<&str> = records.iter().filter_map(|r| r.unit_name.as_deref()).collect();
        assert_eq!(names, vec!["A1", "A2", "B1"]);
        assert_eq!(records[2].file_path, "B.java");
    }

    #[test]
    fn sexp_representation_in_code_column() {
        let source = FakeSource::default().with("o-r", "c", &[("A.java", "class A {}")]);
        let opts = JoinOptions {
            representation: Representation::Sexp,
        };
        let records: Vec<_> = join(vec![row("c", "o-r", "bugfix")], &source, opts).collect();
        assert!(records[0].code.starts_with("(class_declaration"));
    }

    #[test]
    fn join_is_lazy() {
        let source = FakeSource::default()
            .with("o-r", "a", &[("A.java", "class A {}")])
            .with("o-r", "b", &[("B.java", "class B {}")]);
        let rows = vec![row("a", "o-r", "x"), row("b", "o-r", "y")];
        let mut joined = join(rows, &source, JoinOptions::default());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        joined.next();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        joined.next();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn parallel_join_matches_sequential() {
        let source = FakeSource::default()
            .with("o-r", "a", &[("A.java", "class A {} class A2 {}")])
            .with("o-r", "c", &[("C.java", "class C {}")]);
        let rows = vec![
            row("a", "o-r", "x"),
            row("b", "o-r", "y"),
            row("c", "o-r", "z"),
        ];
        let sequential: Vec<_> = join(rows.clone(), &source, JoinOptions::default()).collect();
        let (parallel, stats) = join_parallel(&rows, &source, JoinOptions::default(), 2);
        assert_eq!(parallel, sequential);
        assert_eq!(stats.rows, 3);
        assert_eq!(stats.fetch_failures, 1);
    }
}

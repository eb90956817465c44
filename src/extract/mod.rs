//! # Batch Extraction
//!
//! Reads the value found at every marker's coordinates in each target
//! document and produces one row per document. Documents are processed in
//! parallel; results keep the input order.
//!
//! Failures are confined to the document they happen in: an unreadable
//! document becomes an empty row plus a [`Diagnostic`], a missing table or an
//! out-of-range coordinate becomes an empty value.
use crate::document::document_id;
use crate::document::Document;
use crate::document::DocumentSource;
use crate::error::HarvestError;
use crate::grid::Grid;
use crate::grid::UnsetMergePolicy;
use crate::marker::Marker;
use crate::marker::MarkerSyntax;
use log::debug;
use log::info;
use log::warn;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fmt::Formatter;
use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

/// Options controlling a batch run.
#[derive(Clone, Debug, Default)]
pub struct ExtractOptions {
    /// Worker threads; `None` uses the available parallelism
    pub threads: Option<usize>,
    /// Interpretation of vertical merge markers without a value
    pub policy: UnsetMergePolicy,
    /// Keep rows whose values are all empty
    pub keep_empty_rows: bool,
    /// Marker pattern stripped from extracted values
    pub syntax: MarkerSyntax,
}

/// One output row: the document identifier and one value per marker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractionRow {
    pub document: String,
    pub values: Vec<String>,
}

impl ExtractionRow {
    /// Returns true if every marker value is empty
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(String::is_empty)
    }

    /// Identifier followed by the values, matching the output header
    pub fn to_record(&self) -> Vec<String> {
        std::iter::once(self.document.to_owned())
            .chain(self.values.iter().cloned())
            .collect()
    }
}

/// A soft failure recorded for one document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub document: String,
    pub message: String,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.document, self.message)
    }
}

/// Progress event, delivered once per finished document.
#[derive(Copy, Clone, Debug)]
pub struct Progress<'a> {
    /// Documents finished so far, including this one
    pub completed: usize,
    pub total: usize,
    pub document: &'a Path,
}

/// Result of a batch run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtractionReport {
    /// Rows in input order, empty rows removed unless requested
    pub rows: Vec<ExtractionRow>,
    pub diagnostics: Vec<Diagnostic>,
    /// Documents never started because the run was cancelled
    pub skipped: usize,
}

enum Outcome {
    Row(ExtractionRow),
    Failed(ExtractionRow, Diagnostic),
    Skipped,
}

/// Extracts marker values from target documents.
pub struct BatchExtractor<'a, S: DocumentSource> {
    source: &'a S,
    markers: &'a [Marker],
    /// Marker indexes grouped by table index, tables ascending
    groups: Vec<(usize, Vec<usize>)>,
    options: ExtractOptions,
}

impl<'a, S: DocumentSource> BatchExtractor<'a, S> {
    /// Creates an extractor; markers are grouped by table once so that each
    /// referenced table is built at most once per document
    pub fn new(source: &'a S, markers: &'a [Marker], options: ExtractOptions) -> Self {
        let mut groups = BTreeMap::<usize, Vec<usize>>::new();
        for (index, marker) in markers.iter().enumerate() {
            groups.entry(marker.table_index).or_default().push(index);
        }
        Self {
            source,
            markers,
            groups: groups.into_iter().collect(),
            options,
        }
    }

    /// Processes every document
    pub fn extract(&self, paths: &[PathBuf]) -> Result<ExtractionReport, HarvestError> {
        self.extract_with_progress(paths, |_| (), None)
    }

    /// Processes documents in parallel, reporting each finished document.
    ///
    /// Once `cancel` is set, documents not yet started are skipped; started
    /// documents run to completion.
    pub fn extract_with_progress<F>(
        &self,
        paths: &[PathBuf],
        on_progress: F,
        cancel: Option<&AtomicBool>,
    ) -> Result<ExtractionReport, HarvestError>
    where
        F: Fn(Progress<'_>) + Sync,
    {
        let mut builder = ThreadPoolBuilder::new();
        if let Some(threads) = self.options.threads.filter(|threads| *threads > 0) {
            builder = builder.num_threads(threads);
        }
        let pool = builder.build()?;

        let total = paths.len();
        let completed = AtomicUsize::new(0);
        let mut outcomes = pool.install(|| {
            paths
                .par_iter()
                .enumerate()
                .map(|(index, path)| {
                    if cancel.map(|flag| flag.load(Ordering::Relaxed)).unwrap_or(false) {
                        return (index, Outcome::Skipped);
                    }
                    let outcome = self.process(path);
                    let completed = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    on_progress(Progress {
                        completed,
                        total,
                        document: path,
                    });
                    (index, outcome)
                })
                .collect::<Vec<_>>()
        });
        outcomes.sort_by_key(|(index, _)| *index);

        let mut report = ExtractionReport::default();
        for (_, outcome) in outcomes {
            let row = match outcome {
                Outcome::Row(row) => row,
                Outcome::Failed(row, diagnostic) => {
                    report.diagnostics.push(diagnostic);
                    row
                }
                Outcome::Skipped => {
                    report.skipped += 1;
                    continue;
                }
            };
            if self.options.keep_empty_rows || !row.is_empty() {
                report.rows.push(row);
            }
        }
        info!(
            "Extracted {} row(s) from {} document(s), {} diagnostic(s), {} skipped",
            report.rows.len(),
            total,
            report.diagnostics.len(),
            report.skipped
        );
        Ok(report)
    }

    /// Marker values of a loaded document, in marker order
    pub fn extract_document(&self, document: &Document) -> Vec<String> {
        let mut values = vec![String::new(); self.markers.len()];
        for (table_index, indexes) in &self.groups {
            let table = match document.tables.get(*table_index) {
                Some(table) => table,
                None => {
                    debug!("'{}' has no table {}", document.name, table_index + 1);
                    continue;
                }
            };
            let grid = Grid::build(table, self.options.policy);
            for index in indexes {
                let marker = &self.markers[*index];
                if let Some(owner) = grid.resolve(marker.row, marker.column) {
                    values[*index] = self.options.syntax.strip(&owner.text);
                }
            }
        }
        values
    }

    fn process(&self, path: &Path) -> Outcome {
        let document = document_id(path);
        let result = catch_unwind(AssertUnwindSafe(|| {
            self.source.open(path).map(|loaded| self.extract_document(&loaded))
        }));
        let message = match result {
            Ok(Ok(values)) => return Outcome::Row(ExtractionRow { document, values }),
            Ok(Err(error)) => error.to_string(),
            Err(payload) => match payload.downcast_ref::<&str>() {
                Some(message) => format!("panicked: {message}"),
                None => match payload.downcast_ref::<String>() {
                    Some(message) => format!("panicked: {message}"),
                    None => "panicked".to_owned(),
                },
            },
        };
        warn!("Cannot read '{}': {}", path.display(), message);
        let diagnostic = Diagnostic {
            document: document.clone(),
            message,
        };
        let row = ExtractionRow {
            document,
            values: vec![String::new(); self.markers.len()],
        };
        Outcome::Failed(row, diagnostic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::PhysicalCell;
    use crate::document::Table;
    use crate::document::VerticalMerge;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory documents keyed by path; unknown paths fail to open
    struct MemorySource {
        documents: HashMap<PathBuf, Document>,
    }

    impl MemorySource {
        fn new(documents: Vec<(&str, Vec<Vec<Vec<PhysicalCell>>>)>) -> Self {
            let documents = documents
                .into_iter()
                .map(|(name, tables)| {
                    let document = Document {
                        name: name.to_owned(),
                        tables: tables.into_iter().map(|rows| Table { rows }).collect(),
                    };
                    (PathBuf::from(name), document)
                })
                .collect();
            Self { documents }
        }
    }

    impl DocumentSource for MemorySource {
        fn open(&self, path: &Path) -> Result<Document, HarvestError> {
            match self.documents.get(path) {
                Some(document) if document.name.starts_with("panic") => panic!("corrupt {}", document.name),
                Some(document) => Ok(document.clone()),
                None => Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no such document").into()),
            }
        }
    }

    fn plain(text: &str) -> PhysicalCell {
        PhysicalCell::new(text)
    }

    fn marker(table_index: usize, row: usize, column: usize, name: &str) -> Marker {
        Marker {
            table_index,
            row,
            column,
            name: name.to_owned(),
        }
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    fn row(document: &str, values: &[&str]) -> ExtractionRow {
        ExtractionRow {
            document: document.to_owned(),
            values: values.iter().map(|value| value.to_string()).collect(),
        }
    }

    #[test]
    fn missing_row_scenario() {
        let markers = vec![marker(0, 0, 0, "name"), marker(0, 1, 0, "age"), marker(1, 0, 0, "city")];
        let source = MemorySource::new(vec![
            ("A.docx", vec![vec![vec![plain("Alice")], vec![plain("30")]], vec![vec![plain("Oslo")]]]),
            ("B.docx", vec![vec![], vec![vec![plain("Rome")]]]),
            ("C.docx", vec![vec![vec![plain("")]]]),
        ]);
        let extractor = BatchExtractor::new(&source, &markers, ExtractOptions::default());
        let report = extractor.extract(&paths(&["A.docx", "B.docx", "C.docx"])).unwrap();
        assert_eq!(
            report.rows,
            vec![row("A", &["Alice", "30", "Oslo"]), row("B", &["", "", "Rome"])]
        );
        assert!(report.diagnostics.is_empty());
        assert_eq!(report.rows[0].to_record(), vec!["A", "Alice", "30", "Oslo"]);
    }

    #[test]
    fn unreadable_document_scenario() {
        let markers = vec![marker(0, 0, 0, "name")];
        let source = MemorySource::new(vec![
            ("first.docx", vec![vec![vec![plain("One")]]]),
            ("third.docx", vec![vec![vec![plain("Three")]]]),
        ]);
        let extractor = BatchExtractor::new(&source, &markers, ExtractOptions::default());
        let report = extractor
            .extract(&paths(&["first.docx", "missing.docx", "third.docx"]))
            .unwrap();
        assert_eq!(report.rows, vec![row("first", &["One"]), row("third", &["Three"])]);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].document, "missing");
        assert!(report.diagnostics[0].to_string().contains("no such document"));
    }

    #[test]
    fn panicking_document_becomes_diagnostic() {
        let markers = vec![marker(0, 0, 0, "name")];
        let source = MemorySource::new(vec![
            ("panic.docx", vec![]),
            ("ok.docx", vec![vec![vec![plain("fine")]]]),
        ]);
        let extractor = BatchExtractor::new(&source, &markers, ExtractOptions::default());
        let report = extractor.extract(&paths(&["panic.docx", "ok.docx"])).unwrap();
        assert_eq!(report.rows, vec![row("ok", &["fine"])]);
        assert_eq!(report.diagnostics.len(), 1);
        assert!(report.diagnostics[0].message.contains("corrupt panic.docx"));
    }

    #[test]
    fn keep_empty_rows_retains_soft_failures() {
        let markers = vec![marker(0, 0, 0, "name")];
        let source = MemorySource::new(vec![("blank.docx", vec![vec![vec![plain("")]]])]);
        let options = ExtractOptions {
            keep_empty_rows: true,
            ..ExtractOptions::default()
        };
        let extractor = BatchExtractor::new(&source, &markers, options);
        let report = extractor.extract(&paths(&["blank.docx", "gone.docx"])).unwrap();
        assert_eq!(report.rows, vec![row("blank", &[""]), row("gone", &[""])]);
        assert_eq!(report.diagnostics.len(), 1);
    }

    #[test]
    fn merged_values_resolve_to_anchor_and_markers_are_stripped() {
        let markers = vec![marker(0, 1, 0, "group"), marker(0, 0, 2, "tail"), marker(0, 5, 5, "far")];
        let source = MemorySource::new(vec![(
            "merged.docx",
            vec![vec![
                vec![plain("Team\nRed").with_merge(VerticalMerge::Start), plain("wide {{tail}}").with_span(2)],
                vec![plain("").with_merge(VerticalMerge::Continue), plain("x"), plain("y")],
            ]],
        )]);
        let extractor = BatchExtractor::new(&source, &markers, ExtractOptions::default());
        let report = extractor.extract(&paths(&["merged.docx"])).unwrap();
        assert_eq!(report.rows, vec![row("merged", &["Team Red", "wide", ""])]);
    }

    #[test]
    fn duplicate_names_keep_separate_columns() {
        let markers = vec![marker(0, 0, 0, "value"), marker(0, 0, 1, "value")];
        let source = MemorySource::new(vec![("dup.docx", vec![vec![vec![plain("left"), plain("right")]]])]);
        let extractor = BatchExtractor::new(&source, &markers, ExtractOptions::default());
        let report = extractor.extract(&paths(&["dup.docx"])).unwrap();
        assert_eq!(report.rows, vec![row("dup", &["left", "right"])]);
    }

    #[test]
    fn order_and_results_are_stable_across_thread_counts() {
        let markers = vec![marker(0, 0, 0, "n")];
        let names: Vec<String> = (0..40).map(|index| format!("doc{index:02}.docx")).collect();
        let source = MemorySource::new(
            names
                .iter()
                .map(|name| (name.as_str(), vec![vec![vec![plain(name)]]]))
                .collect(),
        );
        let paths: Vec<PathBuf> = names.iter().map(PathBuf::from).collect();

        let single = ExtractOptions {
            threads: Some(1),
            ..ExtractOptions::default()
        };
        let many = ExtractOptions {
            threads: Some(8),
            ..ExtractOptions::default()
        };
        let first = BatchExtractor::new(&source, &markers, single).extract(&paths).unwrap();
        let second = BatchExtractor::new(&source, &markers, many).extract(&paths).unwrap();
        assert_eq!(first, second);
        let documents: Vec<&str> = first.rows.iter().map(|row| row.document.as_str()).collect();
        let expected: Vec<String> = (0..40).map(|index| format!("doc{index:02}")).collect();
        assert_eq!(documents, expected);
    }

    #[test]
    fn progress_reports_every_document() {
        let markers = vec![marker(0, 0, 0, "n")];
        let source = MemorySource::new(vec![
            ("a.docx", vec![vec![vec![plain("1")]]]),
            ("b.docx", vec![vec![vec![plain("2")]]]),
        ]);
        let seen = Mutex::new(Vec::new());
        let extractor = BatchExtractor::new(&source, &markers, ExtractOptions::default());
        extractor
            .extract_with_progress(
                &paths(&["a.docx", "b.docx", "c.docx"]),
                |progress| seen.lock().unwrap().push((progress.completed, progress.total)),
                None,
            )
            .unwrap();
        let mut seen = seen.into_inner().unwrap();
        seen.sort();
        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[test]
    fn cancelled_run_skips_documents() {
        let markers = vec![marker(0, 0, 0, "n")];
        let source = MemorySource::new(vec![("a.docx", vec![vec![vec![plain("1")]]])]);
        let cancel = AtomicBool::new(true);
        let extractor = BatchExtractor::new(&source, &markers, ExtractOptions::default());
        let report = extractor
            .extract_with_progress(&paths(&["a.docx", "b.docx"]), |_| (), Some(&cancel))
            .unwrap();
        assert!(report.rows.is_empty());
        assert!(report.diagnostics.is_empty());
        assert_eq!(report.skipped, 2);
    }

    #[test]
    fn each_referenced_table_is_read() {
        let markers = vec![marker(2, 0, 0, "third"), marker(0, 0, 0, "first")];
        let source = MemorySource::new(vec![(
            "t.docx",
            vec![vec![vec![plain("one")]], vec![vec![plain("two")]], vec![vec![plain("three")]]],
        )]);
        let extractor = BatchExtractor::new(&source, &markers, ExtractOptions::default());
        assert_eq!(extractor.groups, vec![(0, vec![1]), (2, vec![0])]);
        let report = extractor.extract(&paths(&["t.docx"])).unwrap();
        assert_eq!(report.rows, vec![row("t", &["three", "one"])]);
    }
}

//! # Template Markers
//!
//! Finds `{{name}}` markers in the tables of a template document and records
//! their logical coordinates. The discovery order (table by table, row-major,
//! left to right inside a cell) defines the output column order.
use crate::document::Document;
use crate::document::DocumentSource;
use crate::error::HarvestError;
use crate::grid::Grid;
use crate::grid::UnsetMergePolicy;
use log::debug;
use log::info;
use regex::Regex;
use std::fmt::Display;
use std::fmt::Formatter;
use std::path::Path;

/// Default marker delimiters
pub const DEFAULT_OPEN_DELIMITER: &str = "{{";
pub const DEFAULT_CLOSE_DELIMITER: &str = "}}";

/// Compiled marker pattern.
#[derive(Clone, Debug)]
pub struct MarkerSyntax {
    pattern: Regex,
}

impl MarkerSyntax {
    /// Builds the pattern matching `open` ... `close` with a non-empty, shortest interior
    pub fn new(open: &str, close: &str) -> Result<Self, HarvestError> {
        let pattern = Regex::new(&format!(
            "{}(.+?){}",
            regex::escape(open),
            regex::escape(close)
        ))?;
        Ok(Self { pattern })
    }

    /// Trimmed, non-empty marker names in `text`, left to right
    pub fn names<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pattern
            .captures_iter(text)
            .filter_map(|captures| captures.get(1))
            .map(|name| name.as_str().trim())
            .filter(|name| !name.is_empty())
    }

    /// Removes every marker from `text` and trims the result
    pub fn strip(&self, text: &str) -> String {
        self.pattern.replace_all(text, "").trim().to_owned()
    }
}

impl Default for MarkerSyntax {
    fn default() -> Self {
        Self::new(DEFAULT_OPEN_DELIMITER, DEFAULT_CLOSE_DELIMITER).expect("Hardcode marker pattern")
    }
}

/// A marker found in the template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Marker {
    /// 0-based table index in document order
    pub table_index: usize,
    /// Logical row within the table grid
    pub row: usize,
    /// Logical column within the table grid
    pub column: usize,
    /// Marker name, trimmed
    pub name: String,
}

impl Display for Marker {
    /// 1-based coordinates for display, e.g. `T1 R2C3 -> total`
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "T{} R{}C{} -> {}",
            self.table_index + 1,
            self.row + 1,
            self.column + 1,
            self.name
        )
    }
}

/// Collects markers from every table of a loaded template
pub fn collect_markers(document: &Document, syntax: &MarkerSyntax, policy: UnsetMergePolicy) -> Vec<Marker> {
    let mut markers = Vec::<Marker>::new();
    for (table_index, table) in document.tables.iter().enumerate() {
        let grid = Grid::build(table, policy);
        for ((row, column), cell) in grid.cells() {
            if !cell.is_anchor || cell.text.is_empty() {
                continue;
            }
            for name in syntax.names(&cell.text) {
                markers.push(Marker {
                    table_index,
                    row,
                    column,
                    name: name.to_owned(),
                });
            }
        }
        debug!(
            "Template table {} is {}x{}",
            table_index + 1,
            grid.row_count(),
            grid.col_count()
        );
    }
    markers
}

/// Loads a template and collects its markers.
///
/// Failing to read the template is the one error that aborts a run.
pub fn collect_markers_from_path<S: DocumentSource>(
    source: &S,
    path: &Path,
    syntax: &MarkerSyntax,
    policy: UnsetMergePolicy,
) -> Result<Vec<Marker>, HarvestError> {
    let document = source.open(path)?;
    let markers = collect_markers(&document, syntax, policy);
    info!("Found {} marker(s) in template '{}'", markers.len(), path.display());
    Ok(markers)
}

/// One line per marker: `[NN] T<table> R<row>C<column> -> name`, 1-based
pub fn preview(markers: &[Marker]) -> String {
    markers
        .iter()
        .enumerate()
        .map(|(index, marker)| format!("[{:02}] {}", index + 1, marker))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Output header: identifier column followed by one column per marker
pub fn header(id_column: &str, markers: &[Marker]) -> Vec<String> {
    std::iter::once(id_column.to_owned())
        .chain(markers.iter().map(|marker| marker.name.to_owned()))
        .collect()
}

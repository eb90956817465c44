//! # Document Model
//!
//! Physical view of table-bearing documents: tables made of rows of physical
//! cells, exactly as stored in the source file before merge resolution.
//! Concrete formats implement [`DocumentSource`] to produce [`Document`]s.
use crate::error::HarvestError;
use std::path::Path;
use thiserror::Error;

pub mod docx;

/// Error types for document loading
#[derive(Error, Debug)]
pub enum DocumentError {
    /// File is a compound binary file (legacy `.doc` or password protected)
    #[error("Legacy or password protected document: '{0}'")]
    DocumentCompoundFileError(String),

    /// Package does not contain the main document part
    #[error("Missing main document part '{1}' in '{0}'")]
    DocumentPartMissingError(String, String),
}

/// Vertical merge state of a physical cell.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum VerticalMerge {
    /// Cell takes no part in a vertical merge
    #[default]
    None,
    /// Cell starts a vertical merge
    Start,
    /// Cell continues the merge started above it
    Continue,
    /// Merge marker present without an explicit value
    Unset,
}

impl VerticalMerge {
    /// Maps the raw merge attribute of a present merge marker.
    /// Unknown values degrade to no merge.
    pub fn from_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None => Self::Unset,
            Some(value) if value.eq_ignore_ascii_case("restart") || value.eq_ignore_ascii_case("start") => Self::Start,
            Some(value) if value.eq_ignore_ascii_case("continue") => Self::Continue,
            Some(_) => Self::None,
        }
    }
}

/// One cell as stored in a table row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PhysicalCell {
    /// Raw text content, paragraphs separated by newlines
    pub text: String,
    /// Declared horizontal span; absent or unparseable spans are `None`
    pub horizontal_span: Option<usize>,
    /// Vertical merge state
    pub vertical_merge: VerticalMerge,
}

impl PhysicalCell {
    /// Creates a plain cell with no span and no merge
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_owned(),
            ..Self::default()
        }
    }

    /// Sets the horizontal span
    pub fn with_span(mut self, span: usize) -> Self {
        self.horizontal_span = Some(span);
        self
    }

    /// Sets the vertical merge state
    pub fn with_merge(mut self, merge: VerticalMerge) -> Self {
        self.vertical_merge = merge;
        self
    }

    /// Effective horizontal span; absent or zero spans count as one column,
    /// larger spans are capped at [`MAX_TABLE_COLUMNS`]
    pub fn span(&self) -> usize {
        self.horizontal_span
            .filter(|span| *span > 0)
            .unwrap_or(1)
            .min(MAX_TABLE_COLUMNS)
    }
}

/// Widest table grid word processors produce
pub const MAX_TABLE_COLUMNS: usize = 63;

/// A table as an ordered list of physical rows.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    pub rows: Vec<Vec<PhysicalCell>>,
}

/// A loaded document: its tables in document order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    /// File name the document was loaded from
    pub name: String,
    pub tables: Vec<Table>,
}

/// Loader for a document format.
///
/// Implementations must be shareable across worker threads.
pub trait DocumentSource: Sync {
    /// Opens and parses the document at `path`
    fn open(&self, path: &Path) -> Result<Document, HarvestError>;
}

/// Identifier of a document in the output: its file stem.
pub fn document_id(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

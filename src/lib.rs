//! # Rusty Harvest
//!
//! Collects values from a batch of Word (`.docx`) documents that share a table
//! layout, and writes them into a single spreadsheet.
//!
//! A template document marks the interesting cells with `{{name}}` markers.
//! Each marker is located in the *logical* grid of its table, which accounts
//! for horizontally (`gridSpan`) and vertically (`vMerge`) merged cells. Every
//! target document is then read at the same logical coordinates.
//!
//! ## Pipeline
//!
//! 1. [`marker::collect_markers_from_path`] indexes the template
//! 2. [`config::discover_documents`] lists the target documents
//! 3. [`extract::BatchExtractor`] reads the documents in parallel
//! 4. [`output::XlsxSink`] writes one row per document
//!
//! ## Failure handling
//!
//! Only an unreadable template aborts a run. A target document that cannot be
//! read yields an empty row and a [`extract::Diagnostic`]; a missing table or an
//! out-of-range coordinate yields an empty value.
pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod grid;
mod helpers;
pub mod marker;
pub mod output;

pub use config::discover_documents;
pub use config::HarvestConfig;
pub use document::docx::DocxSource;
pub use document::DocumentSource;
pub use error::HarvestError;
pub use extract::BatchExtractor;
pub use extract::ExtractionReport;
pub use grid::Grid;
pub use grid::UnsetMergePolicy;
pub use helpers::reader::UnifiedReaderError;
pub use helpers::xml::XmlError;
pub use marker::Marker;
pub use marker::MarkerSyntax;
pub use output::TabularSink;
pub use output::XlsxSink;

//! Run configuration and input discovery.
use crate::error::HarvestError;
use crate::error::ResultMessage;
use crate::extract::ExtractOptions;
use crate::grid::UnsetMergePolicy;
use crate::marker::MarkerSyntax;
use crate::marker::DEFAULT_CLOSE_DELIMITER;
use crate::marker::DEFAULT_OPEN_DELIMITER;
use glob::glob;
use log::debug;
use std::path::PathBuf;

/// Prefix of the lock files word processors leave next to open documents
const LOCK_FILE_PREFIX: &str = "~$";

/// Settings of a harvest run.
#[derive(Clone, Debug)]
pub struct HarvestConfig {
    /// Template document carrying the markers
    pub template: PathBuf,
    /// Directory scanned for target documents
    pub input_dir: PathBuf,
    /// Glob pattern, relative to `input_dir`
    pub pattern: String,
    pub output: PathBuf,
    pub sheet_name: String,
    /// Header of the identifier column
    pub id_column: String,
    /// Worker threads; `None` uses the available parallelism
    pub threads: Option<usize>,
    pub policy: UnsetMergePolicy,
    pub keep_empty_rows: bool,
    pub open_delimiter: String,
    pub close_delimiter: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            template: PathBuf::from("template.docx"),
            input_dir: PathBuf::from("Files"),
            pattern: "*.docx".to_owned(),
            output: PathBuf::from("summary.xlsx"),
            sheet_name: "Extraction".to_owned(),
            id_column: "file_name".to_owned(),
            threads: None,
            policy: UnsetMergePolicy::default(),
            keep_empty_rows: false,
            open_delimiter: DEFAULT_OPEN_DELIMITER.to_owned(),
            close_delimiter: DEFAULT_CLOSE_DELIMITER.to_owned(),
        }
    }
}

impl HarvestConfig {
    /// Compiles the configured marker delimiters
    pub fn syntax(&self) -> Result<MarkerSyntax, HarvestError> {
        MarkerSyntax::new(&self.open_delimiter, &self.close_delimiter)
    }

    pub fn extract_options(&self) -> Result<ExtractOptions, HarvestError> {
        Ok(ExtractOptions {
            threads: self.threads,
            policy: self.policy,
            keep_empty_rows: self.keep_empty_rows,
            syntax: self.syntax()?,
        })
    }
}

/// Lists the target documents matching the configured pattern, sorted by path.
///
/// Lock files (`~$name.docx`) and directories are ignored.
pub fn discover_documents(config: &HarvestConfig) -> Result<Vec<PathBuf>, HarvestError> {
    let pattern = config.input_dir.join(&config.pattern);
    let pattern = pattern.to_string_lossy();
    let mut paths = Vec::new();
    for entry in glob(&pattern).map_err(HarvestError::from).with_prefix(&pattern)? {
        let path = entry?;
        let is_lock_file = path
            .file_name()
            .map(|name| name.to_string_lossy().starts_with(LOCK_FILE_PREFIX))
            .unwrap_or(true);
        if is_lock_file || !path.is_file() {
            debug!("Skipping '{}'", path.display());
            continue;
        }
        paths.push(path);
    }
    paths.sort();
    Ok(paths)
}

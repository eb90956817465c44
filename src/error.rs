use thiserror::Error;

/// Main error type for the harvester.
/// Aggregates errors from the standard library, dependencies, and internal modules.
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("{0}")]
    WithContextError(String),

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    PatternError(#[from] glob::PatternError),

    #[error("{0}")]
    GlobError(#[from] glob::GlobError),

    // Third-party library errors
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    #[error("{0}")]
    RegexError(#[from] regex::Error),

    #[error("{0}")]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),

    // Helper module errors
    #[error("{0}")]
    XmlHelperError(#[from] crate::helpers::xml::XmlError),

    #[error("{0}")]
    UnifiedReaderError(#[from] crate::helpers::reader::UnifiedReaderError),

    // Document module errors
    #[error("{0}")]
    DocumentError(#[from] crate::document::DocumentError),
}

pub(crate) trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T, HarvestError> {
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| HarvestError::WithContextError(format!("{}: {}", message, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_prefix_keeps_ok() {
        let result: Result<usize, HarvestError> = Ok(3);
        assert_eq!(result.with_prefix("ignored").unwrap(), 3);
    }

    #[test]
    fn with_prefix_wraps_error_message() {
        let result: Result<(), HarvestError> = Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into());
        let error = result.with_prefix("report.docx").unwrap_err();
        assert_eq!(error.to_string(), "report.docx: gone");
    }
}

use crate::error::HarvestError;
use std::fs::File;
use std::io::BufReader;
use std::io::Cursor;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum UnifiedReaderError {
    #[error("Remote file is not supported: '{0}'")]
    RemoteFileUnsupportedError(String),

    #[error("Invalid file URL: '{0}'")]
    InvalidFileUrlError(String),
}

/// A unified reader over local files and in-memory buffers
pub(crate) enum UnifiedReader {
    /// Local file reader
    Local(BufReader<File>),
    /// In-memory buffer
    Memory(Cursor<Vec<u8>>),
}

impl UnifiedReader {
    /// Opens a file from a local path or a `file://` URL
    ///
    /// # Arguments
    /// * `file_name` - Path or URL to the file
    ///
    /// # Returns
    /// * `Result<UnifiedReader, HarvestError>` - Reader for the file content
    pub(crate) fn new(file_name: &str) -> Result<UnifiedReader, HarvestError> {
        if Self::is_remote_url(file_name) {
            Err(UnifiedReaderError::RemoteFileUnsupportedError(file_name.to_owned()))?
        }
        let file = match Url::parse(file_name) {
            Ok(url) if url.scheme() == "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| UnifiedReaderError::InvalidFileUrlError(file_name.to_owned()))?;
                File::open(path)?
            }
            _ => File::open(file_name)?,
        };
        Ok(UnifiedReader::Local(BufReader::new(file)))
    }

    /// Wraps an in-memory buffer
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> UnifiedReader {
        UnifiedReader::Memory(Cursor::new(bytes))
    }

    /// Checks if a file name represents a remote URL.
    /// Single-letter schemes are Windows drive letters, not URLs.
    pub(crate) fn is_remote_url(file_name: &str) -> bool {
        if let Ok(url) = Url::parse(file_name) {
            url.scheme() != "file" && url.scheme().len() > 1
        } else {
            false
        }
    }

    /// Checks whether the content starts with the given signature and rewinds to the start
    pub(crate) fn starts_with(&mut self, signature: &[u8]) -> Result<bool, HarvestError> {
        let mut buffer = vec![0u8; signature.len()];
        let mut filled = 0usize;
        while filled < buffer.len() {
            let count = self.read(&mut buffer[filled..])?;
            if count == 0 {
                break;
            }
            filled += count;
        }
        self.seek(SeekFrom::Start(0))?;
        Ok(filled == signature.len() && buffer == signature)
    }
}

impl Read for UnifiedReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            UnifiedReader::Local(reader) => reader.read(buf),
            UnifiedReader::Memory(reader) => reader.read(buf),
        }
    }
}

impl Seek for UnifiedReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        match self {
            UnifiedReader::Local(reader) => reader.seek(pos),
            UnifiedReader::Memory(reader) => reader.seek(pos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_remote_url() {
        assert!(!UnifiedReader::is_remote_url("report.docx"));
        assert!(!UnifiedReader::is_remote_url("/path/to/report.docx"));
        assert!(!UnifiedReader::is_remote_url("./relative/report.docx"));
        assert!(!UnifiedReader::is_remote_url("C:\\Files\\report.docx"));

        assert!(UnifiedReader::is_remote_url("http://example.com/report.docx"));
        assert!(UnifiedReader::is_remote_url("https://example.com/report.docx"));
        assert!(UnifiedReader::is_remote_url("s3://bucket/report.docx"));

        assert!(!UnifiedReader::is_remote_url("file:///path/to/report.docx"));
    }

    #[test]
    fn test_open_local_file() {
        let result = UnifiedReader::new("Cargo.toml");
        assert!(result.is_ok(), "Failed to open local file: {:?}", result.err());

        let result = UnifiedReader::new("non_existent_file.docx");
        assert!(result.is_err(), "Should fail to open non-existent file");
    }

    #[test]
    fn test_remote_file_rejected() {
        let result = UnifiedReader::new("https://example.com/report.docx");
        assert!(matches!(
            result,
            Err(HarvestError::UnifiedReaderError(UnifiedReaderError::RemoteFileUnsupportedError(_)))
        ));
    }

    #[test]
    fn test_starts_with_rewinds() {
        let mut reader = UnifiedReader::from_bytes(b"PK\x03\x04rest".to_vec());
        assert!(reader.starts_with(b"PK\x03\x04").unwrap());
        assert!(!reader.starts_with(b"\xD0\xCF").unwrap());
        let mut content = Vec::new();
        reader.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"PK\x03\x04rest");

        let mut short = UnifiedReader::from_bytes(b"PK".to_vec());
        assert!(!short.starts_with(b"PK\x03\x04").unwrap());
    }
}

//! ZIP archive helper utilities for Office Open XML packages
//! Provides convenient methods for accessing parts within ZIP archives

use crate::error::HarvestError;
use crate::helpers::xml::XmlReader;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use zip::read::ZipFile;
use zip::result::ZipError;
use zip::ZipArchive;

/// Helper trait for ZIP archive operations with XML reader creation
pub(crate) trait ZipHelper<RS: Read + Seek> {
    /// Gets a file from the ZIP archive by name (case-insensitive, path separator agnostic)
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, HarvestError>;

    /// Creates an XML reader for a file within the ZIP archive
    fn xml_reader(
        &'_ mut self,
        name: &str,
    ) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, HarvestError>;
}

impl<RS: Read + Seek> ZipHelper<RS> for ZipArchive<RS> {
    /// Gets a file from the ZIP archive by name with case-insensitive matching
    /// and path separator normalization (backslash to forward slash)
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, HarvestError> {
        let pattern = name.replace('\\', "/");
        let path = self.file_names()
            .find(|file_name| pattern.eq_ignore_ascii_case(&file_name.replace('\\', "/")))
            .map(|file_name| file_name.to_owned());
        match path.map(|file_name| self.by_name(&file_name)).transpose() {
            Ok(Some(file)) => Ok(Some(file)),
            Ok(None) | Err(ZipError::FileNotFound) => Ok(None),
            Err(error) => Err(error)?,
        }
    }

    fn xml_reader(
        &'_ mut self,
        name: &str,
    ) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, HarvestError> {
        let reader = self
            .file(name)?
            .map(|file| XmlReader::new(BufReader::new(file)));
        Ok(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn archive(entries: &[(&str, &str)]) -> ZipArchive<Cursor<Vec<u8>>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        let cursor = writer.finish().unwrap();
        ZipArchive::new(Cursor::new(cursor.into_inner())).unwrap()
    }

    #[test]
    fn file_lookup_ignores_case() {
        let mut zip = archive(&[("word/Document.xml", "<w:document/>")]);
        let mut content = String::new();
        zip.file("WORD/document.xml").unwrap().unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "<w:document/>");
    }

    #[test]
    fn file_lookup_normalizes_separators() {
        let mut zip = archive(&[("word/document.xml", "<w:document/>")]);
        assert!(zip.file("word\\document.xml").unwrap().is_some());
    }

    #[test]
    fn missing_file_is_none() {
        let mut zip = archive(&[("word/document.xml", "<w:document/>")]);
        assert!(zip.file("xl/workbook.xml").unwrap().is_none());
        assert!(zip.xml_reader("xl/workbook.xml").unwrap().is_none());
    }
}

//! # Tabular Output
//!
//! Persists the extraction header and rows. [`XlsxSink`] writes a minimal
//! Office Open XML workbook with a single worksheet of inline strings.
use crate::error::HarvestError;
use log::info;
use quick_xml::events::BytesDecl;
use quick_xml::events::BytesEnd;
use quick_xml::events::BytesStart;
use quick_xml::events::BytesText;
use quick_xml::events::Event;
use quick_xml::Writer;
use std::fs::File;
use std::io::BufWriter;
use std::io::Seek;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;
use zip::ZipWriter;

const NAMESPACE_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NAMESPACE_RELATIONSHIPS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
/// Longest sheet name accepted by spreadsheet applications
const SHEET_NAME_LIMIT: usize = 31;
const DEFAULT_SHEET_NAME: &str = "Sheet1";

const CONTENT_TYPES: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
    r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
    r#"<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
    r#"</Types>"#,
);

const PACKAGE_RELATIONSHIPS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>"#,
    r#"</Relationships>"#,
);

const WORKBOOK_RELATIONSHIPS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>"#,
    r#"</Relationships>"#,
);

/// Destination of the extracted dataset.
pub trait TabularSink {
    /// Persists a header row followed by data rows
    fn write(&mut self, header: &[String], rows: &[Vec<String>]) -> Result<(), HarvestError>;
}

/// Writes the dataset as an `.xlsx` file.
#[derive(Clone, Debug)]
pub struct XlsxSink {
    path: PathBuf,
    sheet_name: String,
}

impl XlsxSink {
    pub fn new(path: &Path, sheet_name: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            sheet_name: sheet_name.to_owned(),
        }
    }
}

impl TabularSink for XlsxSink {
    fn write(&mut self, header: &[String], rows: &[Vec<String>]) -> Result<(), HarvestError> {
        let file = BufWriter::new(File::create(&self.path)?);
        let mut file = write_workbook(file, &self.sheet_name, header, rows)?;
        file.flush()?;
        info!("Wrote {} row(s) to '{}'", rows.len(), self.path.display());
        Ok(())
    }
}

/// Writes a single-sheet workbook and returns the underlying writer
pub fn write_workbook<W: Write + Seek>(
    writer: W,
    sheet_name: &str,
    header: &[String],
    rows: &[Vec<String>],
) -> Result<W, HarvestError> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(writer);

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(CONTENT_TYPES.as_bytes())?;
    zip.start_file("_rels/.rels", options)?;
    zip.write_all(PACKAGE_RELATIONSHIPS.as_bytes())?;
    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    zip.write_all(WORKBOOK_RELATIONSHIPS.as_bytes())?;

    zip.start_file("xl/workbook.xml", options)?;
    write_workbook_part(&mut zip, &sanitize_sheet_name(sheet_name))?;

    zip.start_file("xl/worksheets/sheet1.xml", options)?;
    let records = std::iter::once(header).chain(rows.iter().map(Vec::as_slice));
    write_worksheet_part(&mut zip, records)?;

    Ok(zip.finish()?)
}

fn write_workbook_part<W: Write>(writer: W, sheet_name: &str) -> Result<(), HarvestError> {
    let mut xml = Writer::new(writer);
    xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    xml.write_event(Event::Start(
        BytesStart::new("workbook").with_attributes([("xmlns", NAMESPACE_MAIN), ("xmlns:r", NAMESPACE_RELATIONSHIPS)]),
    ))?;
    xml.write_event(Event::Start(BytesStart::new("sheets")))?;
    xml.write_event(Event::Empty(
        BytesStart::new("sheet").with_attributes([("name", sheet_name), ("sheetId", "1"), ("r:id", "rId1")]),
    ))?;
    xml.write_event(Event::End(BytesEnd::new("sheets")))?;
    xml.write_event(Event::End(BytesEnd::new("workbook")))?;
    Ok(())
}

fn write_worksheet_part<'r, W, I>(writer: W, records: I) -> Result<(), HarvestError>
where
    W: Write,
    I: Iterator<Item = &'r [String]>,
{
    let mut xml = Writer::new(writer);
    xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    xml.write_event(Event::Start(BytesStart::new("worksheet").with_attributes([("xmlns", NAMESPACE_MAIN)])))?;
    xml.write_event(Event::Start(BytesStart::new("sheetData")))?;
    for (row, record) in records.enumerate() {
        let row_number = (row + 1).to_string();
        xml.write_event(Event::Start(BytesStart::new("row").with_attributes([("r", row_number.as_str())])))?;
        for (col, value) in record.iter().enumerate() {
            let value = xml_safe_text(value);
            if value.is_empty() {
                continue;
            }
            let reference = cell_reference(row, col);
            xml.write_event(Event::Start(
                BytesStart::new("c").with_attributes([("r", reference.as_str()), ("t", "inlineStr")]),
            ))?;
            xml.write_event(Event::Start(BytesStart::new("is")))?;
            xml.write_event(Event::Start(BytesStart::new("t").with_attributes([("xml:space", "preserve")])))?;
            xml.write_event(Event::Text(BytesText::new(&value)))?;
            xml.write_event(Event::End(BytesEnd::new("t")))?;
            xml.write_event(Event::End(BytesEnd::new("is")))?;
            xml.write_event(Event::End(BytesEnd::new("c")))?;
        }
        xml.write_event(Event::End(BytesEnd::new("row")))?;
    }
    xml.write_event(Event::End(BytesEnd::new("sheetData")))?;
    xml.write_event(Event::End(BytesEnd::new("worksheet")))?;
    Ok(())
}

/// Convert 0-based row & column indexes to an Excel-style cell reference.
pub(crate) fn cell_reference(row: usize, column: usize) -> String {
    let mut column = column + 1;
    let mut reference = String::new();
    while column > 0 {
        column -= 1;
        let digit = char::from(b'A' + (column % 26) as u8);
        column /= 26;
        reference.insert(0, digit);
    }
    reference.push_str(&(row + 1).to_string());
    reference
}

/// Replaces characters spreadsheet applications reject in sheet names
fn sanitize_sheet_name(name: &str) -> String {
    let name: String = name
        .chars()
        .map(|character| match character {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            _ => character,
        })
        .take(SHEET_NAME_LIMIT)
        .collect();
    let name = name.trim().trim_matches('\'').to_owned();
    if name.is_empty() {
        DEFAULT_SHEET_NAME.to_owned()
    } else {
        name
    }
}

/// Drops characters that cannot appear in XML 1.0 text
fn xml_safe_text(text: &str) -> String {
    text.chars()
        .filter(|character| match *character {
            '\t' | '\n' | '\r' => true,
            '\u{FFFE}' | '\u{FFFF}' => false,
            character => character >= ' ',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::xml::XmlNodeHelper;
    use crate::helpers::xml::XmlTextContextHelper;
    use crate::helpers::zip::ZipHelper;
    use crate::match_xml_events;
    use quick_xml::name::QName;
    use std::io::Cursor;
    use zip::ZipArchive;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    /// Reads back `(reference, text)` pairs of the worksheet
    fn read_cells(bytes: Vec<u8>) -> Result<Vec<(String, String)>, HarvestError> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;
        let mut reader = zip.xml_reader("xl/worksheets/sheet1.xml")?.expect("worksheet");
        let mut cells = Vec::new();
        let mut reference = String::new();
        let mut text = String::new();
        let mut in_text = false;
        match_xml_events!(reader => {
            Event::Start(event) if event.name() == QName(b"c") => {
                reference = event.get_attribute_value("r")?.unwrap_or_default().into_owned();
                text.clear();
            }
            Event::Start(event) if event.name() == QName(b"t") => in_text = true,
            Event::End(event) if event.name() == QName(b"t") => in_text = false,
            Event::Text(event) if in_text => text.push_bytes_text(&event)?,
            Event::GeneralRef(event) if in_text => text.push_bytes_ref(&event)?,
            Event::End(event) if event.name() == QName(b"c") => cells.push((reference.to_owned(), text.to_owned())),
        });
        Ok(cells)
    }

    #[test]
    fn cell_references() {
        assert_eq!(cell_reference(0, 0), "A1");
        assert_eq!(cell_reference(9, 25), "Z10");
        assert_eq!(cell_reference(0, 26), "AA1");
        assert_eq!(cell_reference(1, 701), "ZZ2");
        assert_eq!(cell_reference(2, 702), "AAA3");
    }

    #[test]
    fn workbook_round_trips_values() {
        let header = strings(&["file_name", "name", "note"]);
        let rows = vec![strings(&["A", "Alice", "R&D <lab>"]), strings(&["B", "", "x\u{1}y"])];
        let bytes = write_workbook(Cursor::new(Vec::new()), "Extraction", &header, &rows)
            .unwrap()
            .into_inner();
        let cells = read_cells(bytes).unwrap();
        assert_eq!(
            cells,
            vec![
                ("A1".to_owned(), "file_name".to_owned()),
                ("B1".to_owned(), "name".to_owned()),
                ("C1".to_owned(), "note".to_owned()),
                ("A2".to_owned(), "A".to_owned()),
                ("B2".to_owned(), "Alice".to_owned()),
                ("C2".to_owned(), "R&D <lab>".to_owned()),
                ("A3".to_owned(), "B".to_owned()),
                ("C3".to_owned(), "xy".to_owned()),
            ]
        );
    }

    #[test]
    fn package_contains_required_parts() {
        let bytes = write_workbook(Cursor::new(Vec::new()), "Extraction", &strings(&["id"]), &[])
            .unwrap()
            .into_inner();
        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        for part in [
            "[Content_Types].xml",
            "_rels/.rels",
            "xl/workbook.xml",
            "xl/_rels/workbook.xml.rels",
            "xl/worksheets/sheet1.xml",
        ] {
            assert!(zip.file(part).unwrap().is_some(), "missing {part}");
        }
    }

    #[test]
    fn sheet_names_are_sanitized() {
        assert_eq!(sanitize_sheet_name("Q1/Q2 [draft]"), "Q1_Q2 _draft_");
        assert_eq!(sanitize_sheet_name(""), "Sheet1");
        assert_eq!(sanitize_sheet_name("'quoted'"), "quoted");
        assert_eq!(sanitize_sheet_name(&"x".repeat(40)).len(), 31);
    }

    #[test]
    fn sink_writes_file() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("summary.xlsx");
        let mut sink = XlsxSink::new(&path, "Extraction");
        sink.write(&strings(&["file_name", "total"]), &[strings(&["A", "42"])]).unwrap();
        let cells = read_cells(std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(cells.len(), 4);
        assert_eq!(cells[3], ("B2".to_owned(), "42".to_owned()));
    }
}

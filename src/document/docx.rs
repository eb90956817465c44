//! Office Open XML word-processing reader (`.docx`).
//!
//! Streams the main document part and collects top-level tables. Nested tables,
//! text boxes, drawings and alternate-content fallbacks are skipped.
use crate::document::Document;
use crate::document::DocumentError;
use crate::document::DocumentSource;
use crate::document::PhysicalCell;
use crate::document::Table;
use crate::document::VerticalMerge;
use crate::error::HarvestError;
use crate::error::ResultMessage;
use crate::helpers::reader::UnifiedReader;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use log::debug;
use quick_xml::events::Event;
use std::path::Path;
use zip::ZipArchive;

/// Compound file signature shared by legacy `.doc` files and encrypted packages
const COMPOUND_FILE_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const PACKAGE_RELATIONSHIPS: &str = "_rels/.rels";
const DEFAULT_MAIN_PART: &str = "word/document.xml";

// Local element names of the WordprocessingML vocabulary
const TAG_RELATIONSHIP: &[u8] = b"Relationship";
const TAG_TABLE: &[u8] = b"tbl";
const TAG_ROW: &[u8] = b"tr";
const TAG_CELL: &[u8] = b"tc";
const TAG_CELL_PROPERTIES: &[u8] = b"tcPr";
const TAG_GRID_SPAN: &[u8] = b"gridSpan";
const TAG_VERTICAL_MERGE: &[u8] = b"vMerge";
const TAG_PARAGRAPH: &[u8] = b"p";
const TAG_RUN: &[u8] = b"r";
const TAG_TEXT: &[u8] = b"t";
const TAG_TAB: &[u8] = b"tab";
const TAG_BREAK: &[u8] = b"br";
const TAG_CARRIAGE_RETURN: &[u8] = b"cr";
const TAG_NO_BREAK_HYPHEN: &[u8] = b"noBreakHyphen";

/// Containers whose content does not belong to the cell itself; `tcPrChange`
/// holds the properties a cell had before a tracked change
const SKIPPED_CONTAINERS: [&[u8]; 6] = [b"Fallback", b"txbxContent", b"drawing", b"pict", b"object", b"tcPrChange"];

/// Loads `.docx` files from disk.
#[derive(Copy, Clone, Debug, Default)]
pub struct DocxSource;

impl DocumentSource for DocxSource {
    fn open(&self, path: &Path) -> Result<Document, HarvestError> {
        let name = path.to_string_lossy();
        let reader = UnifiedReader::new(&name).with_prefix(&name)?;
        read_document(&name, reader).with_prefix(&name)
    }
}

/// Parses a `.docx` package held in memory
pub fn parse_docx_bytes(name: &str, bytes: Vec<u8>) -> Result<Document, HarvestError> {
    read_document(name, UnifiedReader::from_bytes(bytes)).with_prefix(name)
}

fn read_document(name: &str, mut reader: UnifiedReader) -> Result<Document, HarvestError> {
    if reader.starts_with(&COMPOUND_FILE_SIGNATURE)? {
        Err(DocumentError::DocumentCompoundFileError(name.to_owned()))?
    }

    let mut zip = ZipArchive::new(reader)?;
    let main_part = locate_main_part(&mut zip)?;
    let tables = read_tables(&mut zip, name, &main_part)?;
    debug!("Read {} table(s) from '{}'", tables.len(), name);
    Ok(Document {
        name: name.to_owned(),
        tables,
    })
}

/// Finds the main document part through the package relationships,
/// falling back to the conventional location
fn locate_main_part(zip: &mut ZipArchive<UnifiedReader>) -> Result<String, HarvestError> {
    let mut reader = match zip.xml_reader(PACKAGE_RELATIONSHIPS)? {
        Some(reader) => reader,
        None => return Ok(DEFAULT_MAIN_PART.to_owned()),
    };
    let mut main_part = None::<String>;
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let kind = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            if let Some((kind, target)) = kind.zip(target) {
                if kind.ends_with("/officeDocument") {
                    main_part = Some(target.trim_start_matches('/').to_owned());
                    break;
                }
            }
        }
    });
    Ok(main_part.unwrap_or_else(|| DEFAULT_MAIN_PART.to_owned()))
}

/// Streams the main part and collects tables that are not nested in other tables
fn read_tables(zip: &mut ZipArchive<UnifiedReader>, name: &str, main_part: &str) -> Result<Vec<Table>, HarvestError> {
    let mut reader = zip
        .xml_reader(main_part)?
        .ok_or_else(|| DocumentError::DocumentPartMissingError(name.to_owned(), main_part.to_owned()))?;

    let mut tables = Vec::<Table>::new();
    let mut table = Table::default();
    let mut row = Vec::<PhysicalCell>::new();
    let mut cell = PhysicalCell::default();

    // Context information
    let mut table_depth = 0usize;
    let mut skip_depth = 0usize;
    let mut in_cell = false;
    let mut in_properties = false;
    let mut in_run = false;
    let mut in_text = false;
    let mut paragraphs = 0usize;

    match_xml_events!(reader => {
        Event::Start(event) if SKIPPED_CONTAINERS.contains(&event.local_name().as_ref()) => skip_depth += 1,
        Event::End(event) if SKIPPED_CONTAINERS.contains(&event.local_name().as_ref()) => {
            skip_depth = skip_depth.saturating_sub(1);
        }
        Event::Start(event) if skip_depth == 0 && event.local_name().as_ref() == TAG_TABLE => {
            table_depth += 1;
            if table_depth == 1 {
                table = Table::default();
            }
        }
        Event::End(event) if skip_depth == 0 && event.local_name().as_ref() == TAG_TABLE => {
            if table_depth == 1 {
                tables.push(std::mem::take(&mut table));
            }
            table_depth = table_depth.saturating_sub(1);
        }
        Event::Start(event) if skip_depth == 0 && table_depth == 1 && event.local_name().as_ref() == TAG_ROW => {
            row.clear();
        }
        Event::End(event) if skip_depth == 0 && table_depth == 1 && event.local_name().as_ref() == TAG_ROW => {
            table.rows.push(std::mem::take(&mut row));
        }
        Event::Start(event) if skip_depth == 0 && table_depth == 1 && event.local_name().as_ref() == TAG_CELL => {
            cell = PhysicalCell::default();
            in_cell = true;
            paragraphs = 0;
        }
        Event::End(event) if skip_depth == 0 && table_depth == 1 && event.local_name().as_ref() == TAG_CELL => {
            row.push(std::mem::take(&mut cell));
            in_cell = false;
            in_properties = false;
            in_run = false;
            in_text = false;
        }
        Event::Start(event) if in_cell && skip_depth == 0 && table_depth == 1 && event.local_name().as_ref() == TAG_CELL_PROPERTIES => {
            in_properties = true;
        }
        Event::End(event) if in_properties && skip_depth == 0 && event.local_name().as_ref() == TAG_CELL_PROPERTIES => {
            in_properties = false;
        }
        Event::Start(event) if in_properties && skip_depth == 0 && event.local_name().as_ref() == TAG_GRID_SPAN => {
            cell.horizontal_span = event.get_local_attribute_value("val")?
                .and_then(|value| value.trim().parse::<usize>().ok());
        }
        Event::Start(event) if in_properties && skip_depth == 0 && event.local_name().as_ref() == TAG_VERTICAL_MERGE => {
            let value = event.get_local_attribute_value("val")?;
            cell.vertical_merge = VerticalMerge::from_value(value.as_deref());
        }

        // Cell text content
        Event::Start(event) if in_cell && skip_depth == 0 && table_depth == 1 && event.local_name().as_ref() == TAG_PARAGRAPH => {
            if paragraphs > 0 {
                cell.text.push('\n');
            }
            paragraphs += 1;
        }
        Event::Start(event) if in_cell && skip_depth == 0 && table_depth == 1 && event.local_name().as_ref() == TAG_RUN => in_run = true,
        Event::End(event) if in_run && event.local_name().as_ref() == TAG_RUN => in_run = false,
        Event::Start(event) if in_run && skip_depth == 0 && table_depth == 1 && event.local_name().as_ref() == TAG_TEXT => in_text = true,
        Event::End(event) if in_text && event.local_name().as_ref() == TAG_TEXT => in_text = false,
        Event::Start(event) if in_run && skip_depth == 0 && table_depth == 1 && event.local_name().as_ref() == TAG_TAB => cell.text.push('\t'),
        Event::Start(event) if in_run && skip_depth == 0 && table_depth == 1
            && (event.local_name().as_ref() == TAG_BREAK || event.local_name().as_ref() == TAG_CARRIAGE_RETURN) => cell.text.push('\n'),
        Event::Start(event) if in_run && skip_depth == 0 && table_depth == 1 && event.local_name().as_ref() == TAG_NO_BREAK_HYPHEN => cell.text.push('-'),
        Event::Text(event) if in_text && skip_depth == 0 && table_depth == 1 => cell.text.push_bytes_text(&event)?,
        Event::CData(event) if in_text && skip_depth == 0 && table_depth == 1 => cell.text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if in_text && skip_depth == 0 && table_depth == 1 => cell.text.push_bytes_ref(&event)?,
    });
    Ok(tables)
}

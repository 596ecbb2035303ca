//! Suffix-registered document loaders.
//!
//! Maps a file suffix to a loader that produces plain UTF-8 text:
//! PDF (pdf-extract), plain text and Markdown (direct reads), Word documents
//! (ZIP + `w:t` elements), and tabular files (CSV/XLSX rows flattened to
//! pipe-delimited lines). Image suffixes are classified here but never
//! loaded; they route to the image answerer instead.
//!
//! Loaders never panic: every failure is a [`LoadError`] the pipeline turns
//! into a user-visible answer.

use std::io::Read;
use std::path::Path;

/// Suffixes routed to the image answerer instead of a loader.
pub const IMAGE_SUFFIXES: &[&str] = &[".png", ".jpg", ".jpeg"];

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Maximum sheets processed in an xlsx workbook.
const XLSX_MAX_SHEETS: usize = 100;

/// Loading error. Surfaced as answer text by the pipeline, never fatal.
#[derive(Debug)]
pub enum LoadError {
    Io(String),
    Pdf(String),
    Ooxml(String),
    Csv(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "read failed: {}", e),
            LoadError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            LoadError::Ooxml(e) => write!(f, "OOXML extraction failed: {}", e),
            LoadError::Csv(e) => write!(f, "CSV parsing failed: {}", e),
        }
    }
}

impl std::error::Error for LoadError {}

/// The registered document loaders, keyed by suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loader {
    Pdf,
    PlainText,
    Word,
    Markdown,
    Csv,
    Xlsx,
}

/// Whether a suffix belongs to an image file.
pub fn is_image_suffix(suffix: &str) -> bool {
    IMAGE_SUFFIXES.contains(&suffix)
}

/// Look up the loader registered for a suffix. `None` means unsupported.
pub fn loader_for(suffix: &str) -> Option<Loader> {
    match suffix {
        ".pdf" => Some(Loader::Pdf),
        ".txt" => Some(Loader::PlainText),
        ".docx" => Some(Loader::Word),
        ".md" => Some(Loader::Markdown),
        ".csv" => Some(Loader::Csv),
        ".xlsx" => Some(Loader::Xlsx),
        _ => None,
    }
}

/// Load a document's raw text with the given loader.
pub fn load_document(loader: Loader, path: &Path) -> Result<String, LoadError> {
    match loader {
        Loader::Pdf => load_pdf(path),
        Loader::PlainText | Loader::Markdown => {
            std::fs::read_to_string(path).map_err(|e| LoadError::Io(e.to_string()))
        }
        Loader::Word => load_docx(path),
        Loader::Csv => load_csv(path),
        Loader::Xlsx => load_xlsx(path),
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, LoadError> {
    std::fs::read(path).map_err(|e| LoadError::Io(e.to_string()))
}

fn load_pdf(path: &Path) -> Result<String, LoadError> {
    let bytes = read_bytes(path)?;
    pdf_extract::extract_text_from_mem(&bytes).map_err(|e| LoadError::Pdf(e.to_string()))
}

fn load_docx(path: &Path) -> Result<String, LoadError> {
    let bytes = read_bytes(path)?;
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.as_slice()))
        .map_err(|e| LoadError::Ooxml(e.to_string()))?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;
    extract_w_t_elements(&xml)
}

/// Extract `<w:t>` runs from a docx body, paragraph breaks as newlines.
fn extract_w_t_elements(xml: &[u8]) -> Result<String, LoadError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"p" && !out.ends_with('\n') && !out.is_empty() {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(LoadError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// Flatten CSV rows to pipe-delimited lines, header row included.
fn load_csv(path: &Path) -> Result<String, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| LoadError::Csv(e.to_string()))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| LoadError::Csv(e.to_string()))?;
        let cells: Vec<&str> = record.iter().map(|c| c.trim()).collect();
        rows.push(cells.join(" | "));
    }
    Ok(rows.join("\n"))
}

/// Flatten xlsx shared-string cells to pipe-delimited lines, one per row.
fn load_xlsx(path: &Path) -> Result<String, LoadError> {
    let bytes = read_bytes(path)?;
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.as_slice()))
        .map_err(|e| LoadError::Ooxml(e.to_string()))?;

    let shared_strings = read_shared_strings(&mut archive)?;
    let sheet_names = list_worksheet_names(&mut archive);

    let mut out = Vec::new();
    for name in sheet_names.into_iter().take(XLSX_MAX_SHEETS) {
        let xml = read_zip_entry_bounded(&mut archive, &name)?;
        extract_xlsx_rows(&xml, &shared_strings, &mut out)?;
    }
    Ok(out.join("\n"))
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, LoadError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| LoadError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| LoadError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(LoadError::Ooxml(format!(
            "ZIP entry {} exceeds size limit",
            name
        )));
    }
    Ok(out)
}

fn read_shared_strings(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>, LoadError> {
    let xml = match read_zip_entry_bounded(archive, "xl/sharedStrings.xml") {
        Ok(xml) => xml,
        // Workbooks with only inline/numeric cells carry no shared strings.
        Err(_) => return Ok(Vec::new()),
    };
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = true;
                } else if in_si && e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        strings.push(te.unescape().unwrap_or_default().into_owned());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(LoadError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn list_worksheet_names(archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Walk one worksheet, collecting each `<row>`'s cell values as a
/// pipe-delimited line. Shared-string cells are resolved through the
/// sharedStrings table; numeric cells keep their literal value.
fn extract_xlsx_rows(
    xml: &[u8],
    shared_strings: &[String],
    out: &mut Vec<String>,
) -> Result<(), LoadError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut row_cells: Vec<String> = Vec::new();
    let mut in_v = false;
    let mut cell_is_shared = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => row_cells.clear(),
                b"c" => {
                    cell_is_shared = e.attributes().any(|a| {
                        a.as_ref()
                            .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                            .unwrap_or(false)
                    });
                }
                b"v" => in_v = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_v => {
                let v = te.unescape().unwrap_or_default();
                let s = v.trim();
                if !s.is_empty() {
                    if cell_is_shared {
                        if let Ok(i) = s.parse::<usize>() {
                            if let Some(text) = shared_strings.get(i) {
                                row_cells.push(text.clone());
                            }
                        }
                    } else {
                        row_cells.push(s.to_string());
                    }
                }
                in_v = false;
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"v" => in_v = false,
                b"c" => cell_is_shared = false,
                b"row" => {
                    if !row_cells.is_empty() {
                        out.push(row_cells.join(" | "));
                    }
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(LoadError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn image_suffixes_are_classified() {
        assert!(is_image_suffix(".png"));
        assert!(is_image_suffix(".jpg"));
        assert!(is_image_suffix(".jpeg"));
        assert!(!is_image_suffix(".pdf"));
    }

    #[test]
    fn unsupported_suffix_has_no_loader() {
        assert!(loader_for(".exe").is_none());
        assert!(loader_for("").is_none());
    }

    #[test]
    fn registered_suffixes_resolve() {
        assert_eq!(loader_for(".pdf"), Some(Loader::Pdf));
        assert_eq!(loader_for(".txt"), Some(Loader::PlainText));
        assert_eq!(loader_for(".docx"), Some(Loader::Word));
        assert_eq!(loader_for(".md"), Some(Loader::Markdown));
        assert_eq!(loader_for(".csv"), Some(Loader::Csv));
        assert_eq!(loader_for(".xlsx"), Some(Loader::Xlsx));
    }

    #[test]
    fn plain_text_loads_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "line one\nline two").unwrap();
        let text = load_document(Loader::PlainText, &path).unwrap();
        assert_eq!(text, "line one\nline two");
    }

    #[test]
    fn csv_rows_are_pipe_delimited() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");
        std::fs::write(&path, "name,total\nwidget,42\ngadget,7\n").unwrap();
        let text = load_document(Loader::Csv, &path).unwrap();
        assert_eq!(text, "name | total\nwidget | 42\ngadget | 7");
    }

    #[test]
    fn docx_text_runs_are_extracted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memo.docx");
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file(
                "word/document.xml",
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
            zip.write_all(
                br#"<?xml version="1.0"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>office test phrase</w:t></w:r></w:p></w:body></w:document>"#,
            )
            .unwrap();
            zip.finish().unwrap();
        }
        std::fs::write(&path, &buf).unwrap();
        let text = load_document(Loader::Word, &path).unwrap();
        assert!(text.contains("office test phrase"));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();
        let err = load_document(Loader::Pdf, &path).unwrap_err();
        assert!(matches!(err, LoadError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.docx");
        std::fs::write(&path, b"not a zip").unwrap();
        let err = load_document(Loader::Word, &path).unwrap_err();
        assert!(matches!(err, LoadError::Ooxml(_)));
    }
}

//! Text extraction collaborator: uploaded file bytes in, plain UTF-8 text out.
//!
//! Format selection is by file extension. PDFs go through `pdf-extract`; Office Open XML
//! containers (DOCX, PPTX, XLSX) are unzipped and their text runs read with `quick-xml`;
//! everything else is decoded as UTF-8 (lossy), which covers TXT, CSV, and Markdown.

use std::io::{Cursor, Read};
use std::path::Path;
use thiserror::Error;

const XLSX_MAX_SHEETS: usize = 100;
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Cap on decompressed bytes read from a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Errors raised while turning an uploaded file into text.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The file could not be read from disk.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that failed to load.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// PDF parsing failed.
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    /// DOCX/PPTX/XLSX container could not be parsed.
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    /// The blocking extraction task did not run to completion.
    #[error("extraction task failed: {0}")]
    Interrupted(String),
}

/// Supported document families, keyed by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Portable Document Format.
    Pdf,
    /// Word document.
    Docx,
    /// PowerPoint presentation.
    Pptx,
    /// Excel workbook.
    Xlsx,
    /// Any UTF-8 text (TXT, CSV, Markdown, unknown extensions).
    PlainText,
}

impl DocumentFormat {
    /// Pick the extraction strategy for a file name.
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "pptx" => Self::Pptx,
            "xlsx" => Self::Xlsx,
            _ => Self::PlainText,
        }
    }
}

/// Plain text extracted from one uploaded file.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    /// Full extracted text.
    pub text: String,
    /// Path the text was read from, carried into every chunk for citation.
    pub source_path: String,
}

/// Read `path` from disk and extract its text.
pub async fn extract_file(path: &Path) -> Result<ExtractedDocument, ExtractError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| ExtractError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let format = DocumentFormat::from_path(path);
    let text = tokio::task::spawn_blocking(move || extract_text(&bytes, format))
        .await
        .map_err(|error| ExtractError::Interrupted(error.to_string()))??;
    Ok(ExtractedDocument {
        text,
        source_path: path.display().to_string(),
    })
}

/// Extract plain text from in-memory bytes of the given format.
pub fn extract_text(bytes: &[u8], format: DocumentFormat) -> Result<String, ExtractError> {
    match format {
        DocumentFormat::Pdf => {
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
        }
        DocumentFormat::Docx => {
            let mut archive = open_archive(bytes)?;
            let xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;
            collect_text_runs(&xml, true)
        }
        DocumentFormat::Pptx => extract_pptx(bytes),
        DocumentFormat::Xlsx => extract_xlsx(bytes),
        DocumentFormat::PlainText => Ok(String::from_utf8_lossy(bytes).into_owned()),
    }
}

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{name}: {e}")))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {name} exceeds size limit ({MAX_XML_ENTRY_BYTES} bytes)"
        )));
    }
    Ok(out)
}

/// Concatenate every `<*:t>` text run; paragraphs (`<*:p>`) become line breaks when requested.
fn collect_text_runs(xml: &[u8], paragraph_breaks: bool) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" if paragraph_breaks && !out.ends_with('\n') && !out.is_empty() => {
                    out.push('\n')
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn numbered_entries(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(str::to_string)
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let mut slides = Vec::new();
    for name in numbered_entries(&archive, "ppt/slides/slide") {
        let xml = read_zip_entry_bounded(&mut archive, &name)?;
        let text = collect_text_runs(&xml, true)?;
        if !text.trim().is_empty() {
            slides.push(text.trim().to_string());
        }
    }
    Ok(slides.join("\n\n"))
}

fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let has_shared_strings = archive
        .file_names()
        .any(|name| name == "xl/sharedStrings.xml");
    let shared_strings = if has_shared_strings {
        read_shared_strings(&read_zip_entry_bounded(&mut archive, "xl/sharedStrings.xml")?)?
    } else {
        Vec::new()
    };
    let mut sheets = Vec::new();
    for name in numbered_entries(&archive, "xl/worksheets/sheet")
        .into_iter()
        .take(XLSX_MAX_SHEETS)
    {
        let xml = read_zip_entry_bounded(&mut archive, &name)?;
        let rows = extract_sheet_rows(&xml, &shared_strings)?;
        if !rows.is_empty() {
            sheets.push(rows);
        }
    }
    Ok(sheets.join("\n\n"))
}

fn read_shared_strings(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    use quick_xml::events::Event;

    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                if let Some(value) = current.as_mut() {
                    value.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"si" => strings.extend(current.take()),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Render a worksheet as one line per row, cells separated by `", "`.
fn extract_sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut rows: Vec<String> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_value = false;
    let mut shared = false;
    let mut cell_count = 0usize;
    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    shared = e.attributes().flatten().any(|attr| {
                        attr.key.as_ref() == b"t" && attr.value.as_ref() == b"s"
                    });
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_value => {
                let raw = te.unescape().unwrap_or_default();
                let value = raw.trim();
                if !value.is_empty() {
                    let cell = if shared {
                        value
                            .parse::<usize>()
                            .ok()
                            .and_then(|index| shared_strings.get(index).cloned())
                    } else {
                        Some(value.to_string())
                    };
                    if let Some(cell) = cell {
                        row.push(cell);
                        cell_count += 1;
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => shared = false,
                b"row" if !row.is_empty() => rows.push(std::mem::take(&mut row).join(", ")),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !row.is_empty() {
        rows.push(row.join(", "));
    }
    Ok(rows.join("\n"))
}

//! Per-file text extraction (PDF, OOXML, plain text).
//!
//! The format is chosen by file extension. Binary formats are parsed from the
//! file bytes; everything else must be UTF-8 text. Extraction never panics and
//! never aborts ingestion: each file yields a [`FileExtraction`] whose outcome
//! is either the extracted elements or an [`ExtractError`], and the loader
//! folds these into an [`ExtractionReport`].
//!
//! Table extraction is not implemented; `Extracted::tables` is always empty.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::error::ExtractionFailure;

/// Largest file the extractor will read into memory.
const MAX_FILE_BYTES: u64 = 200 * 1024 * 1024;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Maximum sheets to process in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet.
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// PDF page separator emitted by the text extractor.
const PAGE_BREAK: char = '\u{c}';

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("file exceeds size limit ({0} bytes)")]
    TooLarge(u64),
    #[error("file is not valid UTF-8 text")]
    InvalidUtf8,
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

/// Elements extracted from one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub texts: Vec<String>,
    /// Reserved; never populated.
    pub tables: Vec<String>,
}

/// Outcome of extracting one file.
#[derive(Debug)]
pub struct FileExtraction {
    pub path: PathBuf,
    pub outcome: Result<Extracted, ExtractError>,
}

impl FileExtraction {
    /// Convert a failed outcome into an [`ExtractionFailure`].
    pub fn into_result(self) -> Result<Extracted, ExtractionFailure> {
        let path = self.path;
        self.outcome
            .map_err(|reason| ExtractionFailure { path, reason })
    }
}

/// Per-corpus summary of which files were extracted and which were skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    pub succeeded: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl ExtractionReport {
    pub fn record_success(&mut self, path: PathBuf) {
        self.succeeded.push(path);
    }

    pub fn record_failure(&mut self, failure: &ExtractionFailure) {
        self.failed
            .push((failure.path.clone(), failure.reason.to_string()));
    }

    /// Record a corpus entry the directory walk could not read.
    pub fn record_unreadable(&mut self, path: PathBuf, reason: String) {
        self.failed.push((path, reason));
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Pdf,
    Docx,
    Pptx,
    Xlsx,
    Text,
}

fn detect_format(path: &Path) -> Format {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => Format::Pdf,
        "docx" => Format::Docx,
        "pptx" => Format::Pptx,
        "xlsx" => Format::Xlsx,
        _ => Format::Text,
    }
}

/// Extract all text elements from a file.
pub fn extract_file(path: &Path) -> FileExtraction {
    let outcome = read_bytes(path).and_then(|bytes| extract_bytes(&bytes, detect_format(path)));
    FileExtraction {
        path: path.to_path_buf(),
        outcome,
    }
}

/// Extract `(texts, tables)` from a file, logging and returning empty
/// results on failure.
pub fn extract_data(path: &Path) -> (Vec<String>, Vec<String>) {
    match extract_file(path).into_result() {
        Ok(extracted) => (extracted.texts, extracted.tables),
        Err(failure) => {
            tracing::warn!(path = %failure.path.display(), error = %failure.reason, "skipping file");
            (Vec::new(), Vec::new())
        }
    }
}

/// Read the whole file. The handle is dropped when this function returns,
/// on success and on every error path.
fn read_bytes(path: &Path) -> Result<Vec<u8>, ExtractError> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    if len > MAX_FILE_BYTES {
        return Err(ExtractError::TooLarge(MAX_FILE_BYTES));
    }
    let mut bytes = Vec::with_capacity(len as usize);
    file.take(MAX_FILE_BYTES).read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn extract_bytes(bytes: &[u8], format: Format) -> Result<Extracted, ExtractError> {
    let texts = match format {
        Format::Pdf => extract_pdf_pages(bytes)?,
        Format::Docx => single(extract_docx(bytes)?),
        Format::Pptx => single(extract_pptx(bytes)?),
        Format::Xlsx => single(extract_xlsx(bytes)?),
        Format::Text => {
            let text = std::str::from_utf8(bytes).map_err(|_| ExtractError::InvalidUtf8)?;
            single(text.to_string())
        }
    };
    Ok(Extracted {
        texts,
        tables: Vec::new(),
    })
}

fn single(text: String) -> Vec<String> {
    if text.trim().is_empty() {
        Vec::new()
    } else {
        vec![text]
    }
}

fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    // pdf-extract panics on some malformed documents.
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(bytes)
    }));
    let text = match result {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => return Err(ExtractError::Pdf(e.to_string())),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "parser panicked".to_string());
            return Err(ExtractError::Pdf(message));
        }
    };
    Ok(text
        .split(PAGE_BREAK)
        .filter(|page| !page.trim().is_empty())
        .map(str::to_string)
        .collect())
}

// ============ OOXML ============

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn ooxml_err(e: impl std::fmt::Display) -> ExtractError {
    ExtractError::Ooxml(e.to_string())
}

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(ooxml_err)
}

fn read_entry_bounded(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive.by_name(name).map_err(ooxml_err)?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(ooxml_err)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Entry names with the given prefix, ordered by their numeric suffix
/// (`slide2.xml` before `slide10.xml`).
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

/// Concatenate the text of every `<*:t>` element (w:t in Word, a:t in slides).
fn collect_text_runs(xml: &[u8], separator: &str) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut runs: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_t = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == b"t" => in_t = false,
            Ok(Event::Text(te)) if in_t => {
                runs.push(te.unescape().map_err(ooxml_err)?.into_owned());
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(runs.join(separator))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_entry_bounded(&mut archive, "word/document.xml")?;
    collect_text_runs(&xml, "")
}

fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let mut slides = Vec::new();
    for name in numbered_entries(&archive, "ppt/slides/slide") {
        let xml = read_entry_bounded(&mut archive, &name)?;
        let text = collect_text_runs(&xml, " ")?;
        if !text.is_empty() {
            slides.push(text);
        }
    }
    Ok(slides.join("\n"))
}

fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let shared = read_shared_strings(&mut archive)?;
    let mut sheets = Vec::new();
    for name in numbered_entries(&archive, "xl/worksheets/sheet")
        .into_iter()
        .take(XLSX_MAX_SHEETS)
    {
        let xml = read_entry_bounded(&mut archive, &name)?;
        let cells = sheet_shared_string_cells(&xml, &shared)?;
        if !cells.is_empty() {
            sheets.push(cells);
        }
    }
    Ok(sheets.join("\n"))
}

fn read_shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>, ExtractError> {
    use quick_xml::events::Event;

    if archive.by_name("xl/sharedStrings.xml").is_err() {
        return Ok(Vec::new());
    }
    let xml = read_entry_bounded(archive, "xl/sharedStrings.xml")?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&te.unescape().map_err(ooxml_err)?);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.extend(current.take()),
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn sheet_shared_string_cells(xml: &[u8], shared: &[String]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut cells: Vec<&str> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_v = false;
    let mut shared_cell = false;
    while cells.len() < XLSX_MAX_CELLS_PER_SHEET {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    shared_cell = e.attributes().flatten().any(|a| {
                        a.key.as_ref() == b"t" && a.value.as_ref() == b"s"
                    });
                }
                b"v" => in_v = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_v && shared_cell => {
                let raw = te.unescape().map_err(ooxml_err)?;
                if let Some(s) = raw.trim().parse::<usize>().ok().and_then(|i| shared.get(i)) {
                    cells.push(s);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" => in_v = false,
                b"c" => shared_cell = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(cells.join(" "))
}

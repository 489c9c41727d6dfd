//! Content extraction for indexed files and directories.
//!
//! Dispatch is a capability table keyed by lowercase file extension; each
//! entry is a pure `bytes -> text` function. Supporting a new format means
//! adding a row to [`CAPABILITIES`]. Failures come back as [`ExtractError`]
//! values and never panic, so the walker can record them and move on.

use std::io::Read;
use std::path::Path;

use crate::models::EntryKind;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Maximum sheets to read from a workbook.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to read per sheet.
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("file is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },
    #[error("binary content cannot be decoded as text")]
    Decode,
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("unsupported file type: {0}")]
    Unsupported(String),
}

/// Successful extraction outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// Extracted text, already bounded to the extractor's limit.
    Text(String),
    /// No capability exists for this extension; carries a generic description.
    Unsupported(String),
}

impl Extracted {
    pub fn as_str(&self) -> &str {
        match self {
            Extracted::Text(t) | Extracted::Unsupported(t) => t,
        }
    }
}

type ExtractFn = fn(&[u8]) -> Result<String, ExtractError>;

/// One row of the dispatch table.
pub struct Capability {
    pub extensions: &'static [&'static str],
    /// Human-readable document type ("PDF document", ...).
    pub label: &'static str,
    extract: ExtractFn,
}

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rst", "log", "csv", "tsv", "json", "jsonl", "toml", "yaml", "yml",
    "ini", "cfg", "conf", "xml", "html", "htm", "css", "scss", "js", "jsx", "ts", "tsx", "mjs",
    "py", "rb", "rs", "go", "java", "kt", "scala", "c", "h", "cc", "cpp", "hpp", "cs", "swift",
    "php", "pl", "lua", "r", "sql", "sh", "bash", "zsh", "fish", "ps1", "bat", "tex", "vue",
    "svelte", "dart", "ex", "exs", "hs", "ml", "clj", "el", "vim", "dockerfile", "makefile",
    "gradle", "properties", "env", "gitignore", "proto", "graphql",
];

pub static CAPABILITIES: &[Capability] = &[
    Capability {
        extensions: TEXT_EXTENSIONS,
        label: "text file",
        extract: extract_plain_text,
    },
    Capability {
        extensions: &["pdf"],
        label: "PDF document",
        extract: extract_pdf,
    },
    Capability {
        extensions: &["docx"],
        label: "Word document",
        extract: extract_docx,
    },
    Capability {
        extensions: &["pptx"],
        label: "PowerPoint presentation",
        extract: extract_pptx,
    },
    Capability {
        extensions: &["xlsx"],
        label: "spreadsheet",
        extract: extract_xlsx,
    },
];

/// Lowercase extension of `path`, or the lowercase file name for
/// extensionless names such as `Makefile`.
pub fn normalized_extension(path: &Path) -> Option<String> {
    match path.extension() {
        Some(ext) => Some(ext.to_string_lossy().to_lowercase()),
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().trim_start_matches('.').to_lowercase()),
    }
}

/// Looks up the capability row for `path`.
pub fn capability_for(path: &Path) -> Option<&'static Capability> {
    let ext = normalized_extension(path)?;
    CAPABILITIES
        .iter()
        .find(|c| c.extensions.contains(&ext.as_str()))
}

/// Document type label for `path`; `"file"` when there is no capability.
pub fn type_label(path: &Path) -> &'static str {
    capability_for(path).map(|c| c.label).unwrap_or("file")
}

/// Returns the longest prefix of `s` holding at most `max_chars` characters.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Extractor with fixed output and input bounds.
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    max_chars: usize,
    max_file_bytes: u64,
}

impl ContentExtractor {
    pub fn new(max_chars: usize, max_file_bytes: u64) -> Self {
        Self {
            max_chars,
            max_file_bytes,
        }
    }

    /// Extracts bounded text from a file, or the child listing of a directory.
    pub fn extract(&self, path: &Path, kind: EntryKind) -> Result<Extracted, ExtractError> {
        match kind {
            EntryKind::Directory => self.list_directory(path),
            EntryKind::File => self.extract_file(path),
        }
    }

    fn extract_file(&self, path: &Path) -> Result<Extracted, ExtractError> {
        let Some(capability) = capability_for(path) else {
            let ext = normalized_extension(path).unwrap_or_default();
            return Ok(Extracted::Unsupported(format!(
                "file of unsupported type '{}'",
                ext
            )));
        };

        let size = std::fs::metadata(path)?.len();
        if size > self.max_file_bytes {
            return Err(ExtractError::TooLarge {
                size,
                limit: self.max_file_bytes,
            });
        }

        let bytes = std::fs::read(path)?;
        let text = (capability.extract)(&bytes)?;
        Ok(Extracted::Text(self.bound(text.trim())))
    }

    fn list_directory(&self, path: &Path) -> Result<Extracted, ExtractError> {
        let mut names: Vec<String> = std::fs::read_dir(path)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .filter(|name| !name.starts_with('.'))
            .collect();
        names.sort();
        Ok(Extracted::Text(self.bound(&names.join(", "))))
    }

    fn bound(&self, text: &str) -> String {
        truncate_chars(text, self.max_chars).to_string()
    }
}

fn extract_plain_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let text = std::str::from_utf8(bytes).map_err(|_| ExtractError::Decode)?;
    if text.contains('\0') {
        return Err(ExtractError::Decode);
    }
    Ok(text.to_string())
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed inputs instead of returning an error.
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(result) => result.map_err(|e| ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("parser panicked on malformed input".to_string())),
    }
}

type ZipArchive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_zip(bytes: &[u8]) -> Result<ZipArchive<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut ZipArchive<'_>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

/// Zip entry names matching `prefix<N>.xml`, sorted by `N`.
fn numbered_entries(archive: &ZipArchive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_zip(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    collect_text_runs(&xml, b"p", "\n")
}

fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_zip(bytes)?;
    let mut slides = Vec::new();
    for name in numbered_entries(&archive, "ppt/slides/slide") {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let text = collect_text_runs(&xml, b"p", " | ")?;
        let text = text.trim_end_matches(" | ").trim();
        if !text.is_empty() {
            slides.push(format!("Slide: {}", text));
        }
    }
    Ok(slides.join("\n"))
}

/// Concatenates the text of every `<*:t>` element, appending `separator`
/// whenever a `block` element closes.
fn collect_text_runs(xml: &[u8], block: &[u8], separator: &str) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"t" {
                    in_text = false;
                } else if name.as_ref() == block && !out.is_empty() && !out.ends_with(separator)
                {
                    out.push_str(separator);
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_zip(bytes)?;
    let shared_strings = read_shared_strings(&mut archive)?;
    let mut sheets = Vec::new();
    for name in numbered_entries(&archive, "xl/worksheets/sheet")
        .into_iter()
        .take(XLSX_MAX_SHEETS)
    {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let cells = extract_sheet_cells(&xml, &shared_strings)?;
        if !cells.is_empty() {
            sheets.push(cells);
        }
    }
    Ok(sheets.join("\n"))
}

fn read_shared_strings(archive: &mut ZipArchive<'_>) -> Result<Vec<String>, ExtractError> {
    if !archive.file_names().any(|n| n == "xl/sharedStrings.xml") {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_text = current.is_some(),
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_text => {
                if let Some(s) = current.as_mut() {
                    s.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.extend(current.take()),
                b"t" => in_text = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn extract_sheet_cells(xml: &[u8], shared_strings: &[String]) -> Result<String, ExtractError> {
    let mut cells: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_value = false;
    let mut shared = false;
    while cells.len() < XLSX_MAX_CELLS_PER_SHEET {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    shared = e.attributes().flatten().any(|a| {
                        a.key.as_ref() == b"t" && a.value.as_ref() == b"s"
                    });
                }
                b"v" => in_value = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_value => {
                let raw = te.unescape().unwrap_or_default();
                let value = raw.trim();
                if shared {
                    if let Some(s) = value.parse::<usize>().ok().and_then(|i| shared_strings.get(i)) {
                        cells.push(s.clone());
                    }
                } else if !value.is_empty() {
                    cells.push(value.to_string());
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"v" => in_value = false,
                b"c" => shared = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(cells.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn extractor() -> ContentExtractor {
        ContentExtractor::new(500, 1024 * 1024)
    }

    #[test]
    fn unsupported_extension_yields_generic_description() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("photo.heic");
        fs::write(&path, [0u8, 1, 2, 3]).unwrap();
        let out = extractor().extract(&path, EntryKind::File).unwrap();
        assert!(matches!(out, Extracted::Unsupported(ref d) if d.contains("heic")));
    }

    #[test]
    fn plain_text_is_truncated_to_limit() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.TXT");
        fs::write(&path, "é".repeat(40)).unwrap();
        let out = ContentExtractor::new(10, 1024)
            .extract(&path, EntryKind::File)
            .unwrap();
        assert_eq!(out, Extracted::Text("é".repeat(10)));
    }

    #[test]
    fn invalid_utf8_text_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blob.txt");
        fs::write(&path, [0xff, 0xfe, 0x00, 0x81]).unwrap();
        let err = extractor().extract(&path, EntryKind::File).unwrap_err();
        assert!(matches!(err, ExtractError::Decode));
    }

    #[test]
    fn oversized_file_fails_before_reading() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("big.md");
        fs::write(&path, "x".repeat(64)).unwrap();
        let err = ContentExtractor::new(10, 32)
            .extract(&path, EntryKind::File)
            .unwrap_err();
        assert!(matches!(err, ExtractError::TooLarge { size: 64, limit: 32 }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = extractor()
            .extract(Path::new("/no/such/file.txt"), EntryKind::File)
            .unwrap_err();
        assert!(matches!(err, ExtractError::Io(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_pdf(b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_docx(b"not a zip").unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[test]
    fn directory_lists_visible_children_sorted() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.txt"), "b").unwrap();
        fs::write(tmp.path().join("a.txt"), "a").unwrap();
        fs::write(tmp.path().join(".hidden"), "h").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        let out = extractor().extract(tmp.path(), EntryKind::Directory).unwrap();
        assert_eq!(out.as_str(), "a.txt, b.txt, sub");
    }

    #[test]
    fn labels_follow_capability_table() {
        assert_eq!(type_label(Path::new("a/report.PDF")), "PDF document");
        assert_eq!(type_label(Path::new("deck.pptx")), "PowerPoint presentation");
        assert_eq!(type_label(Path::new("main.rs")), "text file");
        assert_eq!(type_label(Path::new("Makefile")), "text file");
        assert_eq!(type_label(Path::new("song.mp3")), "file");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn text_runs_split_on_paragraphs() {
        let xml = br#"<w:document xmlns:w="w"><w:body>
            <w:p><w:r><w:t>First line</w:t></w:r></w:p>
            <w:p><w:r><w:t>Second</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let text = collect_text_runs(xml, b"p", "\n").unwrap();
        assert_eq!(text, "First line\nSecond");
    }
}

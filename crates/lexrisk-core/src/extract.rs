use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::error::ProcessError;

/// Turns a file on disk into raw text, in document order.
///
/// An extractable file with no text yields `Ok(String::new())`; it is up to
/// the caller to treat that as a failure.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String>;
}

// ── PDF ──────────────────────────────────────────────────────────────────

/// Concatenates the text layer of every page. A page without an extractable
/// text layer contributes an empty string.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract(&self, path: &Path) -> Result<String> {
        let doc = lopdf::Document::load(path)
            .with_context(|| format!("failed to open PDF {}", path.display()))?;

        let mut text = String::new();
        // get_pages is keyed by 1-based page number, so iteration is in page order.
        for page_no in doc.get_pages().keys() {
            match doc.extract_text(&[*page_no]) {
                Ok(page_text) => text.push_str(&page_text),
                Err(e) => debug!(page = page_no, "no text layer on PDF page: {e}"),
            }
        }
        Ok(text)
    }
}

// ── DOCX ─────────────────────────────────────────────────────────────────

const DOCX_BODY: &str = "word/document.xml";

/// Reads `word/document.xml` and emits one line per non-empty paragraph.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxExtractor;

impl TextExtractor for DocxExtractor {
    fn extract(&self, path: &Path) -> Result<String> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open DOCX {}", path.display()))?;
        let mut archive = zip::ZipArchive::new(file).context("DOCX is not a valid zip archive")?;
        let mut xml = String::new();
        archive
            .by_name(DOCX_BODY)
            .with_context(|| format!("DOCX has no {DOCX_BODY}"))?
            .read_to_string(&mut xml)
            .with_context(|| format!("failed to read {DOCX_BODY}"))?;

        let paragraphs = docx_paragraphs(&xml)?;
        Ok(paragraphs
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Paragraph texts from a WordprocessingML body, empty paragraphs included.
///
/// Paragraphs come out in the order they open. A paragraph nested in another
/// (text boxes: `w:txbxContent` inside a run) gets its own entry right after
/// its parent, and the parent's text on both sides of it stays together.
/// Tabs and breaks only count inside a run; `w:tab` under `w:pPr/w:tabs` is a
/// tab-stop definition.
pub fn docx_paragraphs(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs: Vec<String> = Vec::new();
    // (index into `paragraphs`, open `w:r` depth) for each open paragraph.
    let mut open: Vec<(usize, usize)> = Vec::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event().context("malformed DOCX XML")? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:p" => {
                    open.push((paragraphs.len(), 0));
                    paragraphs.push(String::new());
                }
                b"w:r" => {
                    if let Some((_, runs)) = open.last_mut() {
                        *runs += 1;
                    }
                }
                b"w:t" => in_text_run = true,
                _ => {}
            },
            Event::Empty(e) => {
                let inline = match e.name().as_ref() {
                    b"w:tab" => Some('\t'),
                    b"w:br" | b"w:cr" => Some('\n'),
                    b"w:p" => {
                        paragraphs.push(String::new());
                        None
                    }
                    _ => None,
                };
                if let (Some(c), Some(&(idx, runs))) = (inline, open.last()) {
                    if runs > 0 {
                        paragraphs[idx].push(c);
                    }
                }
            }
            Event::Text(t) if in_text_run => {
                if let Some(&(idx, _)) = open.last() {
                    paragraphs[idx].push_str(&t.unescape().context("bad XML escape in DOCX text")?);
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:r" => {
                    if let Some((_, runs)) = open.last_mut() {
                        *runs = runs.saturating_sub(1);
                    }
                }
                b"w:p" => {
                    open.pop();
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(paragraphs)
}

// ── Registry ─────────────────────────────────────────────────────────────

/// Maps lowercase file suffixes (without the dot) to extractors.
#[derive(Clone)]
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn TextExtractor>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::empty()
            .with("pdf", Arc::new(PdfExtractor))
            .with("docx", Arc::new(DocxExtractor))
    }
}

impl ExtractorRegistry {
    pub fn empty() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    pub fn with(mut self, suffix: &str, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractors
            .insert(suffix.trim_start_matches('.').to_ascii_lowercase(), extractor);
        self
    }

    pub fn supports(&self, path: &Path) -> bool {
        suffix_of(path).is_some_and(|s| self.extractors.contains_key(&s))
    }

    /// Sorted list of supported suffixes, e.g. `["docx", "pdf"]`.
    pub fn suffixes(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.extractors.keys().map(String::as_str).collect();
        out.sort_unstable();
        out
    }

    pub fn for_path(&self, path: &Path) -> Result<Arc<dyn TextExtractor>, ProcessError> {
        suffix_of(path)
            .and_then(|s| self.extractors.get(&s))
            .cloned()
            .ok_or_else(|| {
                warn!(path = %path.display(), "no extractor for file type");
                ProcessError::UnsupportedFormat(path.display().to_string())
            })
    }
}

fn suffix_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

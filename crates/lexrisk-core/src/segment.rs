use anyhow::{bail, Result};
use tracing::{debug, warn};
use unicode_segmentation::UnicodeSegmentation;

/// Inputs longer than this (in chars) are refused by the linguistic splitter.
pub const MAX_LINGUISTIC_CHARS: usize = 1_000_000;

/// Tokens that end in a period but are always followed by more of the same
/// sentence: titles, references, "e.g.".
const LEADING_ABBREVIATIONS: &[&str] = &[
    "art.", "approx.", "cl.", "dr.", "e.g.", "i.e.", "mr.", "mrs.", "ms.", "no.", "nos.",
    "para.", "sec.", "st.", "v.", "vs.",
];

/// Tokens that end in a period and may also end a sentence ("... Acme Inc.").
/// A split after one of these is only undone when the next piece does not
/// start with an uppercase letter.
const TRAILING_ABBREVIATIONS: &[&str] = &[
    "co.", "corp.", "inc.", "jr.", "ltd.", "sr.", "u.k.", "u.s.",
];

/// Collapses every whitespace run (newlines included) to one space and trims.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A strategy that may refuse to split.
pub trait SentenceSplitter: Send + Sync {
    fn split(&self, text: &str) -> Result<Vec<String>>;
}

// ── Linguistic splitter ──────────────────────────────────────────────────

/// Unicode (UAX #29) sentence boundaries with an abbreviation guard.
#[derive(Debug, Clone)]
pub struct UnicodeSentenceSplitter {
    pub max_chars: usize,
}

impl Default for UnicodeSentenceSplitter {
    fn default() -> Self {
        Self {
            max_chars: MAX_LINGUISTIC_CHARS,
        }
    }
}

impl SentenceSplitter for UnicodeSentenceSplitter {
    fn split(&self, text: &str) -> Result<Vec<String>> {
        let len = text.chars().count();
        if len > self.max_chars {
            bail!(
                "text of {len} chars exceeds the sentence splitter limit of {}",
                self.max_chars
            );
        }

        let mut sentences: Vec<String> = Vec::new();
        for raw in text.unicode_sentences() {
            let piece = raw.trim();
            if piece.is_empty() {
                continue;
            }
            match sentences.last_mut() {
                Some(prev) if continues_after_abbreviation(prev, piece) => {
                    prev.push(' ');
                    prev.push_str(piece);
                }
                _ => sentences.push(piece.to_string()),
            }
        }
        Ok(sentences)
    }
}

/// True when the boundary between `prev` and `next` was only an abbreviation.
fn continues_after_abbreviation(prev: &str, next: &str) -> bool {
    let Some(last) = prev.split_whitespace().last() else {
        return false;
    };
    let last = last.trim_start_matches(|c: char| matches!(c, '(' | '"' | '\'' | '['));
    let is = |list: &[&str]| list.iter().any(|abbr| last.eq_ignore_ascii_case(abbr));

    if is(LEADING_ABBREVIATIONS) {
        return true;
    }
    is(TRAILING_ABBREVIATIONS) && !next.starts_with(char::is_uppercase)
}

// ── Fallback splitter ────────────────────────────────────────────────────

/// Splits on `.` as a literal delimiter. Deterministic and infallible.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeriodSplitter;

impl PeriodSplitter {
    pub fn split(&self, text: &str) -> Vec<String> {
        text.split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

// ── Segmenter ────────────────────────────────────────────────────────────

/// Normalizes raw text, then splits it into clauses in source order.
///
/// The primary splitter is tried first; if it refuses, the period fallback
/// runs on the same normalized text.
pub struct ClauseSegmenter {
    primary: Box<dyn SentenceSplitter>,
    fallback: PeriodSplitter,
}

impl Default for ClauseSegmenter {
    fn default() -> Self {
        Self::new(Box::new(UnicodeSentenceSplitter::default()))
    }
}

impl ClauseSegmenter {
    pub fn new(primary: Box<dyn SentenceSplitter>) -> Self {
        Self {
            primary,
            fallback: PeriodSplitter,
        }
    }

    pub fn segment(&self, raw: &str) -> Vec<String> {
        let text = normalize(raw);
        debug!(
            original_len = raw.len(),
            normalized_len = text.len(),
            "text normalized"
        );

        let clauses = match self.primary.split(&text) {
            Ok(clauses) => clauses,
            Err(e) => {
                warn!("sentence splitter failed, falling back to period split: {e:#}");
                self.fallback.split(&text)
            }
        };
        clauses
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    }
}

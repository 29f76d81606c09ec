use std::str::FromStr;

use anyhow::{bail, Result};
use async_trait::async_trait;
use lexrisk_core::{analyzer::ClauseAnalyzer, ClauseResult, DEFAULT_CLAUSE_TYPE, MAX_RISK_SCORE};
use regex::Regex;
use tracing::debug;

/// Risk-bearing keywords, their weight and the clause type they suggest.
/// Earlier entries win when weights tie.
const KEYWORDS: &[(&str, f64, &str)] = &[
    ("indemnify", 2.0, "Indemnification"),
    ("liability", 2.0, "Liability"),
    ("penalty", 2.0, "Penalty"),
    ("breach", 1.0, "Breach"),
    ("terminate", 1.0, "Termination"),
    ("exclusive", 1.0, "Exclusivity"),
    ("unlimited", 1.0, "Liability"),
    ("warranty", 1.0, "Warranty"),
    ("confidential", 1.0, "Confidentiality"),
];

const REWRITES: &[(&str, &str)] = &[
    ("indemnify", "mutually indemnify"),
    ("unlimited", "reasonable"),
    ("penalty", "remedy"),
];

/// How harshly keyword hits are scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tolerance {
    Strict,
    Moderate,
    Lenient,
}

impl Tolerance {
    pub fn scale(self) -> f64 {
        match self {
            Tolerance::Strict => 1.2,
            Tolerance::Moderate => 1.0,
            Tolerance::Lenient => 0.8,
        }
    }
}

impl FromStr for Tolerance {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(Tolerance::Strict),
            "moderate" => Ok(Tolerance::Moderate),
            "lenient" => Ok(Tolerance::Lenient),
            other => bail!("unknown keyword tolerance {other:?}; expected strict, moderate or lenient"),
        }
    }
}

/// Offline scorer that flags clauses by keyword presence. Coarse and
/// deterministic; meant for running without network access, not as a
/// replacement for the model-backed analyzer.
pub struct KeywordAnalyzer {
    tolerance: Tolerance,
    rewrites: Vec<(Regex, &'static str)>,
}

impl KeywordAnalyzer {
    pub fn new(tolerance: Tolerance) -> Result<Self> {
        let rewrites = REWRITES
            .iter()
            .map(|(word, replacement)| {
                Ok((Regex::new(&format!(r"(?i)\b{word}\b"))?, *replacement))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { tolerance, rewrites })
    }

    pub fn tolerance(&self) -> Tolerance {
        self.tolerance
    }

    /// Scores one clause. Pure and infallible.
    pub fn score(&self, clause: &str) -> ClauseResult {
        let lower = clause.to_lowercase();
        let hits: Vec<&(&str, f64, &str)> = KEYWORDS
            .iter()
            .filter(|(word, _, _)| lower.contains(word))
            .collect();

        let raw: f64 = hits.iter().map(|(_, weight, _)| weight).sum();
        let risk_score = (raw * self.tolerance.scale())
            .round_ties_even()
            .min(MAX_RISK_SCORE);

        let clause_type = hits
            .iter()
            .fold(None::<&(&str, f64, &str)>, |best, hit| match best {
                Some(b) if b.1 >= hit.1 => Some(b),
                _ => Some(*hit),
            })
            .map(|(_, _, kind)| kind.to_string())
            .unwrap_or_else(|| DEFAULT_CLAUSE_TYPE.to_string());

        let explanation = if hits.is_empty() {
            "No risk keywords found.".to_string()
        } else {
            let words: Vec<&str> = hits.iter().map(|(word, _, _)| *word).collect();
            format!("Contains risk keywords: {}", words.join(", "))
        };

        ClauseResult::new(
            clause,
            risk_score,
            explanation,
            clause_type,
            self.safer_version(clause),
        )
    }

    /// Softens the riskiest wording with whole-word, case-insensitive rewrites.
    pub fn safer_version(&self, clause: &str) -> String {
        self.rewrites
            .iter()
            .fold(clause.to_string(), |text, (re, replacement)| {
                re.replace_all(&text, *replacement).into_owned()
            })
    }
}

#[async_trait]
impl ClauseAnalyzer for KeywordAnalyzer {
    async fn analyze(&self, clause: &str) -> Result<ClauseResult> {
        let result = self.score(clause);
        debug!(risk_score = result.risk_score, clause_type = %result.clause_type, "keyword score");
        Ok(result)
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

use serde::{Deserialize, Serialize};

/// Upper bound of the risk scale. Scores live in `[0, MAX_RISK_SCORE]`.
pub const MAX_RISK_SCORE: f64 = 5.0;

/// Reserved clause type for clauses whose analysis failed.
pub const ERROR_CLAUSE_TYPE: &str = "Error";

/// Clause type used when the analyzer does not name one.
pub const DEFAULT_CLAUSE_TYPE: &str = "Other";

// ── Clause ───────────────────────────────────────────────────────────────

/// One clause's assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClauseResult {
    /// Verbatim source text of the clause.
    pub clause: String,
    pub risk_score: f64,
    pub explanation: String,
    /// Categorical label, e.g. "Liability". `"Error"` marks a failed analysis.
    pub clause_type: String,
    /// Suggested rewrite; the original clause when nothing better was produced.
    pub safer_version: String,
}

impl ClauseResult {
    pub fn new(
        clause: impl Into<String>,
        risk_score: f64,
        explanation: impl Into<String>,
        clause_type: impl Into<String>,
        safer_version: impl Into<String>,
    ) -> Self {
        Self {
            clause: clause.into(),
            risk_score: bound_score(risk_score),
            explanation: explanation.into(),
            clause_type: clause_type.into(),
            safer_version: safer_version.into(),
        }
    }

    /// Placeholder for a clause the analyzer could not assess.
    pub fn failed(clause: impl Into<String>, explanation: impl Into<String>) -> Self {
        let clause = clause.into();
        Self {
            safer_version: clause.clone(),
            clause,
            risk_score: 0.0,
            explanation: explanation.into(),
            clause_type: ERROR_CLAUSE_TYPE.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.clause_type == ERROR_CLAUSE_TYPE
    }

    pub fn level(&self) -> RiskLevel {
        RiskLevel::from_score(self.risk_score)
    }

    /// Re-applies the score bound to a result built outside [`ClauseResult::new`].
    pub fn bounded(mut self) -> Self {
        self.risk_score = bound_score(self.risk_score);
        self
    }
}

/// Clamps a score into `[0, MAX_RISK_SCORE]`. Non-finite input maps to 0.
pub fn bound_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, MAX_RISK_SCORE)
    } else {
        0.0
    }
}

// ── Document ─────────────────────────────────────────────────────────────

/// Document-level result: the surviving clauses in source order plus their mean score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    pub clauses: Vec<ClauseResult>,
    pub overall_risk: f64,
}

impl DocumentAnalysis {
    pub fn from_clauses(clauses: Vec<ClauseResult>) -> Self {
        let overall_risk = crate::aggregate::aggregate(&clauses);
        Self {
            clauses,
            overall_risk,
        }
    }

    /// Clause counts per risk band as `(low, medium, high)`.
    pub fn level_counts(&self) -> (usize, usize, usize) {
        self.clauses
            .iter()
            .fold((0, 0, 0), |(low, medium, high), c| match c.level() {
                RiskLevel::Low => (low + 1, medium, high),
                RiskLevel::Medium => (low, medium + 1, high),
                RiskLevel::High => (low, medium, high + 1),
            })
    }
}

// ── Risk bands ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 4.0 {
            Self::High
        } else if score >= 2.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

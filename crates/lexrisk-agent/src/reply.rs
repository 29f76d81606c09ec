use anyhow::{Context, Result};
use lexrisk_core::{ClauseResult, DEFAULT_CLAUSE_TYPE};
use serde_json::{Map, Value};

/// Turn the model's text reply into a [`ClauseResult`] for `clause`.
///
/// Missing fields take defaults (explanation → "", clause_type → "Other",
/// safer_version → the clause itself). A risk score that is not a number or
/// numeric string becomes 0; any score is clamped to the 0–5 scale. A reply
/// that is not a JSON object, even after stripping code fences, is an error.
pub fn parse_analysis(clause: &str, content: &str) -> Result<ClauseResult> {
    let value: Value = serde_json::from_str(strip_fences(content))
        .context("failed to parse model reply as JSON")?;
    let fields = value
        .as_object()
        .context("model reply is JSON but not an object")?;

    Ok(ClauseResult::new(
        clause,
        coerce_score(fields.get("risk_score")),
        text_field(fields, "explanation").unwrap_or_default(),
        text_field(fields, "clause_type").unwrap_or_else(|| DEFAULT_CLAUSE_TYPE.to_string()),
        text_field(fields, "safer_version").unwrap_or_else(|| clause.to_string()),
    ))
}

fn text_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_string)
}

fn coerce_score(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Strip a surrounding markdown code fence (```json ... ```), if any.
pub fn strip_fences(text: &str) -> &str {
    let t = text.trim();
    if !t.starts_with("```") {
        return t;
    }
    let nl = match t.find('\n') {
        Some(i) => i,
        None => return t,
    };
    let inner = &t[nl + 1..];
    match inner.trim_end().strip_suffix("```") {
        Some(body) => body.trim(),
        None => inner.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLAUSE: &str = "The Supplier's liability shall be unlimited.";

    #[test]
    fn parses_complete_reply() {
        let reply = r#"{"risk_score": 4.5, "explanation": "Uncapped exposure",
            "clause_type": "Liability", "safer_version": "Liability is capped at fees paid."}"#;
        let r = parse_analysis(CLAUSE, reply).unwrap();
        assert_eq!(r.clause, CLAUSE);
        assert_eq!(r.risk_score, 4.5);
        assert_eq!(r.explanation, "Uncapped exposure");
        assert_eq!(r.clause_type, "Liability");
        assert_eq!(r.safer_version, "Liability is capped at fees paid.");
    }

    #[test]
    fn missing_fields_take_defaults() {
        let r = parse_analysis(CLAUSE, r#"{"risk_score": 2}"#).unwrap();
        assert_eq!(r.risk_score, 2.0);
        assert_eq!(r.explanation, "");
        assert_eq!(r.clause_type, "Other");
        assert_eq!(r.safer_version, CLAUSE);
    }

    #[test]
    fn score_coercion() {
        let cases = [
            (r#"{"risk_score": "3.5"}"#, 3.5),
            (r#"{"risk_score": "high"}"#, 0.0),
            (r#"{"risk_score": null}"#, 0.0),
            (r#"{"risk_score": [1]}"#, 0.0),
            (r#"{"risk_score": 12}"#, 5.0),
            (r#"{"risk_score": -2}"#, 0.0),
            (r#"{}"#, 0.0),
        ];
        for (reply, expected) in cases {
            let r = parse_analysis(CLAUSE, reply).unwrap();
            assert_eq!(r.risk_score, expected, "{reply}");
        }
    }

    #[test]
    fn non_string_fields_are_treated_as_missing() {
        let r = parse_analysis(CLAUSE, r#"{"risk_score": 1, "clause_type": 7, "safer_version": null}"#)
            .unwrap();
        assert_eq!(r.clause_type, "Other");
        assert_eq!(r.safer_version, CLAUSE);
    }

    #[test]
    fn fenced_reply_is_accepted() {
        let reply = "```json\n{\"risk_score\": 1, \"clause_type\": \"Termination\"}\n```";
        let r = parse_analysis(CLAUSE, reply).unwrap();
        assert_eq!(r.clause_type, "Termination");
    }

    #[test]
    fn garbled_reply_is_an_error() {
        assert!(parse_analysis(CLAUSE, "Sure! Here is my analysis: risk is high").is_err());
        assert!(parse_analysis(CLAUSE, "{\"risk_score\": 3").is_err());
        assert!(parse_analysis(CLAUSE, "[1, 2, 3]").is_err());
        assert!(parse_analysis(CLAUSE, "").is_err());
    }

    #[test]
    fn strip_fences_plain() {
        assert_eq!(strip_fences(r#"  {"a":1}  "#), r#"{"a":1}"#);
    }

    #[test]
    fn strip_fences_with_backticks() {
        assert_eq!(strip_fences("```json\n{\"a\":1}\n```"), r#"{"a":1}"#);
        assert_eq!(strip_fences("```\n{\"a\":1}\n```\n"), r#"{"a":1}"#);
    }

    #[test]
    fn strip_fences_unterminated() {
        assert_eq!(strip_fences("```json\n{\"a\":1}"), r#"{"a":1}"#);
    }
}

use crate::types::ClauseResult;

/// Arithmetic mean of `risk_score` over `results`, or `0.0` when empty.
///
/// Every clause counts equally; there is no weighting by length or type.
pub fn aggregate(results: &[ClauseResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let total: f64 = results.iter().map(|r| r.risk_score).sum();
    total / results.len() as f64
}

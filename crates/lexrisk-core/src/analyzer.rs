use anyhow::Result;
use async_trait::async_trait;

use crate::types::ClauseResult;

/// Assesses a single clause.
///
/// Implementations must not surface clause-level failures (timeouts, bad
/// upstream replies) as `Err`: they return [`ClauseResult::failed`] instead.
/// An `Err` is treated by the pipeline as a broken adapter, and the clause is
/// dropped from the document result.
#[async_trait]
pub trait ClauseAnalyzer: Send + Sync {
    async fn analyze(&self, clause: &str) -> Result<ClauseResult>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

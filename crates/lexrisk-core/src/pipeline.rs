use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::{
    analyzer::ClauseAnalyzer,
    error::ProcessError,
    extract::ExtractorRegistry,
    segment::ClauseSegmenter,
    types::{ClauseResult, DocumentAnalysis},
};

/// Clauses at or under this many characters (after trimming) are treated as
/// noise and never analyzed.
pub const MIN_CLAUSE_CHARS: usize = 20;

/// Drives extraction, segmentation, per-clause dispatch and aggregation for
/// one document at a time.
pub struct Pipeline {
    pub extractors: ExtractorRegistry,
    pub segmenter: ClauseSegmenter,
    pub analyzer: Arc<dyn ClauseAnalyzer>,
    /// Upper bound on in-flight analyzer calls across every document this
    /// pipeline is processing. 1 = sequential.
    pub max_concurrency: usize,
    permits: Arc<Semaphore>,
}

impl Pipeline {
    pub fn new(analyzer: Arc<dyn ClauseAnalyzer>) -> Self {
        Self {
            extractors: ExtractorRegistry::default(),
            segmenter: ClauseSegmenter::default(),
            analyzer,
            max_concurrency: 1,
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    /// Clamped to `1..=Semaphore::MAX_PERMITS`.
    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.clamp(1, Semaphore::MAX_PERMITS);
        self.permits = Arc::new(Semaphore::new(self.max_concurrency));
        self
    }

    pub fn with_extractors(mut self, extractors: ExtractorRegistry) -> Self {
        self.extractors = extractors;
        self
    }

    pub fn with_segmenter(mut self, segmenter: ClauseSegmenter) -> Self {
        self.segmenter = segmenter;
        self
    }

    /// Analyzes the document at `path`.
    pub async fn process(&self, path: &Path) -> Result<DocumentAnalysis, ProcessError> {
        info!(path = %path.display(), backend = self.analyzer.name(), "processing document");
        let started = Instant::now();

        let text = self.extract(path).await?;
        let analysis = self.analyze_text(&text).await;

        let (low, medium, high) = analysis.level_counts();
        info!(
            path = %path.display(),
            clauses = analysis.clauses.len(),
            overall_risk = analysis.overall_risk,
            low,
            medium,
            high,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "document processing complete"
        );
        Ok(analysis)
    }

    /// Segments already-extracted text and analyzes every substantive clause.
    /// Never fails: clause-level problems only shrink or annotate the result.
    pub async fn analyze_text(&self, text: &str) -> DocumentAnalysis {
        let clauses = self.segmenter.segment(text);
        info!(clauses = clauses.len(), "document split into clauses");

        let substantive: Vec<String> = clauses
            .into_iter()
            .enumerate()
            .filter_map(|(i, clause)| {
                if is_substantive(&clause) {
                    Some(clause)
                } else {
                    debug!(clause_index = i, clause = %clause, "skipping short clause");
                    None
                }
            })
            .collect();

        let results = self.dispatch(substantive).await;
        DocumentAnalysis::from_clauses(results)
    }

    async fn extract(&self, path: &Path) -> Result<String, ProcessError> {
        let extractor = self.extractors.for_path(path)?;
        let owned: PathBuf = path.to_path_buf();

        let text = tokio::task::spawn_blocking(move || extractor.extract(&owned))
            .await
            .map_err(|e| anyhow!("text extraction task failed: {e}"))?
            .map_err(|e| {
                error!(path = %path.display(), "text extraction failed: {e:#}");
                ProcessError::ExtractionFailed(format!("{e:#}"))
            })?;

        if text.trim().is_empty() {
            error!(path = %path.display(), "document contains no extractable text");
            return Err(ProcessError::ExtractionFailed(
                "the document contains no extractable text".into(),
            ));
        }
        debug!(chars = text.len(), "text extracted");
        Ok(text)
    }

    /// Runs the analyzer over `clauses`. The permit pool is shared by every
    /// concurrent call on this pipeline, so at most `max_concurrency` analyzer
    /// calls are in flight in total. Output is index-addressed, so it stays in
    /// source order whatever the completion order. A clause whose call errors
    /// or panics is dropped.
    async fn dispatch(&self, clauses: Vec<String>) -> Vec<ClauseResult> {
        let total = clauses.len();
        let mut slots: Vec<Option<ClauseResult>> = (0..total).map(|_| None).collect();
        let mut tasks = JoinSet::new();

        for (index, clause) in clauses.into_iter().enumerate() {
            let analyzer = Arc::clone(&self.analyzer);
            let permits = Arc::clone(&self.permits);
            tasks.spawn(async move {
                // Never closed, so this always yields a permit.
                let _permit = permits.acquire_owned().await.ok();
                debug!(clause_index = index, total, len = clause.len(), "analyzing clause");
                let outcome = analyzer.analyze(&clause).await;
                (index, clause, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, _, Ok(result))) => {
                    debug!(
                        clause_index = index,
                        risk_score = result.risk_score,
                        clause_type = %result.clause_type,
                        "clause analysis complete"
                    );
                    slots[index] = Some(result.bounded());
                }
                Ok((index, clause, Err(e))) => {
                    error!(
                        clause_index = index,
                        clause = %clause,
                        "clause dispatch failed, dropping clause: {e:#}"
                    );
                }
                Err(e) => {
                    error!("clause dispatch task aborted, dropping clause: {e}");
                }
            }
        }

        let results: Vec<ClauseResult> = slots.into_iter().flatten().collect();
        info!(analyzed = results.len(), dispatched = total, "completed clause analysis");
        results
    }
}

/// True when a clause is long enough to be worth analyzing.
pub fn is_substantive(clause: &str) -> bool {
    clause.trim().chars().count() > MIN_CLAUSE_CHARS
}

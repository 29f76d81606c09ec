use thiserror::Error;

/// Document-level failures. Each one is terminal for the request.
///
/// Clause-level failures never appear here: an analyzer that cannot assess a
/// clause returns an `"Error"`-typed [`crate::types::ClauseResult`], and an
/// analyzer that errors outright has that clause dropped by the pipeline.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to extract text from the document: {0}")]
    ExtractionFailed(String),

    #[error("Error processing document: {0:#}")]
    Unexpected(#[from] anyhow::Error),
}

impl ProcessError {
    /// True for failures caused by the uploaded document rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::UnsupportedFormat(_) | Self::ExtractionFailed(_))
    }
}

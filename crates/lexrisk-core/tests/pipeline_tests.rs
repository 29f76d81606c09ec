// End-to-end tests for `Pipeline`: extraction, short-clause filtering,
// per-clause failure isolation, ordering under concurrent dispatch, and
// aggregation.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use lexrisk_core::{
    analyzer::ClauseAnalyzer, pipeline::Pipeline, ClauseResult, ProcessError, MAX_RISK_SCORE,
};
use tracing_test::traced_test;

const TERMINATE: &str = "This Agreement shall terminate upon breach.";
const INDEMNITY: &str =
    "Party A grants an unlimited indemnity to Party B regarding any penalty imposed.";

// =============================================================================
// Helpers
// =============================================================================

/// Scores clauses with a caller-supplied rule and records every call.
struct ScriptedAnalyzer<F> {
    rule: F,
    calls: Mutex<Vec<String>>,
}

impl<F> ScriptedAnalyzer<F>
where
    F: Fn(&str) -> Result<ClauseResult> + Send + Sync,
{
    fn new(rule: F) -> Arc<Self> {
        Arc::new(Self {
            rule,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl<F> ClauseAnalyzer for ScriptedAnalyzer<F>
where
    F: Fn(&str) -> Result<ClauseResult> + Send + Sync,
{
    async fn analyze(&self, clause: &str) -> Result<ClauseResult> {
        self.calls.lock().unwrap().push(clause.to_string());
        (self.rule)(clause)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn scored(clause: &str, score: f64) -> Result<ClauseResult> {
    Ok(ClauseResult::new(clause, score, "stub", "Other", clause))
}

fn write_docx(paragraphs: &[&str]) -> tempfile::NamedTempFile {
    let tmp = tempfile::Builder::new().suffix(".docx").tempfile().unwrap();
    let mut zip = zip::ZipWriter::new(tmp.reopen().unwrap());
    zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
        .unwrap();
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{p}</w:t></w:r></w:p>"))
        .collect();
    write!(
        zip,
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{body}</w:body></w:document>"
    )
    .unwrap();
    zip.finish().unwrap();
    tmp
}

/// Writes a PDF with one page per entry. `None` is a page with no content
/// stream; `Some(text)` draws `text` with a single `Tj`.
fn write_pdf(pages: &[Option<&str>]) -> tempfile::NamedTempFile {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for page in pages {
        let mut page_dict = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        if let Some(text) = page {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            page_dict.set("Contents", content_id);
            page_dict.set("Resources", resources_id);
        }
        kids.push(doc.add_object(page_dict).into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let tmp = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
    doc.save(tmp.path()).unwrap();
    tmp
}

// =============================================================================
// Scenario: two-sentence contract with fixed scores
// =============================================================================

#[tokio::test]
async fn test_two_sentence_contract_end_to_end() {
    let analyzer = ScriptedAnalyzer::new(|clause: &str| {
        if clause.contains("terminate") {
            scored(clause, 1.0)
        } else {
            scored(clause, 4.5)
        }
    });
    let pipeline = Pipeline::new(analyzer.clone());
    let doc = write_docx(&[&format!("{TERMINATE} {INDEMNITY}")]);

    let analysis = pipeline.process(doc.path()).await.unwrap();

    assert_eq!(analysis.clauses.len(), 2);
    assert_eq!(analysis.clauses[0].clause, TERMINATE);
    assert_eq!(analysis.clauses[0].risk_score, 1.0);
    assert_eq!(analysis.clauses[1].clause, INDEMNITY);
    assert_eq!(analysis.clauses[1].risk_score, 4.5);
    assert_eq!(analysis.overall_risk, 2.75);
    assert_eq!(analyzer.calls().len(), 2);
}

#[tokio::test]
async fn test_paragraphs_across_lines_are_normalized() {
    let analyzer = ScriptedAnalyzer::new(|clause: &str| scored(clause, 2.0));
    let pipeline = Pipeline::new(analyzer.clone());
    let doc = write_docx(&["This Agreement shall", "terminate upon   breach."]);

    let analysis = pipeline.process(doc.path()).await.unwrap();

    assert_eq!(analysis.clauses.len(), 1);
    assert_eq!(analysis.clauses[0].clause, TERMINATE);
}

// =============================================================================
// Extraction failures are terminal and happen before any analysis
// =============================================================================

#[tokio::test]
async fn test_unsupported_extension_fails_before_analysis() {
    let analyzer = ScriptedAnalyzer::new(|clause: &str| scored(clause, 3.0));
    let pipeline = Pipeline::new(analyzer.clone());

    let err = pipeline
        .process(Path::new("/tmp/contract.txt"))
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::UnsupportedFormat(_)));
    assert!(err.is_client_error());
    assert!(analyzer.calls().is_empty());
}

#[tokio::test]
async fn test_docx_without_text_is_extraction_failure() {
    let analyzer = ScriptedAnalyzer::new(|clause: &str| scored(clause, 3.0));
    let pipeline = Pipeline::new(analyzer.clone());
    let doc = write_docx(&["", "   "]);

    let err = pipeline.process(doc.path()).await.unwrap_err();

    assert!(matches!(err, ProcessError::ExtractionFailed(_)));
    assert!(analyzer.calls().is_empty());
}

#[tokio::test]
async fn test_corrupt_docx_is_extraction_failure() {
    let analyzer = ScriptedAnalyzer::new(|clause: &str| scored(clause, 3.0));
    let pipeline = Pipeline::new(analyzer.clone());
    let mut tmp = tempfile::Builder::new().suffix(".docx").tempfile().unwrap();
    tmp.write_all(b"this is not a zip archive").unwrap();

    let err = pipeline.process(tmp.path()).await.unwrap_err();

    assert!(matches!(err, ProcessError::ExtractionFailed(_)));
}

#[tokio::test]
async fn test_pdf_with_no_text_layer_is_extraction_failure() {
    let analyzer = ScriptedAnalyzer::new(|clause: &str| scored(clause, 3.0));
    let pipeline = Pipeline::new(analyzer.clone());
    let pdf = write_pdf(&[None]);

    let err = pipeline.process(pdf.path()).await.unwrap_err();

    assert!(matches!(err, ProcessError::ExtractionFailed(_)));
    assert!(analyzer.calls().is_empty());
}

#[tokio::test]
async fn test_pdf_blank_page_is_skipped_and_text_page_analyzed() {
    let analyzer = ScriptedAnalyzer::new(|clause: &str| scored(clause, 4.0));
    let pipeline = Pipeline::new(analyzer.clone());
    let pdf = write_pdf(&[None, Some("The Supplier shall indemnify the Customer.")]);

    let analysis = pipeline.process(pdf.path()).await.unwrap();

    assert_eq!(analysis.clauses.len(), 1);
    assert_eq!(analysis.clauses[0].clause, "The Supplier shall indemnify the Customer.");
    assert_eq!(analysis.overall_risk, 4.0);
    assert_eq!(analyzer.calls().len(), 1);
}

// =============================================================================
// Short-clause filtering
// =============================================================================

#[tokio::test]
async fn test_short_clauses_never_reach_analyzer() {
    let analyzer = ScriptedAnalyzer::new(|clause: &str| scored(clause, 5.0));
    let pipeline = Pipeline::new(analyzer.clone());

    let analysis = pipeline
        .analyze_text("Void. Section 1. The Supplier shall bear unlimited liability for all losses.")
        .await;

    assert_eq!(analysis.clauses.len(), 1);
    assert!(analysis.clauses[0].clause.starts_with("The Supplier"));
    for call in analyzer.calls() {
        assert!(call.chars().count() > 20, "short clause analyzed: {call}");
    }
}

#[tokio::test]
async fn test_only_short_clauses_gives_zero_risk() {
    let analyzer = ScriptedAnalyzer::new(|clause: &str| scored(clause, 5.0));
    let pipeline = Pipeline::new(analyzer.clone());

    let analysis = pipeline.analyze_text("Void. Null. See above.").await;

    assert!(analysis.clauses.is_empty());
    assert_eq!(analysis.overall_risk, 0.0);
    assert!(analyzer.calls().is_empty());
}

// =============================================================================
// Partial-failure isolation
// =============================================================================

const THREE_CLAUSES: &str = "The Supplier shall deliver the goods on time. \
    The Customer shall pay every invoice within thirty days. \
    Either party may terminate this agreement with notice.";

#[tokio::test]
#[traced_test]
async fn test_erroring_clause_is_dropped() {
    let analyzer = ScriptedAnalyzer::new(|clause: &str| {
        if clause.contains("invoice") {
            bail!("adapter blew up")
        }
        scored(clause, 2.0)
    });
    let pipeline = Pipeline::new(analyzer.clone());

    let analysis = pipeline.analyze_text(THREE_CLAUSES).await;

    assert_eq!(analysis.clauses.len(), 2);
    assert!(analysis.clauses[0].clause.contains("deliver"));
    assert!(analysis.clauses[1].clause.contains("terminate"));
    assert_eq!(analysis.overall_risk, 2.0);
    assert_eq!(analyzer.calls().len(), 3);
    assert!(logs_contain("dropping clause"));
}

#[tokio::test]
async fn test_panicking_clause_is_dropped() {
    let analyzer = ScriptedAnalyzer::new(|clause: &str| {
        if clause.contains("invoice") {
            panic!("adapter panicked");
        }
        scored(clause, 3.0)
    });
    let pipeline = Pipeline::new(analyzer.clone()).with_max_concurrency(2);

    let analysis = pipeline.analyze_text(THREE_CLAUSES).await;

    assert_eq!(analysis.clauses.len(), 2);
    assert!(analysis.clauses[0].clause.contains("deliver"));
    assert!(analysis.clauses[1].clause.contains("terminate"));
    assert_eq!(analysis.overall_risk, 3.0);
}

#[tokio::test]
async fn test_error_placeholders_are_kept_and_count_as_zero() {
    let analyzer = ScriptedAnalyzer::new(|clause: &str| {
        if clause.contains("invoice") {
            Ok(ClauseResult::failed(clause, "Error analyzing clause: timed out"))
        } else {
            scored(clause, 3.0)
        }
    });
    let pipeline = Pipeline::new(analyzer.clone());

    let analysis = pipeline.analyze_text(THREE_CLAUSES).await;

    assert_eq!(analysis.clauses.len(), 3);
    assert!(analysis.clauses[1].is_error());
    assert_eq!(analysis.overall_risk, 2.0);
}

// =============================================================================
// Ordering and bounds under concurrent dispatch
// =============================================================================

/// Sleeps longest on the earliest clauses so completion order is reversed,
/// and tracks the peak number of calls in flight.
struct SlowFirstAnalyzer {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl ClauseAnalyzer for SlowFirstAnalyzer {
    async fn analyze(&self, clause: &str) -> Result<ClauseResult> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let n: u64 = clause
            .split_whitespace()
            .nth(1)
            .and_then(|w| w.parse().ok())
            .unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(10 * (8 - n))).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(ClauseResult::new(clause, n as f64, "", "Other", clause))
    }

    fn name(&self) -> &str {
        "slow-first"
    }
}

fn numbered_clauses(count: u64) -> String {
    (0..count)
        .map(|n| format!("Clause {n} imposes an obligation on the supplier."))
        .collect::<Vec<_>>()
        .join(" ")
}

#[tokio::test]
async fn test_concurrent_dispatch_preserves_source_order() {
    let analyzer = Arc::new(SlowFirstAnalyzer {
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let pipeline = Pipeline::new(analyzer.clone()).with_max_concurrency(3);

    let analysis = pipeline.analyze_text(&numbered_clauses(6)).await;

    assert_eq!(analysis.clauses.len(), 6);
    for (i, c) in analysis.clauses.iter().enumerate() {
        assert!(c.clause.starts_with(&format!("Clause {i} ")), "{}", c.clause);
    }
    assert!(analyzer.peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(analysis.overall_risk, 2.5);
}

#[tokio::test]
async fn test_sequential_dispatch_has_one_call_in_flight() {
    let analyzer = Arc::new(SlowFirstAnalyzer {
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let pipeline = Pipeline::new(analyzer.clone());

    let analysis = pipeline.analyze_text(&numbered_clauses(4)).await;

    assert_eq!(analysis.clauses.len(), 4);
    assert_eq!(analyzer.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrency_cap_is_shared_across_documents() {
    let analyzer = Arc::new(SlowFirstAnalyzer {
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let pipeline = Pipeline::new(analyzer.clone()).with_max_concurrency(2);
    let text = numbered_clauses(4);

    let (a, b, c) = tokio::join!(
        pipeline.analyze_text(&text),
        pipeline.analyze_text(&text),
        pipeline.analyze_text(&text),
    );

    for analysis in [a, b, c] {
        assert_eq!(analysis.clauses.len(), 4);
        for (i, clause) in analysis.clauses.iter().enumerate() {
            assert!(clause.clause.starts_with(&format!("Clause {i} ")));
        }
    }
    assert!(analyzer.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_out_of_range_scores_are_bounded() {
    struct Wild;

    #[async_trait]
    impl ClauseAnalyzer for Wild {
        async fn analyze(&self, clause: &str) -> Result<ClauseResult> {
            Ok(ClauseResult {
                clause: clause.to_string(),
                risk_score: if clause.contains("deliver") { 42.0 } else { -3.0 },
                explanation: String::new(),
                clause_type: "Other".into(),
                safer_version: clause.to_string(),
            })
        }

        fn name(&self) -> &str {
            "wild"
        }
    }

    let pipeline = Pipeline::new(Arc::new(Wild));
    let analysis = pipeline.analyze_text(THREE_CLAUSES).await;

    for c in &analysis.clauses {
        assert!((0.0..=MAX_RISK_SCORE).contains(&c.risk_score));
    }
    assert!((0.0..=MAX_RISK_SCORE).contains(&analysis.overall_risk));
    assert_eq!(analysis.clauses[0].risk_score, 5.0);
}

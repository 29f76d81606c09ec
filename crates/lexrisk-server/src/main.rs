mod logging;
mod routes;

use std::sync::Arc;

use anyhow::Context;
use lexrisk_agent::{KeywordAnalyzer, OpenRouterAnalyzer, Tolerance};
use lexrisk_core::{analyzer::ClauseAnalyzer, config::Config, pipeline::Pipeline};
use tracing::{info, warn};

use crate::routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    logging::init(&config);

    let analyzer = build_analyzer(&config)?;
    let pipeline = Pipeline::new(analyzer).with_max_concurrency(config.analyzer_max_concurrency);
    info!(
        project = %config.project_name,
        backend = pipeline.analyzer.name(),
        max_concurrency = pipeline.max_concurrency,
        suffixes = ?pipeline.extractors.suffixes(),
        "pipeline ready"
    );

    let addr = config.bind_addr();
    let prefix = config.api_prefix.clone();
    let app = routes::router(Arc::new(AppState { pipeline, config }));

    info!("Listening on {addr} (API prefix {prefix})");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_analyzer(config: &Config) -> anyhow::Result<Arc<dyn ClauseAnalyzer>> {
    match config.backend.as_str() {
        "keyword" => {
            let tolerance: Tolerance = config.keyword_tolerance.parse()?;
            warn!(?tolerance, "using offline keyword backend; scores are heuristic");
            Ok(Arc::new(KeywordAnalyzer::new(tolerance)?))
        }
        _ => Ok(Arc::new(OpenRouterAnalyzer::from_config(config)?)),
    }
}

//! `dataforge serve`: starts the Control API plus an in-process worker pool
//! (§4.2's default deployment shape — one process, several worker loops,
//! sharing a local job queue).

use std::sync::Arc;

use console::style;

use crate::analysis::DeterministicClusterer;
use crate::config::Settings;
use crate::knowledge::DeterministicEmbedder;
use crate::llm::{ModelClient, OllamaModelClient};
use crate::pipeline::PipelineConfig;
use crate::repository::DieselTaskStore;
use crate::worker::{InProcessQueue, JobQueue, WorkerContext};

/// Start the Control API and `workers` (default: `settings.max_workers`)
/// in-process worker loops sharing one job queue.
pub async fn cmd_serve(settings: &Settings, bind: &str, workers: Option<usize>) -> anyhow::Result<()> {
    let (host, port) = parse_bind_address(bind)?;

    println!("{} Running database migrations...", style("->").cyan());
    let task_store: Arc<DieselTaskStore> = Arc::new(DieselTaskStore::from_url(&settings.database_url)?);
    task_store.init_schema().await?;
    println!("  {} Database ready", style("OK").green());

    let job_queue: Arc<dyn JobQueue> = Arc::new(InProcessQueue::new(256));
    let model_client: Arc<dyn ModelClient> = Arc::new(OllamaModelClient::new(settings.model.clone()));
    let embedder = Arc::new(DeterministicEmbedder::default());

    let pipeline_config = PipelineConfig {
        batch_size: settings.batch_size,
        retry_limit: settings.task_retry_limit,
        self_correction_enabled: settings.rag_enable_self_correction,
        save_reports: false,
        rag_confidence_threshold: settings.rag_confidence_threshold as f64,
        rag_retrieval_top_k: settings.rag_retrieval_top_k,
    };

    let worker_count = workers.unwrap_or(settings.max_workers).max(1);
    for i in 0..worker_count {
        let ctx = Arc::new(WorkerContext::new(
            task_store.clone(),
            embedder.clone(),
            model_client.clone(),
            pipeline_config.clone(),
        ));
        let queue = job_queue.clone();
        tokio::spawn(async move {
            tracing::info!(worker = i, "worker loop started");
            crate::worker::run_worker_loop(ctx, queue).await;
        });
    }
    println!("  {} {worker_count} worker loop(s) started", style("OK").green());

    let state = crate::server::AppState {
        task_store,
        job_queue,
        embedder,
        clusterer: Arc::new(DeterministicClusterer::default()),
        model_client,
        pipeline_config,
    };

    println!("{} Starting dataforge Control API at http://{}:{}", style("->").cyan(), host, port);
    println!("  Press Ctrl+C to stop");

    crate::server::serve(state, &host, port).await
}

/// Parse a bind address that can be:
/// - Just a port: "3030" -> 127.0.0.1:3030
/// - Just a host: "0.0.0.0" -> 0.0.0.0:3030
/// - Host and port: "0.0.0.0:3030" -> 0.0.0.0:3030
fn parse_bind_address(bind: &str) -> anyhow::Result<(String, u16)> {
    if let Ok(port) = bind.parse::<u16>() {
        return Ok(("127.0.0.1".to_string(), port));
    }
    if let Some((host, port_str)) = bind.rsplit_once(':') {
        if let Ok(port) = port_str.parse::<u16>() {
            return Ok((host.to_string(), port));
        }
    }
    Ok((bind.to_string(), 3030))
}

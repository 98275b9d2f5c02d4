use std::env;
use std::sync::Arc;
use std::time::Duration;

use ehrflow_db_memory::InMemoryConversationStore;
use ehrflow_inbound::InboundHandler;
use ehrflow_server::clients::{GpcRecordClient, MhsTransportClient};
use ehrflow_server::config::loader::load_config;
use ehrflow_server::templates::XmlTemplateRenderer;
use ehrflow_server::xpath::TagPathCursor;
use ehrflow_server::{AckTimeoutReconciler, AppState, build_router, serve};
use ehrflow_storage::ConversationStore;
use ehrflow_tasks::{
    InMemoryObjectStore, InMemoryQueue, TaskConsumer, TaskDispatcher, TaskExecutors,
};

#[tokio::main]
async fn main() {
    // Load .env if present; optional for local development.
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    ehrflow_server::observability::init_tracing();

    let config_path = env::args()
        .skip_while(|a| a != "--config")
        .nth(1)
        .or_else(|| env::var("EHRFLOW_CONFIG").ok());
    let cfg = match load_config(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    ehrflow_server::observability::apply_logging_level(&cfg.logging.level);

    let store: Arc<dyn ConversationStore> = Arc::new(InMemoryConversationStore::new());
    tracing::info!(backend = store.backend_name(), "conversation store initialized");

    let queue = Arc::new(InMemoryQueue::new());
    let dispatcher = TaskDispatcher::new(queue.clone());
    let executors = Arc::new(TaskExecutors::new(
        store.clone(),
        Arc::new(GpcRecordClient::new(cfg.gpc.base_url.clone())),
        Arc::new(MhsTransportClient::new(cfg.mhs.base_url.clone())),
        Arc::new(InMemoryObjectStore::new()),
        Arc::new(XmlTemplateRenderer::new()),
        dispatcher.clone(),
        cfg.transfer.large_attachment_threshold,
    ));

    for worker in 0..cfg.transfer.worker_count {
        let consumer = TaskConsumer::new(queue.clone(), store.clone(), executors.clone());
        tokio::spawn(async move {
            tracing::debug!(worker, "task worker started");
            consumer.run().await;
        });
    }

    let reconciler = AckTimeoutReconciler::new(
        store.clone(),
        Duration::from_secs(cfg.transfer.ack_timeout_secs),
        Duration::from_secs(cfg.transfer.reconcile_interval_secs),
    );
    tokio::spawn(async move { reconciler.run().await });

    let inbound = Arc::new(InboundHandler::new(
        store.clone(),
        dispatcher.clone(),
        Arc::new(TagPathCursor::new()),
    ));
    let router = build_router(AppState {
        store,
        dispatcher,
        inbound,
    });

    if let Err(err) = serve(router, &cfg.server.host, cfg.server.port).await {
        eprintln!("Server error: {err}");
        std::process::exit(1);
    }
}

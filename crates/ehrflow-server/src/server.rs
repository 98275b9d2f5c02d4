use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;
use tracing::info;

use ehrflow_inbound::InboundHandler;
use ehrflow_storage::ConversationStore;
use ehrflow_tasks::TaskDispatcher;

use crate::admin;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ConversationStore>,
    pub dispatcher: TaskDispatcher,
    pub inbound: Arc<InboundHandler>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(admin::healthcheck))
        .route("/resend/{conversation_id}", post(admin::resend))
        .route("/inbound", post(admin::inbound))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(router: Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "HTTP server listening");
    axum::serve(listener, router).await?;
    Ok(())
}

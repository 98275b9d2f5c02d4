//! EHRFlow service wiring: configuration, observability, outbound clients,
//! the HTTP surface, the task workers and the ack-timeout reconciler.

pub mod admin;
pub mod clients;
pub mod config;
pub mod observability;
pub mod reconcile;
pub mod server;
pub mod templates;
pub mod xpath;

pub use config::AppConfig;
pub use reconcile::AckTimeoutReconciler;
pub use server::{AppState, build_router, serve};

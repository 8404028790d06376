use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use crate::engine::TableConfig;
use crate::external::{AllowList, EarningsStore};
use crate::hub::HubConfig;

use super::identity::IdentityVerifier;
use super::routes::{build_router, ServerContext};

const LOG_TARGET: &str = "server::bootstrap";

pub struct ServerConfig {
    pub bind: SocketAddr,
    pub table: TableConfig,
    pub hub: HubConfig,
    pub allow_list: Arc<dyn AllowList>,
    pub earnings: Arc<dyn EarningsStore>,
    pub identity: Arc<dyn IdentityVerifier>,
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    let context = ServerContext::new(
        config.table,
        config.hub,
        config.allow_list,
        config.earnings,
        config.identity,
    );
    let router = build_router(context);
    let make_service = router.into_make_service();

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    let local_addr = listener.local_addr()?;
    info!(target: LOG_TARGET, %local_addr, "nlhe table server listening");

    axum::serve(listener, make_service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(target: LOG_TARGET, %err, "failed to install ctrl-c handler");
        return;
    }
    info!(target: LOG_TARGET, "shutdown signal received");
}

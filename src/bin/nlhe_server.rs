use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use nlhe_table::config::Args;
use nlhe_table::external::{
    AllowList, EarningsStore, LocalAllowList, LocalEarningsStore, RemoteAllowList,
    RemoteEarningsStore,
};
use nlhe_table::server::{run_server, PassThroughVerifier, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let args = Args::parse();
    init_tracing(args.json)?;

    let (allow_list, earnings): (Arc<dyn AllowList>, Arc<dyn EarningsStore>) =
        if Args::is_managed_deployment() {
            (Arc::new(RemoteAllowList), Arc::new(RemoteEarningsStore))
        } else {
            (
                Arc::new(LocalAllowList::new(args.allowlist_path.clone())),
                Arc::new(LocalEarningsStore::new(args.earnings_path.clone())),
            )
        };

    let config = ServerConfig {
        bind: args.bind,
        table: args.table_config(),
        hub: args.hub_config(),
        allow_list,
        earnings,
        identity: Arc::new(PassThroughVerifier),
    };

    run_server(config).await.context("server exited with error")
}

fn load_dotenv() {
    let manifest_env_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(".env");
    dotenv::from_filename(manifest_env_path).ok();
    dotenv::dotenv().ok();
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::fmt().with_env_filter(filter).with_target(false);

    if json {
        builder.json().flatten_event(true).init();
    } else {
        builder.compact().init();
    }

    Ok(())
}

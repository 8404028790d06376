use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::engine::{CashoutPolicy, TableConfig};
use crate::hub::HubConfig;

const DEFAULT_BIND: &str = "127.0.0.1:4000";
const DEFAULT_ALLOWLIST_PATH: &str = "data/allowlist.json";
const DEFAULT_EARNINGS_PATH: &str = "data/earnings.json";

/// Command-line / environment configuration for the table server.
#[derive(Debug, Parser)]
#[command(name = "nlhe_server")]
#[command(about = "Launch the no-limit hold'em table server", long_about = None)]
pub struct Args {
    /// Address to bind the HTTP server to (host:port)
    #[arg(long, env = "SERVER_BIND", default_value = DEFAULT_BIND)]
    pub bind: SocketAddr,

    /// Toggle structured (JSON) logs
    #[arg(long, env = "SERVER_LOG_JSON", default_value_t = false)]
    pub json: bool,

    /// Path to the local allow-list JSON file
    #[arg(long, env = "ALLOWLIST_PATH", default_value = DEFAULT_ALLOWLIST_PATH)]
    pub allowlist_path: PathBuf,

    /// Path to the local earnings ledger JSON file
    #[arg(long, env = "EARNINGS_PATH", default_value = DEFAULT_EARNINGS_PATH)]
    pub earnings_path: PathBuf,

    #[arg(long, env = "TABLE_SMALL_BLIND", default_value_t = 1)]
    pub small_blind: u64,

    #[arg(long, env = "TABLE_BIG_BLIND", default_value_t = 3)]
    pub big_blind: u64,

    #[arg(long, env = "TABLE_MAX_PLAYERS", default_value_t = 6)]
    pub max_players: u8,

    #[arg(long, env = "TABLE_BUY_IN_BB", default_value_t = 100)]
    pub buy_in_bb: u64,

    #[arg(long, env = "TABLE_AUTO_TOPUP", default_value_t = 300)]
    pub auto_topup_amount: u64,

    /// Enable the opt-in auto-cashout policy
    #[arg(long, env = "TABLE_CASHOUT_ENABLED", default_value_t = false)]
    pub cashout_enabled: bool,

    #[arg(long, env = "TABLE_CASHOUT_THRESHOLD_BB")]
    pub cashout_threshold_bb: Option<u32>,

    #[arg(long, env = "TABLE_CASHOUT_TARGET_BB")]
    pub cashout_target_bb: Option<u32>,

    #[arg(long, env = "HUB_LEAVE_GRACE_SECS", default_value_t = 30)]
    pub leave_grace_secs: u64,

    #[arg(long, env = "HUB_GAUGE_TIMEOUT_SECS", default_value_t = 30)]
    pub gauge_timeout_secs: u64,

    #[arg(long, env = "HUB_RUNOUT_DELAY_MS", default_value_t = 1600)]
    pub runout_delay_ms: u64,

    #[arg(long, env = "HUB_HAND_DELAY_MS", default_value_t = 1000)]
    pub hand_delay_ms: u64,
}

impl Args {
    pub fn table_config(&self) -> TableConfig {
        let big_blind = self.big_blind;
        TableConfig {
            small_blind: self.small_blind,
            big_blind,
            max_players: self.max_players,
            buy_in: big_blind * self.buy_in_bb,
            auto_topup_amount: self.auto_topup_amount,
            cashout: CashoutPolicy {
                enabled: self.cashout_enabled,
                threshold_bb: self.cashout_threshold_bb,
                cashout_bb: self.cashout_target_bb,
            },
        }
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            leave_grace: Duration::from_secs(self.leave_grace_secs),
            gauge_timeout: Duration::from_secs(self.gauge_timeout_secs),
            runout_delay: Duration::from_millis(self.runout_delay_ms),
            hand_delay: Duration::from_millis(self.hand_delay_ms),
        }
    }

    /// True when running on a managed platform (e.g. Cloud Run), detected via
    /// the same marker env vars the original deployment used to pick a
    /// remote-backed allow list / earnings store over local JSON files.
    pub fn is_managed_deployment() -> bool {
        std::env::var("K_SERVICE").is_ok() || std::env::var("K_REVISION").is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_config_derives_buy_in_from_big_blind() {
        let args = Args::parse_from([
            "nlhe_server",
            "--big-blind",
            "5",
            "--buy-in-bb",
            "100",
        ]);
        let config = args.table_config();
        assert_eq!(config.big_blind, 5);
        assert_eq!(config.buy_in, 500);
    }
}

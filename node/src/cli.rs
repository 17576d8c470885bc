use std::time::Duration;

use lyra2_primitives::BLOCK_TIME_MS;
use sc_consensus_lyra2::{Lyra2Config, MinerConfig, DEFAULT_WORK_HISTORY};

use crate::service::NodeConfig;

#[derive(Debug, clap::Parser)]
#[command(name = "lyra2-node", version, about = "LYRA2 development node")]
pub struct Cli {
    /// Local mining threads (0 disables the local miner)
    #[arg(long, default_value_t = 1)]
    pub threads: usize,

    /// Do not serve the remote mining API
    #[arg(long)]
    pub no_remote: bool,

    /// Recent work packages that still accept solutions
    #[arg(long, default_value_t = DEFAULT_WORK_HISTORY)]
    pub work_history: usize,

    /// Seconds a remote hash rate report stays valid without refresh
    #[arg(long, default_value_t = 10)]
    pub hashrate_expiry: u64,

    /// Template refresh interval in milliseconds
    #[arg(long, default_value_t = BLOCK_TIME_MS)]
    pub block_time_ms: u64,

    /// Fixed mining difficulty
    #[arg(long, default_value_t = 1_000_000)]
    pub difficulty: u64,

    /// Seconds between status reports
    #[arg(long, default_value_t = 10)]
    pub report_interval: u64,
}

impl Cli {
    pub fn node_config(&self) -> NodeConfig {
        NodeConfig {
            engine: Lyra2Config {
                remote: !self.no_remote,
                work_history: self.work_history,
                hashrate_expiry: Duration::from_secs(self.hashrate_expiry),
                ..Default::default()
            },
            miner: MinerConfig { threads: self.threads },
            difficulty: self.difficulty as u128,
            block_time: Duration::from_millis(self.block_time_ms.max(1)),
            report_interval: Duration::from_secs(self.report_interval.max(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["lyra2-node"]).unwrap();
        let config = cli.node_config();
        assert!(config.engine.remote);
        assert_eq!(config.engine.work_history, 2);
        assert_eq!(config.engine.hashrate_expiry, Duration::from_secs(10));
        assert_eq!(config.miner.threads, 1);
        assert_eq!(config.block_time, Duration::from_millis(BLOCK_TIME_MS));
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "lyra2-node",
            "--threads",
            "0",
            "--no-remote",
            "--work-history",
            "4",
            "--hashrate-expiry",
            "30",
            "--block-time-ms",
            "0",
            "--difficulty",
            "64",
        ])
        .unwrap();
        let config = cli.node_config();
        assert!(!config.engine.remote);
        assert_eq!(config.engine.work_history, 4);
        assert_eq!(config.engine.hashrate_expiry, Duration::from_secs(30));
        assert_eq!(config.miner.threads, 0);
        assert_eq!(config.difficulty, 64);
        // zero would stall the ticker
        assert_eq!(config.block_time, Duration::from_millis(1));
    }
}

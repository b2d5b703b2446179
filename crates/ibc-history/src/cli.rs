use std::path::PathBuf;

use clap::Parser;

/// ibc-history: tracks multi-hop IBC transfers across Cosmos chains and
/// serves their progress over a local REST API.
#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// JSON file listing chains: `[{"chain_id", "rpc", "bech32_prefix"}]`.
    #[arg(long, env = "IBC_HISTORY_CHAINS")]
    pub chains: PathBuf,

    /// Directory for persisted history. If omitted, history is in-memory only.
    #[arg(long, env = "IBC_HISTORY_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Address to bind the web server to.
    #[arg(long, default_value = "127.0.0.1", env = "IBC_HISTORY_BIND")]
    pub bind: String,

    /// Port to listen on.
    #[arg(long, default_value = "3090", env = "IBC_HISTORY_PORT")]
    pub port: u16,

    /// Delay between chain RPC polls while waiting for a tx or packet.
    #[arg(long, default_value = "2000", env = "IBC_HISTORY_POLL_INTERVAL_MS")]
    pub poll_interval_ms: u64,

    /// Cap on outbound chain RPC requests per second (unlimited if omitted).
    #[arg(long, env = "IBC_HISTORY_REQUESTS_PER_SECOND")]
    pub requests_per_second: Option<u32>,

    /// Seconds between re-drives of stalled transfers. 0 disables.
    #[arg(long, default_value = "60", env = "IBC_HISTORY_RESWEEP_SECS")]
    pub resweep_secs: u64,
}

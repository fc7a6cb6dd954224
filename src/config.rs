use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use log::warn;

use crate::blockchain::{DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD, MAX_TXS_PER_BLOCK};
use crate::transaction::DEFAULT_MAX_POOL_SIZE;

/// Node settings, read from the environment (a `.env` file is loaded by `main`).
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub host: String,
    /// HTTP facade port.
    pub port: u16,
    /// Peer protocol port. The node id is `host:p2p_port`.
    pub p2p_port: u16,
    pub difficulty: u32,
    pub mining_reward: f64,
    pub max_pool_size: usize,
    pub max_txs_per_block: usize,
    pub data_dir: PathBuf,
    /// Bootstrap peers as `(host, port)`.
    pub peers: Vec<(String, u16)>,
    pub maintenance_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            p2p_port: 6000,
            difficulty: DEFAULT_DIFFICULTY,
            mining_reward: DEFAULT_MINING_REWARD,
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            max_txs_per_block: MAX_TXS_PER_BLOCK,
            data_dir: PathBuf::from("data"),
            peers: Vec::new(),
            maintenance_interval: Duration::from_secs(30),
        }
    }
}

impl NodeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Missing keys keep their default;
    /// unparsable ones are reported and also keep their default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(d.host),
            port: parse_or(&lookup, "PORT", d.port),
            p2p_port: parse_or(&lookup, "P2P_PORT", d.p2p_port),
            difficulty: parse_or(&lookup, "DIFFICULTY", d.difficulty),
            mining_reward: parse_or(&lookup, "MINING_REWARD", d.mining_reward),
            max_pool_size: parse_or(&lookup, "MAX_POOL_SIZE", d.max_pool_size),
            max_txs_per_block: parse_or(&lookup, "MAX_TXS_PER_BLOCK", d.max_txs_per_block),
            data_dir: lookup("DATA_DIR").map(PathBuf::from).unwrap_or(d.data_dir),
            peers: lookup("PEERS")
                .map(|raw| parse_peers(&raw))
                .unwrap_or_default(),
            maintenance_interval: Duration::from_secs(parse_or(
                &lookup,
                "MAINTENANCE_INTERVAL_SECS",
                d.maintenance_interval.as_secs(),
            )),
        }
    }

    /// Identity announced to peers as `sender_id`.
    pub fn node_id(&self) -> String {
        format!("{}:{}", self.host, self.p2p_port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("CONFIG - invalid value {:?} for {}, using default", raw, key);
            default
        }),
        None => default,
    }
}

/// Parse `host:port` into its parts.
pub fn parse_peer_addr(raw: &str) -> Option<(String, u16)> {
    let (host, port) = raw.trim().rsplit_once(':')?;
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port.parse().ok()?))
}

/// Parse a comma separated `host:port` list, skipping malformed entries.
pub fn parse_peers(raw: &str) -> Vec<(String, u16)> {
    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .filter_map(|s| {
            let parsed = parse_peer_addr(s);
            if parsed.is_none() {
                warn!("CONFIG - ignoring malformed peer address {:?}", s);
            }
            parsed
        })
        .collect()
}

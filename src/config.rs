//! Top-level node configuration.
//!
//! This module aggregates configuration for:
//!
//! - consensus tuning (`consensus::ConsensusConfig`),
//! - persistent storage (`store::RocksDbConfig`),
//! - the P2P network surface (listen port, bootnodes, network id),
//! - the Prometheus metrics exporter.
//!
//! `NodeConfig::from_cli` builds the aggregate from the CLI surface in
//! spec.md §6 (`--datadir`, `--network`, `--port`, `--bootnodes`).

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::consensus::ConsensusConfig;
use crate::store::RocksDbConfig;

/// Network to join, per spec.md §6.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum Network {
    Main,
    Test,
    Dev,
}

impl Network {
    /// Stable network id embedded in the handshake body (spec.md §6).
    pub fn id(self) -> u32 {
        match self {
            Network::Main => 1,
            Network::Test => 2,
            Network::Dev => 3,
        }
    }
}

/// Network-surface configuration: listen port, bootstrap peers, and the
/// network id sent in the handshake (spec.md §4.7, §6).
#[derive(Clone, Debug)]
pub struct NetworkConfig {
    pub network: Network,
    pub listen_port: u16,
    pub bootnodes: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            network: Network::Main,
            listen_port: 8001,
            bootnodes: Vec::new(),
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        let addr: SocketAddr = "127.0.0.1:9898"
            .parse()
            .expect("hard-coded metrics listen address should parse");
        MetricsConfig {
            enabled: true,
            listen_addr: addr,
        }
    }
}

/// Top-level configuration for a node: aggregates every sub-config a
/// running node needs, composed from a single parsed CLI invocation.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub datadir: PathBuf,
    pub consensus: ConsensusConfig,
    pub storage: RocksDbConfig,
    pub network: NetworkConfig,
    pub metrics: MetricsConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let datadir = PathBuf::from("./xdagj-data");
        NodeConfig {
            storage: RocksDbConfig {
                path: datadir.join("db").to_string_lossy().into_owned(),
                create_if_missing: true,
            },
            datadir,
            consensus: ConsensusConfig::default(),
            network: NetworkConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// The CLI surface from spec.md §6.
#[derive(Parser, Debug)]
#[command(name = "xdagj-core", version, about = "Xdag DAG consensus node")]
pub struct Cli {
    /// Directory holding the block store and node metadata.
    #[arg(long, value_name = "PATH")]
    pub datadir: Option<PathBuf>,

    /// Network to join.
    #[arg(long, value_enum, default_value = "main")]
    pub network: Network,

    /// P2P listen port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Comma-separated `host:port` bootstrap peers.
    #[arg(long, value_delimiter = ',')]
    pub bootnodes: Vec<String>,
}

/// Error building a [`NodeConfig`] from parsed CLI arguments. Invalid
/// configuration is an exit-code-1 condition at boot (spec.md §6).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid bootnode address {0:?}")]
    InvalidBootnode(String),
}

impl NodeConfig {
    /// Builds the aggregate config from a parsed [`Cli`] invocation.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        for addr in &cli.bootnodes {
            if addr.rsplit_once(':').is_none() {
                return Err(ConfigError::InvalidBootnode(addr.clone()));
            }
        }

        let datadir = cli.datadir.unwrap_or_else(|| PathBuf::from("./xdagj-data"));
        let storage = RocksDbConfig {
            path: datadir.join("db").to_string_lossy().into_owned(),
            create_if_missing: true,
        };
        let network = NetworkConfig {
            network: cli.network,
            listen_port: cli.port.unwrap_or(8001),
            bootnodes: cli.bootnodes,
        };

        Ok(NodeConfig {
            datadir,
            consensus: ConsensusConfig::default(),
            storage,
            network,
            metrics: MetricsConfig::default(),
        })
    }
}

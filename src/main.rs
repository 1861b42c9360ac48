#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! kadnet node entrypoint (systemd-friendly).
//! Loads configuration, loads or creates the local identity, and keeps
//! the node loop alive.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use kadnet::config::NodeConfig;
use kadnet::identity::LocalNode;
use kadnet::metrics::Metrics;
use kadnet::node::{InMemoryTransport, Node};

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .compact()
        .try_init();

    let config_path = env("KADNET_CONFIG", "./node.toml");
    let config = match NodeConfig::load(Path::new(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config at {config_path}: {e}");
            std::process::exit(1);
        }
    };

    let key_path = PathBuf::from(&config.node.data_dir).join("node.key");
    let local = match LocalNode::load_or_create(&key_path) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("failed to load or create node identity: {e}");
            std::process::exit(1);
        }
    };

    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(_) => {
            eprintln!("metrics init failed");
            std::process::exit(1);
        }
    };

    let git_sha = option_env!("VERGEN_GIT_SHA").unwrap_or("unknown");
    info!(
        node = %local.id(),
        data_dir = %config.node.data_dir,
        version = env!("CARGO_PKG_VERSION"),
        git_sha,
        "kadnet node starting"
    );

    // A real deployment binds `config.transport.listen_addr` and feeds
    // inbound datagrams into this channel after de-framing them; the
    // binding itself is the embedder's concern and out of scope here.
    let _listen_addr: SocketAddr = match config.transport.listen_addr.parse() {
        Ok(addr) => addr,
        Err(_) => {
            warn!(addr = %config.transport.listen_addr, "invalid listen_addr; continuing unbound");
            "0.0.0.0:0".parse().unwrap()
        }
    };

    let transport = Arc::new(InMemoryTransport::new());
    let node = Arc::new(Node::new(local, config.routing, metrics, transport));
    let (_inbound_tx, inbound_rx) = mpsc::channel(1024);

    node.run(inbound_rx).await;
    warn!("node loop exited");
}

//! peercache node
//!
//! Runs one cache node: a demo group backed by a small in-memory table, the
//! HTTP peer pool over the configured peer set, and the peer server.
//!
//! ```text
//! peercache --addr 0.0.0.0:8001 --self-url http://10.0.0.1:8001 \
//!     --peers http://10.0.0.1:8001,http://10.0.0.2:8001,http://10.0.0.3:8001
//! ```

use clap::Parser;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use peercache::{
    CacheServer, Error, GetterFn, GetterRef, GroupRegistry, HttpPool, PoolConfig, Result,
    ServerConfig,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// peercache - Distributed in-process key-value cache node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Peer server bind address
    #[arg(long, env = "PEERCACHE_ADDR", default_value = "0.0.0.0:8001")]
    addr: String,

    /// URL other peers use to reach this node
    #[arg(long, env = "PEERCACHE_SELF_URL", default_value = "http://127.0.0.1:8001")]
    self_url: String,

    /// Comma-separated peer URLs, including this node
    #[arg(long, env = "PEERCACHE_PEERS", value_delimiter = ',')]
    peers: Vec<String>,

    /// Name of the demo group
    #[arg(long, env = "PEERCACHE_GROUP", default_value = "scores")]
    group: String,

    /// Cache capacity of the demo group in bytes (0 = unbounded)
    #[arg(long, env = "PEERCACHE_CACHE_BYTES", default_value = "2048")]
    cache_bytes: u64,

    /// Virtual nodes per peer on the hash ring
    #[arg(long, env = "PEERCACHE_REPLICAS", default_value = "50")]
    replicas: usize,

    /// Peer request timeout in seconds
    #[arg(long, env = "PEERCACHE_PEER_TIMEOUT", default_value = "5")]
    peer_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting peercache node");
    info!("  Version: {}", peercache::VERSION);
    info!("  Bind address: {}", args.addr);
    info!("  Self URL: {}", args.self_url);
    info!("  Group: {} ({} bytes)", args.group, args.cache_bytes);

    let registry = GroupRegistry::new();
    let group = registry.new_group(&args.group, args.cache_bytes, demo_getter())?;

    let pool_config = PoolConfig {
        replicas: args.replicas,
        request_timeout_secs: args.peer_timeout_secs,
        ..Default::default()
    };
    let server_config = ServerConfig {
        bind_addr: args
            .addr
            .parse()
            .map_err(|e| Error::Configuration(format!("Invalid bind address: {}", e)))?,
        base_path: pool_config.base_path.clone(),
    };

    let pool = HttpPool::new(args.self_url.clone(), pool_config)?;
    if args.peers.is_empty() {
        info!("No peers configured, serving all keys locally");
    } else {
        pool.set(&args.peers);
    }
    group.register_peers(pool)?;

    let server = Arc::new(CacheServer::new(server_config, registry.clone()));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt, shutting down");
            signal_server.shutdown();
        }
    });

    server.run().await?;

    info!("Node shutdown complete");
    Ok(())
}

/// Data source the demo group reads through
fn demo_getter() -> GetterRef {
    let table: Arc<HashMap<&'static str, &'static str>> =
        Arc::new([("Tom", "630"), ("Jack", "589"), ("Sam", "567")].into_iter().collect());

    Arc::new(GetterFn::new(move |key: String| {
        let table = table.clone();
        async move {
            info!(key = %key, "Loading from data source");
            match table.get(key.as_str()) {
                Some(value) => Ok(value.as_bytes().to_vec()),
                None => Err(anyhow::anyhow!("{} not exist", key)),
            }
        }
    }))
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn", "tower_http=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

//! # Storage Node Process Entry Point
//!
//! The only process-level surface in scope (§6 Process entry point): boots
//! a single storage node, runs bootstrap against a master if one is given,
//! and serves the `StorageServer.*` RPC surface until terminated.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rand::Rng;

use shardkv_common::types::{LeaseConfig, NodeDescriptor};
use shardkv_engine::bootstrap::join_cluster;
use shardkv_engine::node::StorageNode;
use shardkv_server::{Metrics, MetricsHandler};

#[derive(Parser, Debug)]
#[command(name = "shardkv-server", about = "Sharded KV storage node")]
struct Args {
    /// Port this node listens on for both application and revoke-callback
    /// RPCs.
    #[arg(long, default_value_t = 9090)]
    port: u16,

    /// This node's id. Defaults to a random u32 (§3: chosen at launch).
    #[arg(long)]
    node_id: Option<u32>,

    /// Number of nodes the cluster must reach before bootstrap closes the
    /// ring.
    #[arg(long, default_value_t = 1)]
    cluster_size: u32,

    /// Master's host:port. Absent means this process is the master
    /// (§4.2 Bootstrap).
    #[arg(long)]
    master: Option<String>,

    /// Advertised host:port other nodes and clients dial to reach this
    /// one. Defaults to 127.0.0.1:<port>.
    #[arg(long)]
    advertise: Option<String>,

    #[arg(long, default_value_t = 10)]
    lease_seconds: u32,

    #[arg(long, default_value_t = 2)]
    guard_seconds: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let node_id = args.node_id.unwrap_or_else(|| rand::thread_rng().gen());
    let host_port = args
        .advertise
        .unwrap_or_else(|| format!("127.0.0.1:{}", args.port));

    let descriptor = NodeDescriptor { node_id, host_port: host_port.clone() };
    let config = LeaseConfig {
        lease_seconds: args.lease_seconds,
        guard_seconds: args.guard_seconds,
        ..LeaseConfig::default()
    };

    let node = match &args.master {
        None => {
            tracing::info!(node_id, %host_port, cluster_size = args.cluster_size, "starting as master");
            StorageNode::new_master(descriptor, args.cluster_size, config)
        }
        Some(master_addr) => {
            tracing::info!(node_id, %host_port, master = %master_addr, "starting as slave");
            StorageNode::new_slave(descriptor, args.cluster_size, config)
        }
    };

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port)).await?;
    tracing::info!(port = args.port, "rpc listener bound");

    let metrics = Arc::new(Metrics::new());
    let handler: Arc<dyn shardkv_rpc::Handler> =
        Arc::new(MetricsHandler::new(node.clone(), metrics.clone()));
    let serve_handle = tokio::spawn(async move {
        if let Err(err) = shardkv_rpc::serve(listener, handler).await {
            tracing::error!(error = %err, "rpc listener stopped");
        }
    });

    if let Some(master_addr) = &args.master {
        join_cluster(&node, master_addr).await?;
    }

    let metrics_for_report = metrics.clone();
    let report_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            ticker.tick().await;
            let snapshot = metrics_for_report.snapshot();
            tracing::info!(
                requests = snapshot.requests_total,
                errors = snapshot.errors_total,
                inflight = snapshot.inflight,
                "metrics snapshot"
            );
        }
    });

    tokio::select! {
        _ = serve_handle => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }
    report_handle.abort();

    Ok(())
}

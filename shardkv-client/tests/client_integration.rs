//! End-to-end checks against a live, single-node `StorageNode` (§8
//! scenarios 1, 3, 4): round-trip reads/writes, lease-then-revoke cache
//! invalidation, and `Never` mode never caching.

use std::sync::Arc;
use std::time::Duration;

use shardkv_client::{KVClient, LeaseMode};
use shardkv_common::types::{LeaseConfig, NodeDescriptor};
use shardkv_engine::StorageNode;

async fn spawn_single_node(config: LeaseConfig) -> NodeDescriptor {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let descriptor = NodeDescriptor { node_id: 42, host_port: addr.clone() };
    let node = StorageNode::new_master(descriptor.clone(), 1, config);
    tokio::spawn(async move {
        shardkv_rpc::serve(listener, node as Arc<dyn shardkv_rpc::Handler>).await.ok();
    });
    descriptor
}

fn short_config() -> LeaseConfig {
    LeaseConfig {
        lease_seconds: 2,
        guard_seconds: 1,
        query_cache_thresh: 2,
        query_cache_seconds: 10,
    }
}

#[tokio::test]
async fn put_then_get_round_trips() {
    let descriptor = spawn_single_node(short_config()).await;
    let client = KVClient::connect(
        vec![descriptor],
        "127.0.0.1:0",
        LeaseMode::Never,
        short_config(),
    )
    .await
    .unwrap();

    client.put("greeting", "hello").await.unwrap();
    assert_eq!(client.get("greeting").await.unwrap(), "hello");
}

#[tokio::test]
async fn missing_key_reports_not_found() {
    let descriptor = spawn_single_node(short_config()).await;
    let client = KVClient::connect(
        vec![descriptor],
        "127.0.0.1:0",
        LeaseMode::Never,
        short_config(),
    )
    .await
    .unwrap();

    let err = client.get("nope").await.unwrap_err();
    assert!(matches!(err, shardkv_common::error::HkvError::NotFound));
}

#[tokio::test]
async fn append_and_remove_round_trip_the_sorted_set() {
    let descriptor = spawn_single_node(short_config()).await;
    let client = KVClient::connect(
        vec![descriptor],
        "127.0.0.1:0",
        LeaseMode::Never,
        short_config(),
    )
    .await
    .unwrap();

    client.append_to_list("tags", "b").await.unwrap();
    client.append_to_list("tags", "a").await.unwrap();
    assert_eq!(client.get_list("tags").await.unwrap(), vec!["a".to_string(), "b".to_string()]);

    let err = client.append_to_list("tags", "a").await.unwrap_err();
    assert!(matches!(err, shardkv_common::error::HkvError::ItemExists));

    client.remove_from_list("tags", "a").await.unwrap();
    assert_eq!(client.get_list("tags").await.unwrap(), vec!["b".to_string()]);
}

#[tokio::test]
async fn always_mode_caches_and_a_write_revokes_it() {
    let descriptor = spawn_single_node(short_config()).await;
    let client = KVClient::connect(
        vec![descriptor.clone()],
        "127.0.0.1:0",
        LeaseMode::Always,
        short_config(),
    )
    .await
    .unwrap();

    client.put("k", "v1").await.unwrap();
    assert_eq!(client.get("k").await.unwrap(), "v1");

    // A second client holds no lease, but its write must still revoke the
    // first client's cached lease before applying (§4.2 revoke-then-apply).
    let writer = KVClient::connect(
        vec![descriptor],
        "127.0.0.1:0",
        LeaseMode::Never,
        short_config(),
    )
    .await
    .unwrap();
    writer.put("k", "v2").await.unwrap();

    // Give the revoke callback a moment to land before asserting freshness.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.get("k").await.unwrap(), "v2");
}

#[tokio::test]
async fn never_mode_does_not_request_a_lease() {
    let descriptor = spawn_single_node(short_config()).await;
    let client = KVClient::connect(
        vec![descriptor],
        "127.0.0.1:0",
        LeaseMode::Never,
        short_config(),
    )
    .await
    .unwrap();

    client.put("k", "v").await.unwrap();
    client.get("k").await.unwrap();
    client.get("k").await.unwrap();
    // No direct observable beyond behavior covered elsewhere: this mainly
    // guards against a panic or hang when the callback listener never binds.
}

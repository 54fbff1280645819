#![allow(dead_code)]

use std::sync::Arc;

use k256::ecdsa::SigningKey;
use serde_json::Value;
use sidetree_core::batch::anchor_file::{self, AnchorFileOperations};
use sidetree_core::batch::anchor_string::AnchorString;
use sidetree_core::batch::{chunk_file, map_file, SignedOperationReference};
use sidetree_core::cas::{Cas, MemoryCas};
use sidetree_core::config::{Config, ProtocolParameters, ProtocolVersionConfig, RetryPolicy};
use sidetree_core::ledger::{Ledger, MemoryLedger};
use sidetree_core::operation::builder::{self, CreateRequest};
use sidetree_core::request_handler::{Response, ResponseStatus};
use sidetree_core::store::{MemoryOperationStore, MemoryTransactionStore, MemoryUnresolvableTransactionStore};
use sidetree_core::{Collaborators, Core};

pub const METHOD: &str = "sidetree";

/// Deterministic secp256k1 key; distinct seeds give distinct keys.
pub fn key(seed: u8) -> SigningKey {
    SigningKey::from_slice(&[seed; 32]).unwrap()
}

pub fn did(suffix: &str) -> String {
    format!("did:{}:{}", METHOD, suffix)
}

pub fn versions() -> Vec<ProtocolVersionConfig> {
    vec![ProtocolVersionConfig { start_time: 0, version: "1.0".to_string(), parameters: ProtocolParameters::default() }]
}

/// Retries become due immediately; `attempts` retries before giving up.
pub fn config_with_retries(attempts: u32) -> Config {
    Config {
        unresolvable_retry: RetryPolicy { base_delay_in_seconds: 0, max_retry_attempts: attempts },
        ..Config::default()
    }
}

pub struct TestNode {
    pub core: Core,
    pub ledger: Arc<MemoryLedger>,
    pub cas: Arc<MemoryCas>,
    pub operation_store: Arc<MemoryOperationStore>,
    pub transaction_store: Arc<MemoryTransactionStore>,
    pub unresolvable_store: Arc<MemoryUnresolvableTransactionStore>,
}

pub fn node() -> TestNode {
    node_with(Config::default(), versions())
}

pub fn node_with(config: Config, versions: Vec<ProtocolVersionConfig>) -> TestNode {
    let ledger = Arc::new(MemoryLedger::default());
    let cas = Arc::new(MemoryCas::new());
    let operation_store = Arc::new(MemoryOperationStore::new());
    let transaction_store = Arc::new(MemoryTransactionStore::new());
    let unresolvable_store = Arc::new(MemoryUnresolvableTransactionStore::new());
    let collaborators = Collaborators {
        ledger: ledger.clone(),
        cas: cas.clone(),
        operation_store: operation_store.clone(),
        transaction_store: transaction_store.clone(),
        unresolvable_store: unresolvable_store.clone(),
    };
    let core = Core::new(config, &versions, collaborators).unwrap();
    TestNode { core, ledger, cas, operation_store, transaction_store, unresolvable_store }
}

/// Create request whose recovery key is `key(recovery)` and update key `key(update)`,
/// adding one public key with id `key_id`.
pub fn create(recovery: u8, update: u8, key_id: &str) -> CreateRequest {
    let patches = vec![builder::add_public_key_patch(key_id, &builder::public_jwk(&key(recovery.wrapping_add(100))))];
    builder::create_request(
        &builder::public_jwk(&key(recovery)),
        &builder::public_jwk(&key(update)),
        patches,
        &ProtocolParameters::default(),
    )
    .unwrap()
}

/// Update signed with `key(current)`, committing to `key(next)`, adding key `key_id`.
pub fn update(did_suffix: &str, current: u8, next: u8, key_id: &str) -> Vec<u8> {
    let patches = vec![builder::add_public_key_patch(key_id, &builder::public_jwk(&key(next.wrapping_add(100))))];
    builder::update_request(did_suffix, &key(current), &builder::public_jwk(&key(next)), patches, &ProtocolParameters::default())
        .unwrap()
}

pub fn recover(did_suffix: &str, current: u8, next_recovery: u8, next_update: u8, key_id: &str) -> Vec<u8> {
    let patches = vec![builder::add_public_key_patch(key_id, &builder::public_jwk(&key(next_update.wrapping_add(100))))];
    builder::recover_request(
        did_suffix,
        &key(current),
        &builder::public_jwk(&key(next_recovery)),
        &builder::public_jwk(&key(next_update)),
        patches,
        &ProtocolParameters::default(),
    )
    .unwrap()
}

pub fn deactivate(did_suffix: &str, recovery: u8) -> Vec<u8> {
    builder::deactivate_request(did_suffix, &key(recovery)).unwrap()
}

/// Submits `request`, writes a batch and observes it.
pub async fn submit_and_anchor(node: &TestNode, request: &[u8]) -> Response {
    let response = node.core.handle_operation_request(request).await;
    assert_eq!(response.status, ResponseStatus::Succeeded, "{:?}", response.body);
    assert_eq!(node.core.trigger_batch_writing().await.unwrap(), 1);
    node.core.trigger_process_transactions().await.unwrap();
    response
}

/// Ids of the public keys in a resolution result, without the leading '#'.
pub fn key_ids(resolution: &Value) -> Vec<String> {
    resolution["didDocument"]["publicKey"]
        .as_array()
        .map(|keys| keys.iter().filter_map(|k| k["id"].as_str()).map(|id| id.trim_start_matches('#').to_string()).collect())
        .unwrap_or_default()
}

/// Anchors an update request straight onto the ledger, skipping request validation.
pub async fn anchor_update_directly(node: &TestNode, request: &[u8]) {
    let value: Value = serde_json::from_slice(request).unwrap();
    let field = |name: &str| value[name].as_str().unwrap().to_string();

    let chunk_hash = node.cas.write(chunk_file::build(vec![field("delta")]).unwrap()).await.unwrap();
    let reference = SignedOperationReference { did_suffix: field("did_suffix"), signed_data: field("signed_data") };
    let map_hash = node.cas.write(map_file::build(&chunk_hash, vec![reference]).unwrap()).await.unwrap();
    let anchor = anchor_file::build(&map_hash, AnchorFileOperations::default()).unwrap();
    let anchor_hash = node.cas.write(anchor).await.unwrap();
    node.ledger.write(AnchorString::new(1, anchor_hash).to_string()).await.unwrap();
}

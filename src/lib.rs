//! sidetree_core: ledger-anchored DID operations.
//!
//! Operations are queued, written to content-addressable storage in batches,
//! and anchored on a ledger by a short anchor string. Observers read the ledger
//! back, validate the batch files, and store each operation in ledger order;
//! resolution replays a DID's operations through its commitment chains.
//!
//! # Usage
//! See `src/bin/sidetree_node.rs` for a node wired on in-memory collaborators.

pub mod error;
pub mod config;
pub mod models;
pub mod util {
	pub mod encoder;
	pub mod multihash;
	pub mod canonical;
	pub mod compressor;
	pub mod jwk;
	pub mod jws;
	pub mod deadline;
}
pub mod document;
pub mod operation;
pub mod batch;
pub mod ledger;
pub mod cas;
pub mod store;
pub mod queue;
pub mod download_manager;
pub mod operation_processor;
pub mod batch_writer;
pub mod transaction_processor;
pub mod transaction_selector;
pub mod version_manager;
pub mod scheduler;
pub mod observer;
pub mod resolver;
pub mod request_handler;
pub mod node;

pub use crate::node::{Collaborators, Core};
pub use crate::error::{ErrorCode, ErrorKind, Result, SidetreeError};

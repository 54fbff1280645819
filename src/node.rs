//! Wires the collaborators, protocol versions and background jobs into one node.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::Mutex;
use tracing::info;

use crate::cas::{Cas, MemoryCas};
use crate::config::{Config, ProtocolVersionConfig};
use crate::download_manager::DownloadManager;
use crate::error::Result;
use crate::ledger::{Ledger, MemoryLedger};
use crate::observer::Observer;
use crate::queue::OperationQueue;
use crate::request_handler::{RequestHandler, Response};
use crate::resolver::Resolver;
use crate::scheduler::{BatchScheduler, PeriodicTask};
use crate::store::{
    MemoryOperationStore, MemoryTransactionStore, MemoryUnresolvableTransactionStore, OperationStore,
    TransactionStore, UnresolvableTransactionStore,
};
use crate::version_manager::{VersionContext, VersionManager};

/// External systems the node talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub ledger: Arc<dyn Ledger>,
    pub cas: Arc<dyn Cas>,
    pub operation_store: Arc<dyn OperationStore>,
    pub transaction_store: Arc<dyn TransactionStore>,
    pub unresolvable_store: Arc<dyn UnresolvableTransactionStore>,
}

impl Collaborators {
    pub fn in_memory() -> Self {
        Self {
            ledger: Arc::new(MemoryLedger::default()),
            cas: Arc::new(MemoryCas::new()),
            operation_store: Arc::new(MemoryOperationStore::new()),
            transaction_store: Arc::new(MemoryTransactionStore::new()),
            unresolvable_store: Arc::new(MemoryUnresolvableTransactionStore::new()),
        }
    }
}

pub struct Core {
    config: Config,
    queue: Arc<OperationQueue>,
    versions: Arc<VersionManager>,
    batch_scheduler: Arc<BatchScheduler>,
    observer: Arc<Observer>,
    resolver: Arc<Resolver>,
    request_handler: RequestHandler,
    tasks: Mutex<Vec<PeriodicTask>>,
}

impl Core {
    pub fn new(config: Config, versions: &[ProtocolVersionConfig], collaborators: Collaborators) -> anyhow::Result<Self> {
        config.validate()?;

        // 1. Protocol versions first; nothing runs without them.
        let queue = Arc::new(OperationQueue::new());
        let downloads = Arc::new(DownloadManager::new(
            collaborators.cas.clone(),
            config.max_concurrent_downloads,
            config.cas_fetch_timeout(),
        ));
        let context = VersionContext {
            queue: queue.clone(),
            cas: collaborators.cas.clone(),
            ledger: collaborators.ledger.clone(),
            downloads,
            ledger_timeout: config.ledger_timeout(),
            cas_timeout: config.cas_fetch_timeout(),
        };
        let versions = Arc::new(VersionManager::new(versions, &context).context("loading protocol versions")?);

        // 2. Read side.
        let resolver = Arc::new(Resolver::new(versions.clone(), collaborators.operation_store.clone()));
        let observer = Arc::new(Observer::new(
            versions.clone(),
            collaborators.ledger.clone(),
            collaborators.operation_store.clone(),
            collaborators.transaction_store.clone(),
            collaborators.unresolvable_store.clone(),
            config.unresolvable_retry.clone(),
            config.max_concurrent_downloads,
            config.ledger_timeout(),
        ));

        // 3. Write side.
        let batch_scheduler =
            Arc::new(BatchScheduler::new(versions.clone(), collaborators.ledger.clone(), config.ledger_timeout()));
        let request_handler = RequestHandler::new(
            versions.clone(),
            collaborators.ledger.clone(),
            queue.clone(),
            resolver.clone(),
            config.did_method_name.clone(),
            config.ledger_timeout(),
        );

        Ok(Self {
            config,
            queue,
            versions,
            batch_scheduler,
            observer,
            resolver,
            request_handler,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Starts the periodic batch writer and observer.
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            return;
        }
        tasks.push(PeriodicTask::spawn(
            self.observer.clone(),
            std::time::Duration::from_secs(self.config.observing_interval_in_seconds),
        ));
        tasks.push(PeriodicTask::spawn(
            self.batch_scheduler.clone(),
            std::time::Duration::from_secs(self.config.batching_interval_in_seconds),
        ));
        info!(did_method = %self.config.did_method_name, "node started");
    }

    /// Stops both periodic jobs, waiting for ticks in progress.
    pub async fn close(&self) {
        let tasks: Vec<PeriodicTask> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            task.stop().await;
        }
        info!("node stopped");
    }

    pub async fn trigger_batch_writing(&self) -> Result<usize> {
        self.batch_scheduler.write_batch().await
    }

    pub async fn trigger_process_transactions(&self) -> Result<()> {
        self.observer.process_transactions().await
    }

    pub async fn handle_operation_request(&self, request: &[u8]) -> Response {
        self.request_handler.handle_operation_request(request).await
    }

    pub async fn handle_resolve_request(&self, did: &str) -> Response {
        self.request_handler.handle_resolve_request(did).await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn queue(&self) -> &Arc<OperationQueue> {
        &self.queue
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    pub fn versions(&self) -> &Arc<VersionManager> {
        &self.versions
    }
}

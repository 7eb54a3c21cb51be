//! Services: one broker and worker pool per listening address
//!
//! The root control service serves the `Graph` resource on the well-known
//! port; every graph service owns one `GraphStore` and serves the graph
//! resources on its own port. `ServiceManager` starts and stops graph
//! services.

pub mod broker;
pub mod lifecycle;
pub mod session;
pub mod worker;

pub use lifecycle::ServiceManager;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{info, warn};

use self::broker::Broker;
use self::worker::{spawn_workers, WorkerShared};
use crate::error::Result;
use crate::executor::BatchExecutor;
use crate::graph::GraphStore;
use crate::metrics::Metrics;
use crate::resource::ResourceRegistry;
use crate::value::GraphInfo;

/// Registry key of a graph service
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    pub host: String,
    pub port: u16,
}

impl ServiceKey {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Threads of a running service
struct Runtime {
    broker: Broker,
    workers: Vec<JoinHandle<()>>,
    /// Dropped to tell workers and forwarders to stop
    shutdown: Sender<()>,
}

/// A running broker and worker pool, optionally bound to a graph store
pub struct Service {
    key: ServiceKey,
    local_addr: SocketAddr,
    store: Option<Arc<dyn GraphStore>>,
    metrics: Arc<Metrics>,
    runtime: Mutex<Option<Runtime>>,
}

impl Service {
    /// Bind `key` and start `workers` worker threads serving `registry`.
    pub fn start(
        key: ServiceKey,
        store: Option<Arc<dyn GraphStore>>,
        registry: ResourceRegistry,
        workers: usize,
        slow_batch_ms: u64,
    ) -> Result<Service> {
        let (backend_tx, backend_rx) = crossbeam_channel::unbounded();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);

        let broker = Broker::bind(&key.host, key.port, backend_tx, shutdown_rx.clone())?;
        let local_addr = broker.local_addr();
        let metrics = Arc::new(Metrics::new(slow_batch_ms));

        let shared = Arc::new(WorkerShared {
            executor: BatchExecutor::new(Arc::new(registry)),
            store: store.clone(),
            metrics: Arc::clone(&metrics),
            service: key.to_string(),
        });
        // On failure the broker is dropped, which shuts it down
        let workers = spawn_workers(workers, shared, backend_rx, shutdown_rx)?;

        info!(service = %key, addr = %local_addr, workers = workers.len(), "Service started");
        Ok(Service {
            key,
            local_addr,
            store,
            metrics,
            runtime: Mutex::new(Some(Runtime { broker, workers, shutdown: shutdown_tx })),
        })
    }

    pub fn key(&self) -> &ServiceKey {
        &self.key
    }

    /// Address actually bound (differs from the key when started on port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn store(&self) -> Option<&Arc<dyn GraphStore>> {
        self.store.as_ref()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn is_running(&self) -> bool {
        self.runtime.lock().is_some()
    }

    pub fn info(&self) -> GraphInfo {
        GraphInfo {
            host: self.key.host.clone(),
            port: self.key.port,
            running: self.is_running(),
        }
    }

    /// Close the sockets and join the workers once their current batch is
    /// done. Idempotent.
    pub fn stop(&self) {
        let Some(Runtime { mut broker, workers, shutdown }) = self.runtime.lock().take() else {
            return;
        };
        drop(shutdown);
        broker.shutdown();
        for handle in workers {
            if handle.join().is_err() {
                warn!(service = %self.key, "Worker thread panicked");
            }
        }
        info!(service = %self.key, "Service stopped");
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        self.stop();
    }
}

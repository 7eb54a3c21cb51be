//! Server - the root control service plus the graph services it manages

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::graph::{MemoryStoreFactory, StoreFactory};
use crate::resource::ResourceRegistry;
use crate::service::{Service, ServiceKey, ServiceManager};

pub struct Server {
    services: Arc<ServiceManager>,
    root: Service,
}

impl Server {
    /// Start the root control service with the in-memory store factory,
    /// persistent when `config.data_dir` is set.
    pub fn start(config: Config) -> Result<Server> {
        let factory = Arc::new(MemoryStoreFactory::new(config.data_dir.clone()));
        Self::with_factory(config, factory)
    }

    pub fn with_factory(config: Config, factory: Arc<dyn StoreFactory>) -> Result<Server> {
        config.validate()?;
        let key = ServiceKey::new(&config.host, config.port);
        let (workers, slow_batch_ms) = (config.workers, config.slow_batch_ms);
        match &config.data_dir {
            Some(dir) => info!(data_dir = %dir.display(), "Graph stores are persistent"),
            None => info!("Graph stores are in memory only"),
        }

        let services = Arc::new(ServiceManager::new(config, factory));
        let registry = ResourceRegistry::control(Arc::clone(&services));
        let root = Service::start(key, None, registry, workers, slow_batch_ms)?;
        Ok(Server { services, root })
    }

    /// Address of the root control service
    pub fn local_addr(&self) -> SocketAddr {
        self.root.local_addr()
    }

    pub fn services(&self) -> &Arc<ServiceManager> {
        &self.services
    }

    /// Stop the control service, then every graph service. Idempotent.
    pub fn shutdown(&self) {
        self.root.stop();
        self.services.stop_all();
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}

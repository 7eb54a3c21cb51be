//! ServiceManager - Thread-safe registry of running graph services
//!
//! # Architecture
//!
//! - `ServiceManager` maps `host:port` to a running `Service`
//! - Stores come from a `StoreFactory`, so a stopped service can be started
//!   again on the data it left behind
//! - Every registry mutation, including the slow parts of start and stop,
//!   happens under one mutex; two clients starting the same key end up
//!   with the same service
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use zerograph::config::Config;
//! use zerograph::graph::MemoryStoreFactory;
//! use zerograph::service::ServiceManager;
//!
//! let manager = ServiceManager::new(Config::default(), Arc::new(MemoryStoreFactory::ephemeral()));
//! let service = manager.start("localhost", 47471, true).unwrap();
//! println!("graph service on {}", service.local_addr());
//! manager.stop("localhost", 47471, false).unwrap();
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{Service, ServiceKey};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::graph::StoreFactory;
use crate::resource::ResourceRegistry;

pub struct ServiceManager {
    config: Config,
    factory: Arc<dyn StoreFactory>,
    services: Mutex<HashMap<ServiceKey, Arc<Service>>>,
}

impl ServiceManager {
    pub fn new(config: Config, factory: Arc<dyn StoreFactory>) -> Self {
        Self {
            config,
            factory,
            services: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start the graph service for `host:port`, or return it if it is
    /// already running.
    ///
    /// Without `create`, the store must already exist (`NoSuchGraph`).
    pub fn start(&self, host: &str, port: u16, create: bool) -> Result<Arc<Service>> {
        let key = ServiceKey::new(host, port);
        let mut services = self.services.lock();
        if let Some(service) = services.get(&key) {
            debug!(service = %key, "Service already running");
            return Ok(Arc::clone(service));
        }

        let store = self.factory.open(host, port, create)?;
        let service = Arc::new(Service::start(
            key.clone(),
            Some(store),
            ResourceRegistry::graph(),
            self.config.workers,
            self.config.slow_batch_ms,
        )?);
        services.insert(key, Arc::clone(&service));
        Ok(service)
    }

    /// Stop the graph service for `host:port`. With `delete` its store is
    /// destroyed, otherwise flushed.
    pub fn stop(&self, host: &str, port: u16, delete: bool) -> Result<()> {
        let key = ServiceKey::new(host, port);
        let mut services = self.services.lock();
        let service = services
            .remove(&key)
            .ok_or_else(|| Error::GraphNotStarted { host: host.to_string(), port })?;

        service.stop();
        if let Some(store) = service.store() {
            if delete {
                store.destroy()?;
                info!(service = %key, "Graph store deleted");
            } else {
                store.flush()?;
            }
        }
        Ok(())
    }

    pub fn get(&self, host: &str, port: u16) -> Option<Arc<Service>> {
        self.services.lock().get(&ServiceKey::new(host, port)).cloned()
    }

    /// Running services, ordered by key
    pub fn list(&self) -> Vec<Arc<Service>> {
        let mut services: Vec<_> = self.services.lock().values().cloned().collect();
        services.sort_by(|a, b| a.key().cmp(b.key()));
        services
    }

    /// Whether a store exists for `host:port`, running or not
    pub fn store_exists(&self, host: &str, port: u16) -> bool {
        self.factory.exists(host, port)
    }

    /// Stop every service, flushing its store. Used at process shutdown.
    pub fn stop_all(&self) {
        let mut services = self.services.lock();
        for (key, service) in services.drain() {
            service.stop();
            if let Some(store) = service.store() {
                match store.flush() {
                    Ok(()) => info!(service = %key, "Flushed graph store"),
                    Err(e) => warn!(service = %key, error = %e, "Flush failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use super::*;
    use crate::graph::MemoryStoreFactory;
    use tempfile::tempdir;

    const HOST: &str = "127.0.0.1";

    fn free_port() -> u16 {
        std::net::TcpListener::bind((HOST, 0)).unwrap().local_addr().unwrap().port()
    }

    fn manager(factory: MemoryStoreFactory) -> ServiceManager {
        ServiceManager::new(Config::ephemeral(HOST, 0), Arc::new(factory))
    }

    #[test]
    fn test_start_requires_store_unless_creating() {
        let manager = manager(MemoryStoreFactory::ephemeral());
        let port = free_port();

        let err = manager.start(HOST, port, false).err().unwrap();
        assert!(matches!(err, Error::NoSuchGraph { .. }));
        assert!(manager.get(HOST, port).is_none());

        let first = manager.start(HOST, port, true).unwrap();
        let second = manager.start(HOST, port, false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(first.store().unwrap(), second.store().unwrap()));
        assert_eq!(manager.list().len(), 1);
        manager.stop_all();
    }

    #[test]
    fn test_concurrent_starts_share_one_service() {
        let manager = manager(MemoryStoreFactory::ephemeral());
        let port = free_port();
        let threads = 8;
        let barrier = std::sync::Barrier::new(threads);

        let services: Vec<Arc<Service>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        manager.start(HOST, port, true).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(services.len(), threads);
        assert!(services.iter().all(|s| Arc::ptr_eq(s, &services[0])));
        assert_eq!(manager.list().len(), 1);
        manager.stop_all();
        assert!(!services[0].is_running());
    }

    #[test]
    fn test_stop_twice() {
        let manager = manager(MemoryStoreFactory::ephemeral());
        let port = free_port();
        let service = manager.start(HOST, port, true).unwrap();
        assert!(service.is_running());

        manager.stop(HOST, port, false).unwrap();
        assert!(!service.is_running());
        assert!(manager.get(HOST, port).is_none());
        assert!(manager.store_exists(HOST, port));

        let err = manager.stop(HOST, port, false).unwrap_err();
        assert!(matches!(err, Error::GraphNotStarted { .. }));
        assert_eq!(err.to_string(), format!("Graph {}:{} is not started", HOST, port));
    }

    #[test]
    fn test_restart_keeps_data_and_delete_removes_it() {
        let dir = tempdir().unwrap();
        let manager = manager(MemoryStoreFactory::persistent(dir.path()));
        let port = free_port();

        let service = manager.start(HOST, port, true).unwrap();
        let store = Arc::clone(service.store().unwrap());
        let mut tx = store.begin().unwrap();
        tx.create_node(&["Person".to_string()], &Default::default()).unwrap();
        tx.commit().unwrap();
        drop(service);
        manager.stop(HOST, port, false).unwrap();
        assert!(dir.path().join(format!("{}_{}", HOST, port)).is_dir());

        let service = manager.start(HOST, port, false).unwrap();
        assert_eq!(service.store().unwrap().node_count(), 1);
        drop(service);

        manager.stop(HOST, port, true).unwrap();
        assert!(!manager.store_exists(HOST, port));
        assert!(matches!(manager.start(HOST, port, false), Err(Error::NoSuchGraph { .. })));
    }

    #[test]
    fn test_bind_failure_leaves_registry_untouched() {
        let manager = manager(MemoryStoreFactory::ephemeral());
        let taken = std::net::TcpListener::bind((HOST, 0)).unwrap();
        let port = taken.local_addr().unwrap().port();

        assert!(matches!(manager.start(HOST, port, true), Err(Error::Io(_))));
        assert!(manager.list().is_empty());
    }
}

//! Graph store API
//!
//! The server only talks to storage through these traits. One `Transaction`
//! spans a whole batch; `commit` makes its writes visible atomically or
//! fails with `Error::Conflict` when a concurrent batch got there first.

pub mod memory;
pub mod query;

pub use memory::{MemoryGraph, MemoryStoreFactory};

use std::sync::Arc;

use crate::error::Result;
use crate::value::{Map, Node, Properties, Relationship, Value};

/// Tabular result of a query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub stats: Map,
}

/// One unit of work against a graph store.
///
/// Unknown node or relationship ids fail with `Error::NotFound`.
pub trait Transaction: Send {
    // === QUERIES ===

    fn execute(&mut self, query: &str, params: &Map) -> Result<QueryResult>;

    // === NODE OPERATIONS ===

    fn get_node(&self, id: u64) -> Result<Node>;

    /// Replace all labels and properties
    fn put_node(&mut self, id: u64, labels: &[String], properties: &Properties) -> Result<Node>;

    /// Add labels and properties, keeping the existing ones
    fn patch_node(&mut self, id: u64, labels: &[String], properties: &Properties) -> Result<Node>;

    fn create_node(&mut self, labels: &[String], properties: &Properties) -> Result<Node>;

    fn delete_node(&mut self, id: u64) -> Result<()>;

    // === RELATIONSHIP OPERATIONS ===

    fn get_relationship(&self, id: u64) -> Result<Relationship>;

    fn put_relationship(&mut self, id: u64, properties: &Properties) -> Result<Relationship>;

    fn patch_relationship(&mut self, id: u64, properties: &Properties) -> Result<Relationship>;

    fn create_relationship(
        &mut self,
        start: u64,
        end: u64,
        rel_type: &str,
        properties: &Properties,
    ) -> Result<Relationship>;

    fn delete_relationship(&mut self, id: u64) -> Result<()>;

    // === SET OPERATIONS ===

    /// Nodes with `label`, optionally restricted to `key = value`
    fn match_nodes(&self, label: &str, key: Option<&str>, value: Option<&Value>) -> Result<Vec<Node>>;

    /// Matching nodes, creating one when none exists
    fn merge_nodes(&mut self, label: &str, key: &str, value: &Value) -> Result<Vec<Node>>;

    /// Delete matching nodes, returning how many went
    fn purge_nodes(&mut self, label: &str, key: Option<&str>, value: Option<&Value>) -> Result<usize>;

    /// Relationships by endpoint; at least one of `start`/`end` is required
    fn match_relationships(
        &self,
        start: Option<u64>,
        end: Option<u64>,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>>;

    fn merge_relationships(&mut self, start: u64, end: u64, rel_type: &str) -> Result<Vec<Relationship>>;

    fn purge_relationships(&mut self, start: Option<u64>, end: Option<u64>, rel_type: Option<&str>) -> Result<usize>;

    // === COMPLETION ===

    fn commit(self: Box<Self>) -> Result<()>;

    fn rollback(self: Box<Self>);
}

/// Backing store of one graph service
pub trait GraphStore: Send + Sync {
    fn begin(&self) -> Result<Box<dyn Transaction>>;

    fn node_count(&self) -> usize;

    fn relationship_count(&self) -> usize;

    /// Write committed state to durable storage, if any
    fn flush(&self) -> Result<()>;

    /// Remove all data and any persisted files
    fn destroy(&self) -> Result<()>;
}

/// Opens the store behind a `host:port` service key
pub trait StoreFactory: Send + Sync {
    fn exists(&self, host: &str, port: u16) -> bool;

    /// Fails with `Error::NoSuchGraph` when the store is absent and
    /// `create` is false.
    fn open(&self, host: &str, port: u16, create: bool) -> Result<Arc<dyn GraphStore>>;
}

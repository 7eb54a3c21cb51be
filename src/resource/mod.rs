//! Named resources served by a service
//!
//! A resource implements some of the six verbs; the rest answer 405. Graph
//! services expose `Node`, `Rel`, `NodeSet`, `RelSet` and `Cypher`; the root
//! control service exposes `Graph`.

mod graph_admin;
mod node;
mod node_set;
mod query;
mod relationship;
mod relationship_set;

pub use graph_admin::GraphAdminResource;
pub use node::NodeResource;
pub use node_set::NodeSetResource;
pub use query::QueryResource;
pub use relationship::RelationshipResource;
pub use relationship_set::RelationshipSetResource;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::graph::Transaction;
use crate::protocol::{Request, Responder, Verb};
use crate::service::ServiceManager;
use crate::value::{Entity, Map, Properties, Value};

/// Per-request view of the batch: where to write, and which transaction to
/// work in (absent on the control service).
pub struct Context<'a> {
    pub responder: &'a mut Responder,
    tx: Option<&'a mut (dyn Transaction + 'static)>,
}

impl<'a> Context<'a> {
    pub fn new(responder: &'a mut Responder, tx: Option<&'a mut (dyn Transaction + 'static)>) -> Self {
        Self { responder, tx }
    }

    pub fn tx(&mut self) -> Result<&mut (dyn Transaction + 'static)> {
        match self.tx {
            Some(ref mut tx) => Ok(&mut **tx),
            None => Err(Error::Server("This service has no graph store".into())),
        }
    }
}

fn not_allowed(request: &Request) -> Result<Option<Entity>> {
    Err(Error::MethodNotAllowed { verb: request.verb, resource: request.resource.clone() })
}

/// Every verb returns the request's output entity (for later pointers), if any.
pub trait Resource: Send + Sync {
    fn name(&self) -> &'static str;

    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    fn get(&self, request: &Request, _ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        not_allowed(request)
    }

    fn set(&self, request: &Request, _ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        not_allowed(request)
    }

    fn patch(&self, request: &Request, _ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        not_allowed(request)
    }

    fn create(&self, request: &Request, _ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        not_allowed(request)
    }

    fn delete(&self, request: &Request, _ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        not_allowed(request)
    }

    fn execute(&self, request: &Request, _ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        not_allowed(request)
    }
}

/// Route a request to the verb method of `resource`
pub fn invoke(resource: &dyn Resource, request: &Request, ctx: &mut Context<'_>) -> Result<Option<Entity>> {
    match request.verb {
        Verb::Get => resource.get(request, ctx),
        Verb::Set => resource.set(request, ctx),
        Verb::Patch => resource.patch(request, ctx),
        Verb::Create => resource.create(request, ctx),
        Verb::Delete => resource.delete(request, ctx),
        Verb::Execute => resource.execute(request, ctx),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Node,
    Relationship,
}

/// Id of an entity given either as a handle or as an integer id.
pub fn resolve_entity(value: &Value, kind: EntityKind) -> Result<u64> {
    match (value, kind) {
        (Value::Node(node), EntityKind::Node) => Ok(node.id),
        (Value::Rel(rel), EntityKind::Relationship) => Ok(rel.id),
        (Value::Int(id), _) if *id >= 0 => Ok(*id as u64),
        (other, _) => Err(Error::bad_request(format!(
            "Cannot resolve {} from {}",
            match kind {
                EntityKind::Node => "node",
                EntityKind::Relationship => "relationship",
            },
            other.type_name()
        ))),
    }
}

/// Optional node reference argument (`start`, `end`, ...)
pub fn resolve_node_arg(request: &Request, name: &str) -> Result<Option<u64>> {
    request
        .arguments
        .get(name)
        .map(|value| resolve_entity(value, EntityKind::Node))
        .transpose()
}

pub fn require_node_arg(request: &Request, name: &str) -> Result<u64> {
    resolve_entity(request.arguments.require(name)?, EntityKind::Node)
}

/// `properties` argument, defaulting to empty
pub fn properties_arg(request: &Request) -> Result<Properties> {
    Ok(request.arguments.opt_map("properties")?.unwrap_or_default())
}

/// Foot carrying a single counter
pub fn count_foot(key: &str, count: usize) -> Map {
    let mut foot = Map::new();
    foot.insert(key.to_string(), Value::Int(count as i64));
    foot
}

/// Name-to-resource table of one service
pub struct ResourceRegistry {
    resources: BTreeMap<&'static str, Arc<dyn Resource>>,
}

impl ResourceRegistry {
    pub fn empty() -> Self {
        Self { resources: BTreeMap::new() }
    }

    /// Resources of a graph service
    pub fn graph() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(NodeResource));
        registry.register(Arc::new(RelationshipResource));
        registry.register(Arc::new(NodeSetResource));
        registry.register(Arc::new(RelationshipSetResource));
        registry.register(Arc::new(QueryResource));
        registry
    }

    /// Resources of the root control service
    pub fn control(services: Arc<ServiceManager>) -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(GraphAdminResource::new(services)));
        registry
    }

    pub fn register(&mut self, resource: Arc<dyn Resource>) {
        for name in std::iter::once(resource.name()).chain(resource.aliases().iter().copied()) {
            self.resources.insert(name, Arc::clone(&resource));
        }
    }

    /// Case-sensitive lookup
    pub fn dispatch(&self, name: &str) -> Result<&dyn Resource> {
        self.resources
            .get(name)
            .map(|resource| &**resource)
            .ok_or_else(|| Error::not_found(format!("This service does not provide a resource called {}", name)))
    }

    /// Every name served, aliases included
    pub fn names(&self) -> Vec<&'static str> {
        self.resources.keys().copied().collect()
    }
}

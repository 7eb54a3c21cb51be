//! MemoryGraph - in-memory graph store with optimistic transactions
//!
//! # Architecture
//!
//! - Committed state is an immutable `Arc<GraphData>` snapshot plus a version
//!   counter, guarded by one `RwLock`
//! - A transaction starts from the current snapshot and copies it on its
//!   first write (`Arc::make_mut`), so readers never block writers
//! - Every write records the entity keys it touched. On commit those keys are
//!   checked against the version at which each was last modified; a key
//!   changed after the transaction began is a write conflict (409)
//! - Non-conflicting concurrent transactions are rebased: only their touched
//!   entities are copied onto the newer snapshot
//! - Open transactions register their base version; version entries no open
//!   transaction can conflict with are pruned when a transaction ends
//! - Persistent stores rewrite `graph.json` in their service directory on
//!   every commit (write to a temp file, then rename)

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::graph::{query, GraphStore, QueryResult, StoreFactory, Transaction};
use crate::value::{validate_property, Map, Node, Properties, Relationship, Value};

pub const SNAPSHOT_FILE: &str = "graph.json";

#[derive(Debug, Clone, Default)]
struct GraphData {
    nodes: BTreeMap<u64, Node>,
    relationships: BTreeMap<u64, Relationship>,
}

/// On-disk form of a store
#[derive(Serialize)]
struct SnapshotRef<'a> {
    next_node_id: u64,
    next_relationship_id: u64,
    nodes: Vec<&'a Node>,
    relationships: Vec<&'a Relationship>,
}

#[derive(Deserialize, Default)]
struct Snapshot {
    next_node_id: u64,
    next_relationship_id: u64,
    nodes: Vec<Node>,
    relationships: Vec<Relationship>,
}

/// Unit of conflict detection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Key {
    Node(u64),
    Relationship(u64),
    /// Serializes concurrent find-or-create on the same label and key
    Merge(String),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Node(id) => write!(f, "Node {}", id),
            Key::Relationship(id) => write!(f, "Relationship {}", id),
            Key::Merge(scope) => write!(f, "Merge on {}", scope),
        }
    }
}

struct Committed {
    version: u64,
    data: Arc<GraphData>,
    /// Version at which each key was last written
    modified: HashMap<Key, u64>,
}

struct Shared {
    dir: Option<PathBuf>,
    committed: RwLock<Committed>,
    /// Base version -> number of open transactions started from it.
    /// Lock order: `committed` first, then `live`.
    live: Mutex<BTreeMap<u64, usize>>,
    next_node_id: AtomicU64,
    next_relationship_id: AtomicU64,
    destroyed: AtomicBool,
}

impl Shared {
    fn persist(&self, data: &GraphData) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        std::fs::create_dir_all(dir)?;
        let snapshot = SnapshotRef {
            next_node_id: self.next_node_id.load(Ordering::SeqCst),
            next_relationship_id: self.next_relationship_id.load(Ordering::SeqCst),
            nodes: data.nodes.values().collect(),
            relationships: data.relationships.values().collect(),
        };

        let tmp = dir.join(format!("{}.tmp", SNAPSHOT_FILE));
        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer(&mut writer, &snapshot)?;
        writer.flush()?;
        drop(writer);
        std::fs::rename(&tmp, dir.join(SNAPSHOT_FILE))?;
        Ok(())
    }
}

pub struct MemoryGraph {
    shared: Arc<Shared>,
}

impl MemoryGraph {
    /// Ephemeral store; data lives as long as the value
    pub fn new() -> Self {
        Self::from_parts(None, Snapshot::default())
    }

    /// Store persisted under `dir`, loading `graph.json` when present
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(SNAPSHOT_FILE);
        let snapshot = if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            serde_json::from_reader(reader)?
        } else {
            Snapshot::default()
        };
        info!(
            path = %dir.display(),
            nodes = snapshot.nodes.len(),
            relationships = snapshot.relationships.len(),
            "Opened graph store"
        );
        Ok(Self::from_parts(Some(dir.to_path_buf()), snapshot))
    }

    fn from_parts(dir: Option<PathBuf>, snapshot: Snapshot) -> Self {
        let data = GraphData {
            nodes: snapshot.nodes.into_iter().map(|n| (n.id, n)).collect(),
            relationships: snapshot.relationships.into_iter().map(|r| (r.id, r)).collect(),
        };
        // Never hand out an id that is already in the snapshot
        let next_node_id = data.nodes.keys().next_back().map_or(0, |id| id + 1).max(snapshot.next_node_id);
        let next_relationship_id = data
            .relationships
            .keys()
            .next_back()
            .map_or(0, |id| id + 1)
            .max(snapshot.next_relationship_id);

        Self {
            shared: Arc::new(Shared {
                dir,
                committed: RwLock::new(Committed {
                    version: 0,
                    data: Arc::new(data),
                    modified: HashMap::new(),
                }),
                live: Mutex::new(BTreeMap::new()),
                next_node_id: AtomicU64::new(next_node_id),
                next_relationship_id: AtomicU64::new(next_relationship_id),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.shared.dir.as_deref()
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::SeqCst)
    }
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStore for MemoryGraph {
    fn begin(&self) -> Result<Box<dyn Transaction>> {
        if self.is_destroyed() {
            return Err(Error::Server("Graph store has been destroyed".into()));
        }
        let committed = self.shared.committed.read();
        // Registered under the read lock so no commit lands in between
        let lease = Lease::new(&self.shared, committed.version);
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            base_version: committed.version,
            data: Arc::clone(&committed.data),
            touched: BTreeSet::new(),
            _lease: lease,
        }))
    }

    fn node_count(&self) -> usize {
        self.shared.committed.read().data.nodes.len()
    }

    fn relationship_count(&self) -> usize {
        self.shared.committed.read().data.relationships.len()
    }

    fn flush(&self) -> Result<()> {
        let committed = self.shared.committed.read();
        self.shared.persist(&committed.data)
    }

    fn destroy(&self) -> Result<()> {
        self.shared.destroyed.store(true, Ordering::SeqCst);
        {
            let mut committed = self.shared.committed.write();
            committed.version += 1;
            committed.data = Arc::new(GraphData::default());
            committed.modified.clear();
        }
        self.shared.next_node_id.store(0, Ordering::SeqCst);
        self.shared.next_relationship_id.store(0, Ordering::SeqCst);

        if let Some(dir) = &self.shared.dir {
            if dir.exists() {
                std::fs::remove_dir_all(dir)?;
            }
            info!(path = %dir.display(), "Destroyed graph store");
        }
        Ok(())
    }
}

struct MemoryTransaction {
    shared: Arc<Shared>,
    base_version: u64,
    data: Arc<GraphData>,
    touched: BTreeSet<Key>,
    _lease: Lease,
}

/// Keeps a transaction's base version registered while it is open
struct Lease {
    shared: Arc<Shared>,
    version: u64,
}

impl Lease {
    fn new(shared: &Arc<Shared>, version: u64) -> Self {
        *shared.live.lock().entry(version).or_insert(0) += 1;
        Self { shared: Arc::clone(shared), version }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut committed = self.shared.committed.write();
        let mut live = self.shared.live.lock();
        if let Some(count) = live.get_mut(&self.version) {
            *count -= 1;
            if *count == 0 {
                live.remove(&self.version);
            }
        }
        // A transaction only conflicts with keys written after its base
        match live.keys().next().copied() {
            Some(oldest) => committed.modified.retain(|_, version| *version > oldest),
            None => committed.modified.clear(),
        }
    }
}

fn node_not_found(id: u64) -> Error {
    Error::not_found(format!("Node {} not found", id))
}

fn relationship_not_found(id: u64) -> Error {
    Error::not_found(format!("Relationship {} not found", id))
}

/// Validate every value first so a bad property leaves the entity untouched
fn apply_properties(target: &mut Properties, properties: &Properties, replace: bool) -> Result<()> {
    for (key, value) in properties {
        validate_property(key, value)?;
    }
    if replace {
        target.clear();
    }
    for (key, value) in properties {
        if value.is_null() {
            target.remove(key);
        } else {
            target.insert(key.clone(), value.clone());
        }
    }
    Ok(())
}

impl MemoryTransaction {
    fn write(&mut self, key: Key) -> &mut GraphData {
        self.touched.insert(key);
        Arc::make_mut(&mut self.data)
    }

    fn require_node(&self, id: u64) -> Result<&Node> {
        self.data.nodes.get(&id).ok_or_else(|| node_not_found(id))
    }

    fn require_relationship(&self, id: u64) -> Result<&Relationship> {
        self.data.relationships.get(&id).ok_or_else(|| relationship_not_found(id))
    }

    fn update_node(&mut self, id: u64, labels: &[String], properties: &Properties, replace: bool) -> Result<Node> {
        self.require_node(id)?;
        let data = self.write(Key::Node(id));
        let node = data.nodes.get_mut(&id).ok_or_else(|| node_not_found(id))?;
        apply_properties(&mut node.properties, properties, replace)?;
        if replace {
            node.labels.clear();
        }
        node.labels.extend(labels.iter().filter(|l| !l.is_empty()).cloned());
        Ok(node.clone())
    }

    fn update_relationship(&mut self, id: u64, properties: &Properties, replace: bool) -> Result<Relationship> {
        self.require_relationship(id)?;
        let data = self.write(Key::Relationship(id));
        let rel = data.relationships.get_mut(&id).ok_or_else(|| relationship_not_found(id))?;
        apply_properties(&mut rel.properties, properties, replace)?;
        Ok(rel.clone())
    }
}

impl Transaction for MemoryTransaction {
    fn execute(&mut self, text: &str, params: &Map) -> Result<QueryResult> {
        query::run(self, text, params)
    }

    fn get_node(&self, id: u64) -> Result<Node> {
        self.require_node(id).cloned()
    }

    fn put_node(&mut self, id: u64, labels: &[String], properties: &Properties) -> Result<Node> {
        self.update_node(id, labels, properties, true)
    }

    fn patch_node(&mut self, id: u64, labels: &[String], properties: &Properties) -> Result<Node> {
        self.update_node(id, labels, properties, false)
    }

    fn create_node(&mut self, labels: &[String], properties: &Properties) -> Result<Node> {
        let mut node = Node {
            id: self.shared.next_node_id.fetch_add(1, Ordering::SeqCst),
            labels: labels.iter().filter(|l| !l.is_empty()).cloned().collect(),
            properties: Properties::new(),
        };
        apply_properties(&mut node.properties, properties, true)?;
        self.write(Key::Node(node.id)).nodes.insert(node.id, node.clone());
        Ok(node)
    }

    fn delete_node(&mut self, id: u64) -> Result<()> {
        self.require_node(id)?;
        let attached = self
            .data
            .relationships
            .values()
            .filter(|r| r.start == id || r.end == id)
            .count();
        if attached > 0 {
            return Err(Error::bad_request(format!(
                "Node {} still has {} relationship(s)",
                id, attached
            )));
        }
        self.write(Key::Node(id)).nodes.remove(&id);
        Ok(())
    }

    fn get_relationship(&self, id: u64) -> Result<Relationship> {
        self.require_relationship(id).cloned()
    }

    fn put_relationship(&mut self, id: u64, properties: &Properties) -> Result<Relationship> {
        self.update_relationship(id, properties, true)
    }

    fn patch_relationship(&mut self, id: u64, properties: &Properties) -> Result<Relationship> {
        self.update_relationship(id, properties, false)
    }

    fn create_relationship(
        &mut self,
        start: u64,
        end: u64,
        rel_type: &str,
        properties: &Properties,
    ) -> Result<Relationship> {
        if rel_type.is_empty() {
            return Err(Error::bad_request("Relationship type must not be empty"));
        }
        self.require_node(start)?;
        self.require_node(end)?;

        let mut rel = Relationship {
            id: self.shared.next_relationship_id.fetch_add(1, Ordering::SeqCst),
            start,
            end,
            rel_type: rel_type.to_string(),
            properties: Properties::new(),
        };
        apply_properties(&mut rel.properties, properties, true)?;

        // Endpoints are guarded so a concurrent delete of either node conflicts
        self.touched.insert(Key::Node(start));
        self.touched.insert(Key::Node(end));
        self.write(Key::Relationship(rel.id)).relationships.insert(rel.id, rel.clone());
        Ok(rel)
    }

    fn delete_relationship(&mut self, id: u64) -> Result<()> {
        self.require_relationship(id)?;
        self.write(Key::Relationship(id)).relationships.remove(&id);
        Ok(())
    }

    fn match_nodes(&self, label: &str, key: Option<&str>, value: Option<&Value>) -> Result<Vec<Node>> {
        Ok(self
            .data
            .nodes
            .values()
            .filter(|n| n.labels.contains(label))
            .filter(|n| match (key, value) {
                (None, _) => true,
                (Some(k), None) => n.properties.contains_key(k),
                (Some(k), Some(v)) => n.properties.get(k) == Some(v),
            })
            .cloned()
            .collect())
    }

    fn merge_nodes(&mut self, label: &str, key: &str, value: &Value) -> Result<Vec<Node>> {
        if label.is_empty() {
            return Err(Error::bad_request("Label must not be empty"));
        }
        if value.is_null() {
            return Err(Error::bad_request("Merge value must not be null"));
        }
        validate_property(key, value)?;

        self.touched.insert(Key::Merge(format!("{}.{}", label, key)));
        let existing = self.match_nodes(label, Some(key), Some(value))?;
        if !existing.is_empty() {
            return Ok(existing);
        }
        let mut properties = Properties::new();
        properties.insert(key.to_string(), value.clone());
        Ok(vec![self.create_node(&[label.to_string()], &properties)?])
    }

    fn purge_nodes(&mut self, label: &str, key: Option<&str>, value: Option<&Value>) -> Result<usize> {
        let doomed = self.match_nodes(label, key, value)?;
        for node in &doomed {
            self.delete_node(node.id)?;
        }
        Ok(doomed.len())
    }

    fn match_relationships(
        &self,
        start: Option<u64>,
        end: Option<u64>,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>> {
        if start.is_none() && end.is_none() {
            return Err(Error::bad_request("Either start or end nodes must be specified"));
        }
        for id in start.iter().chain(end.iter()) {
            self.require_node(*id)?;
        }
        Ok(self
            .data
            .relationships
            .values()
            .filter(|r| start.map_or(true, |s| r.start == s))
            .filter(|r| end.map_or(true, |e| r.end == e))
            .filter(|r| rel_type.map_or(true, |t| r.rel_type == t))
            .cloned()
            .collect())
    }

    fn merge_relationships(&mut self, start: u64, end: u64, rel_type: &str) -> Result<Vec<Relationship>> {
        let existing = self.match_relationships(Some(start), Some(end), Some(rel_type))?;
        if !existing.is_empty() {
            self.touched.insert(Key::Node(start));
            self.touched.insert(Key::Node(end));
            return Ok(existing);
        }
        Ok(vec![self.create_relationship(start, end, rel_type, &Properties::new())?])
    }

    fn purge_relationships(&mut self, start: Option<u64>, end: Option<u64>, rel_type: Option<&str>) -> Result<usize> {
        let doomed = self.match_relationships(start, end, rel_type)?;
        for rel in &doomed {
            self.delete_relationship(rel.id)?;
        }
        Ok(doomed.len())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        // `_lease` outlives the write guard below, which it needs to take
        let MemoryTransaction { shared, base_version, data, touched, _lease } = *self;
        if touched.is_empty() {
            return Ok(());
        }
        if shared.destroyed.load(Ordering::SeqCst) {
            return Err(Error::Conflict("Graph store was destroyed during the transaction".into()));
        }

        let mut committed = shared.committed.write();
        let data = if committed.version == base_version {
            data
        } else {
            if let Some(key) = touched
                .iter()
                .find(|key| committed.modified.get(*key).map_or(false, |v| *v > base_version))
            {
                return Err(Error::Conflict(format!(
                    "{} was modified by a concurrent transaction",
                    key
                )));
            }
            let mut rebased = (*committed.data).clone();
            for key in &touched {
                match key {
                    Key::Node(id) => {
                        match data.nodes.get(id) {
                            Some(node) => rebased.nodes.insert(*id, node.clone()),
                            None => rebased.nodes.remove(id),
                        };
                    }
                    Key::Relationship(id) => {
                        match data.relationships.get(id) {
                            Some(rel) => rebased.relationships.insert(*id, rel.clone()),
                            None => rebased.relationships.remove(id),
                        };
                    }
                    Key::Merge(_) => {}
                }
            }
            Arc::new(rebased)
        };

        shared.persist(&data)?;

        let version = committed.version + 1;
        for key in touched {
            committed.modified.insert(key, version);
        }
        committed.data = data;
        committed.version = version;
        debug!(version, "Committed transaction");
        Ok(())
    }

    fn rollback(self: Box<Self>) {
        debug!(base_version = self.base_version, touched = self.touched.len(), "Rolled back transaction");
    }
}

/// Opens `MemoryGraph`s, persistent under `<data_dir>/<host>_<port>` when a
/// data directory is configured.
pub struct MemoryStoreFactory {
    data_dir: Option<PathBuf>,
    stores: Mutex<HashMap<(String, u16), Arc<MemoryGraph>>>,
}

impl MemoryStoreFactory {
    pub fn new(data_dir: Option<PathBuf>) -> Self {
        Self {
            data_dir,
            stores: Mutex::new(HashMap::new()),
        }
    }

    pub fn ephemeral() -> Self {
        Self::new(None)
    }

    pub fn persistent(data_dir: impl Into<PathBuf>) -> Self {
        Self::new(Some(data_dir.into()))
    }

    pub fn service_dir(&self, host: &str, port: u16) -> Option<PathBuf> {
        self.data_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}_{}", host, port)))
    }

    fn live_store(&self, host: &str, port: u16) -> Option<Arc<MemoryGraph>> {
        self.stores
            .lock()
            .get(&(host.to_string(), port))
            .filter(|store| !store.is_destroyed())
            .cloned()
    }
}

impl StoreFactory for MemoryStoreFactory {
    fn exists(&self, host: &str, port: u16) -> bool {
        if self.live_store(host, port).is_some() {
            return true;
        }
        self.service_dir(host, port).map_or(false, |dir| dir.is_dir())
    }

    fn open(&self, host: &str, port: u16, create: bool) -> Result<Arc<dyn GraphStore>> {
        if let Some(store) = self.live_store(host, port) {
            return Ok(store);
        }
        if !create && !self.exists(host, port) {
            return Err(Error::NoSuchGraph { host: host.to_string(), port });
        }

        let store = match self.service_dir(host, port) {
            Some(dir) => Arc::new(MemoryGraph::open(&dir)?),
            None => Arc::new(MemoryGraph::new()),
        };
        self.stores.lock().insert((host.to_string(), port), Arc::clone(&store));
        Ok(store)
    }
}

//! Values carried by requests, responses and the graph store
//!
//! `Value` is the JSON data model extended with graph entity handles
//! (`Node`, `Rel`), service descriptors (`Graph`) and intra-batch
//! `Pointer`s. Entities serialize with a type tag on the wire (see
//! `protocol::text`); stored properties only ever hold the JSON subset.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub type Map = BTreeMap<String, Value>;
pub type Properties = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "serde_json::Value", from = "serde_json::Value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(Map),
    Node(Node),
    Rel(Relationship),
    Graph(GraphInfo),
    Pointer(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: u64,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: u64,
    pub start: u64,
    pub end: u64,
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(default)]
    pub properties: Properties,
}

/// Descriptor of a graph service as reported by the control service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphInfo {
    pub host: String,
    pub port: u16,
    pub running: bool,
}

/// Graph entity handle produced by a request, addressable by later pointers
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Node(Node),
    Relationship(Relationship),
}

impl Entity {
    pub fn id(&self) -> u64 {
        match self {
            Entity::Node(node) => node.id,
            Entity::Relationship(rel) => rel.id,
        }
    }
}

impl From<Entity> for Value {
    fn from(entity: Entity) -> Self {
        match entity {
            Entity::Node(node) => Value::Node(node),
            Entity::Relationship(rel) => Value::Rel(rel),
        }
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        Value::Node(node)
    }
}

impl From<Relationship> for Value {
    fn from(rel: Relationship) -> Self {
        Value::Rel(rel)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl Value {
    /// Type name used in client error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Node(_) => "node",
            Value::Rel(_) => "relationship",
            Value::Graph(_) => "graph",
            Value::Pointer(_) => "pointer",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The entity handle held by this value, if any
    pub fn as_entity(&self) -> Option<Entity> {
        match self {
            Value::Node(node) => Some(Entity::Node(node.clone())),
            Value::Rel(rel) => Some(Entity::Relationship(rel.clone())),
            _ => None,
        }
    }

    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect(),
            ),
        }
    }

    /// Plain JSON form; entities become their attribute maps
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => Json::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
            Value::Node(node) => serde_json::json!({
                "id": node.id,
                "labels": node.labels,
                "properties": properties_to_json(&node.properties),
            }),
            Value::Rel(rel) => serde_json::json!({
                "id": rel.id,
                "start": rel.start,
                "end": rel.end,
                "type": rel.rel_type,
                "properties": properties_to_json(&rel.properties),
            }),
            Value::Graph(info) => serde_json::json!({
                "host": info.host,
                "port": info.port,
                "running": info.running,
            }),
            Value::Pointer(index) => Json::from(*index),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        value.to_json()
    }
}

fn properties_to_json(properties: &Properties) -> serde_json::Value {
    serde_json::Value::Object(
        properties.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
    )
}

/// Check that a value can be stored as a property.
///
/// Properties hold scalars or homogeneous lists of scalars. Null is accepted
/// and means "no value" (the key is dropped on write).
pub fn validate_property(key: &str, value: &Value) -> Result<()> {
    match value {
        Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_) => Ok(()),
        Value::List(items) => {
            let mut kind: Option<std::mem::Discriminant<Value>> = None;
            for item in items {
                match item {
                    Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_) => {}
                    other => {
                        return Err(Error::bad_request(format!(
                            "Property {:?} cannot hold a list of {}",
                            key,
                            other.type_name()
                        )))
                    }
                }
                let d = std::mem::discriminant(item);
                match kind {
                    None => kind = Some(d),
                    Some(k) if k != d => {
                        return Err(Error::bad_request(format!(
                            "Property {:?} must be a list of a single type",
                            key
                        )))
                    }
                    _ => {}
                }
            }
            Ok(())
        }
        other => Err(Error::bad_request(format!(
            "Property {:?} cannot hold a {}",
            key,
            other.type_name()
        ))),
    }
}

//! Text form of values on the wire
//!
//! Plain values are written as compact JSON. Entities carry a YAML-style tag
//! in front of their attribute map, at any nesting depth:
//!
//! ```text
//! !Node {"id":0,"labels":["Person"],"properties":{"name":"Alice"}}
//! [!Node {"id":0,...},42]
//! ```

use crate::error::{Error, Result};
use crate::value::{GraphInfo, Map, Node, Relationship, Value};

pub const NODE_TAG: &str = "!Node";
pub const REL_TAG: &str = "!Rel";
pub const GRAPH_TAG: &str = "!Graph";
pub const POINTER_HINT: &str = "/*Pointer*/";

pub fn encode_value(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("{:?}", s))
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Float(f) => match serde_json::Number::from_f64(*f) {
            Some(n) => out.push_str(&n.to_string()),
            None => out.push_str("null"),
        },
        Value::String(s) => out.push_str(&quote(s)),
        Value::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Map(map) => write_map(out, map),
        Value::Node(node) => {
            out.push_str(NODE_TAG);
            out.push(' ');
            let mut attributes = Map::new();
            attributes.insert("id".into(), Value::Int(node.id as i64));
            attributes.insert(
                "labels".into(),
                Value::List(node.labels.iter().cloned().map(Value::String).collect()),
            );
            attributes.insert("properties".into(), Value::Map(node.properties.clone()));
            write_map(out, &attributes);
        }
        Value::Rel(rel) => {
            out.push_str(REL_TAG);
            out.push(' ');
            let mut attributes = Map::new();
            attributes.insert("id".into(), Value::Int(rel.id as i64));
            attributes.insert("start".into(), Value::Int(rel.start as i64));
            attributes.insert("end".into(), Value::Int(rel.end as i64));
            attributes.insert("type".into(), Value::String(rel.rel_type.clone()));
            attributes.insert("properties".into(), Value::Map(rel.properties.clone()));
            write_map(out, &attributes);
        }
        Value::Graph(info) => {
            out.push_str(GRAPH_TAG);
            out.push(' ');
            let mut attributes = Map::new();
            attributes.insert("host".into(), Value::String(info.host.clone()));
            attributes.insert("port".into(), Value::Int(info.port as i64));
            attributes.insert("running".into(), Value::Bool(info.running));
            write_map(out, &attributes);
        }
        Value::Pointer(index) => out.push_str(&quote(&format!("{}{}", POINTER_HINT, index))),
    }
}

fn write_map(out: &mut String, map: &Map) {
    out.push('{');
    for (i, (key, value)) in map.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&quote(key));
        out.push(':');
        write_value(out, value);
    }
    out.push('}');
}

/// Parse the text form produced by `encode_value`.
pub fn decode_value(text: &str) -> Result<Value> {
    let mut parser = Parser { src: text, pos: 0 };
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos != text.len() {
        return Err(parser.error("trailing characters"));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, what: &str) -> Error {
        Error::bad_request(format!("Cannot decode value at offset {}: {}", self.pos, what))
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        self.skip_ws();
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", byte as char)))
        }
    }

    fn value(&mut self) -> Result<Value> {
        self.skip_ws();
        match self.peek() {
            Some(b'!') => self.tagged(),
            Some(b'[') => self.list(),
            Some(b'{') => self.map().map(Value::Map),
            Some(b'"') => self.string().map(Value::String),
            Some(_) => self.scalar(),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn tagged(&mut self) -> Result<Value> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b == b'!' || b.is_ascii_alphanumeric()) {
            self.pos += 1;
        }
        let tag = &self.src[start..self.pos];
        let attributes = Value::Map(self.map()?).to_json();
        let value = match tag {
            NODE_TAG => Value::Node(serde_json::from_value::<Node>(attributes)?),
            REL_TAG => Value::Rel(serde_json::from_value::<Relationship>(attributes)?),
            GRAPH_TAG => Value::Graph(serde_json::from_value::<GraphInfo>(attributes)?),
            other => return Err(self.error(&format!("unknown tag {}", other))),
        };
        Ok(value)
    }

    fn list(&mut self) -> Result<Value> {
        self.expect(b'[')?;
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(Value::List(items));
        }
        loop {
            items.push(self.value()?);
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Value::List(items));
                }
                _ => return Err(self.error("expected ',' or ']'")),
            }
        }
    }

    fn map(&mut self) -> Result<Map> {
        self.expect(b'{')?;
        let mut map = Map::new();
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(map);
        }
        loop {
            self.skip_ws();
            let key = self.string()?;
            self.expect(b':')?;
            let value = self.value()?;
            map.insert(key, value);
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(map);
                }
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn string(&mut self) -> Result<String> {
        if self.peek() != Some(b'"') {
            return Err(self.error("expected string"));
        }
        let start = self.pos;
        self.pos += 1;
        let bytes = self.src.as_bytes();
        while self.pos < bytes.len() {
            match bytes[self.pos] {
                b'\\' => self.pos += 2,
                b'"' => {
                    self.pos += 1;
                    return Ok(serde_json::from_str::<String>(&self.src[start..self.pos])?);
                }
                _ => self.pos += 1,
            }
        }
        Err(self.error("unterminated string"))
    }

    fn scalar(&mut self) -> Result<Value> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if !matches!(b, b',' | b']' | b'}' | b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
        let token = &self.src[start..self.pos];
        serde_json::from_str::<serde_json::Value>(token)
            .map(Value::from_json)
            .map_err(|_| self.error(&format!("invalid token {:?}", token)))
    }
}

#[cfg(test)]
mod text_tests {
    use super::*;
    use crate::value::Properties;

    fn alice() -> Node {
        let mut properties = Properties::new();
        properties.insert("name".into(), Value::from("Alice"));
        Node {
            id: 0,
            labels: ["Person".to_string()].into_iter().collect(),
            properties,
        }
    }

    #[test]
    fn test_encode_node_is_tagged() {
        assert_eq!(
            encode_value(&Value::Node(alice())),
            r#"!Node {"id":0,"labels":["Person"],"properties":{"name":"Alice"}}"#
        );
    }

    #[test]
    fn test_encode_scalars_as_json() {
        assert_eq!(encode_value(&Value::Null), "null");
        assert_eq!(encode_value(&Value::Float(1.5)), "1.5");
        assert_eq!(encode_value(&Value::from("a\"b")), r#""a\"b""#);
        assert_eq!(encode_value(&Value::Float(f64::NAN)), "null");
    }

    #[test]
    fn test_decode_nested_entities() {
        let rel = Relationship {
            id: 4,
            start: 0,
            end: 1,
            rel_type: "KNOWS".into(),
            properties: Properties::new(),
        };
        let row = Value::List(vec![Value::Node(alice()), Value::Rel(rel.clone()), Value::Int(42)]);
        let text = encode_value(&row);
        assert!(text.starts_with("[!Node {"));
        assert_eq!(decode_value(&text).unwrap(), row);
    }

    #[test]
    fn test_decode_graph_descriptor() {
        let value = decode_value(r#"!Graph {"host":"localhost","port":47471,"running":true}"#).unwrap();
        match value {
            Value::Graph(info) => {
                assert_eq!(info.port, 47471);
                assert!(info.running);
            }
            other => panic!("Expected graph, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_value("!Bogus {}").is_err());
        assert!(decode_value("[1,2").is_err());
        assert!(decode_value("{\"a\":1} x").is_err());
        assert!(decode_value("nope").is_err());
    }
}

//! Request/response codec
//!
//! Request line:  `METHOD RESOURCE [ARGS_JSON]`
//! Response line: `head: <v>` | `body: <v>` | `body:` + `- <v>`... | `foot: <v>`
//!                | `error: {"status":N,"message":"..."}` | `---` (separator)

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result, Status};
use crate::protocol::text::{decode_value, encode_value, POINTER_HINT};
use crate::value::{Map, Value};

pub const SEPARATOR: &str = "---";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Set,
    Patch,
    Create,
    Delete,
    Execute,
}

impl Verb {
    pub const ALL: [Verb; 6] = [Verb::Get, Verb::Set, Verb::Patch, Verb::Create, Verb::Delete, Verb::Execute];

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Set => "SET",
            Verb::Patch => "PATCH",
            Verb::Create => "CREATE",
            Verb::Delete => "DELETE",
            Verb::Execute => "EXECUTE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GET" => Ok(Verb::Get),
            "SET" => Ok(Verb::Set),
            "PATCH" => Ok(Verb::Patch),
            "CREATE" => Ok(Verb::Create),
            "DELETE" => Ok(Verb::Delete),
            "EXECUTE" => Ok(Verb::Execute),
            other => Err(Error::bad_request(format!("Unknown method {:?}", other))),
        }
    }
}

/// Named request arguments in their original order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments(Vec<(String, Value)>);

impl Arguments {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.0.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Value> {
        self.0.iter_mut().map(|(_, v)| v)
    }

    /// Present and not null
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
            .filter(|v| !v.is_null())
    }

    pub fn require(&self, name: &str) -> Result<&Value> {
        self.get(name)
            .ok_or_else(|| Error::bad_request(format!("Missing argument: {}", name)))
    }

    pub fn require_i64(&self, name: &str) -> Result<i64> {
        let value = self.require(name)?;
        value.as_i64().ok_or_else(|| wrong_type(name, "integer", value))
    }

    pub fn require_id(&self, name: &str) -> Result<u64> {
        let id = self.require_i64(name)?;
        u64::try_from(id).map_err(|_| Error::bad_request(format!("Argument {} must not be negative", name)))
    }

    pub fn opt_bool(&self, name: &str, default: bool) -> Result<bool> {
        match self.get(name) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(wrong_type(name, "boolean", other)),
        }
    }

    pub fn require_str(&self, name: &str) -> Result<&str> {
        let value = self.require(name)?;
        value.as_str().ok_or_else(|| wrong_type(name, "string", value))
    }

    pub fn opt_str(&self, name: &str) -> Result<Option<&str>> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(wrong_type(name, "string", other)),
        }
    }

    /// List of strings, e.g. node labels
    pub fn require_strings(&self, name: &str) -> Result<Vec<String>> {
        self.opt_strings(name)?
            .ok_or_else(|| Error::bad_request(format!("Missing argument: {}", name)))
    }

    pub fn opt_strings(&self, name: &str) -> Result<Option<Vec<String>>> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::List(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| wrong_type(name, "list of strings", item))
                })
                .collect::<Result<Vec<_>>>()
                .map(Some),
            Some(other) => Err(wrong_type(name, "list", other)),
        }
    }

    pub fn require_map(&self, name: &str) -> Result<Map> {
        self.opt_map(name)?
            .ok_or_else(|| Error::bad_request(format!("Missing argument: {}", name)))
    }

    pub fn opt_map(&self, name: &str) -> Result<Option<Map>> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::Map(map)) => Ok(Some(map.clone())),
            Some(other) => Err(wrong_type(name, "map", other)),
        }
    }

    fn to_json_object(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
        )
    }
}

fn wrong_type(name: &str, expected: &str, actual: &Value) -> Error {
    Error::bad_request(format!(
        "Argument {} must be a {}, not a {}",
        name,
        expected,
        actual.type_name()
    ))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub verb: Verb,
    pub resource: String,
    pub arguments: Arguments,
}

impl Request {
    pub fn new(verb: Verb, resource: impl Into<String>, arguments: Arguments) -> Self {
        Self { verb, resource: resource.into(), arguments }
    }

    /// Parse one request line
    pub fn parse(line: &str) -> Result<Request> {
        let line = line.trim();
        let mut parts = line.splitn(2, char::is_whitespace);
        let method = parts.next().unwrap_or_default();
        let rest = parts.next().map(str::trim_start).unwrap_or_default();
        if method.is_empty() || rest.is_empty() {
            return Err(Error::bad_request(format!("Malformed request: {}", line)));
        }
        let verb: Verb = method.parse()?;

        let (resource, args) = match rest.find(char::is_whitespace) {
            Some(i) => (&rest[..i], rest[i..].trim()),
            None => (rest, ""),
        };
        if !resource.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(Error::bad_request(format!(
                "Malformed resource name {:?}: arguments must be separated by a space",
                resource
            )));
        }

        let arguments = if args.is_empty() {
            Arguments::new()
        } else {
            parse_arguments(args)?
        };

        Ok(Request::new(verb, resource, arguments))
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb, self.resource)?;
        if !self.arguments.is_empty() {
            write!(f, " {}", self.arguments.to_json_object())?;
        }
        Ok(())
    }
}

/// Decode a JSON object of named arguments, recognising pointer sentinels:
/// `"name*": N` and `"/*Pointer*/N"` string values.
fn parse_arguments(text: &str) -> Result<Arguments> {
    let json: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| Error::bad_request(format!("Malformed arguments: {}", e)))?;
    let object = match json {
        serde_json::Value::Object(object) => object,
        other => {
            return Err(Error::bad_request(format!(
                "Arguments must be a JSON object, not {}",
                other
            )))
        }
    };

    let mut arguments = Arguments::new();
    for (key, value) in object {
        match key.strip_suffix('*') {
            Some(name) if !name.is_empty() => {
                let index = value
                    .as_u64()
                    .ok_or_else(|| Error::bad_request(format!("Pointer argument {} must be a non-negative integer", key)))?;
                arguments.insert(name, Value::Pointer(index as usize));
            }
            _ => arguments.insert(key, decode_pointers(Value::from_json(value))?),
        }
    }
    Ok(arguments)
}

fn decode_pointers(value: Value) -> Result<Value> {
    match value {
        Value::String(s) => match s.strip_prefix(POINTER_HINT) {
            Some(index) => index
                .trim()
                .parse::<usize>()
                .map(Value::Pointer)
                .map_err(|_| Error::bad_request(format!("Malformed pointer {:?}", s))),
            None => Ok(Value::String(s)),
        },
        Value::List(items) => Ok(Value::List(
            items.into_iter().map(decode_pointers).collect::<Result<_>>()?,
        )),
        Value::Map(map) => Ok(Value::Map(
            map.into_iter()
                .map(|(k, v)| decode_pointers(v).map(|v| (k, v)))
                .collect::<Result<_>>()?,
        )),
        other => Ok(other),
    }
}

/// Ordered, non-empty requests executed in one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub requests: Vec<Request>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// One undecodable line of an incoming batch
#[derive(Debug, Clone, PartialEq)]
pub struct LineError {
    /// 1-based position among the non-blank lines of the message
    pub line: usize,
    pub message: String,
}

/// A batch that cannot run. Every line was still examined so the client can
/// see every malformed line at once.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeError {
    pub line_count: usize,
    pub failures: Vec<LineError>,
}

impl DecodeError {
    pub fn is_empty_batch(&self) -> bool {
        self.line_count == 0
    }

    /// Error reported for a given request line (1-based)
    pub fn error_for_line(&self, line: usize) -> Error {
        match self.failures.iter().find(|f| f.line == line) {
            Some(failure) => Error::bad_request(format!("Line {}: {}", line, failure.message)),
            None => {
                let first = self.failures.first().map(|f| f.line).unwrap_or(0);
                Error::bad_request(format!("Not executed: line {} of the batch is malformed", first))
            }
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty_batch() {
            return f.write_str("Empty batch");
        }
        let lines: Vec<String> = self.failures.iter().map(|e| format!("line {}: {}", e.line, e.message)).collect();
        write!(f, "Malformed batch ({})", lines.join("; "))
    }
}

/// Split a message into request lines and decode each of them.
///
/// Lines are split on raw bytes, so a line that is not valid UTF-8 fails on
/// its own without shifting the numbering of the others.
pub fn decode_batch(bytes: &[u8]) -> std::result::Result<Batch, DecodeError> {
    let mut requests = Vec::new();
    let mut failures = Vec::new();
    let mut line_count = 0;

    for raw in bytes.split(|b| *b == b'\r' || *b == b'\n') {
        let parsed = match std::str::from_utf8(raw) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => Request::parse(line),
            Err(e) => Err(Error::bad_request(format!("Invalid UTF-8 at byte {}", e.valid_up_to()))),
        };
        line_count += 1;
        match parsed {
            Ok(request) => requests.push(request),
            Err(e) => failures.push(LineError { line: line_count, message: e.to_string() }),
        }
    }

    if line_count == 0 || !failures.is_empty() {
        return Err(DecodeError { line_count, failures });
    }
    Ok(Batch { requests })
}

/// Join the frames of one request message into a single buffer of lines.
pub fn join_frames(frames: &[Vec<u8>]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for frame in frames {
        if !bytes.is_empty() {
            bytes.push(b'\n');
        }
        bytes.extend_from_slice(frame);
    }
    bytes
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Single(Value),
    List(Vec<Value>),
}

/// A fully materialised response, as seen by a client reading the stream
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Success {
        head: Option<Map>,
        body: Option<Body>,
        foot: Option<Map>,
    },
    Failure {
        status: Status,
        message: String,
    },
}

impl Response {
    pub fn failure(error: &Error) -> Self {
        Response::Failure { status: error.status(), message: error.to_string() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success { .. })
    }

    pub fn body(&self) -> Option<&Body> {
        match self {
            Response::Success { body, .. } => body.as_ref(),
            Response::Failure { .. } => None,
        }
    }

    /// Single body value, or the first item of a list body
    pub fn first_value(&self) -> Option<&Value> {
        match self.body()? {
            Body::Single(value) => Some(value),
            Body::List(items) => items.first(),
        }
    }

    pub fn status(&self) -> Option<Status> {
        match self {
            Response::Failure { status, .. } => Some(*status),
            Response::Success { .. } => None,
        }
    }
}

pub fn head_line(head: &Map) -> String {
    format!("head: {}", encode_value(&Value::Map(head.clone())))
}

pub fn body_line(body: &Value) -> String {
    format!("body: {}", encode_value(body))
}

pub fn body_list_start_line() -> String {
    "body:".to_string()
}

pub fn empty_body_list_line() -> String {
    "body: []".to_string()
}

pub fn body_item_line(item: &Value) -> String {
    format!("- {}", encode_value(item))
}

pub fn foot_line(foot: &Map) -> String {
    format!("foot: {}", encode_value(&Value::Map(foot.clone())))
}

pub fn error_line(status: Status, message: &str) -> String {
    let detail = serde_json::json!({ "status": status.code(), "message": message });
    format!("error: {}", detail)
}

/// Encode one response as its sequence of lines (one frame each).
pub fn encode(response: &Response) -> Vec<String> {
    match response {
        Response::Failure { status, message } => vec![error_line(*status, message)],
        Response::Success { head, body, foot } => {
            let mut lines = Vec::new();
            if let Some(head) = head {
                lines.push(head_line(head));
            }
            match body {
                Some(Body::Single(value)) => lines.push(body_line(value)),
                Some(Body::List(items)) if items.is_empty() => lines.push(empty_body_list_line()),
                Some(Body::List(items)) => {
                    lines.push(body_list_start_line());
                    lines.extend(items.iter().map(body_item_line));
                }
                None => {}
            }
            if let Some(foot) = foot {
                lines.push(foot_line(foot));
            }
            lines
        }
    }
}

/// Decode the frames of one response batch (terminator excluded) back into
/// responses. Each frame may hold one or more lines.
///
/// There is always one more response than there are separators.
pub fn decode_responses(frames: &[Vec<u8>]) -> Result<Vec<Response>> {
    let bytes = join_frames(frames);
    let text = std::str::from_utf8(&bytes)
        .map_err(|e| Error::bad_request(format!("Response is not valid UTF-8 at byte {}", e.valid_up_to())))?;
    let mut responses = Vec::new();
    let mut current: Option<Response> = None;
    let mut open_list = false;

    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        if line == SEPARATOR {
            responses.push(current.take().unwrap_or(Response::Success { head: None, body: None, foot: None }));
            open_list = false;
            continue;
        }

        let success = current.get_or_insert(Response::Success { head: None, body: None, foot: None });
        if let Some(rest) = line.strip_prefix("error:") {
            let detail: serde_json::Value = serde_json::from_str(rest.trim())?;
            let status = detail["status"]
                .as_u64()
                .and_then(|c| Status::from_code(c as u16))
                .unwrap_or(Status::ServerError);
            let message = detail["message"].as_str().unwrap_or_default().to_string();
            *success = Response::Failure { status, message };
            open_list = false;
            continue;
        }

        let Response::Success { head, body, foot } = success else {
            return Err(Error::bad_request(format!("Unexpected line after error: {}", line)));
        };
        if let Some(rest) = line.strip_prefix("head:") {
            *head = Some(decode_map(rest)?);
        } else if let Some(rest) = line.strip_prefix("foot:") {
            *foot = Some(decode_map(rest)?);
            open_list = false;
        } else if let Some(rest) = line.strip_prefix("body:") {
            if rest.trim().is_empty() {
                *body = Some(Body::List(Vec::new()));
                open_list = true;
            } else if rest.trim() == "[]" {
                *body = Some(Body::List(Vec::new()));
            } else {
                *body = Some(Body::Single(decode_value(rest.trim())?));
            }
        } else if let Some(rest) = line.strip_prefix("- ") {
            match body {
                Some(Body::List(items)) if open_list => items.push(decode_value(rest.trim())?),
                _ => return Err(Error::bad_request(format!("List item outside a body list: {}", line))),
            }
        } else {
            return Err(Error::bad_request(format!("Unrecognised response line: {}", line)));
        }
    }

    // A batch always has at least one response; an empty one has no lines
    responses.push(current.unwrap_or(Response::Success { head: None, body: None, foot: None }));
    Ok(responses)
}

fn decode_map(text: &str) -> Result<Map> {
    match decode_value(text.trim())? {
        Value::Map(map) => Ok(map),
        other => Err(Error::bad_request(format!("Expected a map, got a {}", other.type_name()))),
    }
}

#[cfg(test)]
mod codec_tests {
    use super::*;

    // ============================================================================
    // Request lines
    // ============================================================================

    #[test]
    fn test_parse_request_without_arguments() {
        let request = Request::parse("GET Graph").unwrap();
        assert_eq!(request.verb, Verb::Get);
        assert_eq!(request.resource, "Graph");
        assert!(request.arguments.is_empty());
    }

    #[test]
    fn test_parse_request_with_arguments_keeps_order() {
        let request = Request::parse(r#"CREATE Node {"properties":{"name":"Alice"},"labels":["Person"]}"#).unwrap();
        assert_eq!(request.verb, Verb::Create);
        let names: Vec<&str> = request.arguments.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["properties", "labels"]);
        assert_eq!(
            request.to_string(),
            r#"CREATE Node {"properties":{"name":"Alice"},"labels":["Person"]}"#
        );
    }

    #[test]
    fn test_parse_pointer_sentinels() {
        let request = Request::parse(r#"CREATE Rel {"start*":0,"end":"/*Pointer*/1","type":"KNOWS"}"#).unwrap();
        assert_eq!(request.arguments.get("start"), Some(&Value::Pointer(0)));
        assert_eq!(request.arguments.get("end"), Some(&Value::Pointer(1)));
        assert_eq!(request.arguments.require_str("type").unwrap(), "KNOWS");
    }

    #[test]
    fn test_parse_rejects_bad_lines() {
        assert!(Request::parse("GET").is_err());
        assert!(Request::parse("FETCH Node {}").is_err());
        assert!(Request::parse("GET Node [1,2]").is_err());
        assert!(Request::parse("GET Node {nope}").is_err());
        assert!(Request::parse(r#"GET Node {"start*":-1}"#).is_err());
    }

    #[test]
    fn test_parse_rejects_arguments_glued_to_name() {
        let err = Request::parse(r#"GET Node{"id":1}"#).unwrap_err();
        assert_eq!(err.status(), Status::BadRequest);
        assert!(err.to_string().contains("separated by a space"));
        assert!(Request::parse("GET Node/x").is_err());
        assert_eq!(Request::parse("GET Rel_2").unwrap().resource, "Rel_2");
    }

    #[test]
    fn test_argument_accessors() {
        let args = Arguments::new()
            .with("id", 5i64)
            .with("name", "x")
            .with("flag", true)
            .with("labels", Value::List(vec![Value::from("A"), Value::from("B")]));
        assert_eq!(args.require_id("id").unwrap(), 5);
        assert_eq!(args.opt_str("name").unwrap(), Some("x"));
        assert!(args.opt_bool("flag", false).unwrap());
        assert!(!args.opt_bool("missing", false).unwrap());
        assert_eq!(args.require_strings("labels").unwrap(), vec!["A", "B"]);
        assert!(args.require_i64("name").is_err());
        assert!(args.require("missing").is_err());
        assert!(Arguments::new().with("id", -1i64).require_id("id").is_err());
    }

    // ============================================================================
    // Batches
    // ============================================================================

    #[test]
    fn test_decode_batch_splits_lines() {
        let batch = decode_batch(b"CREATE Node {\"labels\":[],\"properties\":{}}\r\n\nGET Node {\"id\":0}\rDELETE Node {\"id\":0}").unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.requests[2].verb, Verb::Delete);
    }

    #[test]
    fn test_decode_batch_reports_every_bad_line() {
        let err = decode_batch(b"GET Node {\"id\":1}\nBOGUS\nGET Node {oops}").unwrap_err();
        assert_eq!(err.line_count, 3);
        let lines: Vec<usize> = err.failures.iter().map(|f| f.line).collect();
        assert_eq!(lines, vec![2, 3]);
        assert!(err.error_for_line(1).to_string().contains("line 2"));
        assert!(err.error_for_line(3).to_string().starts_with("Line 3"));
    }

    #[test]
    fn test_decode_batch_rejects_invalid_utf8() {
        let err = decode_batch(b"CREATE Node {}\nCREATE Node {\"properties\":{\"n\":\"\xff\"}}").unwrap_err();
        assert_eq!(err.line_count, 2);
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].line, 2);
        assert!(err.failures[0].message.contains("Invalid UTF-8"));
        assert_eq!(err.error_for_line(2).status(), Status::BadRequest);
        assert!(err.error_for_line(1).to_string().contains("line 2"));
    }

    #[test]
    fn test_decode_empty_batch() {
        let err = decode_batch(b"\n  \n").unwrap_err();
        assert!(err.is_empty_batch());
        assert_eq!(err.to_string(), "Empty batch");
    }

    // ============================================================================
    // Responses
    // ============================================================================

    #[test]
    fn test_encode_success_with_list_body() {
        let mut head = Map::new();
        head.insert("columns".into(), Value::List(vec![Value::from("n")]));
        let response = Response::Success {
            head: Some(head),
            body: Some(Body::List(vec![Value::Int(1), Value::Int(2)])),
            foot: Some(Map::new()),
        };
        assert_eq!(
            encode(&response),
            vec![r#"head: {"columns":["n"]}"#, "body:", "- 1", "- 2", "foot: {}"]
        );
    }

    #[test]
    fn test_encode_failure() {
        let response = Response::failure(&Error::not_found("Node 9 not found"));
        assert_eq!(encode(&response), vec![r#"error: {"status":404,"message":"Node 9 not found"}"#]);
    }

    #[test]
    fn test_decode_responses_stream() {
        let frames: Vec<Vec<u8>> = [
            "body: 1",
            "---",
            "head: {\"columns\":[\"x\"]}",
            "body:",
            "- [1]",
            "- [2]",
            "foot: {}",
            "---",
            "---",
            r#"error: {"status":405,"message":"Method SET not allowed on resource Cypher"}"#,
        ]
        .iter()
        .map(|l| l.as_bytes().to_vec())
        .collect();

        let responses = decode_responses(&frames).unwrap();
        assert_eq!(responses.len(), 4);
        assert_eq!(responses[0].first_value(), Some(&Value::Int(1)));
        match responses[1].body() {
            Some(Body::List(items)) => assert_eq!(items.len(), 2),
            other => panic!("Expected list body, got {:?}", other),
        }
        assert_eq!(responses[2], Response::Success { head: None, body: None, foot: None });
        assert_eq!(responses[3].status(), Some(Status::MethodNotAllowed));
    }

    #[test]
    fn test_decode_responses_rejects_invalid_utf8() {
        let frames: Vec<Vec<u8>> = vec![b"body: \"\xfe\"".to_vec()];
        assert_eq!(decode_responses(&frames).unwrap_err().status(), Status::BadRequest);
    }

    #[test]
    fn test_decode_trailing_empty_response() {
        let frames: Vec<Vec<u8>> = vec![b"body: 1".to_vec(), b"---".to_vec()];
        let responses = decode_responses(&frames).unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[1], Response::Success { head: None, body: None, foot: None });
    }
}

//! Streaming response writer
//!
//! One `Responder` per batch. It enforces the shape of every response
//! (`head? (body | body-list) foot?` or a single `error`) and writes each
//! line as a frame as soon as it is produced.

use crossbeam_channel::Sender;
use tracing::trace;

use crate::error::{Error, Result, Status};
use crate::protocol::codec;
use crate::value::{Entity, Map, Value};

/// Destination of response frames
pub trait FrameSink: Send {
    fn send_frame(&mut self, frame: Vec<u8>) -> std::io::Result<()>;
}

impl FrameSink for Vec<Vec<u8>> {
    fn send_frame(&mut self, frame: Vec<u8>) -> std::io::Result<()> {
        self.push(frame);
        Ok(())
    }
}

/// Frames handed back to the connection thread that owns the socket
impl FrameSink for Sender<Vec<u8>> {
    fn send_frame(&mut self, frame: Vec<u8>) -> std::io::Result<()> {
        self.send(frame).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "Client connection is gone")
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    Begin,
    Head,
    Body,
    BodyList,
    EndBodyList,
    Foot,
    Error,
    End,
}

pub struct Responder {
    sink: Box<dyn FrameSink>,
    state: ResponseState,
    list_len: usize,
    error_status: Option<Status>,
    responses: usize,
}

impl Responder {
    pub fn new(sink: impl FrameSink + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            state: ResponseState::End,
            list_len: 0,
            error_status: None,
            responses: 0,
        }
    }

    pub fn state(&self) -> ResponseState {
        self.state
    }

    /// Number of responses completed in this batch
    pub fn response_count(&self) -> usize {
        self.responses
    }

    fn violation(&self, operation: &'static str) -> Error {
        Error::ProtocolViolation { operation, state: self.state }
    }

    fn write(&mut self, line: String) -> Result<()> {
        trace!(line = %line, "Response line");
        self.sink.send_frame(line.into_bytes())?;
        Ok(())
    }

    pub fn begin_batch(&mut self) {
        self.state = ResponseState::End;
        self.responses = 0;
    }

    pub fn begin_response(&mut self) -> Result<()> {
        if self.state != ResponseState::End {
            return Err(self.violation("begin_response"));
        }
        if self.responses > 0 {
            self.write(codec::SEPARATOR.to_string())?;
        }
        self.state = ResponseState::Begin;
        self.list_len = 0;
        self.error_status = None;
        Ok(())
    }

    pub fn send_head(&mut self, head: &Map) -> Result<()> {
        if self.state != ResponseState::Begin {
            return Err(self.violation("send_head"));
        }
        self.write(codec::head_line(head))?;
        self.state = ResponseState::Head;
        Ok(())
    }

    pub fn send_body(&mut self, body: &Value) -> Result<()> {
        if !matches!(self.state, ResponseState::Begin | ResponseState::Head) {
            return Err(self.violation("send_body"));
        }
        self.write(codec::body_line(body))?;
        self.state = ResponseState::Body;
        Ok(())
    }

    /// Open a list body. The `body:` line is deferred until the first item
    /// so that an empty list can be rendered as `body: []`.
    pub fn start_body_list(&mut self) -> Result<()> {
        if !matches!(self.state, ResponseState::Begin | ResponseState::Head) {
            return Err(self.violation("start_body_list"));
        }
        self.state = ResponseState::BodyList;
        self.list_len = 0;
        Ok(())
    }

    pub fn send_body_item(&mut self, item: &Value) -> Result<()> {
        if self.state != ResponseState::BodyList {
            return Err(self.violation("send_body_item"));
        }
        if self.list_len == 0 {
            self.write(codec::body_list_start_line())?;
        }
        self.write(codec::body_item_line(item))?;
        self.list_len += 1;
        Ok(())
    }

    pub fn end_body_list(&mut self) -> Result<()> {
        if self.state != ResponseState::BodyList {
            return Err(self.violation("end_body_list"));
        }
        if self.list_len == 0 {
            self.write(codec::empty_body_list_line())?;
        }
        self.state = ResponseState::EndBodyList;
        Ok(())
    }

    pub fn send_foot(&mut self, foot: &Map) -> Result<()> {
        if !matches!(self.state, ResponseState::Body | ResponseState::EndBodyList) {
            return Err(self.violation("send_foot"));
        }
        self.write(codec::foot_line(foot))?;
        self.state = ResponseState::Foot;
        Ok(())
    }

    /// Legal from any state; the response becomes a failure.
    pub fn send_error(&mut self, error: &Error) -> Result<()> {
        let status = error.status();
        if self.state == ResponseState::End {
            // A failure outside any response still needs its own slot
            self.begin_response()?;
        }
        self.write(codec::error_line(status, &error.to_string()))?;
        self.state = ResponseState::Error;
        self.error_status = Some(status);
        Ok(())
    }

    /// Close the current response and report its terminal status.
    pub fn end_response(&mut self) -> Result<Status> {
        let status = match self.state {
            ResponseState::Begin => Status::NoContent,
            ResponseState::Body | ResponseState::EndBodyList | ResponseState::Foot => Status::Ok,
            ResponseState::Error => self.error_status.unwrap_or(Status::ServerError),
            ResponseState::Head | ResponseState::BodyList | ResponseState::End => {
                return Err(self.violation("end_response"))
            }
        };
        self.state = ResponseState::End;
        self.responses += 1;
        Ok(status)
    }

    /// Write the empty frame that terminates the batch.
    pub fn end_batch(&mut self) -> Result<()> {
        if self.state != ResponseState::End {
            return Err(self.violation("end_batch"));
        }
        self.sink.send_frame(Vec::new())?;
        Ok(())
    }

    /// Stream entities as a list body; the first one is the request's output.
    pub fn send_entities<I>(&mut self, entities: I) -> Result<Option<Entity>>
    where
        I: IntoIterator<Item = Entity>,
    {
        self.start_body_list()?;
        let mut first = None;
        for entity in entities {
            let value = Value::from(entity.clone());
            self.send_body_item(&value)?;
            if first.is_none() {
                first = Some(entity);
            }
        }
        self.end_body_list()?;
        Ok(first)
    }
}


#[cfg(test)]
mod responder_tests {
    use super::testing::SharedSink;
    use super::*;

    fn responder() -> (Responder, SharedSink) {
        let sink = SharedSink::default();
        let mut responder = Responder::new(sink.clone());
        responder.begin_batch();
        (responder, sink)
    }

    // ============================================================================
    // Well-formed responses
    // ============================================================================

    #[test]
    fn test_head_list_foot_sequence() {
        let (mut r, sink) = responder();
        r.begin_response().unwrap();
        let mut head = Map::new();
        head.insert("columns".into(), Value::List(vec![Value::from("n")]));
        r.send_head(&head).unwrap();
        r.start_body_list().unwrap();
        r.send_body_item(&Value::Int(1)).unwrap();
        r.send_body_item(&Value::Int(2)).unwrap();
        r.end_body_list().unwrap();
        r.send_foot(&Map::new()).unwrap();
        assert_eq!(r.end_response().unwrap(), Status::Ok);
        r.end_batch().unwrap();

        assert_eq!(
            sink.lines(),
            vec![r#"head: {"columns":["n"]}"#, "body:", "- 1", "- 2", "foot: {}", ""]
        );
    }

    #[test]
    fn test_empty_list_renders_inline() {
        let (mut r, sink) = responder();
        r.begin_response().unwrap();
        r.start_body_list().unwrap();
        r.end_body_list().unwrap();
        r.end_response().unwrap();
        assert_eq!(sink.lines(), vec!["body: []"]);
    }

    #[test]
    fn test_separator_between_responses() {
        let (mut r, sink) = responder();
        for i in 0..3 {
            r.begin_response().unwrap();
            r.send_body(&Value::Int(i)).unwrap();
            r.end_response().unwrap();
        }
        r.end_batch().unwrap();
        assert_eq!(sink.lines(), vec!["body: 0", "---", "body: 1", "---", "body: 2", ""]);
        assert_eq!(r.response_count(), 3);
    }

    #[test]
    fn test_empty_response_is_no_content() {
        let (mut r, _) = responder();
        r.begin_response().unwrap();
        assert_eq!(r.end_response().unwrap(), Status::NoContent);
    }

    // ============================================================================
    // Errors and violations
    // ============================================================================

    #[test]
    fn test_error_from_open_list() {
        let (mut r, sink) = responder();
        r.begin_response().unwrap();
        r.start_body_list().unwrap();
        r.send_body_item(&Value::Int(1)).unwrap();
        r.send_error(&Error::Conflict("Write conflict".into())).unwrap();
        assert_eq!(r.end_response().unwrap(), Status::Conflict);
        let lines = sink.lines();
        assert_eq!(lines.last().unwrap(), r#"error: {"status":409,"message":"Write conflict"}"#);
    }

    #[test]
    fn test_out_of_order_calls_are_violations() {
        let (mut r, _) = responder();
        assert!(matches!(r.send_body(&Value::Null), Err(Error::ProtocolViolation { .. })));

        r.begin_response().unwrap();
        assert!(r.send_body_item(&Value::Null).is_err());
        assert!(r.send_foot(&Map::new()).is_err());

        r.send_head(&Map::new()).unwrap();
        assert!(r.send_head(&Map::new()).is_err());
        // Head without a body cannot end
        let err = r.end_response().unwrap_err();
        assert_eq!(err.status(), Status::ServerError);

        r.start_body_list().unwrap();
        assert!(r.end_response().is_err());
        assert!(r.end_batch().is_err());
    }

    #[test]
    fn test_send_entities_returns_first() {
        use crate::value::Node;
        let (mut r, sink) = responder();
        r.begin_response().unwrap();
        let nodes = (0..2).map(|id| Entity::Node(Node { id, labels: Default::default(), properties: Default::default() }));
        let first = r.send_entities(nodes).unwrap();
        assert_eq!(first.map(|e| e.id()), Some(0));
        assert_eq!(sink.lines().len(), 3);
    }

    #[test]
    fn test_channel_sink_reports_closed_peer() {
        let (tx, rx) = crossbeam_channel::unbounded::<Vec<u8>>();
        drop(rx);
        let mut r = Responder::new(tx);
        r.begin_batch();
        r.begin_response().unwrap();
        assert!(matches!(r.send_body(&Value::Null), Err(Error::Io(_))));
    }
}

//! Error types for the Zerograph server

use thiserror::Error;

use crate::protocol::Verb;
use crate::protocol::responder::ResponseState;

pub type Result<T> = std::result::Result<T, Error>;

/// Response status carried by every terminal response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    Created,
    NoContent,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    Conflict,
    ServerError,
    NotImplemented,
}

impl Status {
    pub fn code(&self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Created => 201,
            Status::NoContent => 204,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::MethodNotAllowed => 405,
            Status::Conflict => 409,
            Status::ServerError => 500,
            Status::NotImplemented => 501,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Created => "Created",
            Status::NoContent => "No Content",
            Status::BadRequest => "Bad Request",
            Status::NotFound => "Not Found",
            Status::MethodNotAllowed => "Method Not Allowed",
            Status::Conflict => "Conflict",
            Status::ServerError => "Server Error",
            Status::NotImplemented => "Not Implemented",
        }
    }

    pub fn from_code(code: u16) -> Option<Status> {
        Some(match code {
            200 => Status::Ok,
            201 => Status::Created,
            204 => Status::NoContent,
            400 => Status::BadRequest,
            404 => Status::NotFound,
            405 => Status::MethodNotAllowed,
            409 => Status::Conflict,
            500 => Status::ServerError,
            501 => Status::NotImplemented,
            _ => return None,
        })
    }

    pub fn is_success(&self) -> bool {
        self.code() < 300
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.code())
    }

    pub fn is_server_error(&self) -> bool {
        self.code() >= 500
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Method {verb} not allowed on resource {resource}")]
    MethodNotAllowed { verb: Verb, resource: String },

    #[error("{0}")]
    Conflict(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Malformed response: {operation} is not allowed in state {state:?}")]
    ProtocolViolation {
        operation: &'static str,
        state: ResponseState,
    },

    // Service lifecycle variants
    #[error("No graph store exists for {host}:{port}")]
    NoSuchGraph { host: String, port: u16 },

    #[error("Graph {host}:{port} is not started")]
    GraphNotStarted { host: String, port: u16 },

    #[error("Invalid graph address: {0}")]
    InvalidGraphAddress(String),

    #[error("Not executed: batch aborted at request {failed_at}")]
    Skipped { failed_at: usize, status: Status },

    #[error("Query error: {0}")]
    Query(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Server error: {0}")]
    Server(String),
}

impl Error {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Error::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound(message.into())
    }

    /// Status class reported to the client for this error
    pub fn status(&self) -> Status {
        match self {
            Error::BadRequest(_) | Error::InvalidGraphAddress(_) | Error::Query(_) => Status::BadRequest,
            Error::NotFound(_) | Error::NoSuchGraph { .. } | Error::GraphNotStarted { .. } => Status::NotFound,
            Error::MethodNotAllowed { .. } => Status::MethodNotAllowed,
            Error::Conflict(_) => Status::Conflict,
            Error::NotImplemented(_) => Status::NotImplemented,
            Error::Skipped { status, .. } => *status,
            Error::ProtocolViolation { .. } | Error::Io(_) | Error::Json(_) | Error::Server(_) => {
                Status::ServerError
            }
        }
    }

    /// Get error code for wire protocol
    pub fn code(&self) -> &'static str {
        match self {
            Error::BadRequest(_) => "BAD_REQUEST",
            Error::NotFound(_) => "NOT_FOUND",
            Error::MethodNotAllowed { .. } => "METHOD_NOT_ALLOWED",
            Error::Conflict(_) => "CONFLICT",
            Error::NotImplemented(_) => "NOT_IMPLEMENTED",
            Error::ProtocolViolation { .. } => "MALFORMED_RESPONSE",
            Error::NoSuchGraph { .. } => "NO_SUCH_GRAPH",
            Error::GraphNotStarted { .. } => "GRAPH_NOT_STARTED",
            Error::InvalidGraphAddress(_) => "INVALID_GRAPH_ADDRESS",
            Error::Skipped { .. } => "NOT_EXECUTED",
            Error::Query(_) => "QUERY_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }
}

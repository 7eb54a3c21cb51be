//! Wire protocol: frames, request/response lines and the response writer

pub mod codec;
pub mod frame;
pub mod responder;
pub mod text;

pub use codec::{decode_batch, Arguments, Batch, Body, DecodeError, Request, Response, Verb};
pub use responder::{FrameSink, Responder, ResponseState};

//! Zerograph - batch-transactional graph resource server
//!
//! Clients send batches of `VERB Resource {arguments}` lines over framed TCP.
//! Each batch runs in one transaction against one graph store and every
//! request gets one streamed response (`head`, `body`, `foot` or `error`).
//!
//! # Overview
//!
//! - `protocol`: framing, request and response codec, the `Responder`
//! - `resource`: the named resources and their verbs
//! - `executor`: pointer resolution and transactional batch execution
//! - `service`: broker, workers and the `ServiceManager` lifecycle
//! - `graph`: the store traits and the in-memory reference store
//! - `server`: the root control service tying it together

pub mod config;
pub mod error;
pub mod executor;
pub mod graph;
pub mod metrics;
pub mod protocol;
pub mod resource;
pub mod server;
pub mod service;
pub mod value;

pub use config::Config;
pub use error::{Error, Result, Status};
pub use server::Server;

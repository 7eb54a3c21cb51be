//! BatchExecutor - runs one batch inside one transaction
//!
//! # Overview
//!
//! For each request, in order: resolve pointer arguments against the
//! outputs of the requests before it, dispatch to the named resource and
//! close its response. The first failure rolls the transaction back; every
//! request after it is answered with a "not executed" failure carrying the
//! same status, so each request gets exactly one terminal response. When
//! every request succeeded the transaction is committed, and a failed
//! commit is reported as one extra trailing response.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::{Error, Result, Status};
use crate::graph::{GraphStore, Transaction};
use crate::protocol::{Batch, Request, Responder, Verb};
use crate::resource::{invoke, Context, ResourceRegistry};
use crate::value::{Entity, Value};

/// What happened to a batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    /// Terminal status of every response sent, trailing commit failure included
    pub statuses: Vec<Status>,
    pub committed: bool,
}

impl BatchOutcome {
    pub fn first_failure(&self) -> Option<(usize, Status)> {
        self.statuses
            .iter()
            .enumerate()
            .find(|(_, status)| !status.is_success())
            .map(|(index, status)| (index, *status))
    }
}

pub struct BatchExecutor {
    registry: Arc<ResourceRegistry>,
}

impl BatchExecutor {
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Run `batch` against `store` (absent on the control service), streaming
    /// every response through `responder`. The caller ends the batch with
    /// `Responder::end_batch` once it is done with the outcome.
    ///
    /// Request failures are reported to the client, not returned. An `Err`
    /// means the responder itself failed, usually because the client is gone.
    pub fn run(&self, batch: &Batch, store: Option<&dyn GraphStore>, responder: &mut Responder) -> Result<BatchOutcome> {
        responder.begin_batch();

        let (mut tx, mut begin_error) = match store.map(|store| store.begin()).transpose() {
            Ok(tx) => (tx, None),
            Err(e) => (None, Some(e)),
        };

        let mut statuses = Vec::with_capacity(batch.len() + 1);
        let mut outputs: Vec<Option<Entity>> = Vec::with_capacity(batch.len());
        let mut failure: Option<(usize, Status)> = None;

        for (index, request) in batch.requests.iter().enumerate() {
            responder.begin_response()?;

            if let Some((failed_at, status)) = failure {
                responder.send_error(&Error::Skipped { failed_at, status })?;
                statuses.push(responder.end_response()?);
                outputs.push(None);
                continue;
            }

            let result = match begin_error.take() {
                Some(e) => Err(e),
                None => self
                    .dispatch(index, request, &outputs, tx.as_deref_mut(), responder)
                    .and_then(|output| responder.end_response().map(|status| (output, status))),
            };

            match result {
                Ok((output, status)) => {
                    let status = match (request.verb, status) {
                        (Verb::Create, Status::Ok) => Status::Created,
                        (_, status) => status,
                    };
                    statuses.push(status);
                    outputs.push(output);
                }
                Err(e) => {
                    debug!(index, request = %request, error = %e, "Request failed, aborting batch");
                    responder.send_error(&e)?;
                    let status = responder.end_response()?;
                    statuses.push(status);
                    outputs.push(None);
                    failure = Some((index, status));
                    if let Some(tx) = tx.take() {
                        tx.rollback();
                    }
                }
            }
        }

        let mut committed = false;
        if failure.is_none() {
            match tx.take().map(|tx| tx.commit()).transpose() {
                Ok(_) => committed = true,
                Err(e) => {
                    warn!(error = %e, requests = batch.len(), "Commit failed");
                    responder.send_error(&e)?;
                    statuses.push(responder.end_response()?);
                }
            }
        }

        Ok(BatchOutcome { statuses, committed })
    }

    fn dispatch(
        &self,
        index: usize,
        request: &Request,
        outputs: &[Option<Entity>],
        tx: Option<&mut (dyn Transaction + 'static)>,
        responder: &mut Responder,
    ) -> Result<Option<Entity>> {
        let mut request = request.clone();
        for value in request.arguments.values_mut() {
            resolve_pointers(value, index, outputs)?;
        }
        let resource = self.registry.dispatch(&request.resource)?;

        let mut ctx = Context::new(responder, tx);
        catch_unwind(AssertUnwindSafe(|| invoke(resource, &request, &mut ctx))).unwrap_or_else(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(request = %request, panic = %message, "Resource panicked");
            Err(Error::Server(format!("{} {} failed: {}", request.verb, request.resource, message)))
        })
    }
}

/// Replace every pointer inside `value` by the entity it refers to.
///
/// A pointer may only name an earlier request of the batch that produced an
/// entity.
pub fn resolve_pointers(value: &mut Value, index: usize, outputs: &[Option<Entity>]) -> Result<()> {
    match value {
        Value::Pointer(target) => {
            let target = *target;
            if target >= index {
                return Err(Error::bad_request(format!(
                    "Pointer {} in request {} does not refer to an earlier request",
                    target, index
                )));
            }
            match outputs.get(target) {
                Some(Some(entity)) => {
                    *value = Value::from(entity.clone());
                    Ok(())
                }
                _ => Err(Error::bad_request(format!("Request {} produced no entity to point at", target))),
            }
        }
        Value::List(items) => items.iter_mut().try_for_each(|item| resolve_pointers(item, index, outputs)),
        Value::Map(map) => map.values_mut().try_for_each(|item| resolve_pointers(item, index, outputs)),
        _ => Ok(()),
    }
}

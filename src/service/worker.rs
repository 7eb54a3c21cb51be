//! Worker pool of a service
//!
//! Every worker blocks on the service's backend queue, decodes one batch,
//! runs it and streams the response frames back through the envelope's
//! reply channel. A failing batch never takes the worker down with it.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{select, Receiver, TryRecvError};
use tracing::{debug, info, warn};

use super::broker::Envelope;
use crate::error::Result;
use crate::executor::BatchExecutor;
use crate::graph::GraphStore;
use crate::metrics::Metrics;
use crate::protocol::codec::join_frames;
use crate::protocol::{decode_batch, DecodeError, Responder, Verb};

/// Everything the workers of one service share
pub struct WorkerShared {
    pub executor: BatchExecutor,
    pub store: Option<Arc<dyn GraphStore>>,
    pub metrics: Arc<Metrics>,
    /// `host:port` of the service, for logs
    pub service: String,
}

pub fn spawn_workers(
    count: usize,
    shared: Arc<WorkerShared>,
    backend: Receiver<Envelope>,
    shutdown: Receiver<()>,
) -> Result<Vec<JoinHandle<()>>> {
    (0..count)
        .map(|index| {
            let shared = Arc::clone(&shared);
            let backend = backend.clone();
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name(format!("zg-worker-{}", index))
                .spawn(move || worker_loop(index, &shared, &backend, &shutdown))
                .map_err(Into::into)
        })
        .collect()
}

fn worker_loop(index: usize, shared: &WorkerShared, backend: &Receiver<Envelope>, shutdown: &Receiver<()>) {
    debug!(service = %shared.service, worker = index, "Worker started");
    loop {
        // Stop requests win over queued batches
        if !matches!(shutdown.try_recv(), Err(TryRecvError::Empty)) {
            break;
        }
        select! {
            recv(backend) -> envelope => match envelope {
                Ok(envelope) => handle_envelope(shared, envelope),
                Err(_) => break,
            },
            recv(shutdown) -> _ => break,
        }
    }
    debug!(service = %shared.service, worker = index, "Worker stopped");
}

/// Run one request message and stream its response.
pub fn handle_envelope(shared: &WorkerShared, envelope: Envelope) {
    let started = Instant::now();
    let client = envelope.client;
    let bytes = join_frames(&envelope.frames);
    let mut responder = Responder::new(envelope.reply);

    let batch = match decode_batch(&bytes) {
        Ok(batch) => batch,
        Err(error) => {
            debug!(service = %shared.service, client, error = %error, "Rejected batch");
            shared.metrics.record_batch(&[], elapsed_ms(started), false, "<malformed>");
            if let Err(e) = reject(&mut responder, &error) {
                debug!(client, error = %e, "Could not report decode failure");
            }
            return;
        }
    };

    let verbs: Vec<Verb> = batch.requests.iter().map(|r| r.verb).collect();
    let summary = batch
        .requests
        .first()
        .map(|r| format!("{} {}", r.verb, r.resource))
        .unwrap_or_default();

    match shared.executor.run(&batch, shared.store.as_deref(), &mut responder) {
        Ok(outcome) => {
            let duration_ms = elapsed_ms(started);
            // Recorded before the terminator so a client that saw the end of
            // its batch also sees it in the metrics
            shared.metrics.record_batch(&verbs, duration_ms, outcome.committed, &summary);
            if let Err(e) = responder.end_batch() {
                debug!(client, error = %e, "Could not end batch");
            }
            match outcome.first_failure() {
                None => debug!(service = %shared.service, client, requests = verbs.len(), duration_ms, "Batch committed"),
                Some((index, status)) => info!(
                    service = %shared.service,
                    client,
                    requests = verbs.len(),
                    failed_at = index,
                    status = status.code(),
                    "Batch aborted"
                ),
            }
        }
        Err(e) => {
            shared.metrics.record_batch(&verbs, elapsed_ms(started), false, &summary);
            warn!(service = %shared.service, client, error = %e, "Batch abandoned, response stream failed");
        }
    }
}

/// Answer an undecodable message: one 400 per request line, or a single
/// 400 for an empty message.
fn reject(responder: &mut Responder, error: &DecodeError) -> Result<()> {
    responder.begin_batch();
    if error.is_empty_batch() {
        responder.send_error(&crate::error::Error::bad_request(error.to_string()))?;
        responder.end_response()?;
    } else {
        for line in 1..=error.line_count {
            responder.begin_response()?;
            responder.send_error(&error.error_for_line(line))?;
            responder.end_response()?;
        }
    }
    responder.end_batch()
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod worker_tests {
    use super::*;
    use crate::graph::MemoryGraph;
    use crate::protocol::codec::decode_responses;
    use crate::protocol::Response;
    use crate::resource::ResourceRegistry;
    use crate::error::Status;

    fn shared() -> WorkerShared {
        WorkerShared {
            executor: BatchExecutor::new(Arc::new(ResourceRegistry::graph())),
            store: Some(Arc::new(MemoryGraph::new())),
            metrics: Arc::new(Metrics::default()),
            service: "test".into(),
        }
    }

    /// Hand one message to `handle_envelope` and collect the responses
    fn exchange(shared: &WorkerShared, message: &[&str]) -> Vec<Response> {
        let (reply, replies) = crossbeam_channel::unbounded();
        let frames = message.iter().map(|l| l.as_bytes().to_vec()).collect();
        handle_envelope(shared, Envelope { client: 1, frames, reply });

        let mut frames: Vec<Vec<u8>> = replies.try_iter().collect();
        assert_eq!(frames.pop(), Some(Vec::new()));
        decode_responses(&frames).unwrap()
    }

    #[test]
    fn test_batch_across_frames() {
        let shared = shared();
        let responses = exchange(&shared, &[r#"CREATE Node {"labels":["A"]}"#, "GET NodeSet {\"label\":\"A\"}"]);
        assert_eq!(responses.len(), 2);
        assert!(responses.iter().all(Response::is_success));
        assert_eq!(shared.metrics.snapshot().committed_count, 1);
    }

    #[test]
    fn test_malformed_lines_reject_whole_batch() {
        let shared = shared();
        let responses = exchange(&shared, &["CREATE Node {}\r\nFETCH Node {}\r\nCREATE Node {"]);
        assert_eq!(responses.len(), 3);
        for response in &responses {
            assert_eq!(response.status(), Some(Status::BadRequest));
        }
        let Response::Failure { message, .. } = &responses[1] else { panic!() };
        assert!(message.starts_with("Line 2:"));
        let Response::Failure { message, .. } = &responses[0] else { panic!() };
        assert!(message.contains("line 2"));
        assert_eq!(shared.store.as_ref().unwrap().node_count(), 0);
    }

    #[test]
    fn test_empty_message() {
        let shared = shared();
        let responses = exchange(&shared, &["\n\n"]);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0], Response::Failure { status: Status::BadRequest, message: "Empty batch".into() });
        assert_eq!(shared.metrics.snapshot().aborted_count, 1);
    }

    #[test]
    fn test_workers_stop_on_shutdown() {
        let (backend_tx, backend) = crossbeam_channel::unbounded::<Envelope>();
        let (stop, shutdown) = crossbeam_channel::bounded::<()>(0);
        let handles = spawn_workers(3, Arc::new(shared()), backend, shutdown).unwrap();
        drop(stop);
        for handle in handles {
            handle.join().unwrap();
        }
        drop(backend_tx);
    }
}

//! Broker - routes client connections to a service's workers
//!
//! # Architecture
//!
//! - One acceptor thread per service binds the frontend TCP address
//! - One forwarding thread per connection reads a request message, hands it
//!   to the backend queue as an `Envelope` and relays the reply frames back
//! - Whichever worker is idle takes the next envelope off the queue
//!
//! Forwarding threads never touch the store, so a slow batch only holds up
//! the worker running it and the client waiting for it.

use std::collections::HashMap;
use std::io::BufReader;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{select, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::session::{ClientId, ClientSession};
use crate::error::Result;
use crate::protocol::frame::{read_message, write_frame};

static NEXT_CLIENT_ID: AtomicUsize = AtomicUsize::new(1);

/// One request message on its way to a worker
pub struct Envelope {
    pub client: ClientId,
    pub frames: Vec<Vec<u8>>,
    /// Response frames, terminated by an empty frame
    pub reply: Sender<Vec<u8>>,
}

type Connections = Arc<Mutex<HashMap<ClientId, TcpStream>>>;

pub struct Broker {
    local_addr: SocketAddr,
    stopping: Arc<AtomicBool>,
    connections: Connections,
    forwarders: Arc<Mutex<Vec<JoinHandle<()>>>>,
    acceptor: Option<JoinHandle<()>>,
}

impl Broker {
    /// Bind `host:port` and start accepting. `shutdown` disconnecting tells
    /// forwarding threads to give up on replies still pending.
    pub fn bind(host: &str, port: u16, backend: Sender<Envelope>, shutdown: Receiver<()>) -> Result<Broker> {
        let listener = TcpListener::bind((host, port))?;
        let local_addr = listener.local_addr()?;
        let stopping = Arc::new(AtomicBool::new(false));
        let connections: Connections = Arc::new(Mutex::new(HashMap::new()));
        let forwarders = Arc::new(Mutex::new(Vec::new()));

        let acceptor = {
            let stopping = Arc::clone(&stopping);
            let connections = Arc::clone(&connections);
            let forwarders = Arc::clone(&forwarders);
            thread::Builder::new()
                .name(format!("zg-broker-{}", local_addr.port()))
                .spawn(move || accept_loop(listener, backend, shutdown, stopping, connections, forwarders))?
        };

        debug!(addr = %local_addr, "Broker listening");
        Ok(Broker {
            local_addr,
            stopping,
            connections,
            forwarders,
            acceptor: Some(acceptor),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Stop accepting, close every client socket and wait for the
    /// forwarding threads. Idempotent.
    pub fn shutdown(&mut self) {
        let Some(acceptor) = self.acceptor.take() else {
            return;
        };
        self.stopping.store(true, Ordering::SeqCst);

        // Unblock accept()
        if let Err(e) = TcpStream::connect_timeout(&wake_addr(self.local_addr), Duration::from_secs(1)) {
            warn!(addr = %self.local_addr, error = %e, "Could not wake acceptor");
        }
        if acceptor.join().is_err() {
            warn!(addr = %self.local_addr, "Acceptor thread panicked");
        }

        for (_, stream) in self.connections.lock().drain() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        let forwarders: Vec<_> = self.forwarders.lock().drain(..).collect();
        for handle in forwarders {
            let _ = handle.join();
        }
        debug!(addr = %self.local_addr, "Broker stopped");
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Address a local connect can reach for a listener bound to `addr`
fn wake_addr(addr: SocketAddr) -> SocketAddr {
    let ip = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, addr.port())
}

fn accept_loop(
    listener: TcpListener,
    backend: Sender<Envelope>,
    shutdown: Receiver<()>,
    stopping: Arc<AtomicBool>,
    connections: Connections,
    forwarders: Arc<Mutex<Vec<JoinHandle<()>>>>,
) {
    for stream in listener.incoming() {
        if stopping.load(Ordering::SeqCst) {
            break;
        }
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Accept error");
                continue;
            }
        };

        let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::SeqCst);
        match stream.try_clone() {
            Ok(handle) => {
                connections.lock().insert(client_id, handle);
            }
            Err(e) => {
                warn!(client = client_id, error = %e, "Cannot track connection");
                continue;
            }
        }

        let backend = backend.clone();
        let shutdown = shutdown.clone();
        let connections_for_client = Arc::clone(&connections);
        let spawned = thread::Builder::new()
            .name(format!("zg-client-{}", client_id))
            .spawn(move || {
                forward(stream, client_id, &backend, &shutdown);
                connections_for_client.lock().remove(&client_id);
            });

        let mut handles = forwarders.lock();
        handles.retain(|handle| !handle.is_finished());
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                warn!(client = client_id, error = %e, "Cannot spawn forwarding thread");
                connections.lock().remove(&client_id);
            }
        }
    }
}

/// Relay one connection until the client leaves or the service stops.
fn forward(stream: TcpStream, client_id: ClientId, backend: &Sender<Envelope>, shutdown: &Receiver<()>) {
    let peer = match stream.peer_addr() {
        Ok(peer) => peer,
        Err(e) => {
            debug!(client = client_id, error = %e, "Connection closed before it was served");
            return;
        }
    };
    let mut writer = match stream.try_clone() {
        Ok(writer) => writer,
        Err(e) => {
            warn!(client = client_id, error = %e, "Cannot clone client socket");
            return;
        }
    };
    if let Err(e) = writer.set_nodelay(true) {
        debug!(client = client_id, error = %e, "Cannot disable Nagle");
    }
    let mut reader = BufReader::new(stream);
    let mut session = ClientSession::new(client_id, peer);
    info!(client = client_id, peer = %peer, "Client connected");

    loop {
        let frames = match read_message(&mut reader) {
            Ok(Some(frames)) => frames,
            Ok(None) => break,
            Err(e) => {
                debug!(client = client_id, error = %e, "Read error");
                break;
            }
        };

        let (reply_tx, reply_rx) = crossbeam_channel::unbounded();
        let envelope = Envelope { client: client_id, frames, reply: reply_tx };
        if backend.send(envelope).is_err() {
            debug!(client = client_id, "Service is stopping, dropping request");
            break;
        }

        let complete = relay(&reply_rx, &mut writer, shutdown, client_id);
        session.record_batch(complete);
        if !complete {
            break;
        }
    }

    info!(
        client = client_id,
        peer = %session.peer,
        batches = session.batches,
        interrupted = session.interrupted,
        secs = session.connected_for().as_secs(),
        "Client disconnected"
    );
}

/// Copy reply frames to the client up to and including the empty
/// terminator. Returns whether the whole response got through.
fn relay(replies: &Receiver<Vec<u8>>, writer: &mut TcpStream, shutdown: &Receiver<()>, client_id: ClientId) -> bool {
    loop {
        let frame = select! {
            recv(replies) -> frame => match frame {
                Ok(frame) => frame,
                Err(_) => {
                    warn!(client = client_id, "Worker dropped the batch without finishing it");
                    return false;
                }
            },
            recv(shutdown) -> _ => return false,
        };

        let done = frame.is_empty();
        if let Err(e) = write_frame(writer, &frame) {
            debug!(client = client_id, error = %e, "Write error");
            return false;
        }
        if done {
            return true;
        }
    }
}

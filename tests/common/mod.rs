//! Shared helpers for integration tests: a blocking frame client and
//! server bootstrap.

#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use zerograph::protocol::codec::decode_responses;
use zerograph::protocol::frame::{read_message, write_message};
use zerograph::protocol::Response;
use zerograph::value::Value;
use zerograph::{Config, Server};

pub const HOST: &str = "127.0.0.1";

pub struct Client {
    stream: TcpStream,
}

impl Client {
    pub fn connect(addr: SocketAddr) -> Client {
        let stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
        Client { stream }
    }

    /// Send one batch (one line per frame) and return the raw response lines
    pub fn lines(&mut self, batch: &[&str]) -> Vec<String> {
        let frames: Vec<Vec<u8>> = batch.iter().map(|line| line.as_bytes().to_vec()).collect();
        write_message(&mut self.stream, &frames).unwrap();
        read_message(&mut self.stream)
            .unwrap()
            .expect("server closed the connection")
            .into_iter()
            .map(|frame| String::from_utf8(frame).unwrap())
            .collect()
    }

    /// Send one batch and decode its responses
    pub fn send(&mut self, batch: &[&str]) -> Vec<Response> {
        let frames: Vec<Vec<u8>> = self.lines(batch).into_iter().map(String::into_bytes).collect();
        decode_responses(&frames).unwrap()
    }
}

/// Control service on an ephemeral port, graphs in memory
pub fn start_server() -> Server {
    Server::start(Config::ephemeral(HOST, 0)).unwrap()
}

pub fn free_port() -> u16 {
    TcpListener::bind((HOST, 0)).unwrap().local_addr().unwrap().port()
}

/// Create and start a graph service through the control service
pub fn start_graph(server: &Server) -> (u16, Client) {
    let port = free_port();
    let mut control = Client::connect(server.local_addr());
    let create = format!(r#"CREATE Graph {{"host":"{}","port":{}}}"#, HOST, port);
    let responses = control.send(&[&create]);
    assert!(responses[0].is_success(), "graph start failed: {:?}", responses[0]);
    let addr: SocketAddr = format!("{}:{}", HOST, port).parse().unwrap();
    (port, Client::connect(addr))
}

pub fn node_id(response: &Response) -> u64 {
    match response.first_value() {
        Some(Value::Node(node)) => node.id,
        other => panic!("expected a node, got {:?}", other),
    }
}

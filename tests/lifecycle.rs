//! Integration test: graph service lifecycle.
//!
//! Validates that:
//! - start without create needs existing storage
//! - start is idempotent per host:port
//! - stop removes the service, and a second stop reports "not started"
//! - data survives stop/start, and `delete` removes it

mod common;

use std::sync::Arc;

use common::{free_port, start_server, Client, HOST};
use tempfile::TempDir;
use zerograph::graph::MemoryStoreFactory;
use zerograph::protocol::{Body, Response};
use zerograph::service::ServiceManager;
use zerograph::value::{GraphInfo, Value};
use zerograph::{Config, Error, Server, Status};

fn graph_info(response: &Response) -> GraphInfo {
    match response.first_value() {
        Some(Value::Graph(info)) => info.clone(),
        other => panic!("expected a graph descriptor, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Through the manager API
// ---------------------------------------------------------------------------

#[test]
fn start_and_stop_transitions() {
    let manager = ServiceManager::new(Config::ephemeral(HOST, 0), Arc::new(MemoryStoreFactory::ephemeral()));
    let port = free_port();

    assert!(matches!(manager.start(HOST, port, false), Err(Error::NoSuchGraph { .. })));

    let running = manager.start(HOST, port, true).unwrap();
    assert!(running.is_running());
    let again = manager.start(HOST, port, true).unwrap();
    assert!(Arc::ptr_eq(&running, &again));

    manager.stop(HOST, port, false).unwrap();
    assert!(manager.get(HOST, port).is_none());
    assert!(!running.is_running());

    let err = manager.stop(HOST, port, false).unwrap_err();
    assert!(matches!(err, Error::GraphNotStarted { .. }));
    assert!(err.to_string().contains("not started"));
}

// ---------------------------------------------------------------------------
// Through the control service
// ---------------------------------------------------------------------------

#[test]
fn control_service_lifecycle_over_the_wire() {
    let server = start_server();
    let mut control = Client::connect(server.local_addr());
    let port = free_port();

    let patch = format!(r#"PATCH Graph {{"host":"{}","port":{}}}"#, HOST, port);
    let responses = control.send(&[&patch]);
    assert_eq!(responses[0].status(), Some(Status::NotFound));

    let start = format!(r#"PATCH Graph {{"host":"{}","port":{},"create":true}}"#, HOST, port);
    let info = graph_info(&control.send(&[&start])[0]);
    assert_eq!(info, GraphInfo { host: HOST.into(), port, running: true });
    let info = graph_info(&control.send(&[&start])[0]);
    assert!(info.running);
    assert_eq!(server.services().list().len(), 1);

    let stop = format!(r#"DELETE Graph {{"host":"{}","port":{}}}"#, HOST, port);
    let responses = control.send(&[&stop]);
    assert_eq!(responses[0], Response::Success { head: None, body: None, foot: None });
    let responses = control.send(&[&stop]);
    match &responses[0] {
        Response::Failure { status, message } => {
            assert_eq!(*status, Status::NotFound);
            assert!(message.contains("not started"));
        }
        other => panic!("expected a failure, got {:?}", other),
    }
}

#[test]
fn get_graph_lists_services_and_reports_metrics() {
    let server = start_server();
    let mut control = Client::connect(server.local_addr());
    let ports = [free_port(), free_port()];

    for port in ports {
        let create = format!(r#"CREATE Graph {{"port":{}}}"#, port);
        assert!(control.send(&[&create])[0].is_success());
    }

    let responses = control.send(&[r#"GET GraphMap {}"#]);
    match responses[0].body() {
        Some(Body::List(items)) => assert_eq!(items.len(), 2),
        other => panic!("expected a list, got {:?}", other),
    }

    let mut graph = Client::connect(format!("{}:{}", HOST, ports[0]).parse().unwrap());
    graph.send(&[r#"CREATE Node {}"#, r#"GET Node {"id*":0}"#]);

    let get = format!(r#"GET Graph {{"port":{}}}"#, ports[0]);
    let responses = control.send(&[&get]);
    let Response::Success { foot: Some(foot), .. } = &responses[0] else {
        panic!("expected metrics in the foot, got {:?}", responses[0]);
    };
    assert_eq!(foot.get("batch_count"), Some(&Value::Int(1)));
    assert_eq!(foot.get("committed_count"), Some(&Value::Int(1)));
    assert_eq!(foot.get("request_count"), Some(&Value::Int(2)));
}

#[test]
fn batch_of_control_requests_is_answered_in_order() {
    let server = start_server();
    let mut control = Client::connect(server.local_addr());
    let port = free_port();

    let create = format!(r#"CREATE Graph {{"port":{}}}"#, port);
    let stop = format!(r#"DELETE Graph {{"port":{}}}"#, port);
    let responses = control.send(&[&create, &stop, &stop]);
    assert_eq!(responses.len(), 3);
    assert!(responses[0].is_success());
    assert!(responses[1].is_success());
    assert_eq!(responses[2].status(), Some(Status::NotFound));
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn data_survives_restart_until_deleted() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::ephemeral(HOST, 0);
    config.data_dir = Some(dir.path().to_path_buf());
    let port = free_port();

    {
        let server = Server::start(config.clone()).unwrap();
        let mut control = Client::connect(server.local_addr());
        control.send(&[&format!(r#"CREATE Graph {{"port":{}}}"#, port)]);
        let mut graph = Client::connect(format!("{}:{}", HOST, port).parse().unwrap());
        let responses = graph.send(&[r#"CREATE Node {"labels":["Durable"],"properties":{"v":1}}"#]);
        assert!(responses[0].is_success());
        server.shutdown();
    }

    let server = Server::start(config).unwrap();
    let mut control = Client::connect(server.local_addr());
    let get = format!(r#"GET Graph {{"port":{}}}"#, port);
    let info = graph_info(&control.send(&[&get])[0]);
    assert!(!info.running);

    control.send(&[&format!(r#"PATCH Graph {{"port":{}}}"#, port)]);
    let mut graph = Client::connect(format!("{}:{}", HOST, port).parse().unwrap());
    let responses = graph.send(&[r#"GET NodeSet {"label":"Durable","key":"v","value":1}"#]);
    match responses[0].body() {
        Some(Body::List(items)) => assert_eq!(items.len(), 1),
        other => panic!("expected one node, got {:?}", other),
    }

    let delete = format!(r#"DELETE Graph {{"port":{},"delete":true}}"#, port);
    assert!(control.send(&[&delete])[0].is_success());
    assert_eq!(control.send(&[&get])[0].status(), Some(Status::NotFound));
    assert!(!dir.path().join(format!("{}_{}", HOST, port)).exists());
}

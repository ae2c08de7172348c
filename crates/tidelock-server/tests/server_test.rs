//! Request handling tests for `ServerContext`
//!
//! Covers the transport-agnostic surface: status codes, response and error
//! bodies, the operator probe, and replay protection across a restart.

use std::{path::PathBuf, time::Duration};

use serde_json::json;
use tempfile::tempdir;
use tidelock_core::{
    ClientSession, ErrorBody, InboundRequest, ManualEnv, MemoryStorage, ResponseEnvelope,
    SecurityPolicy, Status, UserId,
};
use tidelock_crypto::VaultKey;
use tidelock_server::{RedbStorage, ServerConfig, ServerContext, ServerError};

const T0: u64 = 1_710_000_000_000;
const W0: i64 = 57_000_000;
const USER: UserId = UserId(42);

fn config() -> ServerConfig {
    ServerConfig {
        vault_key: VaultKey::from_bytes([5; 32]),
        db_path: PathBuf::from("unused.redb"),
        sweep_interval: Duration::from_secs(60),
        policy: SecurityPolicy::default(),
    }
}

fn server() -> (ServerContext<ManualEnv, MemoryStorage>, ClientSession) {
    let server = ServerContext::new(ManualEnv::new(T0, 3), MemoryStorage::new(), config()).unwrap();
    let issued = server.issuer().rotate(server.storage(), USER).unwrap();
    let client = ClientSession::from_credentials(&issued, &SecurityPolicy::default());
    (server, client)
}

fn ping(client: &ClientSession, nonce: &str) -> String {
    client.seal_request(&json!({"action": "ping"}), W0, nonce, [4; 16]).unwrap().to_json()
}

#[test]
fn accepted_request_gets_sealed_reply() {
    let (server, client) = server();
    let body = ping(&client, "n-1");

    let reply = server.handle(USER, &InboundRequest::new(body.as_bytes()), |request| {
        assert_eq!(request.payload, json!({"action": "ping"}));
        json!({"pong": true})
    });

    assert_eq!(reply.status, 200);
    let response = ResponseEnvelope::from_json(reply.body.as_bytes()).unwrap();
    assert_eq!(response.status, Status::Success);
    assert_eq!(client.open_response(&response).unwrap(), json!({"pong": true}));
}

#[test]
fn replay_gets_error_body() {
    let (server, client) = server();
    let body = ping(&client, "n-1");
    let request = InboundRequest::new(body.as_bytes());

    assert_eq!(server.handle(USER, &request, |_| json!({})).status, 200);

    let reply = server.handle(USER, &request, |_| panic!("handler must not run on replay"));
    assert_eq!(reply.status, 403);

    let error: ErrorBody = serde_json::from_str(&reply.body).unwrap();
    assert_eq!(error.status, Status::Error);
    assert_eq!(error.code, "REPLAY_DETECTED");
}

#[test]
fn garbage_gets_bad_request() {
    let (server, _) = server();
    let reply = server.handle(USER, &InboundRequest::new(b"<html>"), |_| json!({}));

    assert_eq!(reply.status, 400);
    assert!(reply.body.contains("MALFORMED_ENVELOPE"));
}

#[test]
fn error_bodies_do_not_leak_internals() {
    let (server, client) = server();
    let body = ping(&client, "n-1");

    let reply = server.handle(UserId(7), &InboundRequest::new(body.as_bytes()), |_| json!({}));

    assert_eq!(reply.status, 500);
    assert!(!reply.body.contains("no secret record"));
    assert!(!reply.body.contains('7'));
}

#[test]
fn probe_roundtrips() {
    let (server, _) = server();

    let response = server.probe(USER).unwrap();
    assert_eq!(response["pong"], json!(true));
    assert_eq!(response["window"], json!(W0));
}

#[test]
fn probe_requires_issued_credentials() {
    let (server, _) = server();
    assert!(matches!(server.probe(UserId(9)), Err(ServerError::UnknownUser(UserId(9)))));
}

#[test]
fn replay_protection_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tidelock.redb");
    let env = ManualEnv::new(T0, 3);

    let (client, body) = {
        let storage = RedbStorage::open(&path).unwrap();
        let server = ServerContext::new(env.clone(), storage, config()).unwrap();
        let issued = server.issuer().rotate(server.storage(), USER).unwrap();
        let client = ClientSession::from_credentials(&issued, &SecurityPolicy::default());

        let body = ping(&client, "n-1");
        let reply = server.handle(USER, &InboundRequest::new(body.as_bytes()), |_| json!({}));
        assert_eq!(reply.status, 200);
        (client, body)
    };

    let server = ServerContext::new(env, RedbStorage::open(&path).unwrap(), config()).unwrap();

    let replayed = server.handle(USER, &InboundRequest::new(body.as_bytes()), |_| json!({}));
    assert_eq!(replayed.status, 403);

    let fresh = ping(&client, "n-2");
    assert_eq!(server.handle(USER, &InboundRequest::new(fresh.as_bytes()), |_| json!({})).status, 200);
}

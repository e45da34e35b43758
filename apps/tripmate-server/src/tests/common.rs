//! Common test helpers: a server over the in-memory store with a manual clock,
//! fixture builders, and a request helper for driving the router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::{SubsecRound, Utc};
use serde_json::Value;
use tower::ServiceExt;
use tripmate_storage::*;
use tripmate_store_memory::MemoryStore;

use crate::clock::ManualClock;
use crate::config::{ServerConfig, DEFAULT_IDENTITY_HEADER};
use crate::handlers;
use crate::invites::{IssueFlow, MaxUses};
use crate::server::TripServer;

pub struct TestServer {
    pub server: TripServer,
    pub clock: Arc<ManualClock>,
}

/// Test helper: TripServer over a fresh MemoryStore with a clock that only moves on request
pub fn create_test_server() -> TestServer {
    create_test_server_with(Arc::new(MemoryStore::new()), ServerConfig::default())
}

pub fn create_test_server_with(store: Arc<dyn Store>, config: ServerConfig) -> TestServer {
    let clock = Arc::new(ManualClock::new(Utc::now().trunc_subsecs(3)));
    let server = TripServer::with_clock(store, config, clock.clone());
    TestServer { server, clock }
}

pub fn user(name: &str) -> UserId {
    UserId::from(name)
}

/// Test helper: trip owned by `owner`, including its default list
pub async fn create_trip(server: &TripServer, owner: &UserId, name: &str) -> Trip {
    server
        .create_trip(owner, name, None)
        .await
        .expect("create trip")
        .trip
}

/// Test helper: add `member` straight through the store, bypassing invites
pub async fn add_member(server: &TripServer, trip: &Trip, member: &UserId) -> Trip {
    server
        .store
        .add_trip_owner(&trip.id, member)
        .await
        .expect("add owner")
}

/// Test helper: share-flow invite with the given limit
pub async fn share_invite(
    server: &TripServer,
    trip: &Trip,
    owner: &UserId,
    max_uses: MaxUses,
) -> InviteId {
    server
        .issue_invite(&trip.id, owner, max_uses, IssueFlow::Share)
        .await
        .expect("issue invite")
        .invite_id
}

/// Test helper: list → item → comment under the trip's first list
pub async fn seed_contents(
    server: &TripServer,
    trip: &Trip,
    author: &UserId,
) -> (List, ListItem, Comment) {
    let list = server
        .create_list(author, &trip.id, "Food")
        .await
        .expect("create list");
    let item = server
        .create_item(author, &list.id, "Ramen", None, None)
        .await
        .expect("create item");
    let comment = server
        .add_comment(author, &item.id, "Best broth in town")
        .await
        .expect("add comment");
    (list, item, comment)
}

/// Test helper: send one request through the router.
/// Returns the status and the parsed JSON body (`Value::Null` for an empty body).
pub async fn send(
    server: &TripServer,
    method: Method,
    uri: &str,
    actor: Option<&str>,
    body: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        builder = builder.header(DEFAULT_IDENTITY_HEADER, actor);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("build request");

    let response = handlers::router(server.clone())
        .oneshot(request)
        .await
        .expect("router is infallible");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("JSON response body")
    };
    (status, json)
}

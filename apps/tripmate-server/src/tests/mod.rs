//! Server unit and integration tests.
//!
//! Tests are organized into modules by feature area:
//! - `common` - Shared test helpers and utilities
//! - `invites` - Issuing, reusing, redeeming and revoking invites
//! - `access` - Containment-chain authorization
//! - `trips` - Trip contents, likes, member removal and cascading delete
//! - `propagation` - Partial-failure behaviour against a mocked store
//! - `http` - Status codes and JSON shapes through the router

pub mod common;

mod access;
mod propagation;

//! Behavioral specifications for jobletd.
//!
//! These tests are black-box: they spawn the real `jobletd` binary and
//! drive it over mutual-TLS gRPC, asserting on wire responses and status
//! codes rather than internals.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

#[path = "specs/auth.rs"]
mod auth;
#[path = "specs/lifecycle.rs"]
mod lifecycle;
#[path = "specs/monitoring.rs"]
mod monitoring;
#[path = "specs/resources.rs"]
mod resources;
#[path = "specs/validation.rs"]
mod validation;
#[path = "specs/workflow.rs"]
mod workflow;

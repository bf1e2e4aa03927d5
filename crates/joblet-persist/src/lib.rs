// SPDX-License-Identifier: MIT
//! Persistence sidecar client (§4.9): a fire-and-forget Unix-socket IPC
//! client that mirrors job state to an external sidecar process for
//! durability across daemon restarts.

#![forbid(unsafe_code)]

pub mod client;
pub mod message;

pub use client::PersistClient;
pub use message::{Op, Request, Response};

// SPDX-License-Identifier: MIT
//! In-memory job store and log bus (§4.1).

#![forbid(unsafe_code)]

pub mod ring;
pub mod store;
pub mod subscriber;

pub use ring::{LogRing, DEFAULT_RING_BYTES};
pub use store::Store;
pub use subscriber::{StreamEvent, Subscriber, SubscriberHandle};

// SPDX-License-Identifier: MIT
//! Upload transport (§4.2): stream user files into a job's workspace via a
//! named FIFO without buffering whole payloads in memory.

// `session::make_blocking` reconstructs a `File` from a raw fd it already
// owns to clear O_NONBLOCK; `unsafe_code` is not forbidden in this crate.

pub mod reader;
pub mod session;
pub mod wire;

pub use reader::unpack_session;
pub use session::{prepare_session, write_session, UploadSession, SESSION_TIMEOUT};

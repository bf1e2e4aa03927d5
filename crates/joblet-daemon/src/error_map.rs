// SPDX-License-Identifier: MIT
//! Error-kind to gRPC status mapping (§7's table).

use joblet_core::error::{ErrorKind, JobletError};
use tonic::{Code, Status};

pub fn to_status(err: JobletError) -> Status {
    let code = match err.kind {
        ErrorKind::Validation => Code::InvalidArgument,
        ErrorKind::NotFound => Code::NotFound,
        ErrorKind::AlreadyExists => Code::AlreadyExists,
        ErrorKind::PermissionDenied => Code::PermissionDenied,
        ErrorKind::Unauthenticated => Code::Unauthenticated,
        ErrorKind::ResourceExhausted => Code::ResourceExhausted,
        ErrorKind::Isolation => Code::FailedPrecondition,
        ErrorKind::Exec => Code::FailedPrecondition,
        ErrorKind::Timeout => Code::DeadlineExceeded,
        ErrorKind::Filesystem => Code::Internal,
        ErrorKind::Internal => Code::Internal,
    };
    Status::new(code, format!("{}: {}", err.identifier, err.message))
}

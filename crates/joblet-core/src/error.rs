// SPDX-License-Identifier: MIT
//! The error taxonomy of spec §7: every fallible core operation returns
//! a [`JobletError`] carrying a [`ErrorKind`], an identifier, and a wrapped
//! cause. The gRPC edge (`joblet-daemon`) maps each kind to a status code.

use thiserror::Error;

/// The eleven error kinds of spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    Unauthenticated,
    ResourceExhausted,
    Isolation,
    Exec,
    Timeout,
    Filesystem,
    Internal,
}

/// A typed error carrying its kind, an identifier (job/volume/network/
/// runtime/path), and a wrapped cause.
#[derive(Debug, Error)]
#[error("{kind:?} error for {identifier}: {message}")]
pub struct JobletError {
    pub kind: ErrorKind,
    pub identifier: String,
    pub message: String,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl JobletError {
    pub fn new(kind: ErrorKind, identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(
        kind: ErrorKind,
        identifier: impl Into<String>,
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    pub fn validation(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, identifier, message)
    }

    pub fn not_found(identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        Self::new(ErrorKind::NotFound, identifier.clone(), format!("{identifier} not found"))
    }

    pub fn already_exists(identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        Self::new(
            ErrorKind::AlreadyExists,
            identifier.clone(),
            format!("{identifier} already exists"),
        )
    }

    pub fn resource_exhausted(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceExhausted, identifier, message)
    }

    pub fn isolation(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Isolation, identifier, message)
    }

    pub fn exec(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Exec, identifier, message)
    }

    pub fn timeout(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, identifier, message)
    }

    pub fn filesystem(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Filesystem, identifier, message)
    }

    pub fn internal(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, identifier, message)
    }

    pub fn permission_denied(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, identifier, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated, "auth", message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

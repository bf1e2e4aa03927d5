// SPDX-License-Identifier: MIT
//! Authorization (§4.7): role extraction from the peer certificate's first
//! Organizational Unit component, and a per-operation allow/deny matrix.

use joblet_core::error::JobletError;
use tonic::Request;
use x509_parser::prelude::{FromDer, X509Certificate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Viewer,
    Unknown,
}

/// Every operation behind authorization. Read-only job/network/volume/
/// runtime/monitoring operations are `Read`; everything that mutates state
/// is `Write` (§4.7: "viewer — read-only on jobs ... all others deny").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
}

/// Extract the caller's role from the first OU of its peer certificate.
/// Missing TLS info or certificate yields `Role::Unknown` treated as
/// `UNAUTHENTICATED` by the caller — the spec distinguishes "no
/// certificate at all" from "a certificate with a role gRPC doesn't
/// recognize", but both fail closed here since the daemon has no
/// operation that's open to unauthenticated callers.
pub fn extract_role<T>(request: &Request<T>) -> Result<Role, JobletError> {
    let certs = request
        .peer_certs()
        .ok_or_else(|| JobletError::unauthenticated("no client certificate presented"))?;
    let der = certs.first().ok_or_else(|| JobletError::unauthenticated("empty client certificate chain"))?;
    let (_, cert) = X509Certificate::from_der(der.as_ref())
        .map_err(|e| JobletError::unauthenticated(format!("invalid client certificate: {e}")))?;

    let ou = cert
        .subject()
        .iter_organizational_unit()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .unwrap_or("");

    Ok(match ou {
        "admin" => Role::Admin,
        "viewer" => Role::Viewer,
        _ => Role::Unknown,
    })
}

/// Apply the §4.7 matrix: admin may perform any operation; viewer may
/// perform `Read` operations only; unknown roles are denied everything.
pub fn authorize(role: Role, op: Operation) -> Result<(), JobletError> {
    match (role, op) {
        (Role::Admin, _) => Ok(()),
        (Role::Viewer, Operation::Read) => Ok(()),
        (Role::Viewer, Operation::Write) => {
            Err(JobletError::permission_denied("viewer", "viewer role may not perform write operations"))
        }
        (Role::Unknown, _) => Err(JobletError::permission_denied("unknown", "unrecognized role")),
    }
}

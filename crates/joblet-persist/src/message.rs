// SPDX-License-Identifier: MIT
//! Persistence sidecar wire messages (§4.9): newline-terminated JSON over a
//! Unix stream socket.

use joblet_core::job::Job;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Create,
    Update,
    Delete,
    Get,
    List,
    Sync,
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub op: Op,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<Job>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<Vec<Job>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    pub request_id: String,
    pub timestamp: u64,
}

impl Request {
    pub fn new(op: Op, request_id: impl Into<String>, timestamp: u64) -> Self {
        Self {
            op,
            job_id: None,
            job: None,
            jobs: None,
            filter: None,
            request_id: request_id.into(),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub request_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<Job>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<Vec<Job>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_without_unset_optionals() {
        let req = Request::new(Op::Ping, "r1", 1_000);
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("job_id"));
        assert!(json.contains("\"op\":\"ping\""));
    }

    #[test]
    fn response_roundtrips() {
        let resp = Response { request_id: "r1".to_string(), success: true, job: None, jobs: None, error: None };
        let json = serde_json::to_string(&resp).unwrap();
        let back: Response = serde_json::from_str(&json).unwrap();
        assert_eq!(back.request_id, "r1");
        assert!(back.success);
    }
}

// SPDX-License-Identifier: MIT
//! Workflow YAML data model (§4.6): a mapping from job name to `JobSpec`,
//! each carrying a `requires` list of other-job or expression gates.

use joblet_core::error::JobletError;
use joblet_core::job::JobStatus;
use joblet_core::limits::ResourceLimits;
use joblet_core::upload::FileEntry;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// One entry of a job's `requires` list: either a gate on another job's
/// status, or a boolean expression over several jobs' statuses.
#[derive(Debug, Clone, PartialEq)]
pub enum RequireEntry {
    OtherJob { job: String, status: JobStatus },
    Expression { expression: String },
}

impl TryFrom<HashMap<String, String>> for RequireEntry {
    type Error = JobletError;

    fn try_from(mut map: HashMap<String, String>) -> Result<Self, Self::Error> {
        if map.len() != 1 {
            return Err(JobletError::validation(
                "requires",
                "each requires entry must have exactly one key",
            ));
        }
        let (key, value) = map.drain().next().expect("checked len == 1 above");
        if key == "expression" {
            Ok(RequireEntry::Expression { expression: value })
        } else {
            Ok(RequireEntry::OtherJob { job: key, status: value.parse()? })
        }
    }
}

impl<'de> Deserialize<'de> for RequireEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let map = HashMap::<String, String>::deserialize(deserializer)?;
        RequireEntry::try_from(map).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub runtime: String,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub uploads: Vec<FileEntry>,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    #[serde(default)]
    pub resources: ResourceLimits,
    #[serde(default)]
    pub requires: Vec<RequireEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Workflow {
    #[serde(default)]
    pub name: Option<String>,
    pub jobs: HashMap<String, JobSpec>,
}

pub fn parse_workflow_yaml(yaml: &str) -> Result<Workflow, JobletError> {
    serde_yaml::from_str(yaml).map_err(|e| JobletError::validation("workflow", format!("invalid workflow YAML: {e}")))
}

/// Monotonic workflow ID generator scoped to one daemon process (§4.6
/// "ID (monotonic int)").
#[derive(Default)]
pub struct WorkflowIdGenerator {
    next: AtomicU64,
}

impl WorkflowIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> joblet_core::id::WorkflowId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        joblet_core::id::WorkflowId::new(n.to_string())
    }
}

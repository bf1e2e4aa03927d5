// SPDX-License-Identifier: MIT
//! Protobuf <-> domain conversions (§4.8, §6). Kept in one place so the
//! service handlers stay thin and the wire shape changes in one spot.

use crate::pb;
use joblet_core::error::JobletError;
use joblet_core::job::{Job, StartRequest};
use joblet_core::limits::ResourceLimits;
use joblet_core::network::{Network, NetworkKind};
use joblet_core::runtime::Runtime;
use joblet_core::upload::FileEntry;
use joblet_core::volume::{Volume, VolumeKind};

impl TryFrom<pb::RunJobRequest> for StartRequest {
    type Error = JobletError;

    fn try_from(req: pb::RunJobRequest) -> Result<Self, Self::Error> {
        let limits = ResourceLimits::parse(
            req.max_cpu,
            &req.cpu_cores,
            req.max_memory,
            req.max_iobps,
            req.gpu_count,
            req.gpu_memory_mb,
        )
        .map_err(|e| JobletError::validation("resource_limits", e.to_string()))?;

        let uploads = req
            .uploads
            .into_iter()
            .map(FileEntry::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StartRequest {
            name: if req.name.is_empty() { None } else { Some(req.name) },
            command: req.command,
            args: req.args,
            runtime: req.runtime,
            environment: req.environment,
            limits,
            volumes: req.volumes,
            network: req.network,
            uploads,
            schedule: if req.schedule.is_empty() { None } else { Some(req.schedule) },
        })
    }
}

impl TryFrom<pb::FileUpload> for FileEntry {
    type Error = JobletError;

    fn try_from(upload: pb::FileUpload) -> Result<Self, Self::Error> {
        if upload.is_directory {
            FileEntry::directory(upload.path, upload.mode)
        } else {
            FileEntry::file(upload.path, upload.mode, upload.content)
        }
    }
}

impl From<&Job> for pb::Job {
    fn from(job: &Job) -> Self {
        pb::Job {
            id: job.id.as_str().to_string(),
            name: job.name.clone().unwrap_or_default(),
            command: job.command.clone(),
            args: job.args.clone(),
            runtime: job.runtime.clone(),
            environment: job.environment.clone(),
            max_cpu: job.limits.max_cpu_percent,
            cpu_cores: job.limits.cpu_cores.to_string(),
            max_memory: job.limits.max_memory_mb,
            max_iobps: job.limits.max_io_bps,
            gpu_count: job.gpu.count,
            gpu_memory_mb: job.gpu.memory_mb,
            volumes: job.volumes.clone(),
            network: job.network.clone(),
            status: job.status.to_string(),
            exit_code: job.exit_code,
            start_time_ms: job.start_time_ms.unwrap_or(0),
            end_time_ms: job.end_time_ms.unwrap_or(0),
            scheduled_time_ms: job.scheduled_time_ms.unwrap_or(0),
            pid: job.pid.unwrap_or(0),
        }
    }
}

impl From<&Job> for pb::RunJobResponse {
    fn from(job: &Job) -> Self {
        pb::RunJobResponse {
            id: job.id.as_str().to_string(),
            status: job.status.to_string(),
            start_time_ms: job.start_time_ms.unwrap_or(0),
            scheduled_time_ms: job.scheduled_time_ms.unwrap_or(0),
        }
    }
}

impl From<&Job> for pb::StopJobResponse {
    fn from(job: &Job) -> Self {
        pb::StopJobResponse {
            id: job.id.as_str().to_string(),
            status: job.status.to_string(),
        }
    }
}

impl From<&Network> for pb::Network {
    fn from(network: &Network) -> Self {
        pb::Network {
            name: network.name.clone(),
            kind: network_kind_str(&network.kind).to_string(),
        }
    }
}

fn network_kind_str(kind: &NetworkKind) -> String {
    match kind {
        NetworkKind::Bridge => "bridge".to_string(),
        NetworkKind::Isolated => "isolated".to_string(),
        NetworkKind::None => "none".to_string(),
        NetworkKind::Cidr(cidr) => cidr.clone(),
    }
}

pub fn parse_network_kind(kind: &str) -> NetworkKind {
    match kind {
        "bridge" => NetworkKind::Bridge,
        "isolated" => NetworkKind::Isolated,
        "none" => NetworkKind::None,
        cidr => NetworkKind::Cidr(cidr.to_string()),
    }
}

impl From<&Volume> for pb::Volume {
    fn from(volume: &Volume) -> Self {
        pb::Volume {
            name: volume.name.clone(),
            size_bytes: volume.size_bytes,
            kind: match volume.kind {
                VolumeKind::Filesystem => "filesystem".to_string(),
                VolumeKind::Memory => "memory".to_string(),
            },
            mount_path: volume.mount_path(),
            ref_count: volume.ref_count,
        }
    }
}

pub fn parse_volume_kind(kind: &str) -> VolumeKind {
    match kind {
        "memory" => VolumeKind::Memory,
        _ => VolumeKind::Filesystem,
    }
}

impl From<&Runtime> for pb::Runtime {
    fn from(runtime: &Runtime) -> Self {
        pb::Runtime {
            tag: runtime.tag.clone(),
            root_dir: runtime.root_dir.display().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_job_request_converts_empty_schedule_to_none() {
        let req = pb::RunJobRequest {
            command: "echo".into(),
            runtime: "base:latest".into(),
            network: "bridge".into(),
            ..Default::default()
        };
        let start: StartRequest = req.try_into().unwrap();
        assert!(start.schedule.is_none());
        assert!(start.name.is_none());
    }

    #[test]
    fn run_job_request_rejects_invalid_cpu_cores() {
        let req = pb::RunJobRequest {
            command: "echo".into(),
            cpu_cores: "5-1".into(),
            ..Default::default()
        };
        let result: Result<StartRequest, _> = req.try_into();
        assert!(result.is_err());
    }

    #[test]
    fn network_kind_roundtrips_builtins() {
        for (name, kind) in [("bridge", NetworkKind::Bridge), ("isolated", NetworkKind::Isolated), ("none", NetworkKind::None)] {
            let network = Network { name: name.to_string(), kind };
            let proto = pb::Network::from(&network);
            assert_eq!(parse_network_kind(&proto.kind), network.kind);
        }
    }
}

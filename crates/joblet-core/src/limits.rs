// SPDX-License-Identifier: MIT
//! Resource limit value objects (§2.2): CPU percent, CPU-core set, memory
//! bytes, IO bandwidth, GPU count/memory. Parsing and rendering only — no
//! enforcement lives here (that's `joblet-isolate`'s job).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed `cpu_cores` set like `"0-3,5"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreSet {
    cores: Vec<u32>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CoreSetError {
    #[error("empty core range in '{0}'")]
    EmptyRange(String),
    #[error("invalid core number in '{0}'")]
    InvalidNumber(String),
    #[error("descending range '{0}'")]
    DescendingRange(String),
}

impl CoreSet {
    pub fn parse(s: &str) -> Result<Self, CoreSetError> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::default());
        }
        let mut cores = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(CoreSetError::EmptyRange(s.to_string()));
            }
            if let Some((lo, hi)) = part.split_once('-') {
                let lo: u32 = lo.trim().parse().map_err(|_| CoreSetError::InvalidNumber(s.to_string()))?;
                let hi: u32 = hi.trim().parse().map_err(|_| CoreSetError::InvalidNumber(s.to_string()))?;
                if hi < lo {
                    return Err(CoreSetError::DescendingRange(s.to_string()));
                }
                cores.extend(lo..=hi);
            } else {
                let n: u32 = part.parse().map_err(|_| CoreSetError::InvalidNumber(s.to_string()))?;
                cores.push(n);
            }
        }
        cores.sort_unstable();
        cores.dedup();
        Ok(Self { cores })
    }

    pub fn cores(&self) -> &[u32] {
        &self.cores
    }

    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }
}

impl fmt::Display for CoreSet {
    /// Renders back to compact range notation, e.g. `[0,1,2,3,5]` -> `"0-3,5"`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cores.is_empty() {
            return Ok(());
        }
        let mut parts = Vec::new();
        let mut start = self.cores[0];
        let mut prev = self.cores[0];
        for &c in &self.cores[1..] {
            if c == prev + 1 {
                prev = c;
                continue;
            }
            push_range(&mut parts, start, prev);
            start = c;
            prev = c;
        }
        push_range(&mut parts, start, prev);
        write!(f, "{}", parts.join(","))
    }
}

fn push_range(parts: &mut Vec<String>, start: u32, end: u32) {
    if start == end {
        parts.push(start.to_string());
    } else {
        parts.push(format!("{start}-{end}"));
    }
}

/// GPU requirement for a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuRequest {
    pub count: u32,
    pub memory_mb: u64,
}

impl GpuRequest {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_none(&self) -> bool {
        self.count == 0
    }
}

/// Resource limits on a job. Percent/byte fields of `0` mean "unset / no
/// limit requested" rather than "zero resources" (validated at admission).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU quota as a percentage of one core (e.g. 150 == 1.5 cores).
    pub max_cpu_percent: u32,
    pub cpu_cores: CoreSet,
    /// Memory ceiling in MiB.
    pub max_memory_mb: u64,
    /// IO bandwidth ceiling in bytes/sec.
    pub max_io_bps: u64,
    pub gpu: GpuRequest,
}

#[derive(Debug, thiserror::Error)]
pub enum LimitsError {
    #[error("invalid cpu_cores: {0}")]
    CoreSet(#[from] CoreSetError),
}

impl ResourceLimits {
    pub fn parse(
        max_cpu_percent: u32,
        cpu_cores: &str,
        max_memory_mb: u64,
        max_io_bps: u64,
        gpu_count: u32,
        gpu_memory_mb: u64,
    ) -> Result<Self, LimitsError> {
        Ok(Self {
            max_cpu_percent,
            cpu_cores: CoreSet::parse(cpu_cores)?,
            max_memory_mb,
            max_io_bps,
            gpu: GpuRequest {
                count: gpu_count,
                memory_mb: gpu_memory_mb,
            },
        })
    }

    /// cgroup `cpu.max` quota/period pair derived from the percentage, using
    /// the conventional 100ms period (§4.3 step 6).
    pub fn cpu_quota_period_us(&self) -> Option<(u64, u64)> {
        if self.max_cpu_percent == 0 {
            return None;
        }
        const PERIOD_US: u64 = 100_000;
        let quota = PERIOD_US * self.max_cpu_percent as u64 / 100;
        Some((quota, PERIOD_US))
    }

    pub fn memory_max_bytes(&self) -> Option<u64> {
        if self.max_memory_mb == 0 {
            None
        } else {
            Some(self.max_memory_mb * 1024 * 1024)
        }
    }

    /// Upload quota derived from the memory cap, per §4.2: "bounded by a
    /// session limit derived from the job's memory cap". Resolved in
    /// DESIGN.md as half the memory cap, floored at 16 MiB when a memory cap
    /// is set, unbounded (`None`) otherwise.
    pub fn upload_quota_bytes(&self) -> Option<u64> {
        self.memory_max_bytes()
            .map(|mem| (mem / 2).max(16 * 1024 * 1024))
    }

    /// Upload FIFO chunk size, shrinking for small memory caps per §4.2.
    pub fn upload_chunk_size(&self) -> usize {
        const DEFAULT_CHUNK: usize = 32 * 1024;
        const MIN_CHUNK: usize = 4 * 1024;
        match self.memory_max_bytes() {
            Some(mem) if mem < 256 * 1024 * 1024 => {
                let scaled = (mem / 1024) as usize;
                scaled.clamp(MIN_CHUNK, DEFAULT_CHUNK)
            }
            _ => DEFAULT_CHUNK,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_set_roundtrips_ranges() {
        let set = CoreSet::parse("0-3,5").unwrap();
        assert_eq!(set.cores(), &[0, 1, 2, 3, 5]);
        assert_eq!(set.to_string(), "0-3,5");
    }

    #[test]
    fn core_set_rejects_descending_range() {
        assert_eq!(
            CoreSet::parse("5-2"),
            Err(CoreSetError::DescendingRange("5-2".to_string()))
        );
    }

    #[test]
    fn core_set_empty_is_ok() {
        assert!(CoreSet::parse("").unwrap().is_empty());
    }

    #[test]
    fn cpu_quota_from_percent() {
        let limits = ResourceLimits {
            max_cpu_percent: 150,
            ..Default::default()
        };
        assert_eq!(limits.cpu_quota_period_us(), Some((150_000, 100_000)));
    }

    #[test]
    fn upload_chunk_shrinks_for_small_memory_cap() {
        let limits = ResourceLimits {
            max_memory_mb: 8,
            ..Default::default()
        };
        assert!(limits.upload_chunk_size() < 32 * 1024);
        assert!(limits.upload_chunk_size() >= 4 * 1024);
    }

    #[test]
    fn upload_chunk_default_without_cap() {
        let limits = ResourceLimits::default();
        assert_eq!(limits.upload_chunk_size(), 32 * 1024);
    }
}

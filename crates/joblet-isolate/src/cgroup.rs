// SPDX-License-Identifier: MIT
//! Pure cgroups v2 value formatting (§4.3 step 6). Kept free of any syscall
//! so the values are unit-testable without a `Platform`.

use joblet_core::limits::ResourceLimits;

/// `cpu.max` value: `"<quota> <period>"`, or `"max <period>"` when no CPU
/// percent limit was requested.
pub fn cpu_max_value(limits: &ResourceLimits) -> Option<String> {
    limits
        .cpu_quota_period_us()
        .map(|(quota, period)| format!("{quota} {period}"))
}

/// `cpuset.cpus` value from the parsed core set, e.g. `"0-3,5"`.
pub fn cpuset_cpus_value(limits: &ResourceLimits) -> Option<String> {
    if limits.cpu_cores.is_empty() {
        None
    } else {
        Some(limits.cpu_cores.to_string())
    }
}

/// `memory.max` value in bytes.
pub fn memory_max_value(limits: &ResourceLimits) -> Option<String> {
    limits.memory_max_bytes().map(|bytes| bytes.to_string())
}

/// `io.max` value for the device backing the workspace, e.g.
/// `"253:0 rbps=1048576 wbps=1048576"`.
pub fn io_max_value(limits: &ResourceLimits, device_major_minor: &str) -> Option<String> {
    if limits.max_io_bps == 0 {
        None
    } else {
        Some(format!(
            "{device_major_minor} rbps={bps} wbps={bps}",
            bps = limits.max_io_bps
        ))
    }
}

/// `devices.allow` lines for GPU device nodes, supplied by the caller as
/// resolved `major:minor` pairs (GPU discovery is outside this crate's
/// scope). Returns `None` when no GPU was requested.
pub fn device_allow_values(limits: &ResourceLimits, gpu_devices: &[String]) -> Option<Vec<String>> {
    if limits.gpu.is_none() {
        return None;
    }
    Some(gpu_devices.iter().map(|dev| format!("c {dev} rwm")).collect())
}

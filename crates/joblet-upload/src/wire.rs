// SPDX-License-Identifier: MIT
//! Upload FIFO frame format (§4.2): an ASCII header line followed by a
//! binary body (omitted for directories).
//!
//! ```text
//! FILE:<relpath>:<size>:<mode>:<isDir>\n
//! <size bytes of content>
//! ```

use joblet_core::error::JobletError;
use joblet_core::upload::FileEntry;

/// Render one manifest entry's header line. The body (if any) is written
/// separately by the caller so it can be streamed without buffering.
pub fn encode_header(entry: &FileEntry) -> Vec<u8> {
    format!(
        "FILE:{}:{}:{}:{}\n",
        entry.path,
        entry.size(),
        entry.mode,
        entry.is_directory as u8
    )
    .into_bytes()
}

/// A decoded header, used by [`crate::reader::unpack_session`] and by this
/// module's own round-trip tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub path: String,
    pub size: u64,
    pub mode: u32,
    pub is_directory: bool,
}

pub fn decode_header(line: &str) -> Result<FrameHeader, JobletError> {
    let line = line.strip_prefix("FILE:").ok_or_else(|| {
        JobletError::validation("upload-frame", format!("missing FILE: prefix in '{line}'"))
    })?;
    let mut parts = line.rsplitn(4, ':');
    let is_dir = parts.next();
    let mode = parts.next();
    let size = parts.next();
    let path = parts.next();
    let (Some(is_dir), Some(mode), Some(size), Some(path)) = (is_dir, mode, size, path) else {
        return Err(JobletError::validation("upload-frame", format!("malformed frame header '{line}'")));
    };
    let size: u64 = size
        .parse()
        .map_err(|_| JobletError::validation("upload-frame", format!("invalid size in '{line}'")))?;
    let mode: u32 = mode
        .parse()
        .map_err(|_| JobletError::validation("upload-frame", format!("invalid mode in '{line}'")))?;
    let is_directory = match is_dir {
        "0" => false,
        "1" => true,
        other => {
            return Err(JobletError::validation(
                "upload-frame",
                format!("invalid isDir flag '{other}' in '{line}'"),
            ))
        }
    };
    Ok(FrameHeader { path: path.to_string(), size, mode, is_directory })
}

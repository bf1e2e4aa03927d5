// SPDX-License-Identifier: MIT
//! `FileEntry` (§3): one file or directory in an upload manifest. Path
//! normalization/traversal rejection lives here so both the gRPC edge and
//! `joblet-upload` share the same validation.

use crate::error::JobletError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    /// Relative, normalized path with no `..` components.
    pub path: String,
    pub mode: u32,
    pub is_directory: bool,
    pub content: Vec<u8>,
}

impl FileEntry {
    pub fn file(path: impl Into<String>, mode: u32, content: Vec<u8>) -> Result<Self, JobletError> {
        let path = normalize_relative_path(path.into())?;
        Ok(Self {
            path,
            mode,
            is_directory: false,
            content,
        })
    }

    pub fn directory(path: impl Into<String>, mode: u32) -> Result<Self, JobletError> {
        let path = normalize_relative_path(path.into())?;
        Ok(Self {
            path,
            mode,
            is_directory: true,
            content: Vec::new(),
        })
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Reject absolute paths and `..` traversal; normalize `./` prefixes and
/// duplicate separators (§3 FileEntry / §4.4 admission: "path traversal in
/// uploads" is an `INVALID_ARGUMENT`).
pub fn normalize_relative_path(path: String) -> Result<String, JobletError> {
    let p = Path::new(&path);
    if p.is_absolute() {
        return Err(JobletError::validation(path, "upload path must be relative"));
    }
    let mut parts = Vec::new();
    for component in p.components() {
        use std::path::Component::*;
        match component {
            Normal(s) => parts.push(s.to_string_lossy().into_owned()),
            CurDir => {}
            ParentDir => {
                return Err(JobletError::validation(path.clone(), "upload path must not contain '..'"));
            }
            RootDir | Prefix(_) => {
                return Err(JobletError::validation(path.clone(), "upload path must be relative"));
            }
        }
    }
    if parts.is_empty() {
        return Err(JobletError::validation(path, "upload path must not be empty"));
    }
    Ok(parts.join("/"))
}

/// Validate a whole upload manifest: unique normalized paths, total size
/// within `limit_bytes` (§4.2 `PrepareSession`).
pub fn validate_manifest(files: &[FileEntry], limit_bytes: Option<u64>) -> Result<(), JobletError> {
    use std::collections::HashSet;
    let mut seen = HashSet::new();
    let mut total = 0u64;
    for f in files {
        if !seen.insert(f.path.as_str()) {
            return Err(JobletError::validation(f.path.clone(), "duplicate upload path"));
        }
        total += f.size();
    }
    if let Some(limit) = limit_bytes {
        if total > limit {
            return Err(JobletError::resource_exhausted(
                "upload",
                format!("total upload size {total} exceeds limit {limit}"),
            ));
        }
    }
    Ok(())
}

// SPDX-License-Identifier: MIT
//! In-child reader for the upload FIFO (§4.2): the counterpart to
//! [`crate::session::write_session`], invoked by `jobletd --job-init` once
//! isolation is set up and before the user command is `exec`'d.

use crate::wire::decode_header;
use joblet_core::error::{ErrorKind, JobletError};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Read every frame off `fifo_path` and materialize it under `dest_dir`,
/// blocking to open the read end (the writer's non-blocking retry loop is
/// the other half of the handshake). A missing `fifo_path` means the job
/// carried no uploads and is not an error. EOF ends the session: a writer
/// canceled mid-stream is not distinguished from one that finished cleanly,
/// per §4.2's "reader sees EOF and proceeds with whatever it has". A frame
/// whose body is shorter than its declared size is a partial write and
/// fails the launch.
pub fn unpack_session(fifo_path: &Path, dest_dir: &Path) -> Result<usize, JobletError> {
    if !fifo_path.exists() {
        return Ok(0);
    }
    let file = File::open(fifo_path).map_err(|e| {
        JobletError::with_cause(ErrorKind::Filesystem, fifo_path.display().to_string(), "opening upload fifo for read", e)
    })?;
    let mut reader = BufReader::new(file);
    let mut count = 0usize;
    loop {
        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .map_err(|e| JobletError::with_cause(ErrorKind::Exec, fifo_path.display().to_string(), "reading upload frame header", e))?;
        if read == 0 {
            break;
        }
        let header = decode_header(line.trim_end_matches('\n'))?;
        let target = dest_dir.join(&header.path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| JobletError::with_cause(ErrorKind::Filesystem, header.path.clone(), "creating upload parent directory", e))?;
        }

        if header.is_directory {
            std::fs::create_dir_all(&target)
                .map_err(|e| JobletError::with_cause(ErrorKind::Filesystem, header.path.clone(), "creating uploaded directory", e))?;
        } else {
            let mut body = vec![0u8; header.size as usize];
            reader
                .read_exact(&mut body)
                .map_err(|e| JobletError::with_cause(ErrorKind::Exec, header.path.clone(), "reading upload frame body (partial write)", e))?;
            std::fs::write(&target, &body)
                .map_err(|e| JobletError::with_cause(ErrorKind::Filesystem, header.path.clone(), "writing uploaded file", e))?;
        }
        std::fs::set_permissions(&target, std::fs::Permissions::from_mode(header.mode))
            .map_err(|e| JobletError::with_cause(ErrorKind::Filesystem, header.path.clone(), "setting uploaded entry mode", e))?;
        count += 1;
    }
    Ok(count)
}

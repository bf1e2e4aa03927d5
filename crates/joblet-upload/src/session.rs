// SPDX-License-Identifier: MIT
//! Upload session lifecycle (§4.2): validate a manifest, create the named
//! FIFO, and stream frames into it once the isolated child opens the read
//! end.

use crate::wire::encode_header;
use joblet_core::error::JobletError;
use joblet_core::id::JobId;
use joblet_core::limits::ResourceLimits;
use joblet_core::upload::{validate_manifest, FileEntry};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use std::io::Write;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Overall time budget to wait for the child to open the FIFO read end
/// before the session aborts (§4.2 "Failure").
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Backoff cap while retrying a non-blocking open against "no reader yet".
const OPEN_BACKOFF_CAP: Duration = Duration::from_secs(2);
const OPEN_BACKOFF_INITIAL: Duration = Duration::from_millis(20);

pub struct UploadSession {
    pub job_id: JobId,
    pub fifo_path: PathBuf,
    pub chunk_size: usize,
    pub files: Vec<FileEntry>,
}

/// `PrepareSession` (§4.2): validate the manifest, pick a chunk size
/// derived from the job's memory cap, and create the FIFO at
/// `state_dir/upload.fifo`.
pub fn prepare_session(
    job_id: JobId,
    files: Vec<FileEntry>,
    limits: &ResourceLimits,
    state_dir: &Path,
) -> Result<UploadSession, JobletError> {
    validate_manifest(&files, limits.upload_quota_bytes())?;
    let fifo_path = state_dir.join("upload.fifo");
    if fifo_path.exists() {
        std::fs::remove_file(&fifo_path)
            .map_err(|e| JobletError::with_cause(joblet_core::error::ErrorKind::Filesystem, fifo_path.display().to_string(), "removing stale fifo", e))?;
    }
    mkfifo(&fifo_path, Mode::from_bits_truncate(0o600)).map_err(|e| {
        JobletError::with_cause(
            joblet_core::error::ErrorKind::Filesystem,
            fifo_path.display().to_string(),
            "mkfifo failed",
            std::io::Error::from(e),
        )
    })?;

    Ok(UploadSession {
        job_id,
        fifo_path,
        chunk_size: limits.upload_chunk_size(),
        files,
    })
}

/// Open the FIFO write end non-blocking, retrying on "no reader" (`ENXIO`)
/// with exponential backoff capped at 2s, until `SESSION_TIMEOUT` elapses.
async fn open_write_end(path: &Path) -> Result<std::fs::File, JobletError> {
    let deadline = tokio::time::Instant::now() + SESSION_TIMEOUT;
    let mut backoff = OPEN_BACKOFF_INITIAL;
    loop {
        let attempt = std::fs::OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path);
        match attempt {
            Ok(file) => return Ok(file),
            Err(e) if e.raw_os_error() == Some(libc::ENXIO) => {
                if tokio::time::Instant::now() >= deadline {
                    return Err(JobletError::timeout(
                        path.display().to_string(),
                        "no reader attached to upload fifo within session timeout",
                    ));
                }
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(OPEN_BACKOFF_CAP);
            }
            Err(e) => {
                return Err(JobletError::with_cause(
                    joblet_core::error::ErrorKind::Filesystem,
                    path.display().to_string(),
                    "opening upload fifo",
                    e,
                ))
            }
        }
    }
}

/// Clear `O_NONBLOCK` on the opened fd: once the reader has attached,
/// writes should block rather than spin (§4.2 "Once opened, writes are
/// blocking").
fn make_blocking(file: std::fs::File) -> Result<std::fs::File, JobletError> {
    let fd = file.as_raw_fd();
    let flags = fcntl(fd, FcntlArg::F_GETFL)
        .map_err(|e| JobletError::with_cause(joblet_core::error::ErrorKind::Filesystem, "upload-fifo", "fcntl F_GETFL", std::io::Error::from(e)))?;
    let mut flags = OFlag::from_bits_truncate(flags);
    flags.remove(OFlag::O_NONBLOCK);
    fcntl(fd, FcntlArg::F_SETFL(flags))
        .map_err(|e| JobletError::with_cause(joblet_core::error::ErrorKind::Filesystem, "upload-fifo", "fcntl F_SETFL", std::io::Error::from(e)))?;
    // SAFETY: `file` still owns `fd`; we reconstruct from the same raw fd
    // after `into_raw_fd` hands ownership to the new `File`, avoiding a
    // double close.
    let raw = file.into_raw_fd();
    Ok(unsafe { std::fs::File::from_raw_fd(raw) })
}

/// Stream every manifest entry's header (and body, for files) into the
/// FIFO. Runs on a blocking thread since the fd is blocking once opened.
/// Checked for cancellation after each frame boundary (§4.2 "Concurrency
/// and cancellation").
pub async fn write_session(session: UploadSession, cancel: CancellationToken) -> Result<(), JobletError> {
    let opened = open_write_end(&session.fifo_path).await?;
    let blocking = make_blocking(opened)?;
    let chunk_size = session.chunk_size;
    let job_id = session.job_id.clone();
    let files = session.files;

    tokio::task::spawn_blocking(move || write_frames_blocking(blocking, &files, chunk_size, &job_id, cancel))
        .await
        .map_err(|e| JobletError::internal(session_label(&session.fifo_path), format!("upload writer task panicked: {e}")))?
}

fn session_label(path: &Path) -> String {
    path.display().to_string()
}

fn write_frames_blocking(
    mut fifo: std::fs::File,
    files: &[FileEntry],
    chunk_size: usize,
    job_id: &JobId,
    cancel: CancellationToken,
) -> Result<(), JobletError> {
    for entry in files {
        if cancel.is_cancelled() {
            debug!(job_id = %job_id, "upload session canceled before frame boundary");
            return Ok(());
        }
        let header = encode_header(entry);
        fifo.write_all(&header)
            .map_err(|e| JobletError::with_cause(joblet_core::error::ErrorKind::Exec, entry.path.clone(), "writing frame header", e))?;

        if !entry.is_directory {
            for chunk in entry.content.chunks(chunk_size.max(1)) {
                fifo.write_all(chunk)
                    .map_err(|e| JobletError::with_cause(joblet_core::error::ErrorKind::Exec, entry.path.clone(), "writing frame body", e))?;
            }
        }
    }
    fifo.flush()
        .map_err(|e| JobletError::with_cause(joblet_core::error::ErrorKind::Exec, "upload", "flushing fifo", e))?;
    if cancel.is_cancelled() {
        warn!(job_id = %job_id, "upload canceled after final frame; reader proceeds with partial manifest");
    }
    Ok(())
}

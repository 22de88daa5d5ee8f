use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::core::config::RuntimeConfig;
use crate::core::error::{RuntimeError, RuntimeResult};

use super::detached::{in_async_context, run_detached};
use super::target::RuntimeTarget;

/// What a finished download produced.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadReport {
    pub url: String,
    pub bytes: u64,
    pub sha256: String,
    pub destination: PathBuf,
}

/// Downloads the archive for `toolkit_version`/`target` and unpacks it into
/// `destination`, which must already exist and be empty.
///
/// The precondition is checked before anything touches the network. Transfer
/// and extraction errors are returned as-is; whatever the extractor already
/// wrote stays in `destination`.
#[instrument(skip(config))]
pub fn download_runtime(
    config: &RuntimeConfig,
    toolkit_version: &str,
    target: RuntimeTarget,
    destination: &Path,
) -> RuntimeResult<DownloadReport> {
    ensure_empty_destination(destination)?;
    let url = config.url_builder().build_url(toolkit_version, target)?;
    ensure_min_disk_space(destination, config.min_free_disk_bytes())?;

    let spool = SpoolFile::create(config.spool_dir())?;
    let mut writer = HashingWriter::new(spool.open_write()?);
    let source = config.source();

    if in_async_context() {
        debug!("Caller is inside an async runtime, transfer runs detached");
    }
    let started = Instant::now();
    let bytes = run_detached(|| source.fetch(&url, &mut writer))
        .map_err(|source| RuntimeError::Transfer {
            url: url.clone(),
            source,
        })??;
    let sha256 = writer.finish_hex();
    info!(
        "Runtime download finished in {:?} ({} bytes)",
        started.elapsed(),
        bytes
    );

    if let Some(expected) = config.archive_sha256() {
        if !sha256.eq_ignore_ascii_case(expected) {
            return Err(RuntimeError::Sha256Mismatch {
                url,
                expected: expected.to_string(),
                actual: sha256,
            });
        }
    }

    let started = Instant::now();
    let mut archive = BufReader::new(spool.open_read()?);
    config.extractor().extract(&mut archive, destination)?;
    info!("Runtime extraction finished in {:?}", started.elapsed());

    Ok(DownloadReport {
        url,
        bytes,
        sha256,
        destination: destination.to_path_buf(),
    })
}

/// Fails unless `destination` is an existing directory with no entries.
pub fn ensure_empty_destination(destination: &Path) -> RuntimeResult<()> {
    if !destination.is_dir() {
        return Err(RuntimeError::DestinationMissing(destination.to_path_buf()));
    }

    let mut entries =
        std::fs::read_dir(destination).map_err(|source| RuntimeError::io(destination, source))?;
    if entries.next().is_some() {
        return Err(RuntimeError::DestinationNotEmpty(destination.to_path_buf()));
    }
    Ok(())
}

/// `minimum_bytes == 0` disables the check. Unknown mounts pass.
fn ensure_min_disk_space(path: &Path, minimum_bytes: u64) -> RuntimeResult<()> {
    if minimum_bytes == 0 {
        return Ok(());
    }

    let disks = sysinfo::Disks::new_with_refreshed_list();
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let mut best_len = 0usize;
    let mut available = None;
    for disk in disks.list() {
        let mount = disk.mount_point();
        if canonical.starts_with(mount) {
            let len = mount.as_os_str().len();
            if len >= best_len {
                best_len = len;
                available = Some(disk.available_space());
            }
        }
    }

    match available {
        Some(bytes) if bytes < minimum_bytes => Err(RuntimeError::InsufficientDiskSpace {
            path: path.to_path_buf(),
            available: bytes,
            required: minimum_bytes,
        }),
        _ => Ok(()),
    }
}

/// Temporary archive file, removed on drop.
struct SpoolFile {
    path: PathBuf,
}

impl SpoolFile {
    fn create(dir: &Path) -> RuntimeResult<Self> {
        std::fs::create_dir_all(dir).map_err(|source| RuntimeError::io(dir, source))?;
        let path = dir.join(format!("qml-runtime-{}.tar.gz", Uuid::new_v4().simple()));
        Ok(Self { path })
    }

    fn open_write(&self) -> RuntimeResult<File> {
        File::create(&self.path).map_err(|source| RuntimeError::io(&self.path, source))
    }

    fn open_read(&self) -> RuntimeResult<File> {
        File::open(&self.path).map_err(|source| RuntimeError::io(&self.path, source))
    }
}

impl Drop for SpoolFile {
    fn drop(&mut self) {
        if let Err(source) = std::fs::remove_file(&self.path) {
            if source.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove spool file {:?}: {}", self.path, source);
            }
        }
    }
}

/// Computes the SHA-256 of everything written through it.
struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    fn finish_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

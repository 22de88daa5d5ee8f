use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use tracing::{debug, warn};

use crate::core::error::{RuntimeError, RuntimeResult};

/// Unpacks a downloaded archive into an existing, empty directory.
pub trait ArchiveExtractor: Send + Sync {
    fn extract(&self, archive: &mut dyn Read, destination: &Path) -> RuntimeResult<()>;
}

impl<F> ArchiveExtractor for F
where
    F: Fn(&mut dyn Read, &Path) -> RuntimeResult<()> + Send + Sync,
{
    fn extract(&self, archive: &mut dyn Read, destination: &Path) -> RuntimeResult<()> {
        self(archive, destination)
    }
}

/// gzip-compressed tar. Entries that would land outside the destination
/// are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarGzExtractor;

impl ArchiveExtractor for TarGzExtractor {
    fn extract(&self, archive: &mut dyn Read, destination: &Path) -> RuntimeResult<()> {
        let to_err = |source: std::io::Error| RuntimeError::Extraction {
            destination: destination.to_path_buf(),
            source,
        };

        let mut tar = tar::Archive::new(GzDecoder::new(archive));
        tar.set_preserve_permissions(true);
        tar.set_overwrite(false);

        let mut unpacked = 0_usize;
        for entry in tar.entries().map_err(to_err)? {
            let mut entry = entry.map_err(to_err)?;
            let path = entry.path().map_err(to_err)?.into_owned();
            if entry.unpack_in(destination).map_err(to_err)? {
                unpacked += 1;
            } else {
                warn!("Skipped archive entry outside destination: {:?}", path);
            }
        }

        debug!("Unpacked {} entries into {:?}", unpacked, destination);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;

    /// Builds an in-memory `.tar.gz` from `(path, contents)` pairs.
    pub(crate) fn tar_gz(files: &[(&str, &str)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, contents.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn unpacks_nested_files() {
        let bytes = tar_gz(&[
            ("version.txt", "5.15-linux-x64\n"),
            ("qt/lib/preload.txt", ""),
            ("qt/plugins/platforms/libqxcb.so", "elf"),
        ]);
        let dir = tempfile::tempdir().unwrap();

        TarGzExtractor
            .extract(&mut bytes.as_slice(), dir.path())
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("version.txt")).unwrap(),
            "5.15-linux-x64\n"
        );
        assert!(dir.path().join("qt/lib/preload.txt").is_file());
        assert!(dir.path().join("qt/plugins/platforms/libqxcb.so").is_file());
    }

    #[test]
    fn corrupt_archive_is_an_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = TarGzExtractor
            .extract(&mut &b"not a gzip stream"[..], dir.path())
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Extraction { .. }));
    }

    #[test]
    fn closures_are_extractors() {
        let extractor = |_: &mut dyn Read, dest: &Path| -> RuntimeResult<()> {
            std::fs::write(dest.join("marker"), b"x").map_err(|e| RuntimeError::io(dest, e))
        };
        let dir = tempfile::tempdir().unwrap();
        extractor.extract(&mut std::io::empty(), dir.path()).unwrap();
        assert!(dir.path().join("marker").exists());
    }
}

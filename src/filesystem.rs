//! The filesystem adapter.
//!
//! Every path the engine touches goes through this module: directory
//! creation, whole-file reads and writes, stat, removal and the
//! memory-mapped read path. Platform quirks (permission bits, ctime
//! extraction, mapping support) live here and nowhere else.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use log::{debug, trace};
use memmap2::Mmap;

use crate::error::{CacheResult, FilesystemErrorKind};

pub(crate) mod constants {
    /// The maximum path extent in bytes; longer paths are refused
    pub(crate) const PATH_EXTENT: usize = 4096;
}

/// Size and creation time of a path, as reported by stat.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PathAttributes {
    /// Size in bytes
    pub(crate) extent: u64,
    /// Creation time (ctime where the platform reports one)
    pub(crate) ctime: DateTime<Utc>,
}

/// Joins a repository root and the slash-separated tail of an IRI.
///
/// The tail is appended verbatim; no normalization is performed.
pub(crate) fn join(root: &Path, tail: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for segment in tail.split('/').filter(|segment| !segment.is_empty()) {
        path.push(segment);
    }
    path
}

/// Refuses paths that exceed the platform extent.
pub(crate) fn ensure_path_extent(path: &Path) -> CacheResult<()> {
    if path.as_os_str().len() > constants::PATH_EXTENT {
        return Err(FilesystemErrorKind::PathTooLong {
            path: path.to_path_buf(),
            limit: constants::PATH_EXTENT,
        }
        .into());
    }
    Ok(())
}

/// Recursively creates every missing directory component of `path` with
/// mode `rwxrwxr-x`. Pre-existing directories are not an error.
pub(crate) fn create_path(path: &Path) -> CacheResult<()> {
    trace!("creating path {path:?}");
    ensure_path_extent(path)?;
    let mut builder = fs::DirBuilder::new();
    _ = builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        _ = builder.mode(0o775);
    }
    builder
        .create(path)
        .map_err(FilesystemErrorKind::DirectoryCreationFailed)?;
    Ok(())
}

/// Removes a file.
pub(crate) fn remove_file(path: &Path) -> CacheResult<()> {
    trace!("removing file {path:?}");
    fs::remove_file(path).map_err(FilesystemErrorKind::FileRemovalFailed)?;
    Ok(())
}

/// Stats a path. Absent paths are not an error, just `None`.
pub(crate) fn path_attributes(path: &Path) -> CacheResult<Option<PathAttributes>> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(Some(PathAttributes {
            extent: metadata.len(),
            ctime: ctime(&metadata),
        })),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(FilesystemErrorKind::QueryingMetadataFailed(err).into()),
    }
}

/// Reads an entire file.
///
/// # Errors
///
/// * [`FilesystemErrorKind::PathNotFound`] - If the file does not exist
/// * [`FilesystemErrorKind::ReadingContentsOfFileFailed`] - For any other read failure
pub(crate) fn file_to_bytes(path: &Path) -> CacheResult<Bytes> {
    trace!("reading {path:?}");
    ensure_path_extent(path)?;
    match fs::read(path) {
        Ok(contents) => Ok(contents.into()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(FilesystemErrorKind::PathNotFound(path.to_path_buf()).into())
        }
        Err(err) => Err(FilesystemErrorKind::ReadingContentsOfFileFailed(err).into()),
    }
}

/// Writes `bytes` to a newly created file. Fails if the file already exists.
pub(crate) fn bytes_to_file(path: &Path, bytes: &[u8]) -> CacheResult<()> {
    trace!("writing {} bytes to {path:?}", bytes.len());
    ensure_path_extent(path)?;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(FilesystemErrorKind::WritingBlobFailed)?;
    file.write_all(bytes)
        .map_err(FilesystemErrorKind::WritingBlobFailed)?;
    file.sync_all()
        .map_err(FilesystemErrorKind::WritingBlobFailed)?;
    Ok(())
}

/// Memory-maps a file read-only.
///
/// Returns `None` when the platform or filesystem refuses the mapping
/// (including zero-length files); callers fall back to [`file_to_bytes`].
pub(crate) fn map_file(path: &Path) -> Option<Mmap> {
    let file = fs::File::open(path).ok()?;
    // SAFETY: the repository never truncates a payload file in place; a
    // payload is written once and only ever removed wholesale.
    match unsafe { Mmap::map(&file) } {
        Ok(region) => Some(region),
        Err(err) => {
            debug!("cannot map {path:?}, falling back to a read: {err}");
            None
        }
    }
}

#[cfg(unix)]
fn ctime(metadata: &fs::Metadata) -> DateTime<Utc> {
    use std::os::unix::fs::MetadataExt;
    DateTime::from_timestamp(metadata.ctime(), u32::try_from(metadata.ctime_nsec()).unwrap_or(0))
        .unwrap_or_default()
}

#[cfg(not(unix))]
fn ctime(metadata: &fs::Metadata) -> DateTime<Utc> {
    metadata
        .created()
        .or_else(|_| metadata.modified())
        .map(DateTime::from)
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_join_appends_iri_segments() {
        let path = join(Path::new("/repo"), "tests/blob/rose");

        assert_eq!(path, PathBuf::from("/repo/tests/blob/rose"));
    }

    #[test]
    fn test_join_skips_empty_segments() {
        let path = join(Path::new("/repo"), "/tests//blob/");

        assert_eq!(path, PathBuf::from("/repo/tests/blob"));
    }

    #[test]
    fn test_create_path_is_recursive_and_idempotent() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b").join("c");

        create_path(&nested).unwrap();
        create_path(&nested).unwrap();

        assert!(nested.is_dir());
    }

    #[test]
    fn test_bytes_to_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("payload");

        bytes_to_file(&path, b"rose").unwrap();

        assert_eq!(&file_to_bytes(&path).unwrap()[..], b"rose");
    }

    #[test]
    fn test_bytes_to_file_refuses_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("payload");

        bytes_to_file(&path, b"rose").unwrap();

        assert!(bytes_to_file(&path, b"tulip").is_err());
        assert_eq!(&file_to_bytes(&path).unwrap()[..], b"rose");
    }

    #[test]
    fn test_path_attributes_absent_is_none() {
        let dir = tempdir().unwrap();

        assert!(path_attributes(&dir.path().join("missing"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_path_attributes_reports_extent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("payload");
        bytes_to_file(&path, b"rose").unwrap();

        let attributes = path_attributes(&path).unwrap().unwrap();
        assert_eq!(attributes.extent, 4);
    }

    #[test]
    fn test_map_file_maps_payload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("payload");
        bytes_to_file(&path, b"rose").unwrap();

        let region = map_file(&path).unwrap();
        assert_eq!(&region[..], b"rose");
    }

    #[test]
    fn test_too_long_path_is_refused() {
        let long = "x".repeat(constants::PATH_EXTENT);
        let path = PathBuf::from("/tmp").join(long);

        assert!(ensure_path_extent(&path).is_err());
    }
}

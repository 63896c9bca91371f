//! The `Repository` type and the operations over its resources.
//!
//! A repository is a directory tree whose root carries a sentinel binding
//! it to the passkey of its creator. Resources live in subdirectories
//! mirroring their IRI; each holds its own sentinel next to a payload file
//! named by a content-addressed hex digest. The digest is derived from the
//! IRI, the resource nonce, the passkey and the repository nonce, so
//! payload filenames are opaque to clients and a caller holding the wrong
//! passkey cannot address them.

use std::{
    fmt, fs,
    io::Write,
    path::{Path, PathBuf},
};

use bytesize::ByteSize;
use chrono::{DateTime, Utc};
use log::{debug, trace, warn};
use walkdir::WalkDir;

use crate::{
    codec::{Image, ImageCodec, MpcCodec},
    error::{CacheResult, FilesystemErrorKind, RepositoryErrorKind, ResourceErrorKind},
    filesystem,
    id::{hash, hash_parts, HexId, Id, Nonce},
    iri::ResourceKind,
    resource::{Payload, Resource},
    sentinel::{constants, RepositorySentinel, ResourceSentinel},
};

/// An opened cache repository.
///
/// Create one on disk with [`Repository::create`], then open it with
/// [`Repository::open`]. A `Repository` performs no internal locking;
/// callers that need concurrent access serialize externally, one handle
/// per thread.
pub struct Repository {
    /// The repository root, as given by the caller
    path: PathBuf,
    /// The repository nonce, loaded from the repository sentinel
    nonce: Nonce,
    /// The caller-supplied passkey; participates in id derivation, never
    /// written to disk in clear
    passkey: Vec<u8>,
    /// Digest of the passkey
    passkey_digest: Id,
    /// Creation time of the repository root
    timestamp: DateTime<Utc>,
    /// The image codec payloads of kind `image` go through
    codec: Box<dyn ImageCodec>,
    /// Per-image passphrase, forwarded opaquely to the codec
    passphrase: Option<Vec<u8>>,
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // the passkey stays out of debug output
        f.debug_struct("Repository")
            .field("path", &self.path)
            .field("nonce", &self.nonce)
            .field("passkey_digest", &self.passkey_digest)
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

/// Digest binding a repository root to its passkey and nonce.
fn check_digest(path: &Path, passkey: &[u8], nonce: &Nonce) -> HexId {
    hash_parts(&[
        path.to_string_lossy().as_bytes(),
        passkey,
        nonce.as_bytes(),
    ])
    .to_hex()
}

impl Repository {
    /// Creates a new repository at `path`.
    ///
    /// The path is created recursively; a fresh nonce is minted and bound
    /// to the passkey inside the repository sentinel.
    ///
    /// # Errors
    ///
    /// * [`RepositoryErrorKind::RepositoryExists`] - If a repository sentinel is already present
    pub fn create(path: impl AsRef<Path>, passkey: impl AsRef<[u8]>) -> CacheResult<()> {
        let path = path.as_ref();
        trace!("creating repository at {path:?}");
        filesystem::create_path(path)?;
        let sentinel_path = path.join(constants::REPOSITORY_SENTINEL);
        if filesystem::path_attributes(&sentinel_path)?.is_some() {
            return Err(RepositoryErrorKind::RepositoryExists(path.to_path_buf()).into());
        }
        let nonce = Nonce::random();
        let sentinel = RepositorySentinel::new(nonce, check_digest(path, passkey.as_ref(), &nonce));
        filesystem::bytes_to_file(&sentinel_path, &sentinel.encode()?)
    }

    /// Opens the repository at `path`.
    ///
    /// The repository sentinel must verify: its CRC authenticates the
    /// stored nonce, and the check digest re-derived from `path`, the
    /// passkey and that nonce must equal the one written at creation.
    ///
    /// # Errors
    ///
    /// * [`RepositoryErrorKind::NoRepositoryFound`] - If the path or its sentinel is absent
    /// * [`SentinelErrorKind::SignatureMismatch`] - If the sentinel CRC does not verify
    /// * [`RepositoryErrorKind::WrongPasskey`] - If the passkey does not match the creator's
    ///
    /// [`SentinelErrorKind::SignatureMismatch`]: crate::error::SentinelErrorKind::SignatureMismatch
    pub fn open(path: impl AsRef<Path>, passkey: impl Into<Vec<u8>>) -> CacheResult<Self> {
        let path = path.as_ref().to_path_buf();
        let passkey = passkey.into();
        trace!("opening repository at {path:?}");
        let attributes = filesystem::path_attributes(&path)?
            .ok_or_else(|| RepositoryErrorKind::NoRepositoryFound(path.clone()))?;
        let sentinel_path = path.join(constants::REPOSITORY_SENTINEL);
        let bytes = filesystem::file_to_bytes(&sentinel_path).map_err(|err| {
            if err.is_not_found() {
                RepositoryErrorKind::NoRepositoryFound(path.clone()).into()
            } else {
                err
            }
        })?;
        let sentinel = RepositorySentinel::decode(&bytes, &sentinel_path)?;
        let nonce = sentinel.nonce();
        if sentinel.check(&sentinel_path)? != check_digest(&path, &passkey, &nonce) {
            return Err(RepositoryErrorKind::WrongPasskey(path).into());
        }
        Ok(Self {
            nonce,
            passkey_digest: hash(&passkey),
            passkey,
            timestamp: attributes.ctime,
            path,
            codec: Box::new(MpcCodec),
            passphrase: None,
        })
    }

    /// Replaces the bundled image codec.
    #[must_use]
    pub fn with_codec(mut self, codec: impl ImageCodec + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    /// Sets the per-image passphrase forwarded opaquely to the codec.
    pub fn set_passphrase(&mut self, passphrase: impl Into<Vec<u8>>) {
        self.passphrase = Some(passphrase.into());
    }

    /// The repository root.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creation time of the repository root directory.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Digest of the caller's passkey.
    #[must_use]
    pub fn passkey_digest(&self) -> Id {
        self.passkey_digest
    }

    /// Acquires a resource handle for `iri`, bound to this repository.
    ///
    /// A fresh resource nonce is minted; nothing touches the disk until
    /// the handle is used in an operation.
    ///
    /// # Errors
    ///
    /// * [`IriErrorKind`] - If the IRI has fewer than two segments or an unknown type segment
    ///
    /// [`IriErrorKind`]: crate::error::IriErrorKind
    pub fn resource(&self, iri: &str) -> CacheResult<Resource> {
        Resource::new(iri)
    }

    /// The content-addressed id of a resource under this repository's
    /// passkey and nonce.
    fn derive_id(&self, resource: &Resource) -> HexId {
        hash_parts(&[
            resource.iri().as_bytes(),
            resource.nonce().as_bytes(),
            &self.passkey,
            self.nonce.as_bytes(),
        ])
        .to_hex()
    }

    fn resource_dir(&self, resource: &Resource) -> PathBuf {
        filesystem::join(&self.path, resource.iri())
    }

    fn resource_sentinel_path(&self, resource: &Resource) -> PathBuf {
        self.resource_dir(resource).join(constants::RESOURCE_SENTINEL)
    }

    fn payload_path(&self, resource: &Resource) -> CacheResult<PathBuf> {
        let id = resource.id().ok_or_else(|| ResourceErrorKind::CannotAccessResource {
            iri: resource.iri().to_string(),
        })?;
        let path = self.resource_dir(resource).join(id.as_str());
        filesystem::ensure_path_extent(&path)?;
        Ok(path)
    }

    /// The lookup/verify step every read path starts with.
    ///
    /// Reads the resource sentinel, authenticates it, re-derives the
    /// content-addressed id from the live passkey and stats the payload
    /// file, populating the resource's ttl, dimensions, id, timestamp and
    /// extent.
    ///
    /// # Errors
    ///
    /// * [`ResourceErrorKind::NoResourceSentinel`] - If the IRI holds no resource
    /// * [`SentinelErrorKind::SignatureMismatch`] - If the sentinel CRC does not verify
    /// * [`ResourceErrorKind::CannotAccessResource`] - If the payload file is absent
    ///
    /// [`SentinelErrorKind::SignatureMismatch`]: crate::error::SentinelErrorKind::SignatureMismatch
    pub fn fetch(&self, resource: &mut Resource) -> CacheResult<()> {
        let sentinel_path = self.resource_sentinel_path(resource);
        let bytes = match filesystem::file_to_bytes(&sentinel_path) {
            Ok(bytes) => bytes,
            Err(err) if err.is_not_found() => {
                return Err(ResourceErrorKind::NoResourceSentinel {
                    iri: resource.iri().to_string(),
                }
                .into())
            }
            Err(err) => return Err(err),
        };
        let sentinel = ResourceSentinel::decode(&bytes, &sentinel_path)?;
        resource.set_nonce(sentinel.nonce());
        resource.set_ttl(sentinel.ttl);
        resource.set_size(sentinel.columns, sentinel.rows);

        // The id stored in the sentinel was derived under the creator's
        // passkey. Re-derive from the live tuple; with the wrong passkey
        // the derived id simply names a file that is not there.
        let stored_id = sentinel.id(&sentinel_path)?;
        let live_id = self.derive_id(resource);
        if stored_id != live_id {
            debug!(
                "stored id of {} does not match the live passkey",
                resource.iri()
            );
        }
        resource.set_id(live_id);

        let payload_path = self.payload_path(resource)?;
        match filesystem::path_attributes(&payload_path)? {
            Some(attributes) => {
                resource.set_attributes(attributes.ctime, attributes.extent);
                Ok(())
            }
            None => Err(ResourceErrorKind::CannotAccessResource {
                iri: resource.iri().to_string(),
            }
            .into()),
        }
    }

    /// Lays down the resource sentinel for a put.
    ///
    /// Only the sentinel is written here; the payload follows through the
    /// kind-specific putter.
    fn put_resource(&self, resource: &mut Resource) -> CacheResult<()> {
        match self.fetch(resource) {
            Ok(()) => {
                return Err(ResourceErrorKind::CannotOverwriteResource {
                    iri: resource.iri().to_string(),
                }
                .into())
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        let dir = self.resource_dir(resource);
        filesystem::create_path(&dir)?;
        let sentinel_path = dir.join(constants::RESOURCE_SENTINEL);
        if filesystem::path_attributes(&sentinel_path)?.is_some() {
            return Err(ResourceErrorKind::ResourceSentinelExists {
                path: sentinel_path,
            }
            .into());
        }
        let id = self.derive_id(resource);
        resource.set_id(id);
        let (columns, rows) = resource.size();
        let sentinel = ResourceSentinel::new(resource.nonce(), resource.ttl(), columns, rows, id);
        filesystem::bytes_to_file(&sentinel_path, &sentinel.encode()?)
    }

    fn ensure_kind(resource: &Resource, kind: ResourceKind) -> CacheResult<()> {
        if resource.kind() != kind {
            return Err(ResourceErrorKind::WrongResourceKind {
                iri: resource.iri().to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Puts a blob resource.
    ///
    /// # Errors
    ///
    /// * [`ResourceErrorKind::CannotOverwriteResource`] - If the IRI is already populated
    pub fn put_blob(&self, resource: &mut Resource, blob: impl AsRef<[u8]>) -> CacheResult<()> {
        trace!("putting blob {}", resource.iri());
        Self::ensure_kind(resource, ResourceKind::Blob)?;
        resource.set_size(0, 0);
        self.put_resource(resource)?;
        filesystem::bytes_to_file(&self.payload_path(resource)?, blob.as_ref())
    }

    /// Puts a metadata resource. The payload is stored NUL-terminated.
    pub fn put_meta(&self, resource: &mut Resource, meta: &str) -> CacheResult<()> {
        trace!("putting meta {}", resource.iri());
        Self::ensure_kind(resource, ResourceKind::Meta)?;
        resource.set_size(0, 0);
        self.put_resource(resource)?;
        let mut payload = Vec::with_capacity(meta.len() + 1);
        payload.extend_from_slice(meta.as_bytes());
        payload.push(0);
        filesystem::bytes_to_file(&self.payload_path(resource)?, &payload)
    }

    /// Puts an image resource through the codec, in its native
    /// memory-mappable format.
    pub fn put_image(&self, resource: &mut Resource, image: &Image) -> CacheResult<()> {
        trace!("putting image {}", resource.iri());
        Self::ensure_kind(resource, ResourceKind::Image)?;
        resource.set_size(image.columns(), image.rows());
        self.put_resource(resource)?;
        self.codec
            .write_image(image, &self.payload_path(resource)?, self.passphrase.as_deref())
    }

    /// Reads the payload of a resource, mapping it when the platform
    /// allows and falling back to an owned read otherwise.
    fn read_payload(&self, resource: &mut Resource) -> CacheResult<()> {
        let path = self.payload_path(resource)?;
        let payload = match filesystem::map_file(&path) {
            Some(region) => Payload::Mapped(region),
            None => Payload::Owned(filesystem::file_to_bytes(&path)?),
        };
        _ = resource.set_payload(payload);
        Ok(())
    }

    /// Gets a blob resource. The returned slice borrows from the resource
    /// and is replaced by the next get on the same handle.
    ///
    /// # Errors
    ///
    /// * [`ResourceErrorKind::CannotAccessResource`] - If the payload is absent
    pub fn get_blob<'r>(&self, resource: &'r mut Resource) -> CacheResult<&'r [u8]> {
        trace!("getting blob {}", resource.iri());
        Self::ensure_kind(resource, ResourceKind::Blob)?;
        self.fetch(resource)?;
        self.read_payload(resource)?;
        #[allow(clippy::expect_used)]
        let payload = resource
            .payload()
            .and_then(Payload::bytes)
            .expect("payload was just read");
        Ok(payload)
    }

    /// Gets a metadata resource as a string (the stored NUL terminator is
    /// stripped).
    pub fn get_meta<'r>(&self, resource: &'r mut Resource) -> CacheResult<&'r str> {
        trace!("getting meta {}", resource.iri());
        Self::ensure_kind(resource, ResourceKind::Meta)?;
        self.fetch(resource)?;
        let iri = resource.iri().to_string();
        self.read_payload(resource)?;
        #[allow(clippy::expect_used)]
        let bytes = resource
            .payload()
            .and_then(Payload::bytes)
            .expect("payload was just read");
        let bytes = bytes.strip_suffix(&[0]).unwrap_or(bytes);
        std::str::from_utf8(bytes)
            .map_err(|_| ResourceErrorKind::MetaNotUtf8 { iri }.into())
    }

    /// Gets an image resource, optionally reduced by an extract geometry.
    ///
    /// `WxH+X+Y` crops to that rectangle, `WxH` resizes preserving aspect;
    /// the string is forwarded to the codec unvalidated. The returned
    /// image borrows from the resource.
    pub fn get_image<'r>(
        &self,
        resource: &'r mut Resource,
        extract: Option<&str>,
    ) -> CacheResult<&'r Image> {
        trace!("getting image {}, extract {extract:?}", resource.iri());
        Self::ensure_kind(resource, ResourceKind::Image)?;
        self.fetch(resource)?;
        let path = self.payload_path(resource)?;
        let image = self
            .codec
            .read_image(&path, extract, self.passphrase.as_deref())?;
        resource.set_size(image.columns(), image.rows());
        let payload = resource.set_payload(Payload::Decoded(image));
        #[allow(clippy::expect_used)]
        let image = payload.image().expect("payload was just decoded");
        Ok(image)
    }

    /// Deletes a resource: its payload, the codec sibling for images, its
    /// sentinel, and any IRI ancestor directories left empty.
    pub fn delete_resource(&self, resource: &mut Resource) -> CacheResult<()> {
        trace!("deleting {}", resource.iri());
        self.fetch(resource)?;
        let payload_path = self.payload_path(resource)?;
        filesystem::remove_file(&payload_path)?;
        if resource.kind() == ResourceKind::Image {
            // the codec's sibling index; absence is not an error
            let mut sibling = payload_path.into_os_string();
            sibling.push(".cache");
            if let Err(err) = filesystem::remove_file(Path::new(&sibling)) {
                debug!("cannot remove codec sibling: {err}");
            }
        }
        filesystem::remove_file(&self.resource_sentinel_path(resource))?;

        // prune IRI prefixes left empty; shared parents refuse removal
        let dir = self.resource_dir(resource);
        let mut current = Some(dir.as_path());
        while let Some(directory) = current {
            if directory == self.path {
                break;
            }
            if fs::remove_dir(directory).is_err() {
                break;
            }
            current = directory.parent();
        }
        Ok(())
    }

    /// Whether the resource's time-to-live has elapsed. A ttl of 0 never
    /// expires.
    pub fn is_expired(&self, resource: &mut Resource) -> CacheResult<bool> {
        self.fetch(resource)?;
        if resource.ttl() == 0 {
            return Ok(false);
        }
        let elapsed = Utc::now()
            .signed_duration_since(resource.timestamp())
            .num_seconds();
        Ok(elapsed >= i64::try_from(resource.ttl()).unwrap_or(i64::MAX))
    }

    /// Deletes the resource if it has expired. Returns whether it was
    /// deleted.
    pub fn expire_resource(&self, resource: &mut Resource) -> CacheResult<bool> {
        if self.is_expired(resource)? {
            self.delete_resource(resource)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Writes one descriptive line for the resource to `sink`:
    /// IRI, dimensions, payload size, ttl as `D:H:M:S` (a trailing `*`
    /// marks an expired entry) and the ISO 8601 creation time.
    pub fn identify_resource(
        &self,
        resource: &mut Resource,
        sink: &mut impl Write,
    ) -> CacheResult<()> {
        self.fetch(resource)?;
        let (columns, rows) = resource.size();
        let ttl = resource.ttl();
        let elapsed = Utc::now()
            .signed_duration_since(resource.timestamp())
            .num_seconds();
        let expired = ttl != 0 && elapsed >= i64::try_from(ttl).unwrap_or(i64::MAX);
        writeln!(
            sink,
            "{} [{}x{}] {} {}:{}:{}:{}{} {}",
            resource.iri(),
            columns,
            rows,
            ByteSize(resource.extent()).to_string_as(true),
            ttl / 86_400,
            (ttl % 86_400) / 3_600,
            (ttl % 3_600) / 60,
            ttl % 60,
            if expired { "*" } else { "" },
            resource.timestamp().format("%Y-%m-%dT%H:%M:%SZ"),
        )
        .map_err(FilesystemErrorKind::WritingSinkFailed)?;
        Ok(())
    }

    /// Visits every resource whose IRI starts with `prefix`, invoking
    /// `callback` once per resource. A callback returning `Ok(false)`
    /// terminates the iteration early.
    ///
    /// Traversal order is directory-natural; no lexicographic order is
    /// guaranteed.
    ///
    /// # Errors
    ///
    /// * [`FilesystemErrorKind::PathNotFound`] - If no directory matches the prefix
    pub fn iterate_resources<F>(&self, prefix: &str, mut callback: F) -> CacheResult<()>
    where
        F: FnMut(&Self, &mut Resource) -> CacheResult<bool>,
    {
        let start = filesystem::join(&self.path, prefix);
        trace!("iterating resources under {start:?}");
        if filesystem::path_attributes(&start)?.is_none() {
            return Err(FilesystemErrorKind::PathNotFound(start).into());
        }
        for entry in WalkDir::new(&start)
            .into_iter()
            .filter_map(walkdir::Result::ok)
        {
            if !entry.file_type().is_file() || entry.file_name() != constants::RESOURCE_SENTINEL {
                continue;
            }
            let Some(parent) = entry.path().parent() else {
                continue;
            };
            let Ok(relative) = parent.strip_prefix(&self.path) else {
                continue;
            };
            let iri = relative
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");
            let mut resource = match Resource::new(&iri) {
                Ok(resource) => resource,
                Err(err) => {
                    warn!("skipping unroutable sentinel at {iri:?}: {err}");
                    continue;
                }
            };
            self.fetch(&mut resource)?;
            if !callback(self, &mut resource)? {
                break;
            }
        }
        Ok(())
    }

    /// Deletes the entire repository: every resource, the repository
    /// sentinel and the directory tree itself.
    pub fn delete(self) -> CacheResult<()> {
        trace!("deleting repository at {:?}", self.path);
        filesystem::remove_file(&self.path.join(constants::REPOSITORY_SENTINEL))?;
        fs::remove_dir_all(&self.path).map_err(FilesystemErrorKind::DirectoryRemovalFailed)?;
        Ok(())
    }
}

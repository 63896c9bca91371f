//! Error types and Result module.

use std::path::PathBuf;

use displaydoc::Display;
use thiserror::Error;

/// Result type that is being returned from methods that can fail and thus
/// have [`MagickCacheError`]s.
pub type CacheResult<T> = Result<T, MagickCacheError>;

/// [`MagickCacheError`] describes the errors that can be returned by the
/// cache repository engine.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MagickCacheError {
    /// [`IdErrorKind`] describes the errors that can happen while dealing with ids
    #[error(transparent)]
    IdError(#[from] IdErrorKind),

    /// [`IriErrorKind`] describes the errors that can happen while parsing an IRI
    #[error(transparent)]
    IriError(#[from] IriErrorKind),

    /// [`SentinelErrorKind`] describes the errors that can happen while encoding or decoding sentinels
    #[error(transparent)]
    SentinelError(#[from] SentinelErrorKind),

    /// [`FilesystemErrorKind`] describes the errors that can be returned by an action on the filesystem
    #[error(transparent)]
    FilesystemError(#[from] FilesystemErrorKind),

    /// [`RepositoryErrorKind`] describes the errors that can be returned by processing the repository
    #[error(transparent)]
    RepositoryError(#[from] RepositoryErrorKind),

    /// [`ResourceErrorKind`] describes the errors that can be returned by processing a resource
    #[error(transparent)]
    ResourceError(#[from] ResourceErrorKind),

    /// [`CodecErrorKind`] describes the errors that can be returned by the image codec
    #[error(transparent)]
    CodecError(#[from] CodecErrorKind),
}

impl MagickCacheError {
    /// Checks whether the error denotes something that was required but is
    /// not present on disk (a sentinel, a payload file or the repository
    /// itself).
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::RepositoryError(RepositoryErrorKind::NoRepositoryFound(_))
                | Self::ResourceError(
                    ResourceErrorKind::NoResourceSentinel { .. }
                        | ResourceErrorKind::CannotAccessResource { .. }
                )
                | Self::FilesystemError(FilesystemErrorKind::PathNotFound(_))
        )
    }

    /// Checks whether the error denotes an attempt to overwrite something
    /// that already exists.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Self::RepositoryError(RepositoryErrorKind::RepositoryExists(_))
                | Self::ResourceError(
                    ResourceErrorKind::CannotOverwriteResource { .. }
                        | ResourceErrorKind::ResourceSentinelExists { .. }
                )
        )
    }

    /// Checks whether the error denotes a sentinel whose CRC did not verify.
    #[must_use]
    pub fn is_signature_mismatch(&self) -> bool {
        matches!(
            self,
            Self::SentinelError(SentinelErrorKind::SignatureMismatch { .. })
        )
    }

    /// Checks whether the error denotes an IRI with an unrecognized type
    /// segment.
    #[must_use]
    pub fn is_unknown_kind(&self) -> bool {
        matches!(self, Self::IriError(IriErrorKind::UnknownResourceType(_)))
    }
}

/// [`IdErrorKind`] describes the errors that can happen while dealing with ids
#[derive(Error, Debug, Display)]
#[non_exhaustive]
pub enum IdErrorKind {
    /// Hex decoding error: `{0:?}`
    HexError(#[from] hex::FromHexError),
    /// empty hex string
    EmptyHexString,
    /// non-ASCII hex string
    NonAsciiHexString,
}

/// [`IriErrorKind`] describes the errors that can happen while parsing an IRI
#[derive(Error, Debug, Display)]
#[non_exhaustive]
pub enum IriErrorKind {
    /// IRI is missing a project component: `{0}`
    MissingProject(String),
    /// IRI is missing a type component: `{0}`
    MissingType(String),
    /// unknown resource type: `{0}`
    UnknownResourceType(String),
}

/// [`SentinelErrorKind`] describes the errors that can happen while encoding
/// or decoding the repository and resource sentinels
#[derive(Error, Debug, Display)]
#[non_exhaustive]
pub enum SentinelErrorKind {
    /// sentinel signature mismatch: `{path:?}`
    SignatureMismatch {
        /// Path of the offending sentinel file
        path: PathBuf,
    },
    /// sentinel record is malformed: `{0:?}`
    MalformedSentinel(#[from] binrw::Error),
    /// sentinel digest is not valid hex: `{path:?}`
    MalformedDigest {
        /// Path of the offending sentinel file
        path: PathBuf,
    },
}

/// [`FilesystemErrorKind`] describes the errors that can be returned by an
/// action on the filesystem
#[derive(Error, Debug, Display)]
#[non_exhaustive]
pub enum FilesystemErrorKind {
    /// directory creation failed: `{0:?}`
    DirectoryCreationFailed(std::io::Error),
    /// querying metadata failed: `{0:?}`
    QueryingMetadataFailed(std::io::Error),
    /// removing file failed: `{0:?}`
    FileRemovalFailed(std::io::Error),
    /// reading file contents failed: `{0:?}`
    ReadingContentsOfFileFailed(std::io::Error),
    /// writing blob to file failed: `{0:?}`
    WritingBlobFailed(std::io::Error),
    /// writing to the output sink failed: `{0:?}`
    WritingSinkFailed(std::io::Error),
    /// directory removal failed: `{0:?}`
    DirectoryRemovalFailed(std::io::Error),
    /// path not found: `{0:?}`
    PathNotFound(PathBuf),
    /// path exceeds the filesystem extent: `{path:?}`
    PathTooLong {
        /// The path that does not fit
        path: PathBuf,
        /// The maximum extent in bytes
        limit: usize,
    },
    /// reading directory failed: `{0:?}`
    ReadingDirectoryFailed(#[from] walkdir::Error),
}

/// [`RepositoryErrorKind`] describes the errors that can be returned by
/// processing the repository
#[derive(Error, Debug, Display)]
#[non_exhaustive]
pub enum RepositoryErrorKind {
    /// no repository found at `{0:?}`
    NoRepositoryFound(PathBuf),
    /// repository already exists at `{0:?}`
    RepositoryExists(PathBuf),
    /// passkey does not match the repository at `{0:?}`
    WrongPasskey(PathBuf),
}

/// [`ResourceErrorKind`] describes the errors that can be returned by
/// processing a resource
#[derive(Error, Debug, Display)]
#[non_exhaustive]
pub enum ResourceErrorKind {
    /// no resource sentinel for `{iri}`
    NoResourceSentinel {
        /// The resource IRI
        iri: String,
    },
    /// cannot access resource: `{iri}`
    CannotAccessResource {
        /// The resource IRI
        iri: String,
    },
    /// cannot overwrite resource: `{iri}`
    CannotOverwriteResource {
        /// The resource IRI
        iri: String,
    },
    /// resource sentinel already exists: `{path:?}`
    ResourceSentinelExists {
        /// Path of the sentinel file
        path: PathBuf,
    },
    /// resource `{iri}` is not of the requested kind
    WrongResourceKind {
        /// The resource IRI
        iri: String,
    },
    /// metadata for `{iri}` is not valid UTF-8
    MetaNotUtf8 {
        /// The resource IRI
        iri: String,
    },
}

/// [`CodecErrorKind`] describes the errors that can be returned by the image
/// codec
#[derive(Error, Debug, Display)]
#[non_exhaustive]
pub enum CodecErrorKind {
    /// invalid extract geometry: `{0}`
    InvalidGeometry(String),
    /// image header is malformed: `{0:?}`
    MalformedImageHeader(#[from] binrw::Error),
    /// not an image in the native cache format: `{0:?}`
    WrongImageMagic(PathBuf),
    /// pixel payload is truncated: `{path:?}`
    TruncatedPixels {
        /// Path of the pixel file
        path: PathBuf,
    },
    /// image dimensions do not match the pixel payload
    InconsistentDimensions,
    /// reading image failed: `{0:?}`
    ReadingImageFailed(std::io::Error),
    /// writing image failed: `{0:?}`
    WritingImageFailed(std::io::Error),
}

//! The sentinel codec.
//!
//! Two small fixed-layout binary records anchor the on-disk format: the
//! repository sentinel at `<root>/.magick-cache` and one resource sentinel
//! per entry at `<root>/<IRI>/.magick-cache-resource`. Each record leads
//! with a CRC-32 computed over the package name, the API version, the
//! signature magic and the record's nonce; a record whose CRC does not
//! verify is corrupt or belongs to a different repository implementation.
//!
//! Integer fields are encoded little-endian so repositories are portable
//! across hosts.

use std::io::Cursor;
use std::path::Path;

use binrw::{binrw, BinRead, BinWrite};

use crate::{
    error::{CacheResult, SentinelErrorKind},
    id::{HexId, Nonce},
};

pub(crate) mod constants {
    /// The package name bound into every sentinel CRC
    pub(crate) const PACKAGE_NAME: &[u8] = b"MagickCache";
    /// The API version bound into every sentinel CRC and recorded per resource
    pub(crate) const API_VERSION: u32 = 1;
    /// The signature magic bound into every sentinel CRC
    pub(crate) const SIGNATURE: u32 = 0xabac_adab;
    /// Filename of the repository sentinel
    pub(crate) const REPOSITORY_SENTINEL: &str = ".magick-cache";
    /// Filename of the per-resource sentinel
    pub(crate) const RESOURCE_SENTINEL: &str = ".magick-cache-resource";
}

/// Computes the leading CRC-32 of a sentinel record from its nonce.
///
/// The CRC input is the canonical prefix `package-name ∥ u32(API_VERSION) ∥
/// u32(SIGNATURE)` followed by the nonce. Only the nonce varies per record.
#[must_use]
pub(crate) fn cache_signature(nonce: &Nonce) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(constants::PACKAGE_NAME);
    hasher.update(&constants::API_VERSION.to_le_bytes());
    hasher.update(&constants::SIGNATURE.to_le_bytes());
    hasher.update(nonce.as_bytes());
    hasher.finalize()
}

/// The record stored at `<root>/.magick-cache`.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RepositorySentinel {
    /// CRC-32 over the canonical prefix and the nonce
    pub(crate) signature: u32,
    /// The repository nonce
    pub(crate) nonce: [u8; 8],
    /// Hex digest of `root-path ∥ passkey ∥ nonce`, the passkey check
    pub(crate) check: [u8; 64],
}

impl RepositorySentinel {
    /// Builds a fresh record for `create` from a nonce and a check digest.
    pub(crate) fn new(nonce: Nonce, check: HexId) -> Self {
        Self {
            signature: cache_signature(&nonce),
            nonce: *nonce.as_bytes(),
            check: *check.as_bytes(),
        }
    }

    /// Serializes the record to its on-disk byte layout.
    pub(crate) fn encode(&self) -> CacheResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write(&mut cursor)
            .map_err(SentinelErrorKind::MalformedSentinel)?;
        Ok(cursor.into_inner())
    }

    /// Deserializes a record read back from `path`, verifying its CRC.
    pub(crate) fn decode(bytes: &[u8], path: &Path) -> CacheResult<Self> {
        let sentinel =
            Self::read(&mut Cursor::new(bytes)).map_err(SentinelErrorKind::MalformedSentinel)?;
        if sentinel.signature != cache_signature(&Nonce::from(sentinel.nonce)) {
            return Err(SentinelErrorKind::SignatureMismatch {
                path: path.to_path_buf(),
            }
            .into());
        }
        Ok(sentinel)
    }

    /// The repository nonce carried by the record.
    pub(crate) fn nonce(&self) -> Nonce {
        Nonce::from(self.nonce)
    }

    /// The passkey check digest carried by the record.
    pub(crate) fn check(&self, path: &Path) -> CacheResult<HexId> {
        HexId::from_bytes(self.check).map_err(|_| {
            SentinelErrorKind::MalformedDigest {
                path: path.to_path_buf(),
            }
            .into()
        })
    }
}

/// The record stored at `<root>/<IRI>/.magick-cache-resource`.
///
/// Fields not relevant to a kind are stored as 0 (columns and rows for
/// blobs and metadata). The id digest is the filename of the payload next
/// to the sentinel.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResourceSentinel {
    /// CRC-32 over the canonical prefix and the nonce
    pub(crate) signature: u32,
    /// The resource nonce
    pub(crate) nonce: [u8; 8],
    /// Time-to-live in seconds; 0 means the resource never expires
    pub(crate) ttl: u64,
    /// Image width, or 0
    pub(crate) columns: u64,
    /// Image height, or 0
    pub(crate) rows: u64,
    /// Hex digest naming the payload file
    pub(crate) id: [u8; 64],
}

impl ResourceSentinel {
    pub(crate) fn new(nonce: Nonce, ttl: u64, columns: u64, rows: u64, id: HexId) -> Self {
        Self {
            signature: cache_signature(&nonce),
            nonce: *nonce.as_bytes(),
            ttl,
            columns,
            rows,
            id: *id.as_bytes(),
        }
    }

    pub(crate) fn encode(&self) -> CacheResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write(&mut cursor)
            .map_err(SentinelErrorKind::MalformedSentinel)?;
        Ok(cursor.into_inner())
    }

    /// Deserializes a record read back from `path`, verifying its CRC.
    pub(crate) fn decode(bytes: &[u8], path: &Path) -> CacheResult<Self> {
        let sentinel =
            Self::read(&mut Cursor::new(bytes)).map_err(SentinelErrorKind::MalformedSentinel)?;
        if sentinel.signature != cache_signature(&Nonce::from(sentinel.nonce)) {
            return Err(SentinelErrorKind::SignatureMismatch {
                path: path.to_path_buf(),
            }
            .into());
        }
        Ok(sentinel)
    }

    pub(crate) fn nonce(&self) -> Nonce {
        Nonce::from(self.nonce)
    }

    pub(crate) fn id(&self, path: &Path) -> CacheResult<HexId> {
        HexId::from_bytes(self.id).map_err(|_| {
            SentinelErrorKind::MalformedDigest {
                path: path.to_path_buf(),
            }
            .into()
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::id::hash;

    fn sentinel_path() -> PathBuf {
        PathBuf::from("/repo/.magick-cache")
    }

    #[test]
    fn test_repository_sentinel_round_trip_passes() {
        let nonce = Nonce::random();
        let check = hash(b"checked").to_hex();
        let sentinel = RepositorySentinel::new(nonce, check);

        let bytes = sentinel.encode().unwrap();
        // u32 CRC + 8-byte nonce + 64 hex chars
        assert_eq!(bytes.len(), 76);

        let read_back = RepositorySentinel::decode(&bytes, &sentinel_path()).unwrap();
        assert_eq!(read_back, sentinel);
        assert_eq!(read_back.nonce(), nonce);
        assert_eq!(read_back.check(&sentinel_path()).unwrap(), check);
    }

    #[test]
    fn test_resource_sentinel_round_trip_passes() {
        let nonce = Nonce::random();
        let id = hash(b"payload").to_hex();
        let sentinel = ResourceSentinel::new(nonce, 75, 70, 46, id);

        let bytes = sentinel.encode().unwrap();
        assert_eq!(bytes.len(), 100);

        let read_back = ResourceSentinel::decode(&bytes, &sentinel_path()).unwrap();
        assert_eq!(read_back.ttl, 75);
        assert_eq!(read_back.columns, 70);
        assert_eq!(read_back.rows, 46);
        assert_eq!(read_back.id(&sentinel_path()).unwrap(), id);
    }

    #[test]
    fn test_tampered_nonce_fails_signature() {
        let sentinel = RepositorySentinel::new(Nonce::random(), hash(b"checked").to_hex());
        let mut bytes = sentinel.encode().unwrap();
        bytes[4] ^= 0xff;

        let err = RepositorySentinel::decode(&bytes, &sentinel_path()).unwrap_err();
        assert!(err.is_signature_mismatch(), "unexpected error: {err}");
    }

    #[test]
    fn test_truncated_record_fails() {
        let sentinel = RepositorySentinel::new(Nonce::random(), hash(b"checked").to_hex());
        let bytes = sentinel.encode().unwrap();

        assert!(RepositorySentinel::decode(&bytes[..12], &sentinel_path()).is_err());
    }

    #[test]
    fn test_signature_depends_on_nonce() {
        let first = cache_signature(&Nonce::from(*b"abcdefgh"));
        let second = cache_signature(&Nonce::from(*b"hgfedcba"));

        assert_ne!(first, second);
    }
}

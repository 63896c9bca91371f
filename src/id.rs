//! The `Id` type, digest helpers and nonces.

use std::{
    fmt::{self, Display},
    ops::Deref,
    path::Path,
    str::FromStr,
};

use rand::{thread_rng, RngCore};
use sha2::{Digest, Sha256};

use crate::error::{CacheResult, IdErrorKind};

pub(super) mod constants {
    /// The length of the digest in bytes
    pub(super) const LEN: usize = 32;
    /// The length of the digest in hexadecimal characters
    pub(crate) const HEX_LEN: usize = LEN * 2;
    /// The length of a nonce in bytes
    pub(crate) const NONCE_LEN: usize = 8;
}

/// `Id` is the digest of a sequence of bytes.
///
/// It names payload files within the repository and authenticates the
/// passkey check digest stored in the repository sentinel.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id([u8; constants::LEN]);

impl FromStr for Id {
    type Err = IdErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = &self.to_hex()[0..8];

        write!(f, "{id}")
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = &self.to_hex()[..];

        write!(f, "{id}")
    }
}

impl Id {
    /// Parse an `Id` from a hexadecimal string
    ///
    /// # Errors
    ///
    /// * [`IdErrorKind::HexError`] - If the string is not a valid hexadecimal string
    ///
    /// # Examples
    ///
    /// ```
    /// use magick_cache::Id;
    ///
    /// let id = Id::from_hex("0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef").unwrap();
    ///
    /// assert_eq!(id.to_hex().as_str(),
    /// "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef");
    /// ```
    pub fn from_hex(s: &str) -> Result<Self, IdErrorKind> {
        if s.is_empty() {
            return Err(IdErrorKind::EmptyHexString);
        }

        if !s.is_ascii() {
            return Err(IdErrorKind::NonAsciiHexString);
        }

        let mut id = Self::default();

        hex::decode_to_slice(s, &mut id.0)?;

        Ok(id)
    }

    /// Convert to [`HexId`], the fixed-width ASCII form used for filenames.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn to_hex(self) -> HexId {
        let mut hex_id = HexId::EMPTY;

        hex::encode_to_slice(self.0, &mut hex_id.0)
            .expect("HexId's len is LEN * 2, should never panic.");

        hex_id
    }

    /// Checks if the [`Id`] is zero
    #[must_use]
    pub fn is_null(&self) -> bool {
        self == &Self::default()
    }
}

/// An `Id` in hexadecimal format
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HexId([u8; constants::HEX_LEN]);

impl From<Id> for HexId {
    fn from(id: Id) -> Self {
        id.to_hex()
    }
}

impl PartialEq<str> for HexId {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl HexId {
    /// An empty [`HexId`]
    const EMPTY: Self = Self([b'0'; constants::HEX_LEN]);

    /// Get the string representation of a [`HexId`]
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn as_str(&self) -> &str {
        // This is only ever filled with hex chars, which are ascii
        std::str::from_utf8(&self.0).expect("HexId is not valid utf8, which should never happen")
    }

    /// The raw ASCII bytes of the hex digest.
    #[must_use]
    pub(crate) fn as_bytes(&self) -> &[u8; constants::HEX_LEN] {
        &self.0
    }

    /// Reconstructs a [`HexId`] from the ASCII bytes stored in a sentinel.
    pub(crate) fn from_bytes(bytes: [u8; constants::HEX_LEN]) -> CacheResult<Self> {
        // round-trip through Id to reject anything that is not hex
        let s = std::str::from_utf8(&bytes).map_err(|_| IdErrorKind::NonAsciiHexString)?;
        let _ = Id::from_hex(s)?;
        Ok(Self(bytes))
    }
}

impl Deref for HexId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl AsRef<Path> for HexId {
    fn as_ref(&self) -> &Path {
        self.as_str().as_ref()
    }
}

/// Hashes the given data.
///
/// # Returns
///
/// The digest [`Id`] of the data.
#[must_use]
pub fn hash(data: &[u8]) -> Id {
    Id(Sha256::digest(data).into())
}

/// Hashes the concatenation of the given parts without materializing it.
///
/// Used for the derived quantities of the repository: the passkey check
/// digest and the content-addressed resource id.
#[must_use]
pub(crate) fn hash_parts(parts: &[&[u8]]) -> Id {
    let mut hasher = Sha256::default();
    for part in parts {
        hasher.update(part);
    }
    Id(hasher.finalize().into())
}

/// An 8-byte random string minted for each repository and resource.
///
/// Nonces domain-separate the sentinel CRC and the id digest so that two
/// resources with the same IRI never share a payload filename.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Nonce([u8; constants::NONCE_LEN]);

impl Nonce {
    /// Mint a fresh random nonce.
    #[must_use]
    pub fn random() -> Self {
        let mut nonce = Self::default();
        thread_rng().fill_bytes(&mut nonce.0);
        nonce
    }

    /// The raw nonce bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; constants::NONCE_LEN] {
        &self.0
    }
}

impl From<[u8; constants::NONCE_LEN]> for Nonce {
    fn from(bytes: [u8; constants::NONCE_LEN]) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_id_to_hex_to_str_fails() {
        let non_hex = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdefZ";
        let id = non_hex.parse::<Id>();

        assert!(id.is_err(), "Id with non-hex str passed");
    }

    #[test]
    fn test_empty_id_fails() {
        let id = "".parse::<Id>();

        assert!(id.is_err(), "Empty id parsed");
    }

    #[rstest]
    #[case("0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef")]
    fn test_parse_id_from_str_passes(#[case] id_str: &str) {
        let id = id_str.parse::<Id>();

        assert!(id.is_ok(), "Id parsing failed");

        let id = id.unwrap().to_hex();

        assert_eq!(id.as_str(), id_str, "Id to hex to str failed");
    }

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(hash(b"rose"), hash(b"rose"));
        assert_ne!(hash(b"rose"), hash(b"tulip"));
    }

    #[test]
    fn test_hash_parts_matches_concatenation() {
        let parts = hash_parts(&[b"tests/blob/rose", b"nonce", b"passkey"]);
        let whole = hash(b"tests/blob/rosenoncepasskey");

        assert_eq!(parts, whole, "part-wise digest differs from contiguous");
    }

    #[test]
    fn test_nonces_are_random() {
        let nonces: Vec<_> = (0..100).map(|_| Nonce::random()).collect();
        let distinct = nonces
            .iter()
            .map(Nonce::as_bytes)
            .collect::<std::collections::HashSet<_>>();

        assert_eq!(distinct.len(), nonces.len(), "Random nonces are not unique");
    }
}

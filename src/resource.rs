//! The `Resource` type.
//!
//! A resource is one logical cache entry addressed by an IRI. It carries
//! the parsed IRI, the per-resource nonce minted at acquisition, the
//! metadata read back from its sentinel and, after a successful get, the
//! payload itself.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use memmap2::Mmap;

use crate::{
    codec::Image,
    error::CacheResult,
    id::{HexId, Nonce},
    iri::{Iri, ResourceKind},
    sentinel::constants::API_VERSION,
};

/// The payload store of a resource.
///
/// Getters hand out borrows into this store; replacing it (the next get on
/// the same resource) or dropping the resource releases the previous
/// flavour - owned memory is freed, mapped regions are unmapped, decoded
/// images are disposed.
#[derive(Debug)]
pub(crate) enum Payload {
    /// Heap-owned bytes (the fallback read path)
    Owned(Bytes),
    /// A memory-mapped region over the payload file
    Mapped(Mmap),
    /// A decoded image returned by the codec
    Decoded(Image),
}

impl Payload {
    pub(crate) fn bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Owned(bytes) => Some(bytes),
            Self::Mapped(region) => Some(region),
            Self::Decoded(_) => None,
        }
    }

    pub(crate) fn image(&self) -> Option<&Image> {
        match self {
            Self::Decoded(image) => Some(image),
            _ => None,
        }
    }
}

/// A single cache entry addressed by an IRI.
///
/// A resource is bound to an open [`Repository`](crate::Repository) at
/// acquisition time and must not outlive it. The metadata accessors report
/// whatever the most recent repository operation populated.
#[derive(Debug)]
pub struct Resource {
    iri: Iri,
    nonce: Nonce,
    id: Option<HexId>,
    ttl: u64,
    version: u64,
    timestamp: DateTime<Utc>,
    extent: u64,
    columns: u64,
    rows: u64,
    payload: Option<Payload>,
}

impl Resource {
    /// Allocates a resource for `iri`, minting a fresh nonce.
    pub(crate) fn new(iri: &str) -> CacheResult<Self> {
        Ok(Self {
            iri: Iri::parse(iri)?,
            nonce: Nonce::random(),
            id: None,
            ttl: 0,
            version: u64::from(API_VERSION),
            timestamp: DateTime::default(),
            extent: 0,
            columns: 0,
            rows: 0,
            payload: None,
        })
    }

    /// Re-keys the resource to a new IRI.
    ///
    /// The content-addressed id is reset; it is re-derived by the next
    /// repository operation that needs it.
    pub fn set_iri(&mut self, iri: &str) -> CacheResult<()> {
        self.iri = Iri::parse(iri)?;
        self.id = None;
        Ok(())
    }

    /// The IRI, exactly as supplied.
    #[must_use]
    pub fn iri(&self) -> &str {
        &self.iri.iri
    }

    /// The first IRI segment.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.iri.project
    }

    /// The kind selected by the second IRI segment.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.iri.kind
    }

    /// The content-addressed id naming the payload file, if one has been
    /// derived yet.
    #[must_use]
    pub fn id(&self) -> Option<&HexId> {
        self.id.as_ref()
    }

    /// Time-to-live in seconds; 0 means the resource never expires.
    #[must_use]
    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    /// Associates a time-to-live (seconds) with the resource.
    pub fn set_ttl(&mut self, ttl: u64) {
        self.ttl = ttl;
    }

    /// The API version recorded for the resource.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Overrides the recorded API version.
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Payload size in bytes, as of the last fetch.
    #[must_use]
    pub fn extent(&self) -> u64 {
        self.extent
    }

    /// Creation time of the payload file, as of the last fetch.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Image dimensions as `(columns, rows)`; `(0, 0)` for non-image kinds.
    #[must_use]
    pub fn size(&self) -> (u64, u64) {
        (self.columns, self.rows)
    }

    pub(crate) fn nonce(&self) -> Nonce {
        self.nonce
    }

    pub(crate) fn set_nonce(&mut self, nonce: Nonce) {
        self.nonce = nonce;
    }

    pub(crate) fn set_id(&mut self, id: HexId) {
        self.id = Some(id);
    }

    pub(crate) fn set_attributes(&mut self, timestamp: DateTime<Utc>, extent: u64) {
        self.timestamp = timestamp;
        self.extent = extent;
    }

    pub(crate) fn set_size(&mut self, columns: u64, rows: u64) {
        self.columns = columns;
        self.rows = rows;
    }

    /// Replaces the payload store, releasing the previous flavour.
    pub(crate) fn set_payload(&mut self, payload: Payload) -> &Payload {
        self.payload.insert(payload)
    }

    pub(crate) fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }
}

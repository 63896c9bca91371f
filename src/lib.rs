/*!
A library for a persistent, filesystem-backed content cache holding images,
arbitrary blobs and textual metadata, keyed by hierarchical identifiers
(IRIs).

# Overview

The main type is the [`Repository`]: a directory tree created once with
[`Repository::create`] and opened with [`Repository::open`]. A per-repository
secret (the passkey) ties the repository to its creator; a content-addressed
identifier derived from that secret makes on-disk filenames opaque to
clients. Entries may persist indefinitely or carry a time-to-live after
which they expire.

A [`Resource`] is one logical entry addressed by an IRI such as
`tests/image/rose`: the first segment routes it to a project, the second
selects its kind (`blob`, `image` or `meta`). Payloads are memory-mapped on
read where the platform supports it, with a plain read as the fallback.
Image payloads go through an [`ImageCodec`]; the bundled [`MpcCodec`] stores
them in a native format that needs no decode on read and understands crop
and resize extract geometries.

# Example - create a repository and round-trip a blob

```rust
use magick_cache::Repository;

let root = tempfile::tempdir().unwrap();
let path = root.path().join("repo");

Repository::create(&path, "5u[Jz,3!").unwrap();
let repo = Repository::open(&path, "5u[Jz,3!").unwrap();

let mut resource = repo.resource("tests/blob/rose").unwrap();
repo.put_blob(&mut resource, &b"\xab\xac\xad\xab"[..]).unwrap();

let mut resource = repo.resource("tests/blob/rose").unwrap();
let payload = repo.get_blob(&mut resource).unwrap();
assert_eq!(payload, b"\xab\xac\xad\xab");
assert_eq!(resource.extent(), 4);
```

# Crate features

- **cli** - Enables the `magick-cache` command-line front end by enabling
  `clap` and `simplelog`. *This feature is disabled by default*.
*/

pub(crate) mod codec;
#[cfg(feature = "cli")]
pub mod cli;
pub(crate) mod error;
pub(crate) mod filesystem;
pub(crate) mod id;
pub(crate) mod iri;
pub(crate) mod repository;
pub(crate) mod resource;
pub(crate) mod sentinel;
pub(crate) mod version;

// magick_cache Public API
pub use crate::{
    codec::{Image, ImageCodec, MpcCodec},
    error::{
        CacheResult, CodecErrorKind, FilesystemErrorKind, IdErrorKind, IriErrorKind,
        MagickCacheError, RepositoryErrorKind, ResourceErrorKind, SentinelErrorKind,
    },
    id::{hash, HexId, Id, Nonce},
    iri::ResourceKind,
    repository::Repository,
    resource::Resource,
    version::{lib_version, version},
};

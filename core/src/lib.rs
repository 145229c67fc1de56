//! Versioned runtime schema resolution and dynamic SCALE codec.
//!
//! A chain's binary layouts for calls, constants, events and storage values change with every
//! runtime upgrade. This crate answers, for any point in chain history, "which layout applies
//! here", and decodes bytes against it.
//!
//! # Flow
//!
//! * [`resolver::Resolver`] maps a block reference to the [`types::SpecVersion`] active there,
//!   learning version windows lazily from a [`source::VersionSource`]
//! * [`registry::Registry`] turns the runtime metadata of that version into an immutable
//!   [`metadata::RuntimeDescription`], fetched once per version from a [`source::MetadataSource`]
//! * [`chain::Chain`] compares the fingerprint a binding was generated against with the one
//!   resolved for the block, and on match decodes the bytes with [`scale`]

pub mod cache;
pub mod chain;
pub mod configuration;
pub mod error;
pub mod fingerprint;
pub mod metadata;
pub mod registry;
pub mod resolver;
pub mod scale;
pub mod schema;
pub mod source;
pub mod types;
pub mod utils;

pub use chain::{Binding, Chain, Resolved};
pub use error::{DecodeError, EncodeError, Error};
pub use fingerprint::Fingerprint;
pub use scale::Value;
pub use schema::{ItemKind, ItemName, TypeRegistry, TypeSchema};
pub use types::{BlockRef, SpecVersion};

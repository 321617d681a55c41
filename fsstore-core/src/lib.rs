//! Schema-driven persistence core for fs-store: the directory/flat codec,
//! the atomic-commit transaction engine, the in-memory index and a minimal
//! query matcher. This crate knows nothing about the write queue, the
//! filesystem watcher or cross-process sync - those live in `fsstore-sync`
//! and above it `fsstore` wires the whole provider together.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod codec;
pub mod index;
pub mod matcher;
pub mod schema;
pub mod txn;

pub use index::{Index, WriteObserver};
pub use matcher::{EqualityMatcher, Matcher};
pub use schema::{DocumentPropertySpec, EntitySetSchema, EntityType, ExtensionResolver, FieldDef, FieldType, SchemaView, StorageMode};
pub use txn::DirectoryStaging;

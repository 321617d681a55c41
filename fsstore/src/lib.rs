//! fs-store: a schema-aware document store that persists typed entity
//! collections to a directory tree, with crash-safe commits, filesystem
//! watching and cross-process sync.
//!
//! ```no_run
//! use fsstore_common::ProviderConfig;
//! use fsstore_core::{EntitySetSchema, EntityType, FieldDef, FieldType, SchemaView, StorageMode};
//! use fsstore::Provider;
//!
//! # async fn run() -> fsstore_common::Result<()> {
//! let mut schema_view = SchemaView::new();
//! schema_view.register_entity_set(EntitySetSchema::new(
//!     "templates",
//!     StorageMode::Directory,
//!     EntityType::new(
//!         "Template",
//!         vec![
//!             FieldDef::new("name", FieldType::String).key().public_key(),
//!             FieldDef::new("content", FieldType::String).document("html"),
//!         ],
//!     ),
//! ));
//!
//! let provider = Provider::init(ProviderConfig::new("./data").with_watch_enabled(false), schema_view).await?;
//! let templates = provider.collection("templates")?;
//! # let _ = templates;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod collection;
pub mod provider;

pub use collection::Collection;
pub use fsstore_common::{Document, Error, PropertyValue, ProviderConfig, Result};
pub use fsstore_core::{EntitySetSchema, EntityType, FieldDef, FieldType, SchemaView, StorageMode};
pub use fsstore_sync::{SyncAction, SyncEnvelope};
pub use provider::Provider;

//! fs-store common - shared document model, config and error types.
//!
//! This crate provides the vocabulary every other fs-store crate builds on:
//! - [`Document`] and [`PropertyValue`], the in-memory record shape
//! - [`ProviderConfig`], the provider's configuration surface
//! - [`Error`] / [`Result`], the unified error hierarchy

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod document;
pub mod error;

pub use config::ProviderConfig;
pub use document::{Document, EntitySetName, PropertyValue, DELETED_ATTR, ENTITY_SET_ATTR};
pub use error::{Error, Result};

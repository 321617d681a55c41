//! Mutation serialization, filesystem watching and cross-process sync for
//! fs-store. [`queue::WriteQueue`] gives every mutation - API-originated or
//! replayed from [`channel::SyncChannel`] - a single, consistent order;
//! [`watcher::FsWatcher`] turns edits made outside the process into reload
//! events.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod channel;
pub mod queue;
pub mod watcher;

pub use channel::{SyncAction, SyncChannel, SyncEnvelope};
pub use queue::WriteQueue;
pub use watcher::{FsWatcher, ReloadEvent};

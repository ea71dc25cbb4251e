//! Incremental message sync and bounded caching engine for a team-chat client.
//!
//! # Public API Overview
//! - [`Session`] is the one object a front end holds: current user, teams,
//!   channels with resolved names, and channel sync.
//! - [`SyncEngine`] pages through a channel and merges pages into a
//!   [`MergedChannelHistory`] without duplicates, with guaranteed termination.
//! - [`CacheStore`] keeps bounded, persisted LRU caches per resource kind.
//! - [`DisplayNameResolver`] labels direct channels from participant ids.
//!
//! The remote service is reached only through [`chat_client::RemoteClient`].

pub mod cache;
pub mod display_name;
pub mod error;
pub mod history;
pub mod session;
pub mod sync;

pub use crate::cache::{CacheCapacities, CacheLoadReport, CacheStore};
pub use crate::display_name::{
    direct_counterpart, user_label, DisplayNameResolver, DIRECT_CHANNEL_SEPARATOR,
    UNKNOWN_USER_LABEL,
};
pub use crate::error::MatterlessError;
pub use crate::history::{MergedChannelHistory, PageMerge};
pub use crate::session::Session;
pub use crate::sync::{
    never_cancel, CancelSignal, IncompleteReason, PageDirection, SyncEngine, SyncOptions,
    SyncOutcome, SyncStatus, DEFAULT_MAX_PAGES, DEFAULT_SYNC_TIMEOUT,
};

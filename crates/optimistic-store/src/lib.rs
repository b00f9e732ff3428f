//! Optimistic Store
//!
//! A client-held collection that applies create/delete edits speculatively,
//! reconciles them against a remote authority, and merges deltas pushed by
//! a change feed.
//!
//! Layout:
//! - record: identity and the bookmark entity
//! - collection: ordered local store plus the shared single-threaded handle
//! - remote: traits for the authority, the push channel and the clock
//! - executor: optimistic create/delete with rollback
//! - listener: push delta application
//! - controller: one session's store, executor and feed wired together, with
//!   resubscription when the feed drops

mod collection;
mod controller;
mod error;
mod executor;
mod listener;
mod record;
mod remote;
mod session;

#[cfg(test)]
mod tests;

pub use collection::{CollectionHandle, LocalCollection, MutationKind, PendingMutation};
pub use controller::{FeedStatus, ShutdownHandle, SyncController, SyncOptions};
pub use error::{RemoteError, SyncError};
pub use executor::MutationExecutor;
pub use listener::{Change, ChangeListener, DecodeError};
pub use record::{Bookmark, NewBookmark, Record, RecordId};
pub use remote::{ChangeFilter, Clock, PushChannel, RawChange, RemoteAuthority, Subscription};
pub use session::Session;

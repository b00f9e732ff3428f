//! Change Listener
//!
//! Applies deltas from the push feed. Every delta is idempotent by id, so
//! echoes of our own edits and late or repeated deliveries are harmless.

use futures::StreamExt;
use log::{debug, warn};
use thiserror::Error;

use crate::collection::CollectionHandle;
use crate::record::{Record, RecordId};
use crate::remote::{RawChange, Subscription};

/// A validated delta
#[derive(Debug, Clone, PartialEq)]
pub enum Change<R> {
    Inserted(R),
    Deleted(RecordId),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported event type `{0}`")]
    UnknownEvent(String),

    #[error("delete payload has no id")]
    MissingId,

    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl<R: Record> Change<R> {
    pub fn decode(raw: RawChange) -> Result<Self, DecodeError> {
        match raw.event_type.to_ascii_uppercase().as_str() {
            "INSERT" => Ok(Change::Inserted(serde_json::from_value(raw.new)?)),
            "DELETE" => {
                let id = raw.old.get("id").cloned().ok_or(DecodeError::MissingId)?;
                Ok(Change::Deleted(serde_json::from_value(id)?))
            }
            other => Err(DecodeError::UnknownEvent(other.to_string())),
        }
    }
}

pub struct ChangeListener<R> {
    store: CollectionHandle<R>,
    owner: String,
}

impl<R: Record> ChangeListener<R> {
    pub fn new(store: CollectionHandle<R>, owner: impl Into<String>) -> Self {
        Self {
            store,
            owner: owner.into(),
        }
    }

    /// Returns whether the visible records changed
    pub fn apply(&self, change: Change<R>) -> bool {
        match change {
            Change::Inserted(record) => {
                if record.owner() != self.owner {
                    warn!("ignoring insert of {} for another owner", record.id());
                    return false;
                }
                let id = record.id().clone();
                // Deleted, or being deleted, here: a late insert must not bring it back
                let applied = self.store.update(|state| {
                    if !state.accepts_insert(&id) {
                        return false;
                    }
                    state.note_arrival(&id);
                    state.records.insert_at_front(record)
                });
                debug!("feed insert {} (applied: {})", id, applied);
                applied
            }
            Change::Deleted(id) => {
                let applied = self.store.update(|state| {
                    state.tombstones.insert(id.clone());
                    state.records.remove_by_id(&id).is_some()
                });
                debug!("feed delete {} (applied: {})", id, applied);
                applied
            }
        }
    }

    /// Decode and apply; malformed payloads are logged and skipped
    pub fn apply_raw(&self, raw: RawChange) -> bool {
        match Change::decode(raw) {
            Ok(change) => self.apply(change),
            Err(err) => {
                warn!("skipping feed payload: {}", err);
                false
            }
        }
    }

    /// Consume the feed until it ends or the store is closed
    pub async fn run(self, mut subscription: Subscription) {
        while let Some(raw) = subscription.next().await {
            if self.store.is_closed() {
                break;
            }
            self.apply_raw(raw);
        }
        debug!("change feed for {} finished", self.owner);
    }
}

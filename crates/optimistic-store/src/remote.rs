//! External Collaborators
//!
//! The remote authority, its push channel and the clock are injected, so the
//! store runs the same against a browser backend and an in-memory fake.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::LocalBoxFuture;
use futures::stream::{LocalBoxStream, Stream};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RemoteError;
use crate::record::{Record, RecordId};

/// Durable source of truth for records
#[async_trait(?Send)]
pub trait RemoteAuthority<R: Record> {
    /// All records owned by `owner`, newest first
    async fn list(&self, owner: &str) -> Result<Vec<R>, RemoteError>;

    /// Returns the stored record with its assigned id and timestamp
    async fn create(&self, owner: &str, draft: &R::Draft) -> Result<R, RemoteError>;

    async fn delete(&self, id: &RecordId) -> Result<(), RemoteError>;
}

/// Which rows a subscription should receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub collection: String,
    pub owner_field: String,
    pub owner: String,
}

/// Change payload as delivered by the feed, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    #[serde(rename = "eventType", alias = "type")]
    pub event_type: String,
    #[serde(default)]
    pub new: Value,
    #[serde(default)]
    pub old: Value,
}

impl RawChange {
    pub fn new(event_type: impl Into<String>, new: Value, old: Value) -> Self {
        Self {
            event_type: event_type.into(),
            new,
            old,
        }
    }
}

/// Realtime feed of changes made by any client
pub trait PushChannel {
    fn subscribe(&self, filter: ChangeFilter) -> Result<Subscription, RemoteError>;
}

/// Live feed of raw changes. Dropping it unsubscribes.
pub struct Subscription {
    events: LocalBoxStream<'static, RawChange>,
    on_unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(events: impl Stream<Item = RawChange> + 'static) -> Self {
        Self {
            events: Box::pin(events),
            on_unsubscribe: None,
        }
    }

    /// Run `teardown` when the subscription is dropped
    pub fn on_unsubscribe(mut self, teardown: impl FnOnce() + 'static) -> Self {
        self.on_unsubscribe = Some(Box::new(teardown));
        self
    }
}

impl Stream for Subscription {
    type Item = RawChange;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<RawChange>> {
        self.events.as_mut().poll_next(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(teardown) = self.on_unsubscribe.take() {
            teardown();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Wall clock and timers of the host event loop
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()>;
}

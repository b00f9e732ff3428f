//! Mutation Executor
//!
//! Applies create/delete to the local store before the authority answers,
//! then promotes or rolls back once it does.

use std::future::Future;
use std::pin::pin;
use std::rc::Rc;
use std::time::Duration;

use futures::future::{self, Either};
use log::{debug, warn};

use crate::collection::{CollectionHandle, PendingMutation};
use crate::error::{RemoteError, SyncError};
use crate::record::{Record, RecordId};
use crate::remote::{Clock, RemoteAuthority};

pub struct MutationExecutor<R, A, C> {
    store: CollectionHandle<R>,
    authority: Rc<A>,
    clock: Rc<C>,
    owner: String,
    timeout: Duration,
}

impl<R, A, C> MutationExecutor<R, A, C>
where
    R: Record,
    A: RemoteAuthority<R>,
    C: Clock,
{
    pub fn new(
        store: CollectionHandle<R>,
        authority: Rc<A>,
        clock: Rc<C>,
        owner: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            authority,
            clock,
            owner: owner.into(),
            timeout,
        }
    }

    pub fn store(&self) -> &CollectionHandle<R> {
        &self.store
    }

    /// Show a placeholder at the top, then swap in the stored record.
    ///
    /// On failure the placeholder is removed and the error returned; the
    /// create is not retried.
    pub async fn create(&self, draft: R::Draft) -> Result<R, SyncError> {
        R::check_draft(&draft).map_err(SyncError::InvalidDraft)?;
        self.ensure_open()?;

        let placeholder = self.store.bookkeep(|state| state.allocate_placeholder());
        let record = R::speculative(placeholder.clone(), &self.owner, &draft, self.clock.now());
        self.store.update(|state| {
            state
                .pending
                .insert(placeholder.clone(), PendingMutation::insert(placeholder.clone()));
            state.records.insert_at_front(record)
        });
        debug!("optimistic insert {}", placeholder);

        let outcome = self.bounded(self.authority.create(&self.owner, &draft)).await;
        self.ensure_open()?;

        match outcome {
            Ok(stored) => {
                self.store.update(|state| {
                    state.pending.remove(&placeholder);
                    if !state.accepts_insert(stored.id()) {
                        // Deleted before our answer arrived
                        return state.records.remove_by_id(&placeholder).is_some();
                    }
                    state.note_arrival(stored.id());
                    state.records.replace_by_id(&placeholder, stored.clone())
                        || state.records.insert_at_front(stored.clone())
                });
                debug!("confirmed {} as {}", placeholder, stored.id());
                Ok(stored)
            }
            Err(err) => {
                self.store.update(|state| {
                    state.pending.remove(&placeholder);
                    state.records.remove_by_id(&placeholder).is_some()
                });
                warn!("create rolled back: {}", err);
                Err(err)
            }
        }
    }

    /// Remove the record immediately; put it back if the authority refuses.
    ///
    /// A placeholder cannot be deleted until its create resolves, and a
    /// record with a delete already in flight is refused.
    pub async fn delete(&self, id: &RecordId) -> Result<(), SyncError> {
        self.ensure_open()?;
        if id.is_pending() {
            return Err(SyncError::PendingCreate(id.clone()));
        }
        self.store.read(|state| {
            if state.pending.contains_key(id) {
                return Err(SyncError::Busy(id.clone()));
            }
            if !state.records.contains(id) {
                return Err(SyncError::NotFound(id.clone()));
            }
            Ok(())
        })?;

        self.store.update(|state| {
            let prior = state.records.snapshot();
            state.pending.insert(id.clone(), PendingMutation::delete(id.clone(), prior));
            state.records.remove_by_id(id).is_some()
        });
        debug!("optimistic delete {}", id);

        let outcome = self.bounded(self.authority.delete(id)).await;
        self.ensure_open()?;

        match outcome {
            Ok(()) => {
                self.store.bookkeep(|state| {
                    state.pending.remove(id);
                    state.tombstones.insert(id.clone());
                });
                debug!("confirmed delete {}", id);
                Ok(())
            }
            Err(err) => {
                self.store.update(|state| {
                    let prior = state.pending.remove(id).and_then(|pending| pending.prior);
                    match prior {
                        Some(prior) => {
                            state.restore_snapshot(prior);
                            true
                        }
                        None => false,
                    }
                });
                warn!("delete of {} rolled back: {}", id, err);
                Err(err)
            }
        }
    }

    fn ensure_open(&self) -> Result<(), SyncError> {
        if self.store.is_closed() {
            return Err(SyncError::TornDown);
        }
        Ok(())
    }

    async fn bounded<T>(&self, request: impl Future<Output = Result<T, RemoteError>>) -> Result<T, SyncError> {
        with_timeout(self.clock.as_ref(), self.timeout, request).await
    }
}

/// Race a remote call against `timeout` on the host's timers
pub(crate) async fn with_timeout<T, C: Clock>(
    clock: &C,
    timeout: Duration,
    request: impl Future<Output = Result<T, RemoteError>>,
) -> Result<T, SyncError> {
    let request = pin!(request);
    match future::select(request, clock.sleep(timeout)).await {
        Either::Left((result, _)) => result.map_err(SyncError::from),
        Either::Right(((), _)) => Err(SyncError::Timeout(timeout)),
    }
}

//! Sync Controller
//!
//! One signed-in session: fetch, subscribe, mutate, tear down. A feed that
//! drops is resubscribed with backoff and the list fetched again.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{AbortHandle, AbortRegistration, Abortable, LocalBoxFuture};
use log::{debug, info, warn};

use crate::collection::CollectionHandle;
use crate::error::SyncError;
use crate::executor::{with_timeout, MutationExecutor};
use crate::listener::ChangeListener;
use crate::record::{Record, RecordId};
use crate::remote::{ChangeFilter, Clock, PushChannel, RemoteAuthority, Subscription};
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Upper bound for every remote call before rolling back
    pub request_timeout: Duration,
    pub collection: String,
    pub owner_field: String,
    /// First wait before resubscribing a dropped feed; doubles per failure
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            collection: "bookmarks".to_string(),
            owner_field: "user_id".to_string(),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }
}

/// Health of the change feed after the initial start
#[derive(Debug, Clone, PartialEq)]
pub enum FeedStatus {
    /// The feed dropped; changes from elsewhere are not shown until it is back
    Interrupted,
    /// Resubscribed and refetched
    Restored,
    /// Gave up; the session needs new credentials
    Stopped(SyncError),
}

type StatusObserver = Rc<RefCell<Option<Box<dyn Fn(&FeedStatus)>>>>;

/// Stops a session from any thread; safe to call more than once
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    closed: Arc<AtomicBool>,
    abort: AbortHandle,
}

impl ShutdownHandle {
    /// Discard pending reconciliations and unsubscribe the feed
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("sync session shut down");
        }
        self.abort.abort();
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Subscribes and fetches for one owner; shared with the feed task
struct Feed<R, A, P, C> {
    store: CollectionHandle<R>,
    authority: Rc<A>,
    channel: Rc<P>,
    clock: Rc<C>,
    filter: ChangeFilter,
    options: SyncOptions,
    status: StatusObserver,
}

impl<R, A, P, C> Clone for Feed<R, A, P, C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            authority: Rc::clone(&self.authority),
            channel: Rc::clone(&self.channel),
            clock: Rc::clone(&self.clock),
            filter: self.filter.clone(),
            options: self.options.clone(),
            status: Rc::clone(&self.status),
        }
    }
}

impl<R, A, P, C> Feed<R, A, P, C>
where
    R: Record,
    A: RemoteAuthority<R>,
    P: PushChannel,
    C: Clock,
{
    /// Subscribe, then fetch and merge the list.
    ///
    /// Subscribing first means deltas that race the fetch are buffered and
    /// deduplicated once the listener runs.
    async fn connect(&self) -> Result<Subscription, SyncError> {
        let subscription = self.channel.subscribe(self.filter.clone())?;

        self.store.bookkeep(|state| state.begin_fetch());
        let fetched = with_timeout(
            self.clock.as_ref(),
            self.options.request_timeout,
            self.authority.list(&self.filter.owner),
        )
        .await;
        if self.store.is_closed() {
            return Err(SyncError::TornDown);
        }

        match fetched {
            Ok(records) => {
                info!("loaded {} {} for {}", records.len(), self.filter.collection, self.filter.owner);
                self.store.update(|state| {
                    state.load_fetched(records);
                    true
                });
                Ok(subscription)
            }
            Err(err) => {
                self.store.bookkeep(|state| state.abandon_fetch());
                Err(err)
            }
        }
    }

    /// Apply deltas until shutdown, reconnecting whenever the feed ends
    async fn follow(self, mut subscription: Subscription) {
        loop {
            ChangeListener::new(self.store.clone(), self.filter.owner.clone())
                .run(subscription)
                .await;
            if self.store.is_closed() {
                return;
            }

            warn!("change feed for {} lost", self.filter.owner);
            self.report(FeedStatus::Interrupted);
            match self.reconnect().await {
                Some(resumed) => {
                    info!("change feed for {} restored", self.filter.owner);
                    self.report(FeedStatus::Restored);
                    subscription = resumed;
                }
                None => return,
            }
        }
    }

    async fn reconnect(&self) -> Option<Subscription> {
        let mut delay = self.options.reconnect_delay;
        loop {
            self.clock.sleep(delay).await;
            if self.store.is_closed() {
                return None;
            }
            match self.connect().await {
                Ok(subscription) => return Some(subscription),
                Err(err) if err.is_torn_down() => return None,
                Err(err) if err.is_unauthorized() => {
                    warn!("change feed for {} stopped: {}", self.filter.owner, err);
                    self.report(FeedStatus::Stopped(err));
                    return None;
                }
                Err(err) => {
                    delay = (delay * 2).min(self.options.max_reconnect_delay);
                    warn!("resubscribe failed: {}; retrying in {:?}", err, delay);
                }
            }
        }
    }

    fn report(&self, status: FeedStatus) {
        if let Some(observer) = self.status.borrow().as_ref() {
            observer(&status);
        }
    }
}

pub struct SyncController<R, A, P, C> {
    session: Session,
    executor: MutationExecutor<R, A, C>,
    feed: Feed<R, A, P, C>,
    shutdown: ShutdownHandle,
    registration: RefCell<Option<AbortRegistration>>,
}

impl<R, A, P, C> SyncController<R, A, P, C>
where
    R: Record,
    A: RemoteAuthority<R> + 'static,
    P: PushChannel + 'static,
    C: Clock + 'static,
{
    pub fn new(session: Session, authority: A, channel: P, clock: C, options: SyncOptions) -> Self {
        let store = CollectionHandle::new();
        let (abort, registration) = AbortHandle::new_pair();
        let shutdown = ShutdownHandle {
            closed: store.closed_flag(),
            abort,
        };
        let authority = Rc::new(authority);
        let clock = Rc::new(clock);
        let executor = MutationExecutor::new(
            store.clone(),
            Rc::clone(&authority),
            Rc::clone(&clock),
            session.user_id.clone(),
            options.request_timeout,
        );
        let feed = Feed {
            store,
            authority,
            channel: Rc::new(channel),
            clock,
            filter: ChangeFilter {
                collection: options.collection.clone(),
                owner_field: options.owner_field.clone(),
                owner: session.user_id.clone(),
            },
            options,
            status: Rc::new(RefCell::new(None)),
        };
        Self {
            session,
            executor,
            feed,
            shutdown,
            registration: RefCell::new(Some(registration)),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn store(&self) -> &CollectionHandle<R> {
        self.executor.store()
    }

    pub fn records(&self) -> Vec<R> {
        self.store().snapshot()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Called when the feed drops, comes back or gives up.
    /// Replaces any previous observer.
    pub fn on_feed_status(&self, observer: impl Fn(&FeedStatus) + 'static) {
        *self.feed.status.borrow_mut() = Some(Box::new(observer));
    }

    /// Load the user's records and start listening.
    ///
    /// Returns the feed task; the caller spawns it on its executor. It ends
    /// when the session is shut down or reconnecting is given up.
    pub async fn start(&self) -> Result<LocalBoxFuture<'static, ()>, SyncError> {
        let registration = self
            .registration
            .borrow_mut()
            .take()
            .ok_or(SyncError::AlreadyStarted)?;

        let subscription = self.feed.connect().await?;

        let task = Abortable::new(self.feed.clone().follow(subscription), registration);
        Ok(Box::pin(async move {
            let _ = task.await;
        }))
    }

    pub async fn create(&self, draft: R::Draft) -> Result<R, SyncError> {
        self.executor.create(draft).await
    }

    pub async fn delete(&self, id: &RecordId) -> Result<(), SyncError> {
        self.executor.delete(id).await
    }

    pub fn shutdown(&self) {
        self.shutdown.shutdown();
        self.store().close();
    }
}

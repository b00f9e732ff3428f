//! Reconciliation Tests
//!
//! Executor, listener and controller against an in-memory backend whose
//! calls can be held open or failed, so interleavings are deterministic.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::channel::{mpsc, oneshot};
use futures::future::{self, FutureExt, LocalBoxFuture};
use proptest::prelude::*;
use serde_json::json;

use crate::{
    Bookmark, Change, ChangeFilter, ChangeListener, Clock, FeedStatus, MutationExecutor, NewBookmark,
    PushChannel, RawChange, RecordId, RemoteAuthority, RemoteError, Session, Subscription,
    SyncController, SyncError, SyncOptions,
};

const OWNER: &str = "user-1";
const TIMEOUT: Duration = Duration::from_secs(10);

/// Ticks one second per reading so sort keys are strictly increasing
#[derive(Clone)]
struct TestClock {
    ticks: Rc<Cell<i64>>,
    timers: bool,
}

impl TestClock {
    fn manual() -> Self {
        Self {
            ticks: Rc::new(Cell::new(0)),
            timers: false,
        }
    }

    fn with_timers() -> Self {
        Self {
            timers: true,
            ..Self::manual()
        }
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        self.ticks.set(self.ticks.get() + 1);
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap() + chrono::Duration::seconds(self.ticks.get())
    }

    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        if self.timers {
            tokio::time::sleep(duration).boxed_local()
        } else {
            future::pending().boxed_local()
        }
    }
}

#[derive(Default)]
struct BackendState {
    rows: RefCell<Vec<Bookmark>>,
    next_id: Cell<u32>,
    failures: Cell<u32>,
    gates: RefCell<VecDeque<oneshot::Receiver<()>>>,
    list_gates: RefCell<VecDeque<oneshot::Receiver<()>>>,
    list_failures: RefCell<VecDeque<RemoteError>>,
    subscribers: RefCell<Vec<mpsc::UnboundedSender<RawChange>>>,
    unsubscribed: Cell<u32>,
}

/// In-memory authority that also echoes every change on its feed
#[derive(Clone)]
struct FakeBackend {
    state: Rc<BackendState>,
    clock: TestClock,
}

impl FakeBackend {
    fn new(clock: &TestClock) -> Self {
        Self {
            state: Rc::default(),
            clock: clock.clone(),
        }
    }

    /// A row that already exists before the session starts
    fn seed(&self, owner: &str, title: &str) -> Bookmark {
        let row = self.next_row(owner, title, &format!("https://{}.dev", title.to_lowercase()));
        self.state.rows.borrow_mut().push(row.clone());
        row
    }

    /// A row created by another device of the same user
    fn insert_from_elsewhere(&self, owner: &str, title: &str) -> Bookmark {
        let row = self.seed(owner, title);
        self.broadcast(insert_change(&row));
        row
    }

    fn fail_next(&self, calls: u32) {
        self.state.failures.set(calls);
    }

    /// Hold the next mutation open until the returned sender fires
    fn hold_next(&self) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        self.state.gates.borrow_mut().push_back(gate);
        release
    }

    /// Hold the next list call open until the returned sender fires
    fn hold_next_list(&self) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        self.state.list_gates.borrow_mut().push_back(gate);
        release
    }

    fn fail_next_list(&self, err: RemoteError) {
        self.state.list_failures.borrow_mut().push_back(err);
    }

    /// Server side of every feed goes away
    fn drop_feed(&self) {
        self.state.subscribers.borrow_mut().clear();
    }

    fn unsubscribed(&self) -> u32 {
        self.state.unsubscribed.get()
    }

    fn broadcast(&self, change: RawChange) {
        self.state
            .subscribers
            .borrow_mut()
            .retain(|subscriber| subscriber.unbounded_send(change.clone()).is_ok());
    }

    fn next_row(&self, owner: &str, title: &str, url: &str) -> Bookmark {
        self.state.next_id.set(self.state.next_id.get() + 1);
        Bookmark {
            id: RecordId::durable(format!("R{}", self.state.next_id.get())),
            user_id: owner.to_string(),
            title: title.to_string(),
            url: url.to_string(),
            created_at: self.clock.now(),
        }
    }

    async fn pass_gate(&self) {
        let gate = self.state.gates.borrow_mut().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
    }

    fn take_failure(&self) -> bool {
        let remaining = self.state.failures.get();
        if remaining == 0 {
            return false;
        }
        self.state.failures.set(remaining - 1);
        true
    }
}

#[async_trait(?Send)]
impl RemoteAuthority<Bookmark> for FakeBackend {
    async fn list(&self, owner: &str) -> Result<Vec<Bookmark>, RemoteError> {
        let gate = self.state.list_gates.borrow_mut().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        let failure = self.state.list_failures.borrow_mut().pop_front();
        if let Some(err) = failure {
            return Err(err);
        }
        let mut rows: Vec<Bookmark> = self
            .state
            .rows
            .borrow()
            .iter()
            .filter(|row| row.user_id == owner)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn create(&self, owner: &str, draft: &NewBookmark) -> Result<Bookmark, RemoteError> {
        self.pass_gate().await;
        if self.take_failure() {
            return Err(RemoteError::Http {
                status: 500,
                message: "insert failed".to_string(),
            });
        }
        let row = self.next_row(owner, &draft.title, &draft.url);
        self.state.rows.borrow_mut().push(row.clone());
        self.broadcast(insert_change(&row));
        Ok(row)
    }

    async fn delete(&self, id: &RecordId) -> Result<(), RemoteError> {
        self.pass_gate().await;
        if self.take_failure() {
            return Err(RemoteError::Http {
                status: 500,
                message: "delete failed".to_string(),
            });
        }
        self.state.rows.borrow_mut().retain(|row| &row.id != id);
        self.broadcast(delete_change(&id.to_string()));
        Ok(())
    }
}

impl PushChannel for FakeBackend {
    fn subscribe(&self, filter: ChangeFilter) -> Result<Subscription, RemoteError> {
        assert_eq!(filter.owner, OWNER);
        let (sender, events) = mpsc::unbounded();
        self.state.subscribers.borrow_mut().push(sender);
        let state = Rc::clone(&self.state);
        Ok(Subscription::new(events)
            .on_unsubscribe(move || state.unsubscribed.set(state.unsubscribed.get() + 1)))
    }
}

fn insert_change(row: &Bookmark) -> RawChange {
    RawChange::new("INSERT", serde_json::to_value(row).unwrap(), json!({}))
}

fn delete_change(id: &str) -> RawChange {
    RawChange::new("DELETE", json!({}), json!({ "id": id }))
}

fn executor(backend: &FakeBackend, clock: &TestClock) -> MutationExecutor<Bookmark, FakeBackend, TestClock> {
    MutationExecutor::new(
        crate::CollectionHandle::new(),
        Rc::new(backend.clone()),
        Rc::new(clock.clone()),
        OWNER,
        TIMEOUT,
    )
}

/// Executor whose store already holds `titles`, listed newest first
fn loaded_executor(
    backend: &FakeBackend,
    clock: &TestClock,
    titles: &[&str],
) -> (MutationExecutor<Bookmark, FakeBackend, TestClock>, Vec<Bookmark>) {
    let executor = executor(backend, clock);
    let mut rows: Vec<Bookmark> = titles.iter().rev().map(|title| backend.seed(OWNER, title)).collect();
    rows.reverse();
    let loaded = rows.clone();
    executor.store().update(|state| {
        state.records.load(loaded);
        true
    });
    (executor, rows)
}

fn session() -> Session {
    Session {
        user_id: OWNER.to_string(),
        email: Some("user@example.com".to_string()),
        access_token: "token".to_string(),
        refresh_token: None,
        expires_at: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
    }
}

fn ids(records: &[Bookmark]) -> Vec<String> {
    records.iter().map(|record| record.id.to_string()).collect()
}

fn example() -> NewBookmark {
    NewBookmark::new("Example", "https://example.com")
}

// ========================
// Mutation Executor
// ========================

#[tokio::test]
async fn test_create_confirms_with_durable_record() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let executor = executor(&backend, &clock);

    let stored = executor.create(example()).await.unwrap();

    assert_eq!(stored.id, RecordId::durable("R1"));
    let records = executor.store().snapshot();
    assert_eq!(ids(&records), vec!["R1"]);
    assert_eq!(records[0].title, "Example");
    assert_eq!(records[0].url, "https://example.com");
    assert!(!executor.store().is_pending(&stored.id));
}

#[tokio::test]
async fn test_placeholder_shown_before_confirmation() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let (executor, _) = loaded_executor(&backend, &clock, &["Older"]);
    let release = backend.hold_next();

    let create = executor.create(example());
    let check = async {
        let records = executor.store().snapshot();
        assert_eq!(records.len(), 2);
        assert!(records[0].is_pending());
        assert_eq!(records[0].title, "Example");
        assert!(executor.store().is_pending(&records[0].id));
        release.send(()).unwrap();
    };
    let (stored, ()) = futures::join!(create, check);

    let stored = stored.unwrap();
    assert_eq!(ids(&executor.store().snapshot()), vec![stored.id.to_string(), "R1".to_string()]);
}

#[tokio::test]
async fn test_create_failure_restores_prior_ids() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let (executor, _) = loaded_executor(&backend, &clock, &["A", "B"]);
    let before = ids(&executor.store().snapshot());
    backend.fail_next(1);

    let result = executor.create(example()).await;

    assert!(matches!(result, Err(SyncError::Remote(RemoteError::Http { status: 500, .. }))));
    assert_eq!(ids(&executor.store().snapshot()), before);
}

#[tokio::test]
async fn test_invalid_draft_makes_no_local_edit() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let executor = executor(&backend, &clock);

    let result = executor.create(NewBookmark::new("", "https://example.com")).await;

    assert!(matches!(result, Err(SyncError::InvalidDraft(_))));
    assert!(executor.store().is_empty());
}

#[tokio::test]
async fn test_delete_removes_record() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let (executor, rows) = loaded_executor(&backend, &clock, &["A", "B"]);

    executor.delete(&rows[1].id).await.unwrap();

    assert_eq!(ids(&executor.store().snapshot()), vec![rows[0].id.to_string()]);
}

#[tokio::test]
async fn test_failed_delete_restores_single_record() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let (executor, rows) = loaded_executor(&backend, &clock, &["Only"]);
    backend.fail_next(1);

    let result = executor.delete(&rows[0].id).await;

    assert!(result.is_err());
    assert_eq!(executor.store().snapshot(), rows);
}

#[tokio::test]
async fn test_failed_delete_restores_original_position() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let (executor, rows) = loaded_executor(&backend, &clock, &["A", "B", "C"]);
    let before = executor.store().snapshot();
    backend.fail_next(1);
    let release = backend.hold_next();

    let delete = executor.delete(&rows[1].id);
    let check = async {
        assert_eq!(executor.store().len(), 2);
        assert!(!executor.store().contains(&rows[1].id));
        release.send(()).unwrap();
    };
    let (result, ()) = futures::join!(delete, check);

    assert!(result.is_err());
    assert_eq!(executor.store().snapshot(), before);
}

#[tokio::test]
async fn test_failed_delete_keeps_changes_made_meanwhile() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let (executor, rows) = loaded_executor(&backend, &clock, &["A", "B", "C"]);
    let listener = ChangeListener::new(executor.store().clone(), OWNER);
    backend.fail_next(1);
    let release = backend.hold_next();

    let delete = executor.delete(&rows[1].id);
    let meanwhile = async {
        listener.apply(Change::Deleted(rows[2].id.clone()));
        let fresh = backend.seed(OWNER, "D");
        listener.apply(Change::Inserted(fresh.clone()));
        release.send(()).unwrap();
        fresh
    };
    let (result, fresh) = futures::join!(delete, meanwhile);

    assert!(result.is_err());
    assert_eq!(
        ids(&executor.store().snapshot()),
        vec![fresh.id.to_string(), rows[0].id.to_string(), rows[1].id.to_string()]
    );
}

#[tokio::test]
async fn test_delete_of_pending_placeholder_is_refused() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let executor = executor(&backend, &clock);
    let release = backend.hold_next();

    let create = executor.create(example());
    let attempt = async {
        let placeholder = executor.store().snapshot()[0].id.clone();
        assert!(placeholder.is_pending());
        let refused = executor.delete(&placeholder).await;
        release.send(()).unwrap();
        (placeholder, refused)
    };
    let (stored, (placeholder, refused)) = futures::join!(create, attempt);

    assert_eq!(refused, Err(SyncError::PendingCreate(placeholder)));
    assert_eq!(ids(&executor.store().snapshot()), vec![stored.unwrap().id.to_string()]);
}

#[tokio::test]
async fn test_second_delete_of_same_record_is_busy() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let (executor, rows) = loaded_executor(&backend, &clock, &["A"]);
    let release = backend.hold_next();

    let first = executor.delete(&rows[0].id);
    let second = async {
        let refused = executor.delete(&rows[0].id).await;
        release.send(()).unwrap();
        refused
    };
    let (first, second) = futures::join!(first, second);

    assert_eq!(first, Ok(()));
    assert_eq!(second, Err(SyncError::Busy(rows[0].id.clone())));
    assert!(executor.store().is_empty());
}

#[tokio::test]
async fn test_delete_of_unknown_record_is_not_found() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let executor = executor(&backend, &clock);
    let missing = RecordId::durable("nope");

    assert_eq!(executor.delete(&missing).await, Err(SyncError::NotFound(missing)));
}

#[tokio::test]
async fn test_mutations_on_different_records_do_not_block() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let (executor, rows) = loaded_executor(&backend, &clock, &["A"]);
    let release = backend.hold_next();

    let create = executor.create(example());
    let other = async {
        // Completes while the create is still held open
        executor.delete(&rows[0].id).await.unwrap();
        assert_eq!(executor.store().len(), 1);
        assert!(executor.store().snapshot()[0].is_pending());
        release.send(()).unwrap();
    };
    let (stored, ()) = futures::join!(create, other);

    assert_eq!(ids(&executor.store().snapshot()), vec![stored.unwrap().id.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_create_times_out_and_rolls_back() {
    let clock = TestClock::with_timers();
    let backend = FakeBackend::new(&clock);
    let executor = executor(&backend, &clock);
    let _never = backend.hold_next();

    let result = executor.create(example()).await;

    assert_eq!(result, Err(SyncError::Timeout(TIMEOUT)));
    assert!(executor.store().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_delete_times_out_and_restores() {
    let clock = TestClock::with_timers();
    let backend = FakeBackend::new(&clock);
    let (executor, rows) = loaded_executor(&backend, &clock, &["A", "B"]);
    let _never = backend.hold_next();

    let result = executor.delete(&rows[0].id).await;

    assert_eq!(result, Err(SyncError::Timeout(TIMEOUT)));
    assert_eq!(executor.store().snapshot(), rows);
}

#[tokio::test]
async fn test_completion_after_close_leaves_store_alone() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let executor = executor(&backend, &clock);
    let release = backend.hold_next();

    let create = executor.create(example());
    let teardown = async {
        executor.store().close();
        release.send(()).unwrap();
    };
    let (result, ()) = futures::join!(create, teardown);

    assert_eq!(result, Err(SyncError::TornDown));
    assert!(executor.store().snapshot()[0].is_pending());
    assert_eq!(executor.create(example()).await, Err(SyncError::TornDown));
}

// ========================
// Change Listener
// ========================

#[tokio::test]
async fn test_feed_delete_is_idempotent() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let (executor, rows) = loaded_executor(&backend, &clock, &["R1", "R2"]);
    let listener = ChangeListener::new(executor.store().clone(), OWNER);

    assert!(listener.apply_raw(delete_change(&rows[1].id.to_string())));
    let once = executor.store().snapshot();
    assert!(!listener.apply_raw(delete_change(&rows[1].id.to_string())));

    assert_eq!(ids(&once), vec![rows[0].id.to_string()]);
    assert_eq!(executor.store().snapshot(), once);
}

#[tokio::test]
async fn test_feed_echo_after_create_is_ignored() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let executor = executor(&backend, &clock);
    let listener = ChangeListener::new(executor.store().clone(), OWNER);

    let stored = executor.create(example()).await.unwrap();

    assert!(!listener.apply_raw(insert_change(&stored)));
    assert_eq!(ids(&executor.store().snapshot()), vec![stored.id.to_string()]);
}

#[tokio::test]
async fn test_feed_insert_before_create_response_is_not_duplicated() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let executor = executor(&backend, &clock);
    let listener = ChangeListener::new(executor.store().clone(), OWNER);
    let release = backend.hold_next();

    let create = executor.create(example());
    let early_echo = async {
        let early = Bookmark {
            id: RecordId::durable("R1"),
            user_id: OWNER.to_string(),
            title: "Example".to_string(),
            url: "https://example.com".to_string(),
            created_at: clock.now(),
        };
        assert!(listener.apply(Change::Inserted(early)));
        assert_eq!(executor.store().len(), 2);
        release.send(()).unwrap();
    };
    let (stored, ()) = futures::join!(create, early_echo);

    assert_eq!(stored.unwrap().id, RecordId::durable("R1"));
    assert_eq!(ids(&executor.store().snapshot()), vec!["R1"]);
}

#[tokio::test]
async fn test_feed_delete_before_create_response_drops_placeholder() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let executor = executor(&backend, &clock);
    let listener = ChangeListener::new(executor.store().clone(), OWNER);
    let release = backend.hold_next();

    let create = executor.create(example());
    let deleted_elsewhere = async {
        listener.apply(Change::Deleted(RecordId::durable("R1")));
        release.send(()).unwrap();
    };
    let (stored, ()) = futures::join!(create, deleted_elsewhere);

    assert!(stored.is_ok());
    assert!(executor.store().is_empty());
}

#[tokio::test]
async fn test_feed_insert_of_confirmed_delete_is_ignored() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let (executor, rows) = loaded_executor(&backend, &clock, &["A"]);
    let listener = ChangeListener::new(executor.store().clone(), OWNER);

    executor.delete(&rows[0].id).await.unwrap();

    assert!(!listener.apply(Change::Inserted(rows[0].clone())));
    assert!(executor.store().is_empty());
}

#[tokio::test]
async fn test_feed_insert_during_delete_does_not_resurrect() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let (executor, rows) = loaded_executor(&backend, &clock, &["A", "B"]);
    let listener = ChangeListener::new(executor.store().clone(), OWNER);
    let release = backend.hold_next();

    let delete = executor.delete(&rows[0].id);
    let late_insert = async {
        let applied = listener.apply(Change::Inserted(rows[0].clone()));
        release.send(()).unwrap();
        applied
    };
    let (result, applied) = futures::join!(delete, late_insert);

    assert_eq!(result, Ok(()));
    assert!(!applied);
    assert_eq!(ids(&executor.store().snapshot()), vec![rows[1].id.to_string()]);
}

#[tokio::test]
async fn test_feed_insert_during_failed_delete_restores_once() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let (executor, rows) = loaded_executor(&backend, &clock, &["A", "B"]);
    let listener = ChangeListener::new(executor.store().clone(), OWNER);
    backend.fail_next(1);
    let release = backend.hold_next();

    let delete = executor.delete(&rows[0].id);
    let late_insert = async {
        listener.apply(Change::Inserted(rows[0].clone()));
        release.send(()).unwrap();
    };
    let (result, ()) = futures::join!(delete, late_insert);

    assert!(result.is_err());
    assert_eq!(executor.store().snapshot(), rows);
}

#[tokio::test]
async fn test_feed_insert_for_other_owner_is_ignored() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let executor = executor(&backend, &clock);
    let listener = ChangeListener::new(executor.store().clone(), OWNER);

    let theirs = backend.seed("someone-else", "Theirs");

    assert!(!listener.apply_raw(insert_change(&theirs)));
    assert!(executor.store().is_empty());
}

#[tokio::test]
async fn test_malformed_payloads_are_skipped() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let executor = executor(&backend, &clock);
    let listener = ChangeListener::new(executor.store().clone(), OWNER);

    assert!(!listener.apply_raw(RawChange::new("UPDATE", json!({}), json!({}))));
    assert!(!listener.apply_raw(RawChange::new("INSERT", json!({ "id": "R9" }), json!({}))));
    assert!(!listener.apply_raw(RawChange::new("DELETE", json!({}), json!({}))));
    assert!(!listener.apply_raw(RawChange::new("DELETE", json!({}), json!({ "id": null }))));

    let valid = backend.seed(OWNER, "Valid");
    assert!(listener.apply_raw(insert_change(&valid)));
    assert_eq!(ids(&executor.store().snapshot()), vec![valid.id.to_string()]);
}

#[test]
fn test_decode_accepts_lowercase_event_types() {
    let change: Change<Bookmark> = Change::decode(RawChange::new("delete", json!(null), json!({ "id": 7 }))).unwrap();

    assert_eq!(change, Change::Deleted(RecordId::durable("7")));
}

// ========================
// Sync Controller
// ========================

#[tokio::test]
async fn test_controller_loads_then_follows_feed() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let older = backend.seed(OWNER, "Older");
    let newer = backend.seed(OWNER, "Newer");
    backend.seed("someone-else", "Theirs");
    let controller = SyncController::new(
        session(),
        backend.clone(),
        backend.clone(),
        clock.clone(),
        SyncOptions::default(),
    );

    let listener = controller.start().await.unwrap();
    assert_eq!(ids(&controller.records()), vec![newer.id.to_string(), older.id.to_string()]);

    let shutdown = controller.shutdown_handle();
    let session_activity = async {
        let mine = controller.create(NewBookmark::new("Mine", "https://mine.dev")).await.unwrap();
        tokio::task::yield_now().await;
        let phone = backend.insert_from_elsewhere(OWNER, "Phone");
        tokio::task::yield_now().await;
        backend.delete(&older.id).await.unwrap();
        tokio::task::yield_now().await;
        shutdown.shutdown();
        (mine, phone)
    };
    let ((), (mine, phone)) = futures::join!(listener, session_activity);

    assert_eq!(
        ids(&controller.records()),
        vec![phone.id.to_string(), mine.id.to_string(), newer.id.to_string()]
    );
    assert_eq!(backend.unsubscribed(), 1);
}

#[tokio::test]
async fn test_controller_observer_sees_every_change() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    backend.seed(OWNER, "Existing");
    let controller = SyncController::new(
        session(),
        backend.clone(),
        backend.clone(),
        clock.clone(),
        SyncOptions::default(),
    );
    let lengths = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&lengths);
    controller.store().observe(move |records| sink.borrow_mut().push(records.len()));

    let _listener = controller.start().await.unwrap();
    let stored = controller.create(example()).await.unwrap();
    controller.delete(&stored.id).await.unwrap();

    // initial, load, placeholder, promotion, removal
    assert_eq!(*lengths.borrow(), vec![0, 1, 2, 2, 1]);
}

#[tokio::test]
async fn test_initial_load_keeps_create_in_flight() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let existing = backend.seed(OWNER, "Existing");
    let controller = SyncController::new(
        session(),
        backend.clone(),
        backend.clone(),
        clock.clone(),
        SyncOptions::default(),
    );
    let release_list = backend.hold_next_list();
    let release_create = backend.hold_next();

    let driver = async {
        let records = controller.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_pending());
        release_list.send(()).unwrap();
        tokio::task::yield_now().await;

        let records = controller.records();
        assert_eq!(records.len(), 2);
        assert!(records[0].is_pending());
        assert_eq!(records[1].id, existing.id);
        release_create.send(()).unwrap();
    };
    let (started, created, ()) = futures::join!(controller.start(), controller.create(example()), driver);

    assert!(started.is_ok());
    let created = created.unwrap();
    assert_eq!(ids(&controller.records()), vec![created.id.to_string(), existing.id.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_feed_is_resubscribed_and_refetched() {
    let clock = TestClock::with_timers();
    let backend = FakeBackend::new(&clock);
    let controller = SyncController::new(
        session(),
        backend.clone(),
        backend.clone(),
        clock.clone(),
        SyncOptions::default(),
    );
    let statuses = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&statuses);
    controller.on_feed_status(move |status| sink.borrow_mut().push(status.clone()));

    let feed = controller.start().await.unwrap();
    let shutdown = controller.shutdown_handle();
    let session_activity = async {
        backend.drop_feed();
        backend.fail_next_list(RemoteError::Network("offline".to_string()));
        let missed = backend.seed(OWNER, "Missed");
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(*statuses.borrow(), vec![FeedStatus::Interrupted, FeedStatus::Restored]);
        assert_eq!(ids(&controller.records()), vec![missed.id.to_string()]);

        let after = backend.insert_from_elsewhere(OWNER, "After");
        tokio::task::yield_now().await;
        shutdown.shutdown();
        (missed, after)
    };
    let ((), (missed, after)) = futures::join!(feed, session_activity);

    assert_eq!(ids(&controller.records()), vec![after.id.to_string(), missed.id.to_string()]);
    // the dropped feed, the failed attempt's subscription, the resumed feed
    assert_eq!(backend.unsubscribed(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_feed_stops_when_credentials_are_rejected() {
    let clock = TestClock::with_timers();
    let backend = FakeBackend::new(&clock);
    let controller = SyncController::new(
        session(),
        backend.clone(),
        backend.clone(),
        clock.clone(),
        SyncOptions::default(),
    );
    let statuses = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&statuses);
    controller.on_feed_status(move |status| sink.borrow_mut().push(status.clone()));

    let feed = controller.start().await.unwrap();
    backend.drop_feed();
    backend.fail_next_list(RemoteError::Unauthorized);
    feed.await;

    assert_eq!(
        *statuses.borrow(),
        vec![
            FeedStatus::Interrupted,
            FeedStatus::Stopped(SyncError::Remote(RemoteError::Unauthorized))
        ]
    );
    assert!(!controller.shutdown_handle().is_shut_down());
}

#[tokio::test]
async fn test_shutdown_before_start_unsubscribes() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let controller = SyncController::new(
        session(),
        backend.clone(),
        backend.clone(),
        clock.clone(),
        SyncOptions::default(),
    );

    controller.shutdown();

    assert!(controller.shutdown_handle().is_shut_down());
    assert!(matches!(controller.start().await, Err(SyncError::TornDown)));
    assert_eq!(backend.unsubscribed(), 1);
    assert_eq!(controller.create(example()).await, Err(SyncError::TornDown));
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let clock = TestClock::manual();
    let backend = FakeBackend::new(&clock);
    let controller = SyncController::new(
        session(),
        backend.clone(),
        backend.clone(),
        clock.clone(),
        SyncOptions::default(),
    );

    let _listener = controller.start().await.unwrap();

    assert!(matches!(controller.start().await, Err(SyncError::AlreadyStarted)));
}

// ========================
// Properties
// ========================

#[derive(Debug, Clone)]
enum Op {
    Create,
    Delete(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Create), any::<usize>().prop_map(Op::Delete)]
}

proptest! {
    #[test]
    fn prop_successful_mutations_leave_live_records_newest_first(ops in proptest::collection::vec(op(), 0..40)) {
        let clock = TestClock::manual();
        let backend = FakeBackend::new(&clock);
        let executor = executor(&backend, &clock);
        let mut live: Vec<RecordId> = Vec::new();

        futures::executor::block_on(async {
            for op in ops {
                match op {
                    Op::Create => {
                        let stored = executor.create(example()).await.unwrap();
                        live.push(stored.id);
                    }
                    Op::Delete(pick) => {
                        if live.is_empty() {
                            continue;
                        }
                        let id = live.remove(pick % live.len());
                        executor.delete(&id).await.unwrap();
                    }
                }
            }
        });

        let records = executor.store().snapshot();
        let got: Vec<RecordId> = records.iter().map(|record| record.id.clone()).collect();
        let want: Vec<RecordId> = live.iter().rev().cloned().collect();
        prop_assert_eq!(got, want);
        prop_assert!(records.windows(2).all(|pair| pair[0].created_at >= pair[1].created_at));
    }
}

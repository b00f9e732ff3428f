//! Local Collection Store
//!
//! `LocalCollection` is the plain ordered store. `CollectionHandle` shares it
//! between the executor, the listener and the UI on a single thread, together
//! with the bookkeeping both sides consult while reconciling.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::record::{Record, RecordId};

/// Records ordered newest first, ids unique
#[derive(Debug, Clone)]
pub struct LocalCollection<R> {
    records: Vec<R>,
}

impl<R> Default for LocalCollection<R> {
    fn default() -> Self {
        Self { records: Vec::new() }
    }
}

impl<R: Record> LocalCollection<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the content with a fetched list
    pub fn load(&mut self, mut records: Vec<R>) {
        // Stable: ties keep the authority's order
        records.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
        let mut seen = HashSet::new();
        records.retain(|record| seen.insert(record.id().clone()));
        self.records = records;
    }

    /// Returns false (and leaves the store alone) if the id is already present
    pub fn insert_at_front(&mut self, record: R) -> bool {
        if self.contains(record.id()) {
            return false;
        }
        self.records.insert(0, record);
        true
    }

    /// No-op if absent
    pub fn remove_by_id(&mut self, id: &RecordId) -> Option<R> {
        let index = self.position(id)?;
        Some(self.records.remove(index))
    }

    /// Swap a record in place, keeping its position.
    ///
    /// Any other copy of the new id is dropped first, so a feed insert that
    /// beat the create response does not leave a duplicate behind.
    pub fn replace_by_id(&mut self, old_id: &RecordId, record: R) -> bool {
        let Some(mut index) = self.position(old_id) else {
            return false;
        };
        if record.id() != old_id {
            if let Some(duplicate) = self.position(record.id()) {
                self.records.remove(duplicate);
                if duplicate < index {
                    index -= 1;
                }
            }
        }
        self.records[index] = record;
        true
    }

    pub fn snapshot(&self) -> Vec<R> {
        self.records.clone()
    }

    pub fn restore(&mut self, snapshot: Vec<R>) {
        self.records = snapshot;
    }

    pub fn position(&self, id: &RecordId) -> Option<usize> {
        self.records.iter().position(|record| record.id() == id)
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &RecordId) -> Option<&R> {
        self.records.iter().find(|record| record.id() == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.records.iter()
    }

    pub fn as_slice(&self) -> &[R] {
        &self.records
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Insert,
    Delete,
}

/// An optimistic edit waiting for the authority's answer
#[derive(Debug, Clone)]
pub struct PendingMutation<R> {
    pub target: RecordId,
    pub kind: MutationKind,
    /// Collection as it was before a delete
    pub prior: Option<Vec<R>>,
}

impl<R> PendingMutation<R> {
    pub fn insert(target: RecordId) -> Self {
        Self {
            target,
            kind: MutationKind::Insert,
            prior: None,
        }
    }

    pub fn delete(target: RecordId, prior: Vec<R>) -> Self {
        Self {
            target,
            kind: MutationKind::Delete,
            prior: Some(prior),
        }
    }
}

type Observer<R> = Box<dyn Fn(&[R])>;

pub(crate) struct StoreState<R> {
    pub(crate) records: LocalCollection<R>,
    pub(crate) pending: HashMap<RecordId, PendingMutation<R>>,
    /// Confirmed deleted during this session, by us or by the feed
    pub(crate) tombstones: HashSet<RecordId>,
    /// Ids that arrived while a fetch was in flight
    arrivals: Option<HashSet<RecordId>>,
    next_placeholder: u64,
    observer: Option<Observer<R>>,
}

impl<R: Record> StoreState<R> {
    pub(crate) fn allocate_placeholder(&mut self) -> RecordId {
        self.next_placeholder += 1;
        RecordId::Pending(self.next_placeholder)
    }

    /// A delete of `id` was sent and has not been answered yet
    pub(crate) fn is_delete_pending(&self, id: &RecordId) -> bool {
        self.pending
            .get(id)
            .is_some_and(|pending| pending.kind == MutationKind::Delete)
    }

    /// Whether the feed or a create response may (re)insert `id`
    pub(crate) fn accepts_insert(&self, id: &RecordId) -> bool {
        !self.tombstones.contains(id) && !self.is_delete_pending(id)
    }

    /// Start tracking inserts that a fetched list may not include yet
    pub(crate) fn begin_fetch(&mut self) {
        self.arrivals = Some(HashSet::new());
    }

    pub(crate) fn abandon_fetch(&mut self) {
        self.arrivals = None;
    }

    pub(crate) fn note_arrival(&mut self, id: &RecordId) {
        if let Some(arrivals) = self.arrivals.as_mut() {
            arrivals.insert(id.clone());
        }
    }

    /// Replace the records with a fetched list without losing local edits.
    ///
    /// Placeholders of creates in flight stay at the front, records that
    /// arrived during the fetch are kept, and ids deleted or being deleted
    /// are left out.
    pub(crate) fn load_fetched(&mut self, fetched: Vec<R>) {
        let arrivals = self.arrivals.take().unwrap_or_default();
        let (placeholders, arrived): (Vec<R>, Vec<R>) = self
            .records
            .iter()
            .filter(|record| {
                let id = record.id();
                (id.is_pending() && self.pending.contains_key(id)) || arrivals.contains(id)
            })
            .cloned()
            .partition(|record| record.id().is_pending());

        let mut merged: Vec<R> = fetched
            .into_iter()
            .chain(arrived)
            .filter(|record| self.accepts_insert(record.id()))
            .collect();
        self.records.load(merged);
        for placeholder in placeholders.into_iter().rev() {
            self.records.insert_at_front(placeholder);
        }
    }

    /// Whether a record from an older snapshot may reappear
    fn is_live(&self, id: &RecordId) -> bool {
        match self.pending.get(id) {
            Some(pending) => pending.kind == MutationKind::Insert,
            // A placeholder with no pending create was already promoted or dropped
            None => !id.is_pending() && !self.tombstones.contains(id),
        }
    }

    /// Put back the collection a failed delete removed a record from.
    ///
    /// The snapshot is restored in full, then reconciled with edits that
    /// completed since it was taken: records removed since stay removed,
    /// records added since are kept at the front.
    pub(crate) fn restore_snapshot(&mut self, prior: Vec<R>) {
        let current = self.records.snapshot();
        let mut restored: Vec<R> = prior
            .into_iter()
            .filter(|record| self.is_live(record.id()))
            .collect();
        let added: Vec<R> = current
            .into_iter()
            .filter(|record| !restored.iter().any(|kept| kept.id() == record.id()))
            .collect();
        restored.splice(0..0, added);
        self.records.restore(restored);
    }
}

/// Shared, single-threaded handle to one session's store
pub struct CollectionHandle<R> {
    state: Rc<RefCell<StoreState<R>>>,
    closed: Arc<AtomicBool>,
}

impl<R> Clone for CollectionHandle<R> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
            closed: Arc::clone(&self.closed),
        }
    }
}

impl<R: Record> Default for CollectionHandle<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> CollectionHandle<R> {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(StoreState {
                records: LocalCollection::new(),
                pending: HashMap::new(),
                tombstones: HashSet::new(),
                arrivals: None,
                next_placeholder: 0,
                observer: None,
            })),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Called with the full record list after every change.
    /// Replaces any previous observer.
    pub fn observe(&self, observer: impl Fn(&[R]) + 'static) {
        self.state.borrow_mut().observer = Some(Box::new(observer));
        self.notify();
    }

    pub fn snapshot(&self) -> Vec<R> {
        self.state.borrow().records.snapshot()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().records.is_empty()
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.state.borrow().records.contains(id)
    }

    pub fn is_pending(&self, id: &RecordId) -> bool {
        self.state.borrow().pending.contains_key(id)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop accepting reconciliations; later completions are discarded
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.state.borrow_mut().pending.clear();
    }

    pub(crate) fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    /// Apply an edit; the observer runs if `edit` reports a change
    pub(crate) fn update(&self, edit: impl FnOnce(&mut StoreState<R>) -> bool) -> bool {
        let changed = {
            let mut state = self.state.borrow_mut();
            edit(&mut state)
        };
        if changed {
            self.notify();
        }
        changed
    }

    /// Bookkeeping that never touches the visible records
    pub(crate) fn bookkeep<T>(&self, edit: impl FnOnce(&mut StoreState<R>) -> T) -> T {
        let mut state = self.state.borrow_mut();
        edit(&mut state)
    }

    pub(crate) fn read<T>(&self, view: impl FnOnce(&StoreState<R>) -> T) -> T {
        view(&self.state.borrow())
    }

    fn notify(&self) {
        let state = self.state.borrow();
        if let Some(observer) = &state.observer {
            observer(state.records.as_slice());
        }
    }
}

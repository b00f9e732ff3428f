//! Global Application State Store
//!
//! Uses Leptos reactive_stores for fine-grained reactivity.

use leptos::prelude::*;
use reactive_stores::Store;

use crate::models::{Bookmark, Notice};

/// Global application state with field-level reactivity
#[derive(Clone, Debug, Default, Store)]
pub struct AppState {
    /// Mirror of the sync session's collection, newest first
    pub bookmarks: Vec<Bookmark>,
    /// Dismissible error banners, oldest first
    pub notices: Vec<Notice>,
    pub next_notice_id: u32,
}

/// Type alias for the store
pub type AppStore = Store<AppState>;

/// Get the app store from context
pub fn use_app_store() -> AppStore {
    expect_context::<AppStore>()
}

// ========================
// Store Helper Functions
// ========================

/// Replace the mirrored bookmarks with the collection's current contents
pub fn store_set_bookmarks(store: &AppStore, bookmarks: &[Bookmark]) {
    *store.bookmarks().write() = bookmarks.to_vec();
}

pub fn store_clear_bookmarks(store: &AppStore) {
    store.bookmarks().write().clear();
}

/// Queue a notice and return its id
pub fn store_push_notice(store: &AppStore, message: String) -> u32 {
    let id = store.next_notice_id().get_untracked();
    store.next_notice_id().set(id + 1);
    store.notices().write().push(Notice { id, message });
    id
}

/// Remove a notice by ID; unknown ids are ignored
pub fn store_dismiss_notice(store: &AppStore, notice_id: u32) {
    store.notices().write().retain(|notice| notice.id != notice_id);
}

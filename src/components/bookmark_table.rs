//! Bookmark Table Component
//!
//! Renders the store's bookmarks, newest first. Rows are keyed by id so a
//! change to one bookmark leaves the others (and any open delete prompt)
//! alone.

use leptos::prelude::*;

use crate::components::DeleteConfirmButton;
use crate::format::{format_date, format_time};
use crate::models::{Bookmark, RecordId};
use crate::store::{use_app_store, AppStateStoreFields, AppStore};

#[component]
pub fn BookmarkTable(#[prop(into)] on_delete: Callback<RecordId>) -> impl IntoView {
    let store = use_app_store();

    view! {
        <table class="bookmark-table">
            <thead>
                <tr>
                    <th>"SL No"</th>
                    <th>"Title"</th>
                    <th>"URL"</th>
                    <th>"Date"</th>
                    <th>"Time"</th>
                    <th>"Action"</th>
                </tr>
            </thead>
            <tbody>
                <For
                    each=move || store.bookmarks().get()
                    key=|bookmark| bookmark.id.clone()
                    children=move |bookmark| view! {
                        <BookmarkRow store=store bookmark=bookmark on_delete=on_delete />
                    }
                />
            </tbody>
        </table>
        <Show when=move || store.bookmarks().with(Vec::is_empty)>
            <p class="empty-state">"No bookmarks yet."</p>
        </Show>
    }
}

#[component]
fn BookmarkRow(store: AppStore, bookmark: Bookmark, on_delete: Callback<RecordId>) -> impl IntoView {
    let pending = bookmark.is_pending();
    let id = bookmark.id.clone();

    // Rows are not rebuilt when others come and go, so the number follows the position
    let serial = {
        let id = id.clone();
        move || {
            store
                .bookmarks()
                .with(|all| all.iter().position(|other| other.id == id))
                .map_or(0, |index| index + 1)
        }
    };

    view! {
        <tr class:pending=pending>
            <td>{serial}</td>
            <td>
                {bookmark.title.clone()}
                {pending.then(|| view! { <span class="pending-label">" (saving)"</span> })}
            </td>
            <td>
                <a href=bookmark.url.clone() target="_blank" rel="noopener noreferrer">"Visit"</a>
            </td>
            <td>{format_date(&bookmark.created_at)}</td>
            <td>{format_time(&bookmark.created_at)}</td>
            <td>
                <DeleteConfirmButton
                    title=bookmark.title.clone()
                    disabled=pending
                    on_confirm=Callback::new(move |_: ()| on_delete.run(id.clone()))
                />
            </td>
        </tr>
    }
}

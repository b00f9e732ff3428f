//! Notice Banner Component

use leptos::prelude::*;

use crate::store::{store_dismiss_notice, use_app_store, AppStateStoreFields};

/// Error banners; each dismisses itself after a few seconds
#[component]
pub fn NoticeBanner() -> impl IntoView {
    let store = use_app_store();

    view! {
        <div class="notices">
            <For
                each=move || store.notices().get()
                key=|notice| notice.id
                children=move |notice| {
                    let id = notice.id;
                    view! {
                        <div class="notice" role="alert">
                            <span>{notice.message}</span>
                            <button class="notice-dismiss" on:click=move |_| store_dismiss_notice(&store, id)>
                                "×"
                            </button>
                        </div>
                    }
                }
            />
        </div>
    }
}

//! New Bookmark Form Component

use leptos::prelude::*;

use crate::models::NewBookmark;

/// Title and URL inputs; cleared as soon as the create is issued
#[component]
pub fn NewBookmarkForm(#[prop(into)] on_create: Callback<NewBookmark>) -> impl IntoView {
    let (title, set_title) = signal(String::new());
    let (url, set_url) = signal(String::new());

    let submit = move |ev: web_sys::SubmitEvent| {
        ev.prevent_default();
        let draft = NewBookmark::new(&title.get_untracked(), &url.get_untracked());
        if draft.title.is_empty() || draft.url.is_empty() {
            return;
        }
        set_title.set(String::new());
        set_url.set(String::new());
        on_create.run(draft);
    };

    view! {
        <form class="new-bookmark-form" on:submit=submit>
            <input
                type="text"
                placeholder="Title"
                prop:value=move || title.get()
                on:input=move |ev| set_title.set(event_target_value(&ev))
            />
            <input
                type="url"
                placeholder="URL"
                prop:value=move || url.get()
                on:input=move |ev| set_url.set(event_target_value(&ev))
            />
            <button type="submit">"Add"</button>
        </form>
    }
}

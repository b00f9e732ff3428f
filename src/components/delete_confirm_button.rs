//! Delete Confirm Button Component

use leptos::prelude::*;

/// Delete control for one bookmark row.
///
/// The first click turns it into an inline "Delete <title>?" prompt; only
/// "Yes" runs `on_confirm`. While `disabled` holds (the bookmark has no
/// server id yet) the control is inert and any open prompt is dropped.
#[component]
pub fn DeleteConfirmButton(
    /// Bookmark title, repeated in the prompt
    #[prop(into)]
    title: String,
    #[prop(into)] disabled: Signal<bool>,
    #[prop(into)] on_confirm: Callback<()>,
) -> impl IntoView {
    let confirming = RwSignal::new(false);
    let prompt = format!("Delete \"{}\"?", title);

    move || {
        if confirming.get() && !disabled.get() {
            view! {
                <span class="delete-confirm" role="group">
                    <span class="delete-confirm-text">{prompt.clone()}</span>
                    <button
                        class="confirm-btn"
                        on:click=move |_| {
                            confirming.set(false);
                            on_confirm.run(());
                        }
                    >
                        "Yes"
                    </button>
                    <button class="cancel-btn" on:click=move |_| confirming.set(false)>
                        "No"
                    </button>
                </span>
            }
            .into_any()
        } else {
            view! {
                <button
                    class="delete-btn"
                    disabled=move || disabled.get()
                    title=move || if disabled.get() { "Saving..." } else { "Delete bookmark" }
                    on:click=move |_| confirming.set(true)
                >
                    "Delete"
                </button>
            }
            .into_any()
        }
    }
}

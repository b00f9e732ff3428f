//! Sign-In Screen

use leptos::prelude::*;
use log::error;

use crate::commands;
use crate::context::AppContext;

#[component]
pub fn SignIn() -> impl IntoView {
    let ctx = use_context::<AppContext>().expect("AppContext should be provided");

    let sign_in = move |_| {
        let config = ctx.config.get_value();
        if let Err(err) = commands::redirect_to_sign_in(&config) {
            error!("could not start sign-in: {}", err);
            ctx.notify("Could not start sign-in.");
        }
    };

    view! {
        <main class="sign-in">
            <h1>"My Bookmarks"</h1>
            <button class="sign-in-btn" on:click=sign_in>"Sign in with Google"</button>
        </main>
    }
}

//! Bookmarks Frontend App
//!
//! Loads configuration, resolves the session and switches between the
//! sign-in screen and the dashboard.

use leptos::prelude::*;
use leptos::task::spawn_local;
use log::{error, warn, LevelFilter};
use reactive_stores::Store;

use crate::commands;
use crate::components::{Dashboard, NoticeBanner, SignIn};
use crate::config::BackendConfig;
use crate::context::AppContext;
use crate::logging;
use crate::store::AppState;

#[component]
pub fn App() -> impl IntoView {
    let config = match BackendConfig::load() {
        Ok(config) => config,
        Err(err) => {
            logging::init(LevelFilter::Warn);
            error!("invalid configuration: {}", err);
            return view! {
                <main class="config-error">
                    <h1>"Configuration error"</h1>
                    <p>{err.to_string()}</p>
                </main>
            }
            .into_any();
        }
    };
    logging::init(config.log_filter().unwrap_or(LevelFilter::Info));

    let store = Store::new(AppState::default());
    provide_context(store);
    let ctx = AppContext::new(config, store);
    provide_context(ctx);

    let (resolving, set_resolving) = signal(true);
    spawn_local(async move {
        let config = ctx.config.get_value();
        match commands::resolve_session(&config).await {
            Ok(session) => ctx.session.set(session),
            Err(err) => {
                warn!("could not resolve session: {}", err);
                ctx.notify(format!("Sign-in failed: {}", err));
            }
        }
        set_resolving.set(false);
    });

    // Keyed on the token so a refreshed session restarts the dashboard
    let signed_in = Memo::new(move |_| {
        ctx.session
            .with(|session| session.as_ref().map(|s| s.access_token.clone()))
    });

    view! {
        <div class="app">
            <NoticeBanner />
            {move || {
                if resolving.get() {
                    view! { <p class="loading">"Loading..."</p> }.into_any()
                } else if signed_in.with(Option::is_some) {
                    view! { <Dashboard /> }.into_any()
                } else {
                    view! { <SignIn /> }.into_any()
                }
            }}
        </div>
    }
    .into_any()
}

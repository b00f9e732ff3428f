//! Dashboard Component
//!
//! Owns the sync session for the signed-in user. Mounting starts it,
//! unmounting (sign-out or session expiry) shuts it down.

use std::rc::Rc;

use leptos::prelude::*;
use leptos::task::spawn_local;
use log::{info, warn};
use optimistic_store::{FeedStatus, SyncController, SyncOptions};

use crate::commands::{BrowserClock, RealtimeChannel, RestAuthority};
use crate::components::{BookmarkTable, NewBookmarkForm};
use crate::context::AppContext;
use crate::models::{Bookmark, NewBookmark, RecordId};
use crate::store::{store_clear_bookmarks, store_set_bookmarks};

type BookmarkSync = SyncController<Bookmark, RestAuthority, RealtimeChannel, BrowserClock>;

#[component]
pub fn Dashboard() -> impl IntoView {
    let ctx = use_context::<AppContext>().expect("AppContext should be provided");
    let Some(session) = ctx.session.get_untracked() else {
        return ().into_any();
    };
    let store = ctx.store;
    let config = ctx.config.get_value();

    let options = SyncOptions {
        request_timeout: config.request_timeout(),
        ..SyncOptions::default()
    };
    let controller: Rc<BookmarkSync> = Rc::new(SyncController::new(
        session.clone(),
        RestAuthority::new(config.clone(), &session),
        RealtimeChannel::new(config, &session),
        BrowserClock,
        options,
    ));
    controller.store().observe(move |records| store_set_bookmarks(&store, records));
    controller.on_feed_status(move |status| match status {
        FeedStatus::Interrupted => ctx.notify("Live updates interrupted. Reconnecting..."),
        FeedStatus::Restored => info!("live updates restored"),
        FeedStatus::Stopped(err) => ctx.report(err),
    });

    let shutdown = controller.shutdown_handle();
    on_cleanup(move || {
        shutdown.shutdown();
        store_clear_bookmarks(&store);
    });

    let sync = StoredValue::new_local(Rc::clone(&controller));

    spawn_local(async move {
        let started = controller.start().await;
        drop(controller);
        match started {
            // Runs until unmount; resubscribes on its own when the feed drops
            Ok(feed) => feed.await,
            Err(err) => {
                warn!("could not load bookmarks: {}", err);
                ctx.report(&err);
            }
        }
    });

    let on_create = Callback::new(move |draft: NewBookmark| {
        let Some(controller) = sync.try_get_value() else {
            return;
        };
        spawn_local(async move {
            if let Err(err) = controller.create(draft).await {
                ctx.report(&err);
            }
        });
    });

    let on_delete = Callback::new(move |id: RecordId| {
        let Some(controller) = sync.try_get_value() else {
            return;
        };
        spawn_local(async move {
            if let Err(err) = controller.delete(&id).await {
                ctx.report(&err);
            }
        });
    });

    let email = session.email.clone().unwrap_or_default();

    view! {
        <section class="dashboard">
            <header class="dashboard-header">
                <h1>"My Bookmarks"</h1>
                <span class="user-email">{email}</span>
                <button class="logout-btn" on:click=move |_| ctx.sign_out()>"Logout"</button>
            </header>
            <NewBookmarkForm on_create=on_create />
            <BookmarkTable on_delete=on_delete />
        </section>
    }
    .into_any()
}

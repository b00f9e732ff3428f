//! Application Context
//!
//! Shared state provided via Leptos Context API.

use gloo_timers::callback::Timeout;
use leptos::prelude::*;
use leptos::task::spawn_local;
use chrono::Utc;
use log::{info, warn};
use optimistic_store::SyncError;

use crate::commands;
use crate::config::BackendConfig;
use crate::models::Session;
use crate::store::{store_dismiss_notice, store_push_notice, AppStore};

const NOTICE_DISMISS_MS: u32 = 6_000;

/// App-wide signals provided via context
#[derive(Clone, Copy)]
pub struct AppContext {
    /// Signed-in session; `None` shows the sign-in screen
    pub session: RwSignal<Option<Session>>,
    pub config: StoredValue<BackendConfig>,
    pub store: AppStore,
    /// A refresh-token exchange is in flight
    renewing: RwSignal<bool>,
}

impl AppContext {
    pub fn new(config: BackendConfig, store: AppStore) -> Self {
        Self {
            session: RwSignal::new(None),
            config: StoredValue::new(config),
            store,
            renewing: RwSignal::new(false),
        }
    }

    /// Show an error banner that dismisses itself
    pub fn notify(&self, message: impl Into<String>) {
        let store = self.store;
        let id = store_push_notice(&store, message.into());
        Timeout::new(NOTICE_DISMISS_MS, move || store_dismiss_notice(&store, id)).forget();
    }

    /// Surface a failed call; a rejected token triggers a refresh
    pub fn report(&self, err: &SyncError) {
        if err.is_torn_down() {
            return;
        }
        if err.is_unauthorized() {
            self.renew_session();
            return;
        }
        self.notify(err.to_string());
    }

    /// Swap the rejected access token for a new one, or end the session.
    ///
    /// A new token remounts the dashboard, which starts a fresh sync session.
    pub fn renew_session(&self) {
        if self.renewing.get_untracked() {
            return;
        }
        let Some(refresh_token) = self
            .session
            .with_untracked(|session| session.as_ref().and_then(|s| s.refresh_token.clone()))
        else {
            self.expire_session();
            return;
        };

        self.renewing.set(true);
        let ctx = *self;
        let config = self.config.get_value();
        spawn_local(async move {
            match commands::refresh_session(&config, &refresh_token, Utc::now()).await {
                Ok(session) => {
                    commands::store_session(&session);
                    ctx.session.set(Some(session));
                }
                Err(err) => {
                    warn!("session refresh failed: {}", err);
                    ctx.expire_session();
                }
            }
            ctx.renewing.set(false);
        });
    }

    fn expire_session(&self) {
        self.notify("Your session has expired. Please sign in again.");
        self.end_session();
    }

    /// Drop the session locally without contacting the backend
    pub fn end_session(&self) {
        commands::clear_session();
        self.session.set(None);
    }

    pub fn sign_out(&self) {
        let Some(session) = self.session.get_untracked() else {
            return;
        };
        let config = self.config.get_value();
        self.session.set(None);
        spawn_local(async move {
            commands::sign_out(&config, &session).await;
            info!("signed out");
        });
    }
}

//! Auth Commands
//!
//! OAuth redirect sign-in, callback handling, token refresh and session
//! persistence.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use optimistic_store::{RemoteError, Session};
use serde::{Deserialize, Serialize};
use url::Url;
use wasm_bindgen::JsValue;

use super::{check_status, network, read_json};
use crate::config::BackendConfig;

const SESSION_KEY: &str = "bookmarks.session";
const DEFAULT_EXPIRES_IN: i64 = 3600;

/// Tokens handed back in the callback URL fragment
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// Answer to a refresh-token grant
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: AuthUser,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

impl TokenResponse {
    /// Servers that do not rotate refresh tokens omit it; keep the one we sent
    fn into_session(self, sent_refresh_token: &str, now: DateTime<Utc>) -> Session {
        Session {
            user_id: self.user.id,
            email: self.user.email,
            access_token: self.access_token,
            refresh_token: Some(self.refresh_token.unwrap_or_else(|| sent_refresh_token.to_string())),
            expires_at: now + Duration::seconds(self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN)),
        }
    }
}

/// Provider authorize URL that returns to `{origin}{callback_path}`
pub fn sign_in_url(config: &BackendConfig, origin: &str) -> Result<Url, RemoteError> {
    let redirect_to = Url::parse(origin)
        .and_then(|origin| origin.join(&config.callback_path))
        .map_err(|e| RemoteError::InvalidRequest(format!("bad origin {}: {}", origin, e)))?;
    let mut url = config.auth_url("authorize")?;
    url.query_pairs_mut()
        .append_pair("provider", &config.provider)
        .append_pair("redirect_to", redirect_to.as_str());
    Ok(url)
}

/// Token endpoint for the refresh grant
pub fn refresh_url(config: &BackendConfig) -> Result<Url, RemoteError> {
    let mut url = config.auth_url("token")?;
    url.query_pairs_mut().append_pair("grant_type", "refresh_token");
    Ok(url)
}

/// `Ok(None)` when the fragment carries no sign-in result
pub fn parse_callback_fragment(fragment: &str) -> Result<Option<CallbackTokens>, RemoteError> {
    let fragment = fragment.trim_start_matches('#');
    if fragment.is_empty() {
        return Ok(None);
    }

    let params: HashMap<String, String> = url::form_urlencoded::parse(fragment.as_bytes())
        .into_owned()
        .collect();

    if let Some(error) = params.get("error") {
        let description = params.get("error_description").unwrap_or(error);
        return Err(RemoteError::InvalidRequest(format!("sign-in failed: {}", description)));
    }

    let Some(access_token) = params.get("access_token").filter(|token| !token.is_empty()) else {
        return Ok(None);
    };

    Ok(Some(CallbackTokens {
        access_token: access_token.clone(),
        refresh_token: params.get("refresh_token").cloned(),
        expires_in: params
            .get("expires_in")
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_EXPIRES_IN),
    }))
}

/// Send the browser to the identity provider
pub fn redirect_to_sign_in(config: &BackendConfig) -> Result<(), String> {
    let window = web_sys::window().ok_or("no window")?;
    let location = window.location();
    let origin = location.origin().map_err(|e| format!("{:?}", e))?;
    let url = sign_in_url(config, &origin).map_err(|e| e.to_string())?;
    location.set_href(url.as_str()).map_err(|e| format!("{:?}", e))
}

/// Resolve the user behind freshly issued tokens
pub async fn complete_sign_in(
    config: &BackendConfig,
    tokens: CallbackTokens,
    now: DateTime<Utc>,
) -> Result<Session, RemoteError> {
    let response = reqwest::Client::new()
        .get(config.auth_url("user")?)
        .header("apikey", &config.anon_key)
        .bearer_auth(&tokens.access_token)
        .send()
        .await
        .map_err(network)?;
    let user: AuthUser = read_json(response).await?;

    Ok(Session {
        user_id: user.id,
        email: user.email,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        expires_at: now + Duration::seconds(tokens.expires_in),
    })
}

/// Trade a refresh token for a new session
pub async fn refresh_session(
    config: &BackendConfig,
    refresh_token: &str,
    now: DateTime<Utc>,
) -> Result<Session, RemoteError> {
    let response = reqwest::Client::new()
        .post(refresh_url(config)?)
        .header("apikey", &config.anon_key)
        .json(&RefreshGrant { refresh_token })
        .send()
        .await
        .map_err(network)?;
    let tokens: TokenResponse = read_json(response).await?;
    let session = tokens.into_session(refresh_token, now);
    info!("refreshed session for {}", session.user_id);
    Ok(session)
}

/// Session for this page load: a sign-in callback first, then storage
pub async fn resolve_session(config: &BackendConfig) -> Result<Option<Session>, RemoteError> {
    let Some(window) = web_sys::window() else {
        return Ok(None);
    };
    let hash = window.location().hash().unwrap_or_default();

    let tokens = match parse_callback_fragment(&hash) {
        Ok(Some(tokens)) => tokens,
        Ok(None) => return restore_session(config, Utc::now()).await,
        Err(err) => {
            clear_address_bar(&window);
            return Err(err);
        }
    };

    // Tokens must not linger in the address bar or history
    clear_address_bar(&window);
    let session = complete_sign_in(config, tokens, Utc::now()).await?;
    store_session(&session);
    info!("signed in as {}", session.email.as_deref().unwrap_or(&session.user_id));
    Ok(Some(session))
}

/// Stored session, refreshed when it has expired and can be
async fn restore_session(config: &BackendConfig, now: DateTime<Utc>) -> Result<Option<Session>, RemoteError> {
    let Some(stored) = read_stored_session() else {
        return Ok(None);
    };
    if !stored.is_expired(now) {
        return Ok(Some(stored));
    }
    let Some(refresh_token) = stored.refresh_token else {
        info!("stored session expired");
        clear_session();
        return Ok(None);
    };

    match refresh_session(config, &refresh_token, now).await {
        Ok(session) => {
            store_session(&session);
            Ok(Some(session))
        }
        // Offline: keep the stored tokens for the next load
        Err(err @ RemoteError::Network(_)) => Err(err),
        Err(err) => {
            info!("stored session could not be refreshed: {}", err);
            clear_session();
            Ok(None)
        }
    }
}

fn clear_address_bar(window: &web_sys::Window) {
    if let Ok(history) = window.history() {
        let _ = history.replace_state_with_url(&JsValue::NULL, "", Some("/"));
    }
}

fn local_storage() -> Option<web_sys::Storage> {
    web_sys::window()?.local_storage().ok().flatten()
}

/// Stored session, expired or not; unreadable entries are dropped
fn read_stored_session() -> Option<Session> {
    let storage = local_storage()?;
    let raw = storage.get_item(SESSION_KEY).ok().flatten()?;
    match serde_json::from_str::<Session>(&raw) {
        Ok(session) => Some(session),
        Err(err) => {
            warn!("discarding unreadable stored session: {}", err);
            clear_session();
            None
        }
    }
}

pub fn store_session(session: &Session) {
    let Some(storage) = local_storage() else {
        return;
    };
    match serde_json::to_string(session) {
        Ok(raw) => {
            if storage.set_item(SESSION_KEY, &raw).is_err() {
                warn!("could not persist session");
            }
        }
        Err(err) => warn!("could not serialize session: {}", err),
    }
}

pub fn clear_session() {
    if let Some(storage) = local_storage() {
        let _ = storage.remove_item(SESSION_KEY);
    }
}

/// Revoke the token server-side; local state is cleared regardless
pub async fn sign_out(config: &BackendConfig, session: &Session) {
    if let Err(err) = revoke(config, session).await {
        warn!("sign-out request failed: {}", err);
    }
    clear_session();
}

async fn revoke(config: &BackendConfig, session: &Session) -> Result<(), RemoteError> {
    let response = reqwest::Client::new()
        .post(config.auth_url("logout")?)
        .header("apikey", &config.anon_key)
        .bearer_auth(&session.access_token)
        .send()
        .await
        .map_err(network)?;
    check_status(response).await.map(|_| ())
}

//! Bookmark Commands
//!
//! REST bindings for the `bookmarks` table, exposed to the store as its
//! remote authority.

use async_trait::async_trait;
use optimistic_store::{Bookmark, NewBookmark, RecordId, RemoteAuthority, RemoteError, Session};
use serde::Serialize;
use url::Url;

use super::{network, read_json};
use crate::config::{BackendConfig, ConfigError};

const TABLE: &str = "bookmarks";

#[derive(Serialize)]
struct InsertRow<'a> {
    title: &'a str,
    url: &'a str,
    user_id: &'a str,
}

/// One user's bookmarks, newest first
pub fn list_url(config: &BackendConfig, owner: &str) -> Result<Url, ConfigError> {
    let mut url = config.rest_url(TABLE)?;
    url.query_pairs_mut()
        .append_pair("select", "*")
        .append_pair("user_id", &format!("eq.{}", owner))
        .append_pair("order", "created_at.desc");
    Ok(url)
}

/// Exactly one row
pub fn row_url(config: &BackendConfig, id: &str) -> Result<Url, ConfigError> {
    let mut url = config.rest_url(TABLE)?;
    url.query_pairs_mut().append_pair("id", &format!("eq.{}", id));
    Ok(url)
}

pub struct RestAuthority {
    client: reqwest::Client,
    config: BackendConfig,
    access_token: String,
}

impl RestAuthority {
    pub fn new(config: BackendConfig, session: &Session) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            access_token: session.access_token.clone(),
        }
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&self.access_token)
    }
}

#[async_trait(?Send)]
impl RemoteAuthority<Bookmark> for RestAuthority {
    async fn list(&self, owner: &str) -> Result<Vec<Bookmark>, RemoteError> {
        let response = self
            .request(reqwest::Method::GET, list_url(&self.config, owner)?)
            .send()
            .await
            .map_err(network)?;
        read_json(response).await
    }

    async fn create(&self, owner: &str, draft: &NewBookmark) -> Result<Bookmark, RemoteError> {
        let row = InsertRow {
            title: &draft.title,
            url: &draft.url,
            user_id: owner,
        };
        let response = self
            .request(reqwest::Method::POST, self.config.rest_url(TABLE)?)
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await
            .map_err(network)?;
        let mut stored: Vec<Bookmark> = read_json(response).await?;
        stored
            .pop()
            .ok_or_else(|| RemoteError::Decode("insert returned no row".to_string()))
    }

    async fn delete(&self, id: &RecordId) -> Result<(), RemoteError> {
        let id = id
            .as_durable()
            .ok_or_else(|| RemoteError::InvalidRequest(format!("{} is not saved yet", id)))?;
        let response = self
            .request(reqwest::Method::DELETE, row_url(&self.config, id)?)
            .header("Prefer", "return=representation")
            .send()
            .await
            .map_err(network)?;
        // Row-level security filters silently; an empty result means nothing was deleted
        let deleted: Vec<Bookmark> = read_json(response).await?;
        if deleted.is_empty() {
            return Err(RemoteError::Http {
                status: 404,
                message: format!("bookmark {} not found", id),
            });
        }
        Ok(())
    }
}

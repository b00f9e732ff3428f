//! Backend Command Wrappers
//!
//! Bindings to the hosted backend, organized by concern.

mod auth;
mod bookmark;
mod clock;
mod realtime;

use optimistic_store::RemoteError;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::config::ConfigError;

// Re-export all public items
pub use auth::*;
pub use bookmark::*;
pub use clock::*;
pub use realtime::*;

pub(crate) fn network(err: reqwest::Error) -> RemoteError {
    RemoteError::Network(err.to_string())
}

impl From<ConfigError> for RemoteError {
    fn from(err: ConfigError) -> Self {
        RemoteError::InvalidRequest(err.to_string())
    }
}

/// Map error statuses; an expired or missing token is `Unauthorized`
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(RemoteError::Unauthorized);
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(RemoteError::Http {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

pub(crate) async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RemoteError> {
    check_status(response)
        .await?
        .json::<T>()
        .await
        .map_err(|e| RemoteError::Decode(e.to_string()))
}

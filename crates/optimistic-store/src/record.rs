//! Record Identity and Bookmark Entity
//!
//! Every record carries an identifier that is either assigned by the remote
//! authority or a local placeholder awaiting confirmation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

/// Record identifier
///
/// Placeholders live in their own variant, so they can never be confused
/// with an authority-assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordId {
    /// Assigned by the remote authority
    Durable(String),
    /// Local placeholder for a create that has not been confirmed
    Pending(u64),
}

impl RecordId {
    pub fn durable(id: impl Into<String>) -> Self {
        RecordId::Durable(id.into())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, RecordId::Pending(_))
    }

    /// The authority-assigned value, if confirmed
    pub fn as_durable(&self) -> Option<&str> {
        match self {
            RecordId::Durable(id) => Some(id),
            RecordId::Pending(_) => None,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Durable(id) => f.write_str(id),
            RecordId::Pending(seq) => write!(f, "pending-{}", seq),
        }
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Identity columns come back as numbers, uuid columns as strings
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Text(String),
            Number(i64),
        }

        match Wire::deserialize(deserializer)? {
            Wire::Text(id) => Ok(RecordId::Durable(id)),
            Wire::Number(id) => Ok(RecordId::Durable(id.to_string())),
        }
    }
}

/// Contract between the store and the concrete entity it holds
pub trait Record: Clone + fmt::Debug + DeserializeOwned + 'static {
    /// Payload the user submits to create a record
    type Draft: Clone + fmt::Debug;

    fn id(&self) -> &RecordId;

    /// Owning user
    fn owner(&self) -> &str;

    /// Creation time; the collection is ordered by this, newest first
    fn sort_key(&self) -> DateTime<Utc>;

    /// Build the placeholder shown while the create is in flight
    fn speculative(id: RecordId, owner: &str, draft: &Self::Draft, now: DateTime<Utc>) -> Self;

    /// Reject a draft before any local edit is made
    fn check_draft(_draft: &Self::Draft) -> Result<(), String> {
        Ok(())
    }
}

/// A saved link (matches the `bookmarks` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: RecordId,
    pub user_id: String,
    pub title: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl Bookmark {
    pub fn is_pending(&self) -> bool {
        self.id.is_pending()
    }
}

/// Title and URL typed into the dashboard form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewBookmark {
    pub title: String,
    pub url: String,
}

impl NewBookmark {
    pub fn new(title: &str, url: &str) -> Self {
        Self {
            title: title.trim().to_string(),
            url: url.trim().to_string(),
        }
    }
}

impl Record for Bookmark {
    type Draft = NewBookmark;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn owner(&self) -> &str {
        &self.user_id
    }

    fn sort_key(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn speculative(id: RecordId, owner: &str, draft: &NewBookmark, now: DateTime<Utc>) -> Self {
        Bookmark {
            id,
            user_id: owner.to_string(),
            title: draft.title.clone(),
            url: draft.url.clone(),
            created_at: now,
        }
    }

    fn check_draft(draft: &NewBookmark) -> Result<(), String> {
        if draft.title.trim().is_empty() {
            return Err("title is required".to_string());
        }
        if draft.url.trim().is_empty() {
            return Err("url is required".to_string());
        }
        Ok(())
    }
}

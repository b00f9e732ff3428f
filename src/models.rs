//! Frontend Models
//!
//! Records come from the sync library; view-only types live here.

pub use optimistic_store::{Bookmark, NewBookmark, RecordId, Session};

/// Error banner shown above the table
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub id: u32,
    pub message: String,
}

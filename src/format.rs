//! Date/Time Cells
//!
//! Rendered in UTC so the output does not depend on the viewer's locale.

use chrono::{DateTime, Utc};

/// `YYYY-MM-DD`
pub fn format_date(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// `HH:MM:SS`
pub fn format_time(at: &DateTime<Utc>) -> String {
    at.format("%H:%M:%S").to_string()
}

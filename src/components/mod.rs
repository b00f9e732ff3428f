//! UI Components
//!
//! Reusable Leptos components.

mod bookmark_table;
mod dashboard;
mod delete_confirm_button;
mod new_bookmark_form;
mod notice_banner;
mod sign_in;

pub use bookmark_table::BookmarkTable;
pub use dashboard::Dashboard;
pub use delete_confirm_button::DeleteConfirmButton;
pub use new_bookmark_form::NewBookmarkForm;
pub use notice_banner::NoticeBanner;
pub use sign_in::SignIn;

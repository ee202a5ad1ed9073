//! SQLite-backed persistence for form entries and delivery notifications.
//!
//! Both stores share a single connection behind a mutex; structured payloads
//! (form data, meta, status log) live in JSON text columns.

pub mod db;
pub mod entries;
pub mod notifications;

pub use db::{Db, open, open_in_memory};
pub use entries::{EntryQuery, EntrySort, EntryStore, SortOrder};
pub use notifications::{NotificationQuery, NotificationStore};

//! Notification persistence, querying and status aggregation.

use std::collections::BTreeMap;

use rusqlite::params;
use serde_json::Value;

use formbox_core::error::{FormboxError, Result};
use formbox_core::notification::{Notification, Status, StatusEntry};
use formbox_core::time::now_stamp;

use crate::db::Db;
use crate::entries::parse_map;

pub const PER_PAGE_DEFAULT: u32 = 25;

/// Search parameters for notification listings. Always ordered id descending.
#[derive(Debug, Clone)]
pub struct NotificationQuery {
    pub entry_id: Option<i64>,
    /// Only the user-facing statuses are accepted as a filter; transport
    /// events never gate a listing.
    pub status: Option<Status>,
    pub per_page: u32,
    /// 1-indexed.
    pub page: u32,
}

impl Default for NotificationQuery {
    fn default() -> Self {
        Self {
            entry_id: None,
            status: None,
            per_page: PER_PAGE_DEFAULT,
            page: 1,
        }
    }
}

/// Store for delivery notifications.
pub struct NotificationStore {
    db: Db,
}

impl NotificationStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Insert a new notification and return it with its assigned id.
    /// An empty created_on is filled with the current timestamp.
    pub fn create(&self, mut notification: Notification) -> Result<Notification> {
        if notification.created_on.is_empty() {
            notification.created_on = now_stamp();
        }
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO notifications (form, entry_id, email, created_on, status_log, meta) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                notification.form,
                notification.entry_id,
                notification.email,
                notification.created_on,
                serde_json::to_string(&notification.status_log)?,
                Value::Object(notification.meta.clone()).to_string(),
            ],
        )
        .map_err(|e| FormboxError::Persistence(format!("Create notification: {e}")))?;
        notification.id = conn.last_insert_rowid();
        Ok(notification)
    }

    /// Persist the full current state of an already-created notification.
    pub fn save(&self, notification: &Notification) -> Result<()> {
        let conn = self.db.lock().unwrap();
        let updated = conn
            .execute(
                "UPDATE notifications SET form = ?1, entry_id = ?2, email = ?3, \
                 created_on = ?4, status_log = ?5, meta = ?6 WHERE id = ?7",
                params![
                    notification.form,
                    notification.entry_id,
                    notification.email,
                    notification.created_on,
                    serde_json::to_string(&notification.status_log)?,
                    Value::Object(notification.meta.clone()).to_string(),
                    notification.id,
                ],
            )
            .map_err(|e| FormboxError::Persistence(format!("Save notification: {e}")))?;
        if updated == 0 {
            return Err(FormboxError::NotFound(format!(
                "Notification {} does not exist",
                notification.id
            )));
        }
        Ok(())
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<Notification>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, form, entry_id, email, created_on, status_log, meta \
                 FROM notifications WHERE id = ?1",
            )
            .map_err(|e| FormboxError::Persistence(format!("Find notification: {e}")))?;
        stmt.query_row(params![id], row_to_notification)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(FormboxError::Persistence(format!(
                    "Find notification: {other}"
                ))),
            })
    }

    /// Filtered, paginated listing with the total match count.
    pub fn find_by_query(&self, query: &NotificationQuery) -> Result<(Vec<Notification>, u64)> {
        let mut where_sql = String::from(" WHERE 1 = 1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(entry_id) = query.entry_id {
            where_sql.push_str(" AND entry_id = ?");
            params_vec.push(Box::new(entry_id));
        }
        if let Some(status) = query.status
            && Status::FILTERABLE.contains(&status)
        {
            where_sql.push_str(" AND json_extract(status_log, '$[0].status') = ?");
            params_vec.push(Box::new(status.as_str().to_string()));
        }

        let conn = self.db.lock().unwrap();

        let total: u64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM notifications{where_sql}"),
                rusqlite::params_from_iter(params_vec.iter().map(|p| p.as_ref())),
                |r| r.get::<_, i64>(0),
            )
            .map_err(|e| FormboxError::Persistence(format!("Count notifications: {e}")))?
            as u64;

        let per_page = query.per_page.max(1);
        let offset = (per_page as i64).saturating_mul(query.page.max(1) as i64 - 1);
        let select = format!(
            "SELECT id, form, entry_id, email, created_on, status_log, meta \
             FROM notifications{where_sql} ORDER BY id DESC LIMIT ? OFFSET ?"
        );
        params_vec.push(Box::new(per_page as i64));
        params_vec.push(Box::new(offset));

        let mut stmt = conn
            .prepare(&select)
            .map_err(|e| FormboxError::Persistence(format!("Query notifications: {e}")))?;
        let notifications = stmt
            .query_map(
                rusqlite::params_from_iter(params_vec.iter().map(|p| p.as_ref())),
                row_to_notification,
            )
            .map_err(|e| FormboxError::Persistence(format!("Query notifications: {e}")))?
            .collect::<rusqlite::Result<Vec<Notification>>>()
            .map_err(|e| FormboxError::Persistence(format!("Query notifications: {e}")))?;

        Ok((notifications, total))
    }

    /// Count of notifications grouped by their current (head) status, plus an
    /// "all" total. Unrrecognized stored labels still get counted under their
    /// own key.
    pub fn counts_by_status(&self) -> Result<BTreeMap<String, u64>> {
        let conn = self.db.lock().unwrap();
        let mut counts = BTreeMap::new();
        let mut total: u64 = 0;

        let mut stmt = conn
            .prepare(
                "SELECT COALESCE(json_extract(status_log, '$[0].status'), ''), COUNT(*) \
                 FROM notifications GROUP BY 1",
            )
            .map_err(|e| FormboxError::Persistence(format!("Count by status: {e}")))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })
            .map_err(|e| FormboxError::Persistence(format!("Count by status: {e}")))?;
        for row in rows {
            let (status, count) =
                row.map_err(|e| FormboxError::Persistence(format!("Count by status: {e}")))?;
            total += count;
            *counts.entry(status).or_insert(0) += count;
        }
        counts.insert("all".to_string(), total);
        Ok(counts)
    }

    /// All notifications whose current status is scheduled, oldest first.
    /// This feeds the retry sweep.
    pub fn find_scheduled(&self) -> Result<Vec<Notification>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, form, entry_id, email, created_on, status_log, meta \
                 FROM notifications \
                 WHERE json_extract(status_log, '$[0].status') = ?1 ORDER BY id ASC",
            )
            .map_err(|e| FormboxError::Persistence(format!("Find scheduled: {e}")))?;
        let notifications = stmt
            .query_map(params![Status::Scheduled.as_str()], row_to_notification)
            .map_err(|e| FormboxError::Persistence(format!("Find scheduled: {e}")))?
            .collect::<rusqlite::Result<Vec<Notification>>>()
            .map_err(|e| FormboxError::Persistence(format!("Find scheduled: {e}")))?;
        Ok(notifications)
    }

    /// Register a status on the notification and persist it in one step.
    pub fn update_status(&self, notification: &mut Notification, status: Status) -> Result<()> {
        notification.register_status(status);
        self.save(notification)
    }

    pub fn get_total(&self) -> Result<u64> {
        let conn = self.db.lock().unwrap();
        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM notifications", [], |r| r.get(0))
            .map_err(|e| FormboxError::Persistence(format!("Count notifications: {e}")))?;
        Ok(total as u64)
    }
}

/// Map a row to a Notification. Malformed JSON columns degrade to empty.
fn row_to_notification(row: &rusqlite::Row) -> rusqlite::Result<Notification> {
    let log_raw: String = row.get(5)?;
    let meta_raw: String = row.get(6)?;
    Ok(Notification {
        id: row.get(0)?,
        form: row.get(1)?,
        entry_id: row.get(2)?,
        email: row.get(3)?,
        created_on: row.get(4)?,
        status_log: serde_json::from_str::<Vec<StatusEntry>>(&log_raw).unwrap_or_default(),
        meta: parse_map(&meta_raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use serde_json::json;

    fn store() -> NotificationStore {
        NotificationStore::new(db::open_in_memory().unwrap())
    }

    fn scheduled(store: &NotificationStore, email: &str, entry_id: i64) -> Notification {
        let mut n = Notification::new("contact", entry_id, email);
        n.register_status(Status::Scheduled);
        store.create(n).unwrap()
    }

    #[test]
    fn test_create_assigns_id_and_timestamp() {
        let store = store();
        let created = scheduled(&store, "a@example.com", 1);
        assert!(created.id > 0);
        assert!(!created.created_on.is_empty());
        let found = store.find_by_id(created.id).unwrap().unwrap();
        assert_eq!(found.email, "a@example.com");
        assert_eq!(found.last_status(), Status::Scheduled.as_str());
    }

    #[test]
    fn test_save_round_trips_status_log() {
        let store = store();
        let mut n = scheduled(&store, "a@example.com", 1);
        n.register_status(Status::SendSuccess);
        n.set_meta("last_send_error", json!("boom"));
        store.save(&n).unwrap();

        let reloaded = store.find_by_id(n.id).unwrap().unwrap();
        assert_eq!(reloaded.status_log.len(), 2);
        assert_eq!(reloaded.last_status(), Status::SendSuccess.as_str());
        assert_eq!(reloaded.status_log[1].status, Status::Scheduled.as_str());
        assert_eq!(reloaded.meta_field("last_send_error"), Some(&json!("boom")));
    }

    #[test]
    fn test_save_unknown_id_is_not_found() {
        let store = store();
        let mut n = Notification::new("contact", 1, "a@example.com");
        n.id = 42;
        assert!(matches!(store.save(&n), Err(FormboxError::NotFound(_))));
    }

    #[test]
    fn test_query_by_entry_and_status() {
        let store = store();
        let mut done = scheduled(&store, "a@example.com", 1);
        done.register_status(Status::SendSuccess);
        store.save(&done).unwrap();
        scheduled(&store, "b@example.com", 1);
        scheduled(&store, "c@example.com", 2);

        let (by_entry, total) = store
            .find_by_query(&NotificationQuery {
                entry_id: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(total, 2);
        // Listings are newest first.
        assert_eq!(by_entry[0].email, "b@example.com");

        let (_, pending) = store
            .find_by_query(&NotificationQuery {
                status: Some(Status::Scheduled),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(pending, 2);
    }

    #[test]
    fn test_transport_status_filter_is_ignored() {
        let store = store();
        scheduled(&store, "a@example.com", 1);
        let (_, total) = store
            .find_by_query(&NotificationQuery {
                status: Some(Status::TransportFailed),
                ..Default::default()
            })
            .unwrap();
        // Not a filterable status: everything comes back.
        assert_eq!(total, 1);
    }

    #[test]
    fn test_counts_by_status_includes_all_and_unknown() {
        let store = store();
        scheduled(&store, "a@example.com", 1);
        scheduled(&store, "b@example.com", 1);
        let mut done = scheduled(&store, "c@example.com", 2);
        done.register_status(Status::SendError);
        store.save(&done).unwrap();
        let mut odd = Notification::new("contact", 3, "d@example.com");
        odd.status_log.insert(
            0,
            StatusEntry {
                status: "legacy_status".into(),
                datetime: now_stamp(),
            },
        );
        store.create(odd).unwrap();

        let counts = store.counts_by_status().unwrap();
        assert_eq!(counts.get("all"), Some(&4));
        assert_eq!(counts.get(Status::Scheduled.as_str()), Some(&2));
        assert_eq!(counts.get(Status::SendError.as_str()), Some(&1));
        assert_eq!(counts.get("legacy_status"), Some(&1));
    }

    #[test]
    fn test_find_scheduled_oldest_first() {
        let store = store();
        let first = scheduled(&store, "a@example.com", 1);
        let mut done = scheduled(&store, "b@example.com", 1);
        done.register_status(Status::SendSuccess);
        store.save(&done).unwrap();
        let second = scheduled(&store, "c@example.com", 2);

        let pending = store.find_scheduled().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, first.id);
        assert_eq!(pending[1].id, second.id);
    }

    #[test]
    fn test_pagination_beyond_end_is_empty() {
        let store = store();
        scheduled(&store, "a@example.com", 1);
        let (page, total) = store
            .find_by_query(&NotificationQuery {
                per_page: 10,
                page: 5,
                ..Default::default()
            })
            .unwrap();
        assert!(page.is_empty());
        assert_eq!(total, 1);
        assert_eq!(store.get_total().unwrap(), 1);
    }

    #[test]
    fn test_extreme_pagination_does_not_overflow() {
        let store = store();
        scheduled(&store, "a@example.com", 1);
        let (page, total) = store
            .find_by_query(&NotificationQuery {
                per_page: u32::MAX,
                page: u32::MAX,
                ..Default::default()
            })
            .unwrap();
        assert!(page.is_empty());
        assert_eq!(total, 1);
    }

    #[test]
    fn test_update_status_persists() {
        let store = store();
        let mut n = scheduled(&store, "a@example.com", 1);
        store.update_status(&mut n, Status::SendSuccess).unwrap();
        let stored = store.find_by_id(n.id).unwrap().unwrap();
        assert_eq!(stored.last_status(), Status::SendSuccess.as_str());
        assert_eq!(stored.status_log.len(), 2);
    }
}

//! Entry persistence and querying.

use rusqlite::params;
use serde_json::{Map, Value};

use formbox_core::entry::Entry;
use formbox_core::error::{FormboxError, Result};
use formbox_core::form::FormRegistry;
use formbox_core::time::{normalize_stamp, now_stamp};

use crate::db::{Db, escape_like};

pub const PER_PAGE_DEFAULT: u32 = 50;

/// Sort field for entry listings. Anything else is not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntrySort {
    #[default]
    Id,
    Form,
    SubmittedOn,
}

impl EntrySort {
    fn column(&self) -> &'static str {
        match self {
            EntrySort::Id => "id",
            EntrySort::Form => "form",
            EntrySort::SubmittedOn => "submitted_on",
        }
    }

    /// Parse a user-supplied sort field; unknown values fall back to id.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "form" => EntrySort::Form,
            "submitted_on" => EntrySort::SubmittedOn,
            _ => EntrySort::Id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("asc") {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        }
    }
}

/// Search parameters for entry listings.
#[derive(Debug, Clone)]
pub struct EntryQuery {
    /// Form slug. Applied only when the slug is actually registered.
    pub form: Option<String>,
    /// Lower bound on submitted_on. Invalid dates are ignored, not errors.
    pub from: Option<String>,
    /// Upper bound on submitted_on. Invalid dates are ignored, not errors.
    pub to: Option<String>,
    /// Case-insensitive substring match across data and meta.
    pub search: Option<String>,
    pub per_page: u32,
    /// 1-indexed.
    pub page: u32,
    pub orderby: EntrySort,
    pub order: SortOrder,
}

impl Default for EntryQuery {
    fn default() -> Self {
        Self {
            form: None,
            from: None,
            to: None,
            search: None,
            per_page: PER_PAGE_DEFAULT,
            page: 1,
            orderby: EntrySort::default(),
            order: SortOrder::default(),
        }
    }
}

/// Store for form entries.
pub struct EntryStore {
    db: Db,
}

impl EntryStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Persist a new entry, recording the current timestamp. Returns its id.
    pub fn create(
        &self,
        form_slug: &str,
        data: &Map<String, Value>,
        meta: &Map<String, Value>,
    ) -> Result<i64> {
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO entries (form, submitted_on, form_data, meta) VALUES (?1, ?2, ?3, ?4)",
            params![
                form_slug,
                now_stamp(),
                Value::Object(data.clone()).to_string(),
                Value::Object(meta.clone()).to_string(),
            ],
        )
        .map_err(|e| FormboxError::Persistence(format!("Create entry: {e}")))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<Entry>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT id, form, submitted_on, form_data, meta FROM entries WHERE id = ?1")
            .map_err(|e| FormboxError::Persistence(format!("Find entry: {e}")))?;
        let entry = stmt
            .query_row(params![id], row_to_entry)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(FormboxError::Persistence(format!("Find entry: {other}"))),
            })?;
        Ok(entry)
    }

    /// Filtered, paginated listing. Returns the page of entries together
    /// with the total match count, so pagination needs no second call and no
    /// stored counter.
    pub fn find_by_query(
        &self,
        query: &EntryQuery,
        registry: &FormRegistry,
    ) -> Result<(Vec<Entry>, u64)> {
        let mut where_sql = String::from(" WHERE 1 = 1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(form) = &query.form
            && registry.get(form).is_some()
        {
            where_sql.push_str(" AND form = ?");
            params_vec.push(Box::new(form.clone()));
        }
        if let Some(from) = query.from.as_deref().and_then(normalize_stamp) {
            where_sql.push_str(" AND submitted_on > ?");
            params_vec.push(Box::new(from));
        }
        if let Some(to) = query.to.as_deref().and_then(normalize_stamp) {
            where_sql.push_str(" AND submitted_on < ?");
            params_vec.push(Box::new(to));
        }
        if let Some(search) = &query.search
            && !search.is_empty()
        {
            let like = format!("%{}%", escape_like(&search.to_lowercase()));
            where_sql.push_str(
                " AND (lower_utf8(form_data) LIKE ? ESCAPE '\\' \
                 OR lower_utf8(meta) LIKE ? ESCAPE '\\')",
            );
            params_vec.push(Box::new(like.clone()));
            params_vec.push(Box::new(like));
        }

        let conn = self.db.lock().unwrap();

        let total: u64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM entries{where_sql}"),
                rusqlite::params_from_iter(params_vec.iter().map(|p| p.as_ref())),
                |r| r.get::<_, i64>(0),
            )
            .map_err(|e| FormboxError::Persistence(format!("Count entries: {e}")))?
            as u64;

        let per_page = query.per_page.max(1);
        let offset = (per_page as i64).saturating_mul(query.page.max(1) as i64 - 1);
        let select = format!(
            "SELECT id, form, submitted_on, form_data, meta FROM entries{where_sql} \
             ORDER BY {} {} LIMIT ? OFFSET ?",
            query.orderby.column(),
            query.order.keyword(),
        );
        params_vec.push(Box::new(per_page as i64));
        params_vec.push(Box::new(offset));

        let mut stmt = conn
            .prepare(&select)
            .map_err(|e| FormboxError::Persistence(format!("Query entries: {e}")))?;
        let entries = stmt
            .query_map(
                rusqlite::params_from_iter(params_vec.iter().map(|p| p.as_ref())),
                row_to_entry,
            )
            .map_err(|e| FormboxError::Persistence(format!("Query entries: {e}")))?
            .collect::<rusqlite::Result<Vec<Entry>>>()
            .map_err(|e| FormboxError::Persistence(format!("Query entries: {e}")))?;

        Ok((entries, total))
    }

    /// Persist an entry's meta. Data and form are immutable after creation.
    pub fn update(&self, entry: &Entry) -> Result<()> {
        let conn = self.db.lock().unwrap();
        conn.execute(
            "UPDATE entries SET meta = ?1 WHERE id = ?2",
            params![Value::Object(entry.meta.clone()).to_string(), entry.id],
        )
        .map_err(|e| FormboxError::Persistence(format!("Update entry: {e}")))?;
        Ok(())
    }
}

/// Map a row to an Entry. Malformed stored JSON degrades to an empty map.
fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<Entry> {
    let data_raw: String = row.get(3)?;
    let meta_raw: String = row.get(4)?;
    Ok(Entry {
        id: row.get(0)?,
        form: row.get(1)?,
        submitted_on: row.get(2)?,
        data: parse_map(&data_raw),
        meta: parse_map(&meta_raw),
    })
}

pub(crate) fn parse_map(raw: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

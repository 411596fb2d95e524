use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::Result;
use crate::model::{
    CUSTOMER_ID_META_KEY, CompletionRecord, Donation, Donor, LegacyMetaRow, RecordedEvent,
    SortOrder,
};
use crate::store::StoreAdapter;
use crate::upgrade::cursor::{BatchCursor, offset_for};

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = Self { conn };
        store.create_tables()?;
        Ok(store)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let store = Self { conn };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS donors (
                id INTEGER PRIMARY KEY,
                email TEXT,
                payment_ids TEXT NOT NULL DEFAULT ''
            );
            CREATE TABLE IF NOT EXISTS donor_meta (
                donor_id INTEGER NOT NULL,
                meta_key TEXT NOT NULL,
                meta_value TEXT NOT NULL,
                PRIMARY KEY (donor_id, meta_key)
            );
            CREATE TABLE IF NOT EXISTS donations (
                id INTEGER PRIMARY KEY,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS donation_meta (
                donation_id INTEGER NOT NULL,
                meta_key TEXT NOT NULL,
                meta_value TEXT NOT NULL,
                PRIMARY KEY (donation_id, meta_key)
            );
            CREATE TABLE IF NOT EXISTS legacy_payment_meta (
                meta_id INTEGER PRIMARY KEY AUTOINCREMENT,
                payment_id INTEGER NOT NULL,
                meta_key TEXT NOT NULL,
                meta_value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS payment_postmeta (
                meta_id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id INTEGER NOT NULL,
                meta_key TEXT NOT NULL,
                meta_value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS completions (
                task_id TEXT PRIMARY KEY,
                completed_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS cursors (
                task_id TEXT PRIMARY KEY,
                step INTEGER NOT NULL,
                page_size INTEGER NOT NULL,
                total_items INTEGER NOT NULL DEFAULT 0,
                processed_so_far INTEGER NOT NULL DEFAULT 0,
                percentage INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                category TEXT NOT NULL,
                message TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_donations_created ON donations(created_at, id);
            CREATE INDEX IF NOT EXISTS idx_donors_email ON donors(email);
            CREATE INDEX IF NOT EXISTS idx_postmeta_post ON payment_postmeta(post_id);",
        )?;
        Ok(())
    }

    pub fn insert_donor(&self, donor: &Donor, meta: &BTreeMap<String, String>) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let payment_ids = donor
            .payment_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        tx.execute(
            "INSERT OR REPLACE INTO donors (id, email, payment_ids) VALUES (?1, ?2, ?3)",
            params![donor.id, donor.email, payment_ids],
        )?;
        if let Some(customer_id) = &donor.external_customer_id {
            tx.execute(
                "INSERT OR REPLACE INTO donor_meta (donor_id, meta_key, meta_value) VALUES (?1, ?2, ?3)",
                params![donor.id, CUSTOMER_ID_META_KEY, customer_id],
            )?;
        }
        for (key, value) in meta {
            tx.execute(
                "INSERT OR REPLACE INTO donor_meta (donor_id, meta_key, meta_value) VALUES (?1, ?2, ?3)",
                params![donor.id, key, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn insert_donation(
        &self,
        donation: &Donation,
        meta: &BTreeMap<String, String>,
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO donations (id, created_at) VALUES (?1, ?2)",
            params![donation.id, donation.created_at.to_rfc3339()],
        )?;
        for (key, value) in meta {
            tx.execute(
                "INSERT OR REPLACE INTO donation_meta (donation_id, meta_key, meta_value) VALUES (?1, ?2, ?3)",
                params![donation.id, key, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn insert_legacy_meta(&self, donation_id: u64, key: &str, value: &str) -> Result<u64> {
        self.conn.execute(
            "INSERT INTO legacy_payment_meta (payment_id, meta_key, meta_value) VALUES (?1, ?2, ?3)",
            params![donation_id, key, value],
        )?;
        Ok(self.conn.last_insert_rowid() as u64)
    }

    pub fn insert_postmeta(&self, donation_id: u64, key: &str, value: &str) -> Result<u64> {
        self.conn.execute(
            "INSERT INTO payment_postmeta (post_id, meta_key, meta_value) VALUES (?1, ?2, ?3)",
            params![donation_id, key, value],
        )?;
        Ok(self.conn.last_insert_rowid() as u64)
    }

    fn count(&self, table: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        let count: u64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count)
    }
}

fn parse_payment_ids(raw: &str) -> Vec<u64> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<u64>() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!(value = s, "ignoring malformed donation id in donor record");
                None
            }
        })
        .collect()
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

impl StoreAdapter for SqliteStore {
    fn list_donors(&self, page: u64, page_size: u64, order: SortOrder) -> Result<Vec<Donor>> {
        let sql = format!(
            "SELECT d.id, d.email, d.payment_ids, m.meta_value
             FROM donors d
             LEFT JOIN donor_meta m ON m.donor_id = d.id AND m.meta_key = ?3
             ORDER BY d.id {}
             LIMIT ?1 OFFSET ?2",
            order.as_sql()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![page_size, offset_for(page, page_size), CUSTOMER_ID_META_KEY],
            |row| {
                let raw_ids: String = row.get(2)?;
                let customer_id: Option<String> = row.get(3)?;
                Ok(Donor {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    payment_ids: parse_payment_ids(&raw_ids),
                    external_customer_id: customer_id.filter(|c| !c.trim().is_empty()),
                })
            },
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn count_donors(&self) -> Result<u64> {
        self.count("donors")
    }

    fn get_donor_meta(&self, donor_id: u64, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT meta_value FROM donor_meta WHERE donor_id = ?1 AND meta_key = ?2",
                params![donor_id, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_donor_meta(&self, donor_id: u64, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO donor_meta (donor_id, meta_key, meta_value) VALUES (?1, ?2, ?3)",
            params![donor_id, key, value],
        )?;
        Ok(())
    }

    fn donor_exists(&self, donor_id: u64) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM donors WHERE id = ?1",
                params![donor_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn get_completion(&self, task_id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM completions WHERE task_id = ?1",
                params![task_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn set_completion(&self, task_id: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO completions (task_id, completed_at) VALUES (?1, ?2)",
            params![task_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn list_completions(&self) -> Result<Vec<CompletionRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT task_id, completed_at FROM completions ORDER BY completed_at, task_id")?;
        let rows = stmt.query_map([], |row| {
            let raw: String = row.get(1)?;
            Ok(CompletionRecord {
                task_id: row.get(0)?,
                completed_at: parse_timestamp(1, &raw)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn get_cursor(&self, task_id: &str) -> Result<Option<BatchCursor>> {
        let cursor = self
            .conn
            .query_row(
                "SELECT task_id, step, page_size, total_items, processed_so_far, percentage
                 FROM cursors WHERE task_id = ?1",
                params![task_id],
                |row| {
                    Ok(BatchCursor {
                        task_id: row.get(0)?,
                        step: row.get(1)?,
                        page_size: row.get(2)?,
                        total_items: row.get(3)?,
                        processed_so_far: row.get(4)?,
                        percentage: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(cursor)
    }

    fn save_cursor(&self, cursor: &BatchCursor) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO cursors (task_id, step, page_size, total_items, processed_so_far, percentage, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                cursor.task_id,
                cursor.step,
                cursor.page_size,
                cursor.total_items,
                cursor.processed_so_far,
                cursor.percentage,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn delete_cursor(&self, task_id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM cursors WHERE task_id = ?1", params![task_id])?;
        Ok(())
    }

    fn list_donations(&self, page: u64, page_size: u64) -> Result<Vec<Donation>> {
        let mut stmt = self.conn.prepare(
            "SELECT d.id, d.created_at, m.meta_value
             FROM donations d
             LEFT JOIN donation_meta m ON m.donation_id = d.id AND m.meta_key = '_give_payment_donor_id'
             ORDER BY d.created_at ASC, d.id ASC
             LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![page_size, offset_for(page, page_size)], |row| {
            let raw: String = row.get(1)?;
            let donor_id: Option<String> = row.get(2)?;
            Ok(Donation {
                id: row.get(0)?,
                donor_id: donor_id
                    .and_then(|d| d.trim().parse().ok())
                    .filter(|&id: &u64| id != 0),
                created_at: parse_timestamp(1, &raw)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn count_donations(&self) -> Result<u64> {
        self.count("donations")
    }

    fn get_donation_meta(&self, donation_id: u64, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT meta_value FROM donation_meta WHERE donation_id = ?1 AND meta_key = ?2",
                params![donation_id, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn add_donation_meta(&self, donation_id: u64, key: &str, value: &str) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO donation_meta (donation_id, meta_key, meta_value) VALUES (?1, ?2, ?3)",
            params![donation_id, key, value],
        )?;
        Ok(inserted > 0)
    }

    fn set_donation_meta(&self, donation_id: u64, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO donation_meta (donation_id, meta_key, meta_value) VALUES (?1, ?2, ?3)",
            params![donation_id, key, value],
        )?;
        Ok(())
    }

    fn find_donor_id_by_email(&self, email: &str) -> Result<Option<u64>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM donors WHERE email = ?1 COLLATE NOCASE ORDER BY id LIMIT 1",
                params![email.trim()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn list_legacy_meta(&self, page: u64, page_size: u64) -> Result<Vec<LegacyMetaRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT meta_id, payment_id, meta_key, meta_value
             FROM legacy_payment_meta
             ORDER BY meta_id ASC
             LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![page_size, offset_for(page, page_size)], |row| {
            Ok(LegacyMetaRow {
                meta_id: row.get(0)?,
                donation_id: row.get(1)?,
                meta_key: row.get(2)?,
                meta_value: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn count_legacy_meta(&self) -> Result<u64> {
        self.count("legacy_payment_meta")
    }

    fn list_payment_postmeta(&self, donation_id: u64) -> Result<Vec<LegacyMetaRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT meta_id, post_id, meta_key, meta_value
             FROM payment_postmeta
             WHERE post_id = ?1
             ORDER BY meta_id ASC",
        )?;
        let rows = stmt.query_map(params![donation_id], |row| {
            Ok(LegacyMetaRow {
                meta_id: row.get(0)?,
                donation_id: row.get(1)?,
                meta_key: row.get(2)?,
                meta_value: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn record_event(&self, category: &str, message: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO events (category, message, recorded_at) VALUES (?1, ?2, ?3)",
            params![category, message, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn recent_events(&self, limit: u64) -> Result<Vec<RecordedEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, category, message, recorded_at FROM events ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            let raw: String = row.get(3)?;
            Ok(RecordedEvent {
                id: row.get(0)?,
                category: row.get(1)?,
                message: row.get(2)?,
                recorded_at: parse_timestamp(3, &raw)?,
            })
        })?;
        let mut events = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        events.reverse();
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn donor(id: u64, payment_ids: Vec<u64>, customer: Option<&str>) -> Donor {
        Donor {
            id,
            email: Some(format!("donor{id}@example.org")),
            payment_ids,
            external_customer_id: customer.map(str::to_string),
        }
    }

    fn donation(id: u64, day: u32) -> Donation {
        Donation {
            id,
            donor_id: None,
            created_at: Utc.with_ymd_and_hms(2019, 1, day, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn list_donors_pages_in_id_order() {
        let store = SqliteStore::open_memory().unwrap();
        for id in 1..=5 {
            store.insert_donor(&donor(id, vec![], None), &BTreeMap::new()).unwrap();
        }

        let page1: Vec<u64> = store
            .list_donors(1, 2, SortOrder::Asc)
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();
        let page3: Vec<u64> = store
            .list_donors(3, 2, SortOrder::Asc)
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();
        let desc: Vec<u64> = store
            .list_donors(1, 2, SortOrder::Desc)
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();

        assert_eq!(page1, vec![1, 2]);
        assert_eq!(page3, vec![5]);
        assert_eq!(desc, vec![5, 4]);
        assert!(store.list_donors(4, 2, SortOrder::Asc).unwrap().is_empty());
        assert_eq!(store.count_donors().unwrap(), 5);
    }

    #[test]
    fn donor_round_trips_payment_order_and_customer() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .insert_donor(&donor(7, vec![30, 10, 20], Some("cus_7")), &BTreeMap::new())
            .unwrap();

        let loaded = store.list_donors(1, 10, SortOrder::Asc).unwrap();
        assert_eq!(loaded[0].payment_ids, vec![30, 10, 20]);
        assert_eq!(loaded[0].external_customer_id.as_deref(), Some("cus_7"));
        assert_eq!(
            store.get_donor_meta(7, CUSTOMER_ID_META_KEY).unwrap().as_deref(),
            Some("cus_7")
        );
    }

    #[test]
    fn postmeta_is_scoped_to_one_donation() {
        let store = SqliteStore::open_memory().unwrap();
        store.insert_postmeta(1, "_give_payment_total", "10").unwrap();
        store.insert_postmeta(2, "_give_payment_total", "20").unwrap();
        store.insert_postmeta(1, "_give_payment_mode", "live").unwrap();

        let rows = store.list_payment_postmeta(1).unwrap();
        let keys: Vec<&str> = rows.iter().map(|r| r.meta_key.as_str()).collect();
        assert_eq!(keys, vec!["_give_payment_total", "_give_payment_mode"]);
        assert!(rows.iter().all(|r| r.donation_id == 1));
    }

    #[test]
    fn donor_meta_and_existence() {
        let store = SqliteStore::open_memory().unwrap();
        store.insert_donor(&donor(3, vec![], None), &BTreeMap::new()).unwrap();
        assert!(store.donor_exists(3).unwrap());
        assert!(!store.donor_exists(4).unwrap());

        store.set_donor_meta(3, "k", "v").unwrap();
        store.set_donor_meta(3, "k", "w").unwrap();
        assert_eq!(store.get_donor_meta(3, "k").unwrap().as_deref(), Some("w"));
    }

    #[test]
    fn add_donation_meta_never_overwrites() {
        let store = SqliteStore::open_memory().unwrap();
        store.insert_donation(&donation(1, 1), &BTreeMap::new()).unwrap();

        assert!(store.add_donation_meta(1, "k", "first").unwrap());
        assert!(!store.add_donation_meta(1, "k", "second").unwrap());
        assert_eq!(store.get_donation_meta(1, "k").unwrap().as_deref(), Some("first"));

        store.set_donation_meta(1, "k", "third").unwrap();
        assert_eq!(store.get_donation_meta(1, "k").unwrap().as_deref(), Some("third"));
    }

    #[test]
    fn donations_list_oldest_first() {
        let store = SqliteStore::open_memory().unwrap();
        store.insert_donation(&donation(10, 3), &BTreeMap::new()).unwrap();
        store.insert_donation(&donation(20, 1), &BTreeMap::new()).unwrap();
        store.insert_donation(&donation(30, 2), &BTreeMap::new()).unwrap();

        let ids: Vec<u64> = store
            .list_donations(1, 10)
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec![20, 30, 10]);
    }

    #[test]
    fn find_donor_by_email_ignores_case() {
        let store = SqliteStore::open_memory().unwrap();
        store.insert_donor(&donor(3, vec![], None), &BTreeMap::new()).unwrap();
        assert_eq!(
            store.find_donor_id_by_email("DONOR3@example.org").unwrap(),
            Some(3)
        );
        assert_eq!(store.find_donor_id_by_email("nobody@example.org").unwrap(), None);
    }

    #[test]
    fn cursor_round_trip_and_delete() {
        let store = SqliteStore::open_memory().unwrap();
        let mut cursor = BatchCursor::new("t", 25);
        cursor.step = 4;
        cursor.record_progress(90);
        store.save_cursor(&cursor).unwrap();

        assert_eq!(store.get_cursor("t").unwrap(), Some(cursor));
        store.delete_cursor("t").unwrap();
        assert_eq!(store.get_cursor("t").unwrap(), None);
    }

    #[test]
    fn recent_events_are_chronological() {
        let store = SqliteStore::open_memory().unwrap();
        for i in 0..5 {
            store.record_event("task", &format!("event {i}")).unwrap();
        }
        let events = store.recent_events(2).unwrap();
        let messages: Vec<&str> = events.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["event 3", "event 4"]);
    }

    #[test]
    fn malformed_payment_ids_are_skipped() {
        assert_eq!(parse_payment_ids("1, 2,x,,3"), vec![1, 2, 3]);
        assert!(parse_payment_ids("").is_empty());
    }
}

//! `sqlite` — durable contact table backed by a single SQLite file.
//!
//! Each transaction opens its own connection and starts with
//! `BEGIN IMMEDIATE`, taking the database write lock up front. Concurrent
//! identify calls therefore serialize; one that cannot get the lock within
//! `busy_timeout` fails with a [`StoreError`] instead of retrying.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use crate::error::StoreError;
use crate::subsystems::identity::{
    Contact, ContactId, ContactUpdate, LinkPrecedence, NewContact, now,
};

use super::{ContactStore, ContactTx};

const SCHEMA_VERSION: i64 = 1;

const CONTACT_COLUMNS: &str =
    "id, email, phone_number, linked_id, link_precedence, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `db_path` and bring the schema up to date.
    pub fn open(db_path: &Path, busy_timeout_ms: u64) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                StoreError::new(format!("contacts: cannot create {}: {e}", parent.display()))
            })?;
        }

        let store = Self {
            db_path: db_path.to_path_buf(),
            busy_timeout: Duration::from_millis(busy_timeout_ms),
        };
        store.init_db()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn init_db(&self) -> Result<(), StoreError> {
        let conn = self.open_conn()?;
        let version: i64 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .map_err(|e| StoreError::new(format!("contacts: read schema version: {e}")))?;

        if version == 0 {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS contacts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    email TEXT,
                    phone_number TEXT,
                    linked_id INTEGER REFERENCES contacts(id),
                    link_precedence TEXT NOT NULL
                        CHECK (link_precedence IN ('primary', 'secondary')),
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    CHECK ((link_precedence = 'primary') = (linked_id IS NULL))
                );

                CREATE INDEX IF NOT EXISTS idx_contacts_email ON contacts(email);
                CREATE INDEX IF NOT EXISTS idx_contacts_phone_number ON contacts(phone_number);
                CREATE INDEX IF NOT EXISTS idx_contacts_linked_id ON contacts(linked_id);

                PRAGMA user_version = 1;
                ",
            )
            .map_err(|e| StoreError::new(format!("contacts: initialize schema: {e}")))?;
            return Ok(());
        }

        if version != SCHEMA_VERSION {
            return Err(StoreError::new(format!(
                "contacts: unsupported schema version {version}, expected {SCHEMA_VERSION}"
            )));
        }

        Ok(())
    }

    fn open_conn(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.db_path).map_err(|e| {
            StoreError::new(format!("contacts: open {}: {e}", self.db_path.display()))
        })?;

        // Before the pragmas: switching to WAL can itself wait on a lock.
        conn.busy_timeout(self.busy_timeout)
            .map_err(|e| StoreError::new(format!("contacts: set busy_timeout: {e}")))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| StoreError::new(format!("contacts: set journal_mode WAL: {e}")))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| StoreError::new(format!("contacts: set foreign_keys ON: {e}")))?;

        Ok(conn)
    }
}

impl ContactStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn ContactTx) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.open_conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StoreError::new(format!("contacts: begin tx: {e}")))?;

        // Dropping `tx` without commit rolls back.
        let out = f(&mut SqliteTx { conn: &*tx })?;

        tx.commit()
            .map_err(|e| StoreError::new(format!("contacts: commit: {e}")))?;
        Ok(out)
    }
}

struct SqliteTx<'c> {
    conn: &'c Connection,
}

impl SqliteTx<'_> {
    fn query_contacts(
        &self,
        what: &str,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Contact>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| StoreError::new(format!("contacts: prepare {what}: {e}")))?;

        let rows = stmt
            .query_map(params, contact_from_row)
            .map_err(|e| StoreError::new(format!("contacts: query {what}: {e}")))?;

        let mut contacts = Vec::new();
        for row in rows {
            contacts.push(
                row.map_err(|e| StoreError::new(format!("contacts: map {what} row: {e}")))?,
            );
        }
        Ok(contacts)
    }
}

impl ContactTx for SqliteTx<'_> {
    fn find_by_predicate(
        &mut self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Vec<Contact>, StoreError> {
        if email.is_none() && phone_number.is_none() {
            return Ok(Vec::new());
        }
        self.query_contacts(
            "find_by_predicate",
            &format!(
                "SELECT {CONTACT_COLUMNS} FROM contacts
                 WHERE (?1 IS NOT NULL AND email = ?1)
                    OR (?2 IS NOT NULL AND phone_number = ?2)
                 ORDER BY created_at, id"
            ),
            params![email, phone_number],
        )
    }

    fn find_by_id(&mut self, id: ContactId) -> Result<Option<Contact>, StoreError> {
        self.conn
            .query_row(
                &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1"),
                params![id],
                contact_from_row,
            )
            .optional()
            .map_err(|e| StoreError::new(format!("contacts: find_by_id {id}: {e}")))
    }

    fn find_secondaries_of(&mut self, primary_id: ContactId) -> Result<Vec<Contact>, StoreError> {
        self.query_contacts(
            "find_secondaries_of",
            &format!(
                "SELECT {CONTACT_COLUMNS} FROM contacts WHERE linked_id = ?1 ORDER BY created_at, id"
            ),
            params![primary_id],
        )
    }

    fn insert(&mut self, contact: &NewContact) -> Result<Contact, StoreError> {
        let at = now();
        let stamp = format_ts(&at);
        let precedence = contact.link_precedence();

        self.conn
            .execute(
                "INSERT INTO contacts (email, phone_number, linked_id, link_precedence, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![
                    contact.email,
                    contact.phone_number,
                    contact.linked_id,
                    precedence.as_str(),
                    stamp,
                ],
            )
            .map_err(|e| StoreError::new(format!("contacts: insert: {e}")))?;

        Ok(Contact {
            id: self.conn.last_insert_rowid(),
            email: contact.email.clone(),
            phone_number: contact.phone_number.clone(),
            linked_id: contact.linked_id,
            link_precedence: precedence,
            created_at: at,
            updated_at: at,
        })
    }

    fn update(&mut self, id: ContactId, update: &ContactUpdate) -> Result<Contact, StoreError> {
        let changed = self
            .conn
            .execute(
                "UPDATE contacts SET linked_id = ?1, link_precedence = ?2, updated_at = ?3 WHERE id = ?4",
                params![
                    update.linked_id,
                    update.link_precedence.as_str(),
                    format_ts(&now()),
                    id,
                ],
            )
            .map_err(|e| StoreError::new(format!("contacts: update {id}: {e}")))?;

        if changed == 0 {
            return Err(StoreError::new(format!("contacts: update {id}: no such contact")));
        }

        self.find_by_id(id)?
            .ok_or_else(|| StoreError::new(format!("contacts: update {id}: row vanished")))
    }
}

fn contact_from_row(row: &Row<'_>) -> rusqlite::Result<Contact> {
    let precedence: String = row.get(4)?;
    let link_precedence = LinkPrecedence::parse(&precedence).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            format!("unknown link precedence '{precedence}'").into(),
        )
    })?;

    Ok(Contact {
        id: row.get(0)?,
        email: row.get(1)?,
        phone_number: row.get(2)?,
        linked_id: row.get(3)?,
        link_precedence,
        created_at: parse_ts(row, 5)?,
        updated_at: parse_ts(row, 6)?,
    })
}

// Fixed-width RFC 3339 so `ORDER BY created_at` sorts chronologically.
fn format_ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_store() -> (TempDir, SqliteStore) {
        let temp = TempDir::new().expect("tempdir");
        let store = SqliteStore::open(&temp.path().join("contacts.db"), 1000).expect("open store");
        (temp, store)
    }

    #[test]
    fn open_is_idempotent() {
        let (temp, store) = make_store();
        drop(store);
        SqliteStore::open(&temp.path().join("contacts.db"), 1000).expect("reopen");
    }

    #[test]
    fn insert_and_read_back() {
        let (_temp, store) = make_store();
        let (created, fetched) = store
            .transaction(|tx| -> Result<_, StoreError> {
                let created = tx.insert(&NewContact::primary(
                    Some("doc@hillvalley.edu".into()),
                    Some("88".into()),
                ))?;
                let fetched = tx.find_by_id(created.id)?;
                Ok((created, fetched))
            })
            .unwrap();

        assert_eq!(fetched, Some(created));
    }

    #[test]
    fn update_relinks_and_refreshes_updated_at() {
        let (_temp, store) = make_store();
        let (first, second) = store
            .transaction(|tx| -> Result<_, StoreError> {
                let a = tx.insert(&NewContact::primary(Some("a@x.com".into()), None))?;
                let b = tx.insert(&NewContact::primary(None, Some("111".into())))?;
                Ok((a, b))
            })
            .unwrap();

        let demoted = store
            .transaction(|tx| tx.update(second.id, &ContactUpdate::link_to(first.id)))
            .unwrap();
        assert_eq!(demoted.link_precedence, LinkPrecedence::Secondary);
        assert_eq!(demoted.linked_id, Some(first.id));
        assert!(demoted.updated_at >= second.updated_at);
        assert_eq!(demoted.created_at, second.created_at);

        let children = store
            .transaction(|tx| tx.find_secondaries_of(first.id))
            .unwrap();
        assert_eq!(children, vec![demoted]);
    }

    #[test]
    fn err_from_closure_rolls_back() {
        let (_temp, store) = make_store();
        let result: Result<(), StoreError> = store.transaction(|tx| {
            tx.insert(&NewContact::primary(Some("ghost@x.com".into()), None))?;
            Err(StoreError::new("abort"))
        });
        assert!(result.is_err());

        let found = store
            .transaction(|tx| tx.find_by_predicate(Some("ghost@x.com"), None))
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn schema_rejects_secondary_without_link() {
        let (_temp, store) = make_store();
        let conn = store.open_conn().unwrap();
        let result = conn.execute(
            "INSERT INTO contacts (email, linked_id, link_precedence, created_at, updated_at)
             VALUES ('x@x.com', NULL, 'secondary', '2024-01-01T00:00:00.000000Z', '2024-01-01T00:00:00.000000Z')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn schema_rejects_primary_with_link() {
        let (_temp, store) = make_store();
        let conn = store.open_conn().unwrap();
        conn.execute(
            "INSERT INTO contacts (email, linked_id, link_precedence, created_at, updated_at)
             VALUES ('a@x.com', NULL, 'primary', '2024-01-01T00:00:00.000000Z', '2024-01-01T00:00:00.000000Z')",
            [],
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO contacts (email, linked_id, link_precedence, created_at, updated_at)
             VALUES ('b@x.com', 1, 'primary', '2024-01-01T00:00:00.000000Z', '2024-01-01T00:00:00.000000Z')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn update_missing_contact_errors() {
        let (_temp, store) = make_store();
        let err = store
            .transaction(|tx| tx.update(99, &ContactUpdate::link_to(1)))
            .unwrap_err();
        assert!(err.to_string().contains("contacts: update 99"));
    }
}

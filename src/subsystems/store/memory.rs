//! `memory` — process-local contact table.
//!
//! A transaction holds the table lock for its whole duration and works on a
//! copy; the copy replaces the table only when the closure returns `Ok`.
//! That gives serializable isolation and all-or-nothing writes.

use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::subsystems::identity::{Contact, ContactId, ContactUpdate, NewContact, now};

use super::{ContactStore, ContactTx};

#[derive(Debug, Clone)]
struct Table {
    rows: Vec<Contact>,
    next_id: ContactId,
}

#[derive(Debug)]
pub struct MemoryStore {
    table: Mutex<Table>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_contacts(Vec::new())
    }

    /// Start from existing rows. New ids continue after the largest one given.
    pub fn with_contacts(rows: Vec<Contact>) -> Self {
        let next_id = rows.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        Self {
            table: Mutex::new(Table { rows, next_id }),
        }
    }

    /// Committed rows, ordered by id.
    pub fn snapshot(&self) -> Vec<Contact> {
        let mut rows = self.lock().rows.clone();
        rows.sort_by_key(|c| c.id);
        rows
    }

    // A panic inside a transaction poisons the mutex, but the committed table
    // is untouched (the panic hit the working copy), so it is safe to reuse.
    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ContactStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn ContactTx) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut committed = self.lock();
        let mut working = committed.clone();
        let out = f(&mut MemoryTx { table: &mut working })?;
        *committed = working;
        Ok(out)
    }
}

struct MemoryTx<'t> {
    table: &'t mut Table,
}

impl MemoryTx<'_> {
    fn select(&self, pred: impl Fn(&Contact) -> bool) -> Vec<Contact> {
        let mut found: Vec<Contact> = self.table.rows.iter().filter(|c| pred(c)).cloned().collect();
        found.sort_by_key(Contact::creation_key);
        found
    }
}

impl ContactTx for MemoryTx<'_> {
    fn find_by_predicate(
        &mut self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Vec<Contact>, StoreError> {
        Ok(self.select(|c| {
            let email_hit = email.is_some() && c.email.as_deref() == email;
            let phone_hit = phone_number.is_some() && c.phone_number.as_deref() == phone_number;
            email_hit || phone_hit
        }))
    }

    fn find_by_id(&mut self, id: ContactId) -> Result<Option<Contact>, StoreError> {
        Ok(self.table.rows.iter().find(|c| c.id == id).cloned())
    }

    fn find_secondaries_of(&mut self, primary_id: ContactId) -> Result<Vec<Contact>, StoreError> {
        Ok(self.select(|c| c.linked_id == Some(primary_id)))
    }

    fn insert(&mut self, contact: &NewContact) -> Result<Contact, StoreError> {
        if let Some(primary_id) = contact.linked_id {
            if !self.table.rows.iter().any(|c| c.id == primary_id) {
                return Err(StoreError::new(format!(
                    "contacts: insert: linked contact {primary_id} does not exist"
                )));
            }
        }

        let at = now();
        let row = Contact {
            id: self.table.next_id,
            email: contact.email.clone(),
            phone_number: contact.phone_number.clone(),
            linked_id: contact.linked_id,
            link_precedence: contact.link_precedence(),
            created_at: at,
            updated_at: at,
        };
        self.table.next_id += 1;
        self.table.rows.push(row.clone());
        Ok(row)
    }

    fn update(&mut self, id: ContactId, update: &ContactUpdate) -> Result<Contact, StoreError> {
        let row = self
            .table
            .rows
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StoreError::new(format!("contacts: update {id}: no such contact")))?;
        row.linked_id = update.linked_id;
        row.link_precedence = update.link_precedence;
        row.updated_at = now();
        Ok(row.clone())
    }
}

//! Contact store — the persistence seam of the consolidation core.
//!
//! Every read and write the core performs goes through a [`ContactTx`]
//! handle that only exists inside [`ContactStore::transaction`]. The
//! transaction commits when the closure returns `Ok` and rolls back on `Err`
//! (or panic), so a failed consolidation never leaves a half-merged chain.
//!
//! Backends:
//! - [`sqlite::SqliteStore`] — durable, `isqlite` feature.
//! - [`memory::MemoryStore`] — process-local, copy-on-commit.

pub mod memory;
#[cfg(feature = "isqlite")]
pub mod sqlite;

use tracing::info;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::{AppError, StoreError};
use crate::subsystems::identity::{Contact, ContactId, ContactUpdate, NewContact};

pub use memory::MemoryStore;
#[cfg(feature = "isqlite")]
pub use sqlite::SqliteStore;

/// Operations available inside a transaction.
pub trait ContactTx {
    /// Contacts whose email equals `email` or whose phone number equals
    /// `phone_number`. An absent argument matches nothing.
    fn find_by_predicate(
        &mut self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Vec<Contact>, StoreError>;

    fn find_by_id(&mut self, id: ContactId) -> Result<Option<Contact>, StoreError>;

    /// Contacts whose `linked_id` is `primary_id`.
    fn find_secondaries_of(&mut self, primary_id: ContactId) -> Result<Vec<Contact>, StoreError>;

    fn insert(&mut self, contact: &NewContact) -> Result<Contact, StoreError>;

    /// Apply `update` to an existing contact and return the stored result.
    /// Updating a missing id is an error.
    fn update(&mut self, id: ContactId, update: &ContactUpdate) -> Result<Contact, StoreError>;
}

/// A contact table that can run closures atomically.
pub trait ContactStore: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Run `f` inside one transaction. Commits on `Ok`, rolls back on `Err`.
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn ContactTx) -> Result<T, E>,
        E: From<StoreError>;
}

/// Store selected by configuration.
pub enum AnyStore {
    #[cfg(feature = "isqlite")]
    Sqlite(SqliteStore),
    Memory(MemoryStore),
}

impl AnyStore {
    pub fn open(config: &StoreConfig) -> Result<Self, AppError> {
        match config.backend {
            #[cfg(feature = "isqlite")]
            StoreBackend::Sqlite => {
                let store = SqliteStore::open(&config.path, config.busy_timeout_ms)?;
                info!(path = %store.path().display(), "sqlite contact store ready");
                Ok(AnyStore::Sqlite(store))
            }
            #[cfg(not(feature = "isqlite"))]
            StoreBackend::Sqlite => Err(AppError::Config(
                "store backend 'sqlite' is configured but not compiled in (enable feature `isqlite`)"
                    .into(),
            )),
            StoreBackend::Memory => {
                info!("in-memory contact store ready — contacts are lost on exit");
                Ok(AnyStore::Memory(MemoryStore::new()))
            }
        }
    }
}

impl ContactStore for AnyStore {
    fn backend(&self) -> &'static str {
        match self {
            #[cfg(feature = "isqlite")]
            AnyStore::Sqlite(store) => store.backend(),
            AnyStore::Memory(store) => store.backend(),
        }
    }

    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn ContactTx) -> Result<T, E>,
        E: From<StoreError>,
    {
        match self {
            #[cfg(feature = "isqlite")]
            AnyStore::Sqlite(store) => store.transaction(f),
            AnyStore::Memory(store) => store.transaction(f),
        }
    }
}

//! Consolidation engine — one identify request, one transaction.
//!
//! ```text
//! request ─▶ validate ─▶ transaction {
//!              find matches ─▶ none? insert primary
//!                           └▶ expand ─▶ merge / flatten ─▶ summarize
//!                                                        └▶ insert secondary if unseen
//!            } ─▶ Consolidation
//! ```

use tracing::{debug, info};

use crate::error::IdentifyError;
use crate::subsystems::store::{ContactStore, ContactTx};

use super::contact::NewContact;
use super::expand::expand;
use super::merge::{flatten, merge};
use super::view::{Consolidation, IdentityView, summarize};

/// Normalized identify input. Blank values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifyRequest {
    email: Option<String>,
    phone_number: Option<String>,
}

impl IdentifyRequest {
    pub fn new(email: Option<String>, phone_number: Option<String>) -> Self {
        Self {
            email: normalize(email),
            phone_number: normalize(phone_number),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = normalize(Some(email.into()));
        self
    }

    pub fn with_phone(mut self, phone_number: impl Into<String>) -> Self {
        self.phone_number = normalize(Some(phone_number.into()));
        self
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn phone_number(&self) -> Option<&str> {
        self.phone_number.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone_number.is_none()
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub struct ConsolidationEngine<S> {
    store: S,
}

impl<S: ContactStore> ConsolidationEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resolve `request` to its consolidated identity, creating or linking
    /// contacts as needed. Validation happens before the store is touched.
    pub fn identify(&self, request: &IdentifyRequest) -> Result<Consolidation, IdentifyError> {
        if request.is_empty() {
            return Err(IdentifyError::Validation(
                "Email or phone number required".into(),
            ));
        }
        self.store.transaction(|tx| consolidate(tx, request))
    }
}

fn consolidate(
    tx: &mut dyn ContactTx,
    request: &IdentifyRequest,
) -> Result<Consolidation, IdentifyError> {
    let email = request.email();
    let phone_number = request.phone_number();

    let matches = tx.find_by_predicate(email, phone_number)?;
    if matches.is_empty() {
        let created = tx.insert(&NewContact::primary(
            email.map(str::to_string),
            phone_number.map(str::to_string),
        ))?;
        info!(contact = created.id, "new primary contact");
        return Ok(Consolidation {
            contact: IdentityView::fresh(created.id),
            is_new: true,
        });
    }

    let closure = expand(tx, matches)?;
    debug!(
        contacts = closure.contacts.len(),
        primaries = closure.primaries.len(),
        "closure expanded"
    );

    let merged = if closure.primaries.len() > 1 {
        merge(tx, &closure.primaries, closure.contacts)?
    } else {
        let primary = closure.primaries[0].clone();
        flatten(tx, primary, closure.contacts)?
    };

    let mut view = summarize(&merged.primary, &merged.contacts);

    let unseen_email = email.filter(|e| !view.has_email(e));
    let unseen_phone = phone_number.filter(|p| !view.has_phone_number(p));
    if unseen_email.is_none() && unseen_phone.is_none() {
        return Ok(Consolidation {
            contact: view,
            is_new: false,
        });
    }

    let created = tx.insert(&NewContact::secondary_of(
        merged.primary.id,
        unseen_email.map(str::to_string),
        unseen_phone.map(str::to_string),
    ))?;
    info!(
        contact = created.id,
        primary = merged.primary.id,
        "new secondary contact"
    );

    if let Some(e) = unseen_email {
        view.emails.push(e.to_string());
    }
    if let Some(p) = unseen_phone {
        view.phone_numbers.push(p.to_string());
    }
    view.secondary_contact_ids.push(created.id);

    Ok(Consolidation {
        contact: view,
        is_new: true,
    })
}

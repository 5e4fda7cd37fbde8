//! Response shaping: the consolidated identity as callers see it.

use serde::Serialize;

use super::contact::{Contact, ContactId};

/// Consolidated view of one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityView {
    pub primary_contact_id: ContactId,
    /// Primary's email first, then the rest in discovery order.
    pub emails: Vec<String>,
    pub phone_numbers: Vec<String>,
    pub secondary_contact_ids: Vec<ContactId>,
}

impl IdentityView {
    /// View returned for an identity created by this request: the new primary
    /// carries no linked information yet.
    pub fn fresh(primary_id: ContactId) -> Self {
        Self {
            primary_contact_id: primary_id,
            emails: Vec::new(),
            phone_numbers: Vec::new(),
            secondary_contact_ids: Vec::new(),
        }
    }

    pub fn has_email(&self, email: &str) -> bool {
        self.emails.iter().any(|e| e == email)
    }

    pub fn has_phone_number(&self, phone_number: &str) -> bool {
        self.phone_numbers.iter().any(|p| p == phone_number)
    }
}

/// Result of one identify call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consolidation {
    pub contact: IdentityView,
    /// Whether this call inserted a contact.
    pub is_new: bool,
}

/// Fold an identity's contacts into a view. `contacts` may include `primary`
/// itself; it is never listed as a secondary.
pub fn summarize(primary: &Contact, contacts: &[Contact]) -> IdentityView {
    let mut emails = Vec::new();
    let mut phone_numbers = Vec::new();
    let mut secondary_contact_ids = Vec::new();

    push_unique(&mut emails, primary.email.as_deref());
    push_unique(&mut phone_numbers, primary.phone_number.as_deref());

    for contact in contacts.iter().filter(|c| c.id != primary.id) {
        push_unique(&mut emails, contact.email.as_deref());
        push_unique(&mut phone_numbers, contact.phone_number.as_deref());
        if !secondary_contact_ids.contains(&contact.id) {
            secondary_contact_ids.push(contact.id);
        }
    }

    IdentityView {
        primary_contact_id: primary.id,
        emails,
        phone_numbers,
        secondary_contact_ids,
    }
}

fn push_unique(values: &mut Vec<String>, value: Option<&str>) {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return;
    };
    if !values.iter().any(|v| v == value) {
        values.push(value.to_string());
    }
}

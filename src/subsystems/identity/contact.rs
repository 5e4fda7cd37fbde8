//! Contact records and the write shapes the store accepts.

use chrono::{DateTime, SubsecRound, Utc};

pub type ContactId = i64;

/// Position of a contact in its identity: the canonical record, or linked to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkPrecedence {
    Primary,
    Secondary,
}

impl LinkPrecedence {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkPrecedence::Primary => "primary",
            LinkPrecedence::Secondary => "secondary",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "primary" => Some(LinkPrecedence::Primary),
            "secondary" => Some(LinkPrecedence::Secondary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub id: ContactId,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    /// Set only on secondaries; names the primary of the identity.
    pub linked_id: Option<ContactId>,
    pub link_precedence: LinkPrecedence,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    pub fn is_primary(&self) -> bool {
        self.link_precedence == LinkPrecedence::Primary
    }

    /// Ordering used to elect the surviving primary: oldest first, id breaks
    /// ties between records created in the same instant.
    pub fn creation_key(&self) -> (DateTime<Utc>, ContactId) {
        (self.created_at, self.id)
    }
}

/// Fields for a contact about to be inserted. Timestamps and id come from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub linked_id: Option<ContactId>,
}

impl NewContact {
    pub fn primary(email: Option<String>, phone_number: Option<String>) -> Self {
        Self {
            email,
            phone_number,
            linked_id: None,
        }
    }

    pub fn secondary_of(
        primary_id: ContactId,
        email: Option<String>,
        phone_number: Option<String>,
    ) -> Self {
        Self {
            email,
            phone_number,
            linked_id: Some(primary_id),
        }
    }

    /// Precedence follows from the link, so a new row can never violate
    /// "primary iff no linked id".
    pub fn link_precedence(&self) -> LinkPrecedence {
        match self.linked_id {
            Some(_) => LinkPrecedence::Secondary,
            None => LinkPrecedence::Primary,
        }
    }
}

/// Mutation applied to an existing contact. `updated_at` is refreshed by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactUpdate {
    pub linked_id: Option<ContactId>,
    pub link_precedence: LinkPrecedence,
}

impl ContactUpdate {
    /// Make the contact a secondary pointing directly at `primary_id`.
    pub fn link_to(primary_id: ContactId) -> Self {
        Self {
            linked_id: Some(primary_id),
            link_precedence: LinkPrecedence::Secondary,
        }
    }
}

/// Current time at the microsecond precision the stores persist.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

//! Primary election and chain flattening.

use tracing::{debug, info};

use crate::error::IdentifyError;
use crate::subsystems::store::ContactTx;

use super::contact::{Contact, ContactUpdate};

/// An identity after merging: one primary, every other contact linked straight to it.
#[derive(Debug, Clone)]
pub struct Merged {
    pub primary: Contact,
    /// Every contact of the identity, primary included, as stored after the merge.
    pub contacts: Vec<Contact>,
}

/// Collapse several primaries into one.
///
/// The oldest primary (by creation time, then id) survives; every other
/// contact in `contacts`, demoted primaries included, is relinked to it.
pub fn merge(
    tx: &mut dyn ContactTx,
    primaries: &[Contact],
    mut contacts: Vec<Contact>,
) -> Result<Merged, IdentifyError> {
    let survivor = primaries
        .iter()
        .min_by_key(|c| c.creation_key())
        .cloned()
        .ok_or_else(|| IdentifyError::InvariantViolation("merge called without a primary".into()))?;

    for primary in primaries {
        if !contacts.iter().any(|c| c.id == primary.id) {
            contacts.push(primary.clone());
        }
    }

    debug!(
        survivor = survivor.id,
        primaries = primaries.len(),
        "merging identities"
    );
    flatten(tx, survivor, contacts)
}

/// Point every contact other than `primary` directly at it.
///
/// Contacts already linked to `primary` are left alone. Anything else, a
/// demoted primary or a secondary hanging off another contact, is rewritten.
pub fn flatten(
    tx: &mut dyn ContactTx,
    mut primary: Contact,
    contacts: Vec<Contact>,
) -> Result<Merged, IdentifyError> {
    let mut out = Vec::with_capacity(contacts.len());

    for contact in contacts {
        if contact.id == primary.id {
            primary = contact.clone();
            out.push(contact);
            continue;
        }
        if contact.linked_id == Some(primary.id) && !contact.is_primary() {
            out.push(contact);
            continue;
        }

        let updated = tx.update(contact.id, &ContactUpdate::link_to(primary.id))?;
        if contact.is_primary() {
            info!(demoted = contact.id, primary = primary.id, "primary contact demoted");
        } else {
            debug!(contact = contact.id, primary = primary.id, "secondary relinked");
        }
        out.push(updated);
    }

    if !out.iter().any(|c| c.id == primary.id) {
        out.insert(0, primary.clone());
    }

    Ok(Merged {
        primary,
        contacts: out,
    })
}

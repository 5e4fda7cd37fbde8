//! Chain expansion: the connected component around a set of matched contacts.

use std::collections::{HashSet, VecDeque};

use crate::error::IdentifyError;
use crate::subsystems::store::ContactTx;

use super::contact::{Contact, ContactId, LinkPrecedence};

/// Every contact transitively linked to the seeds.
#[derive(Debug, Clone)]
pub struct Closure {
    /// Discovery order: seeds first, then contacts reached through links.
    pub contacts: Vec<Contact>,
    /// Subset of `contacts` that are primaries. Never empty.
    pub primaries: Vec<Contact>,
}

/// Breadth-first closure over both link directions.
///
/// Upward: a secondary pulls in the contact its `linked_id` names.
/// Downward: once the queue drains, each contact not yet descended pulls in
/// the contacts linked to it; the walk resumes until a pass finds nothing new.
/// Each contact is enqueued at most once, so the walk ends after at most one
/// pass per contact in the component.
pub fn expand(tx: &mut dyn ContactTx, seeds: Vec<Contact>) -> Result<Closure, IdentifyError> {
    let mut visited: HashSet<ContactId> = HashSet::new();
    let mut descended: HashSet<ContactId> = HashSet::new();
    let mut queue: VecDeque<Contact> = VecDeque::new();
    let mut contacts: Vec<Contact> = Vec::new();

    for seed in seeds {
        if visited.insert(seed.id) {
            queue.push_back(seed);
        }
    }

    loop {
        while let Some(contact) = queue.pop_front() {
            if contact.link_precedence == LinkPrecedence::Secondary {
                let parent_id = contact.linked_id.ok_or_else(|| {
                    IdentifyError::InvariantViolation(format!(
                        "secondary contact {} has no linked contact",
                        contact.id
                    ))
                })?;
                if !visited.contains(&parent_id) {
                    let parent = tx.find_by_id(parent_id)?.ok_or_else(|| {
                        IdentifyError::InvariantViolation(format!(
                            "contact {} links to missing contact {parent_id}",
                            contact.id
                        ))
                    })?;
                    visited.insert(parent.id);
                    queue.push_back(parent);
                }
            }
            contacts.push(contact);
        }

        // Secondaries are descended too: older data may hold chains
        // (3 -> 2 -> 1) that only a downward edge from 2 reaches.
        let pending: Vec<ContactId> = contacts
            .iter()
            .filter(|c| !descended.contains(&c.id))
            .map(|c| c.id)
            .collect();
        if pending.is_empty() {
            break;
        }

        for parent_id in pending {
            descended.insert(parent_id);
            for child in tx.find_secondaries_of(parent_id)? {
                if visited.insert(child.id) {
                    queue.push_back(child);
                }
            }
        }
    }

    let primaries: Vec<Contact> = contacts.iter().filter(|c| c.is_primary()).cloned().collect();
    if primaries.is_empty() {
        let ids: Vec<ContactId> = contacts.iter().map(|c| c.id).collect();
        return Err(IdentifyError::InvariantViolation(format!(
            "no primary contact among linked contacts {ids:?}"
        )));
    }

    Ok(Closure { contacts, primaries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::subsystems::identity::contact::{ContactUpdate, NewContact, now};
    use crate::subsystems::store::{ContactStore, MemoryStore};

    fn row(id: ContactId, email: Option<&str>, phone: Option<&str>, linked: Option<ContactId>) -> Contact {
        let at = now();
        Contact {
            id,
            email: email.map(Into::into),
            phone_number: phone.map(Into::into),
            linked_id: linked,
            link_precedence: if linked.is_some() {
                LinkPrecedence::Secondary
            } else {
                LinkPrecedence::Primary
            },
            created_at: at,
            updated_at: at,
        }
    }

    fn expand_from(store: &MemoryStore, seed_ids: &[ContactId]) -> Result<Closure, IdentifyError> {
        store.transaction(|tx| {
            let mut seeds = Vec::new();
            for id in seed_ids {
                seeds.extend(tx.find_by_id(*id)?);
            }
            expand(tx, seeds)
        })
    }

    fn ids(contacts: &[Contact]) -> Vec<ContactId> {
        let mut ids: Vec<ContactId> = contacts.iter().map(|c| c.id).collect();
        ids.sort();
        ids
    }

    #[test]
    fn secondary_seed_reaches_primary_and_siblings() {
        let store = MemoryStore::with_contacts(vec![
            row(1, Some("a@x.com"), Some("111"), None),
            row(2, Some("b@x.com"), Some("111"), Some(1)),
            row(3, Some("c@x.com"), None, Some(1)),
            row(9, Some("other@x.com"), None, None),
        ]);

        let closure = expand_from(&store, &[2]).unwrap();
        assert_eq!(ids(&closure.contacts), vec![1, 2, 3]);
        assert_eq!(ids(&closure.primaries), vec![1]);
        assert_eq!(closure.contacts[0].id, 2, "seeds come first");
    }

    #[test]
    fn two_identities_touched_by_one_query_yield_two_primaries() {
        let store = MemoryStore::with_contacts(vec![
            row(1, Some("a@x.com"), None, None),
            row(2, Some("a2@x.com"), None, Some(1)),
            row(5, None, Some("111"), None),
            row(6, None, Some("222"), Some(5)),
        ]);

        let closure = expand_from(&store, &[1, 5]).unwrap();
        assert_eq!(ids(&closure.contacts), vec![1, 2, 5, 6]);
        assert_eq!(ids(&closure.primaries), vec![1, 5]);
    }

    #[test]
    fn chained_secondary_is_followed_upward() {
        let store = MemoryStore::with_contacts(vec![
            row(1, Some("a@x.com"), None, None),
            row(2, None, Some("111"), Some(1)),
            row(3, None, Some("222"), Some(2)),
        ]);

        let closure = expand_from(&store, &[3]).unwrap();
        assert_eq!(ids(&closure.contacts), vec![1, 2, 3]);
        assert_eq!(ids(&closure.primaries), vec![1]);
    }

    #[test]
    fn primary_seed_reaches_grandchild_through_secondary() {
        let store = MemoryStore::with_contacts(vec![
            row(1, Some("a@x.com"), None, None),
            row(2, None, Some("111"), Some(1)),
            row(3, None, Some("222"), Some(2)),
        ]);

        for seed in [1, 2, 3] {
            let closure = expand_from(&store, &[seed]).unwrap();
            assert_eq!(ids(&closure.contacts), vec![1, 2, 3], "seeded from {seed}");
            assert_eq!(ids(&closure.primaries), vec![1]);
        }
    }

    #[test]
    fn dangling_link_is_invariant_violation() {
        let store = MemoryStore::with_contacts(vec![row(2, None, Some("111"), Some(77))]);
        let err = expand_from(&store, &[2]).unwrap_err();
        assert!(matches!(err, IdentifyError::InvariantViolation(_)), "{err}");
        assert!(err.to_string().contains("missing contact 77"));
    }

    #[test]
    fn cycle_without_primary_is_invariant_violation() {
        let store = MemoryStore::with_contacts(vec![
            row(1, Some("a@x.com"), None, Some(2)),
            row(2, Some("b@x.com"), None, Some(1)),
        ]);
        let err = expand_from(&store, &[1]).unwrap_err();
        assert!(err.to_string().contains("no primary contact"));
    }

    #[test]
    fn store_failure_propagates() {
        struct Broken;
        impl ContactTx for Broken {
            fn find_by_predicate(&mut self, _: Option<&str>, _: Option<&str>) -> Result<Vec<Contact>, StoreError> {
                Ok(Vec::new())
            }
            fn find_by_id(&mut self, _: ContactId) -> Result<Option<Contact>, StoreError> {
                Err(StoreError::new("connection reset"))
            }
            fn find_secondaries_of(&mut self, _: ContactId) -> Result<Vec<Contact>, StoreError> {
                Err(StoreError::new("connection reset"))
            }
            fn insert(&mut self, _: &NewContact) -> Result<Contact, StoreError> {
                unreachable!()
            }
            fn update(&mut self, _: ContactId, _: &ContactUpdate) -> Result<Contact, StoreError> {
                unreachable!()
            }
        }

        let err = expand(&mut Broken, vec![row(2, None, Some("111"), Some(1))]).unwrap_err();
        assert!(matches!(err, IdentifyError::Store(_)));
    }
}

//! Identity subsystem — contact consolidation.
//!
//! A caller presents an email and/or phone number; the engine finds every
//! stored contact that shares either value, walks the links between them,
//! elects one primary for the whole group and records anything new as a
//! secondary of that primary.
//!
//! Nothing here knows about HTTP or SQL: the engine is generic over
//! [`ContactStore`](crate::subsystems::store::ContactStore).

mod contact;
mod engine;
mod expand;
mod merge;
mod view;

pub use contact::{Contact, ContactId, ContactUpdate, LinkPrecedence, NewContact};
pub(crate) use contact::now;
pub use engine::{ConsolidationEngine, IdentifyRequest};
pub use expand::{Closure, expand};
pub use merge::{Merged, flatten, merge};
pub use view::{Consolidation, IdentityView, summarize};

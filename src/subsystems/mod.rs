//! Subsystem modules for the contact identity service.

pub mod comms;
pub mod identity;
pub mod store;

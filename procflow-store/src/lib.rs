#![forbid(unsafe_code)]

//! Persistence collaborator for procflow process instances.
//!
//! The engine only reads and writes variable values and checks instance
//! existence through [`StateStore`]; it never issues queries of its own.

pub mod memory;
pub mod store;

pub use crate::memory::InMemoryStore;
pub use crate::store::{InstanceRecord, InstanceStatus, NewInstance, StateStore, StoreError, Variables};

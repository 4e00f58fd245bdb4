mod trait_store;
mod types;

pub use trait_store::StateStore;
pub use types::{InstanceRecord, InstanceStatus, NewInstance, StoreError, Variables};

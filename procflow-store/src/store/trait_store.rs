use async_trait::async_trait;
use uuid::Uuid;

use crate::store::types::*;

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn create_instance(&self, instance: NewInstance) -> Result<InstanceRecord, StoreError>;

    async fn instance_exists(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn get_instance(&self, id: Uuid) -> Result<Option<InstanceRecord>, StoreError>;

    async fn load_variables(&self, id: Uuid) -> Result<Variables, StoreError>;

    /// Replaces the persisted variable map of an instance.
    async fn save_variables(&self, id: Uuid, variables: Variables) -> Result<(), StoreError>;

    async fn set_status(&self, id: Uuid, status: InstanceStatus) -> Result<(), StoreError>;

    async fn remove_instance(&self, id: Uuid) -> Result<(), StoreError>;
}

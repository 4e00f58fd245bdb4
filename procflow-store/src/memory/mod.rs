use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::{InstanceRecord, InstanceStatus, NewInstance, StateStore, StoreError, Variables};

/// Process-local store, used for tests and for embedding without a database.
#[derive(Default)]
pub struct InMemoryStore {
    instances: RwLock<HashMap<Uuid, InstanceRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.instances.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.instances.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn create_instance(&self, instance: NewInstance) -> Result<InstanceRecord, StoreError> {
        let mut guard = self.instances.write().await;
        if guard.contains_key(&instance.id) {
            return Err(StoreError::AlreadyExists(instance.id));
        }
        let now = Utc::now();
        let record = InstanceRecord {
            id: instance.id,
            process_id: instance.process_id,
            status: InstanceStatus::Active,
            variables: instance.variables,
            created_at: now,
            updated_at: now,
        };
        guard.insert(record.id, record.clone());
        Ok(record)
    }

    async fn instance_exists(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.instances.read().await.contains_key(&id))
    }

    async fn get_instance(&self, id: Uuid) -> Result<Option<InstanceRecord>, StoreError> {
        Ok(self.instances.read().await.get(&id).cloned())
    }

    async fn load_variables(&self, id: Uuid) -> Result<Variables, StoreError> {
        self.instances
            .read()
            .await
            .get(&id)
            .map(|r| r.variables.clone())
            .ok_or(StoreError::NotFound(id))
    }

    async fn save_variables(&self, id: Uuid, variables: Variables) -> Result<(), StoreError> {
        let mut guard = self.instances.write().await;
        let record = guard.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.variables = variables;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn set_status(&self, id: Uuid, status: InstanceStatus) -> Result<(), StoreError> {
        let mut guard = self.instances.write().await;
        let record = guard.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.status = status;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn remove_instance(&self, id: Uuid) -> Result<(), StoreError> {
        self.instances
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }
}

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

pub type Variables = BTreeMap<String, JsonValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    Active,
    Completed,
    Aborted,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Active => "active",
            InstanceStatus::Completed => "completed",
            InstanceStatus::Aborted => "aborted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewInstance {
    pub id: Uuid,
    pub process_id: String,
    pub variables: Variables,
}

#[derive(Debug, Clone)]
pub struct InstanceRecord {
    pub id: Uuid,
    pub process_id: String,
    pub status: InstanceStatus,
    pub variables: Variables,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("process instance not found: {0}")]
    NotFound(Uuid),
    #[error("process instance already exists: {0}")]
    AlreadyExists(Uuid),
    #[error("store backend error: {0}")]
    Backend(String),
}

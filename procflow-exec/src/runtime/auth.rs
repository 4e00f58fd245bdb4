use std::collections::{BTreeMap, BTreeSet};

use uuid::Uuid;

use crate::path::NodePath;

/// A request to act on a human task.
#[derive(Debug, Clone)]
pub struct TaskRequest<'a> {
    pub instance_id: Uuid,
    pub node: &'a NodePath,
    pub task_name: &'a str,
    pub actors: Vec<&'a str>,
    pub groups: Vec<&'a str>,
    pub user: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("task operation denied: {}", .reasons.join("; "))]
pub struct Denial {
    pub reasons: Vec<String>,
}

impl Denial {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reasons: vec![reason.into()],
        }
    }
}

pub trait TaskAuthorizer: Send + Sync {
    fn authorize(&self, request: &TaskRequest<'_>) -> Result<(), Denial>;
}

pub struct AllowAll;

impl TaskAuthorizer for AllowAll {
    fn authorize(&self, _request: &TaskRequest<'_>) -> Result<(), Denial> {
        Ok(())
    }
}

/// Only a task's actors, or members of its groups, may act on it. Tasks
/// without actors or groups are open to everyone.
#[derive(Debug, Clone, Default)]
pub struct PotentialOwners {
    memberships: BTreeMap<String, BTreeSet<String>>,
}

impl PotentialOwners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_member(mut self, user: impl Into<String>, group: impl Into<String>) -> Self {
        self.memberships
            .entry(user.into())
            .or_default()
            .insert(group.into());
        self
    }
}

impl TaskAuthorizer for PotentialOwners {
    fn authorize(&self, request: &TaskRequest<'_>) -> Result<(), Denial> {
        if request.actors.is_empty() && request.groups.is_empty() {
            return Ok(());
        }
        if request.actors.contains(&request.user) {
            return Ok(());
        }
        let member = self
            .memberships
            .get(request.user)
            .is_some_and(|groups| request.groups.iter().any(|g| groups.contains(*g)));
        if member {
            return Ok(());
        }
        Err(Denial::new(format!(
            "user '{}' is not a potential owner of task '{}'",
            request.user, request.task_name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(node: &'a NodePath, user: &'a str) -> TaskRequest<'a> {
        TaskRequest {
            instance_id: Uuid::nil(),
            node,
            task_name: "Approve",
            actors: vec!["mary"],
            groups: vec!["managers"],
            user,
        }
    }

    #[test]
    fn actors_and_group_members_are_owners() {
        let node = NodePath::new([3]);
        let auth = PotentialOwners::new().with_member("john", "managers");
        assert!(auth.authorize(&request(&node, "mary")).is_ok());
        assert!(auth.authorize(&request(&node, "john")).is_ok());

        let denial = auth.authorize(&request(&node, "eve")).unwrap_err();
        assert_eq!(
            denial.to_string(),
            "task operation denied: user 'eve' is not a potential owner of task 'Approve'"
        );
    }
}

use procflow_core::types::NodeId;

/// Identifier of one node instance inside a process instance.
pub type NodeInstanceId = u64;

/// Hands out node instance ids, starting at 1.
#[derive(Debug, Clone, Default)]
pub struct InstanceIds {
    last: NodeInstanceId,
}

impl InstanceIds {
    pub fn next_id(&mut self) -> NodeInstanceId {
        self.last += 1;
        self.last
    }
}

/// Address of a node from the process root: the ids of every enclosing
/// composite followed by the node's own id. The empty path is the process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct NodePath(Vec<NodeId>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(ids: impl Into<Vec<NodeId>>) -> Self {
        Self(ids.into())
    }

    pub fn child(&self, id: NodeId) -> Self {
        let mut ids = self.0.clone();
        ids.push(id);
        Self(ids)
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.0.split_last()?;
        Some(Self(rest.to_vec()))
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> &[NodeId] {
        &self.0
    }

    pub fn last(&self) -> Option<NodeId> {
        self.0.last().copied()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// This path followed by each ancestor up to and including the root.
    pub fn ancestry(&self) -> impl Iterator<Item = NodePath> + '_ {
        (0..=self.0.len()).rev().map(|n| Self(self.0[..n].to_vec()))
    }
}

impl From<&[NodeId]> for NodePath {
    fn from(ids: &[NodeId]) -> Self {
        Self(ids.to_vec())
    }
}

impl std::fmt::Display for NodePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for id in &self.0 {
            write!(f, "/{id}")?;
        }
        Ok(())
    }
}

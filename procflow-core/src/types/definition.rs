use crate::types::{ExceptionHandlerSpec, Metadata, NodeDescriptor, NodeId, VariableDeclaration};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDefinition {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<VariableDeclaration>,

    pub nodes: Vec<NodeDescriptor>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<Connection>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exception_handlers: Vec<ExceptionHandlerSpec>,

    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl ProcessDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            version: None,
            package: None,
            variables: Vec::new(),
            nodes: Vec::new(),
            connections: Vec::new(),
            exception_handlers: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_variable(mut self, decl: VariableDeclaration) -> Self {
        self.variables.push(decl);
        self
    }

    pub fn with_node(mut self, node: NodeDescriptor) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_connection(mut self, from: NodeId, to: NodeId) -> Self {
        self.connections.push(Connection { from, to });
        self
    }

    pub fn with_exception_handler(mut self, handler: ExceptionHandlerSpec) -> Self {
        self.exception_handlers.push(handler);
        self
    }

    /// Looks up a node by its id path from the process root.
    pub fn find(&self, path: &[NodeId]) -> Option<&NodeDescriptor> {
        let (first, rest) = path.split_first()?;
        let mut cur = self.nodes.iter().find(|n| n.id == *first)?;
        for id in rest {
            cur = cur.children().iter().find(|n| n.id == *id)?;
        }
        Some(cur)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Connection {
    pub from: NodeId,
    pub to: NodeId,
}

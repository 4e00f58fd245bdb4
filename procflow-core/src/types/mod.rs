mod common;
mod definition;
mod handler;
mod node;
mod variable;

pub use common::{non_blank, Metadata, NodeId};
pub use definition::{Connection, ProcessDefinition};
pub use handler::ExceptionHandlerSpec;
pub use node::{
    CompositeNode, Constraint, Container, CustomNode, DynamicNode, EndNode, EventNode, EventScope,
    FaultNode, HumanTaskNode, JoinNode, JoinType, NodeDescriptor, NodeKind, NodeType,
    RuleTaskNode, SplitNode, SplitType, SubProcessNode, TimerNode, TransformationSpec,
};
pub use variable::{VariableDeclaration, VariableType};

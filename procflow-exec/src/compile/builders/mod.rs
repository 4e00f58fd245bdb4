//! Builders for the node kinds every registry knows about.

mod container;
mod custom;
mod event;
mod flow;
mod task;

pub use container::{CompositeBuilder, DynamicBuilder};
pub use custom::AttributeBuilder;
pub use event::{EventBuilder, FaultBuilder, TimerBuilder};
pub use flow::{EndBuilder, JoinBuilder, SplitBuilder, StartBuilder};
pub use task::{HumanTaskBuilder, RuleTaskBuilder, SubProcessBuilder};

use procflow_core::types::{NodeDescriptor, NodeType};

use crate::error::CompileError;

pub(crate) fn wrong_kind(node: &NodeDescriptor, expected: NodeType) -> CompileError {
    CompileError::Configuration {
        node_id: node.id,
        message: format!("builder for {expected} nodes received a {} node", node.node_type()),
    }
}

#![forbid(unsafe_code)]

//! Compiler, fault routing and runtime for procflow process definitions.
//!
//! Definitions from `procflow-core` are compiled through the
//! [`NodeBuilderRegistry`] into [`ExecutableUnit`] trees. At run time a
//! [`ProcessInstance`] drives dynamic regions, transforms events and routes
//! faults through the [`PolicyChain`].

pub mod compile;
pub mod config;
pub mod dynamic;
pub mod engine;
pub mod error;
pub mod events;
pub mod fault;
pub mod path;
pub mod registry;
pub mod runtime;
pub mod transform;

pub use crate::compile::{CompiledProcess, Compiler, CompilerOptions, ExecutableUnit, Op};
pub use crate::config::EngineConfig;
pub use crate::dynamic::{RegionState, TriggerOutcome};
pub use crate::engine::Engine;
pub use crate::error::{CompileError, EngineError, RuntimeError};
pub use crate::events::{AuditEvent, EventSink, MemoryEventSink, TracingEventSink};
pub use crate::fault::{Fault, FaultCause, HandlerDeclaration, HandlerMatch, PolicyChain, UnhandledFault};
pub use crate::path::{InstanceIds, NodeInstanceId, NodePath};
pub use crate::registry::{NodeBuilder, NodeBuilderRegistry};
pub use crate::runtime::{Denial, ProcessInstance, RuntimeServices, TaskAuthorizer};
pub use crate::transform::{EventTransformation, EventTransformer, Transformer, TransformerRegistry};

//! Process instance state: variable frames, live dynamic regions, event
//! delivery, task completion and fault routing.

mod auth;
mod frames;

use std::collections::BTreeMap;
use std::sync::Arc;

use procflow_core::types::{NodeId, NodeType};
use procflow_store::{InstanceStatus, Variables};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::compile::{CompiledProcess, ExecutableUnit};
use crate::dynamic::{
    ActiveChild, DynamicRegion, RegionChange, RegionError, RegionInstance, RegionState,
    TriggerOutcome,
};
use crate::error::RuntimeError;
use crate::events::AuditEvent;
use crate::fault::{Fault, HandlerMatch, PolicyChain, UnhandledFault};
use crate::path::{InstanceIds, NodeInstanceId, NodePath};
use crate::transform::{EventTransformer, TransformerRegistry};

pub use auth::{AllowAll, Denial, PotentialOwners, TaskAuthorizer, TaskRequest};

use frames::{FrameId, Frames, ROOT_FRAME};

/// Shared, read-only collaborators of every process instance.
#[derive(Clone)]
pub struct RuntimeServices {
    pub policies: Arc<PolicyChain>,
    pub transformers: Arc<TransformerRegistry>,
    pub authorizer: Arc<dyn TaskAuthorizer>,
    pub max_region_instances: Option<usize>,
}

impl Default for RuntimeServices {
    fn default() -> Self {
        Self {
            policies: Arc::new(PolicyChain::standard()),
            transformers: Arc::new(TransformerRegistry::standard()),
            authorizer: Arc::new(AllowAll),
            max_region_instances: None,
        }
    }
}

#[derive(Debug, Clone)]
struct LiveRegion {
    instance: RegionInstance,
    frame: FrameId,
}

/// One running instance of a compiled process.
///
/// Every operation is synchronous and leaves audit events behind; callers
/// collect them with [`ProcessInstance::drain_events`].
pub struct ProcessInstance {
    id: Uuid,
    process: Arc<CompiledProcess>,
    services: RuntimeServices,
    frames: Frames,
    /// Composite frames, keyed by path, with the frame they were opened under.
    scopes: BTreeMap<NodePath, (FrameId, FrameId)>,
    regions: BTreeMap<NodePath, LiveRegion>,
    ids: InstanceIds,
    status: InstanceStatus,
    handled: Vec<HandlerMatch>,
    events: Vec<AuditEvent>,
}

impl ProcessInstance {
    pub fn new(
        id: Uuid,
        process: Arc<CompiledProcess>,
        services: RuntimeServices,
        initial: Variables,
    ) -> Result<Self, RuntimeError> {
        let mut frames = Frames::new(&process.variables);
        for (name, value) in initial {
            frames.set(ROOT_FRAME, &name, value)?;
        }
        info!(instance_id = %id, process_id = %process.id, "process instance started");
        let events = vec![AuditEvent::ProcessStarted {
            instance_id: id,
            process_id: process.id.clone(),
        }];
        Ok(Self {
            id,
            process,
            services,
            frames,
            scopes: BTreeMap::new(),
            regions: BTreeMap::new(),
            ids: InstanceIds::default(),
            status: InstanceStatus::Active,
            handled: Vec::new(),
            events,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn process(&self) -> &CompiledProcess {
        &self.process
    }

    pub fn status(&self) -> InstanceStatus {
        self.status
    }

    /// Process-level variables.
    pub fn variables(&self) -> Variables {
        self.frames.root_values()
    }

    pub fn variable(&self, name: &str) -> Option<&JsonValue> {
        self.frames.get(ROOT_FRAME, name)
    }

    pub fn region_state(&self, path: &NodePath) -> Option<RegionState> {
        self.regions.get(path).map(|r| r.instance.state())
    }

    pub fn active_children(&self, path: &NodePath) -> Vec<ActiveChild> {
        self.regions
            .get(path)
            .map(|r| r.instance.active_children())
            .unwrap_or_default()
    }

    /// Handlers that accepted faults so far, oldest first.
    pub fn handled_faults(&self) -> &[HandlerMatch] {
        &self.handled
    }

    pub fn drain_events(&mut self) -> Vec<AuditEvent> {
        std::mem::take(&mut self.events)
    }

    fn ensure_active(&self) -> Result<(), RuntimeError> {
        if self.status == InstanceStatus::Active {
            Ok(())
        } else {
            Err(RuntimeError::InstanceNotActive(self.id))
        }
    }

    fn unit(&self, path: &NodePath) -> Result<&ExecutableUnit, RuntimeError> {
        self.process
            .unit(path)
            .ok_or_else(|| RuntimeError::UnknownNode(path.clone()))
    }

    fn expect_unit(&self, path: &NodePath, expected: NodeType) -> Result<&ExecutableUnit, RuntimeError> {
        let unit = self.unit(path)?;
        if unit.node_type != expected {
            return Err(RuntimeError::WrongNodeType {
                path: path.clone(),
                expected,
                found: unit.node_type.clone(),
            });
        }
        Ok(unit)
    }

    /// Frame seen by the node at `path`: the innermost live region or
    /// composite enclosing it, or the process frame. A composite's frame is
    /// opened the first time something inside it needs one.
    fn enclosing_frame(&mut self, path: &NodePath) -> FrameId {
        let mut outer: Vec<NodePath> = path.ancestry().skip(1).collect();
        outer.reverse();

        let mut frame = ROOT_FRAME;
        for p in outer.into_iter().filter(|p| !p.is_root()) {
            if let Some(r) = self.regions.get(&p).filter(|r| r.instance.is_active()) {
                frame = r.frame;
                continue;
            }
            let Some(unit) = self
                .process
                .unit(&p)
                .filter(|u| u.node_type == NodeType::Composite)
            else {
                continue;
            };
            frame = match self.scopes.get(&p).copied() {
                Some((parent, scope)) if parent == frame => scope,
                _ => {
                    let scope = self.frames.push(frame, unit.variables());
                    self.scopes.insert(p, (frame, scope));
                    scope
                }
            };
        }
        frame
    }

    /// The running instance of the node at `path` inside its parent, when
    /// the parent is a live region.
    fn running_in_parent(&self, path: &NodePath) -> Option<(NodePath, ActiveChild)> {
        let parent = path.parent()?;
        let id = path.last()?;
        let child = self
            .regions
            .get(&parent)
            .filter(|r| r.instance.is_active())?
            .instance
            .active_children()
            .into_iter()
            .find(|c| c.child == id)?;
        Some((parent, child))
    }

    fn live_region(&mut self, path: &NodePath) -> Result<&mut LiveRegion, RuntimeError> {
        match self.regions.get_mut(path) {
            Some(r) if r.instance.is_active() => Ok(r),
            _ => Err(RuntimeError::RegionNotActive(path.clone())),
        }
    }

    // Variables

    /// Sets a process-level variable and re-evaluates every live region.
    pub fn set_variable(&mut self, name: &str, value: JsonValue) -> Result<(), RuntimeError> {
        self.ensure_active()?;
        self.assign(ROOT_FRAME, name, value)?;
        self.reevaluate_regions()
    }

    /// Sets a variable as seen from inside the region at `path`.
    pub fn set_region_variable(
        &mut self,
        path: &NodePath,
        name: &str,
        value: JsonValue,
    ) -> Result<(), RuntimeError> {
        self.ensure_active()?;
        let frame = self.live_region(path)?.frame;
        self.assign(frame, name, value)?;
        self.reevaluate_regions()
    }

    fn assign(&mut self, frame: FrameId, name: &str, value: JsonValue) -> Result<(), RuntimeError> {
        self.frames.set(frame, name, value.clone())?;
        debug!(instance_id = %self.id, name, "variable changed");
        self.events.push(AuditEvent::VariableChanged {
            instance_id: self.id,
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    fn reevaluate_regions(&mut self) -> Result<(), RuntimeError> {
        let paths: Vec<NodePath> = self
            .regions
            .iter()
            .filter(|(_, r)| r.instance.is_active())
            .map(|(p, _)| p.clone())
            .collect();
        for path in paths {
            if self.status != InstanceStatus::Active {
                break;
            }
            let Some(live) = self.regions.get_mut(&path) else {
                continue;
            };
            let result = live
                .instance
                .variables_changed(&self.frames.view(live.frame), &mut self.ids);
            self.settle(&path, result)?;
        }
        Ok(())
    }

    // Dynamic regions

    /// Enters the dynamic region at `path`. Entering a region that is
    /// already active returns its existing instance id. A region started as
    /// a child of another region takes over that child's instance id.
    pub fn enter_dynamic(&mut self, path: &NodePath) -> Result<NodeInstanceId, RuntimeError> {
        self.ensure_active()?;
        if let Some(r) = self.regions.get(path).filter(|r| r.instance.is_active()) {
            return Ok(r.instance.instance_id());
        }
        let unit = self.expect_unit(path, NodeType::Dynamic)?;
        let declarations: Vec<_> = unit.variables().into_iter().cloned().collect();
        let region = DynamicRegion::from_unit(path.clone(), unit)
            .ok_or_else(|| RuntimeError::UnknownNode(path.clone()))?;

        let parent = self.enclosing_frame(path);
        let frame = self.frames.push(parent, declarations.iter());
        let instance_id = match self.running_in_parent(path) {
            Some((_, c)) => c.instance,
            None => {
                let instance_id = self.ids.next_id();
                self.events.push(AuditEvent::NodeTriggered {
                    instance_id: self.id,
                    node: path.clone(),
                    node_instance_id: instance_id,
                });
                instance_id
            }
        };
        let instance =
            RegionInstance::new(region, instance_id).with_max_active(self.services.max_region_instances);
        self.regions
            .insert(path.clone(), LiveRegion { instance, frame });

        if let Some(live) = self.regions.get_mut(path) {
            let result = live
                .instance
                .enter(&self.frames.view(live.frame), &mut self.ids);
            self.settle(path, result)?;
        }
        Ok(instance_id)
    }

    /// Asks the region at `path` to start `child`.
    pub fn trigger(&mut self, path: &NodePath, child: NodeId) -> Result<TriggerOutcome, RuntimeError> {
        self.ensure_active()?;
        self.live_region(path)?;
        let Some(live) = self.regions.get_mut(path) else {
            return Err(RuntimeError::RegionNotActive(path.clone()));
        };
        let result = live
            .instance
            .trigger(child, &self.frames.view(live.frame), &mut self.ids);
        match result {
            Ok((outcome, changes)) => {
                self.apply(path, changes)?;
                Ok(outcome)
            }
            Err(RegionError::Fault(fault)) => Err(self.fail(fault)),
            Err(other) => Err(region_error(other)),
        }
    }

    pub fn complete_child(
        &mut self,
        path: &NodePath,
        instance: NodeInstanceId,
    ) -> Result<(), RuntimeError> {
        self.finish_child(path, instance, false)
    }

    pub fn cancel_child(&mut self, path: &NodePath, instance: NodeInstanceId) -> Result<(), RuntimeError> {
        self.finish_child(path, instance, true)
    }

    fn finish_child(
        &mut self,
        path: &NodePath,
        instance: NodeInstanceId,
        cancel: bool,
    ) -> Result<(), RuntimeError> {
        self.ensure_active()?;
        let Some(live) = self.regions.get_mut(path) else {
            return Err(RuntimeError::RegionNotActive(path.clone()));
        };
        let child = live
            .instance
            .active_children()
            .into_iter()
            .find(|c| c.instance == instance);
        let vars = self.frames.view(live.frame);
        let result = if cancel {
            live.instance.cancel_child(instance, &vars)
        } else {
            live.instance.child_completed(instance, &vars)
        };

        if let (Some(c), Ok(_) | Err(RegionError::Fault(_))) = (child, &result) {
            let node = path.child(c.child);
            if cancel {
                self.cancel_nested(&node);
                self.events.push(AuditEvent::NodeCancelled {
                    instance_id: self.id,
                    node,
                    node_instance_id: c.instance,
                });
            } else {
                self.events.push(AuditEvent::NodeLeft {
                    instance_id: self.id,
                    node,
                    node_instance_id: c.instance,
                });
            }
        }
        self.settle(path, result)
    }

    /// Cancels the region at `path` and everything still running in it. A
    /// region running as another region's child is cancelled through its
    /// parent.
    pub fn cancel_region(&mut self, path: &NodePath) -> Result<(), RuntimeError> {
        self.ensure_active()?;
        self.live_region(path)?;
        if let Some((parent, c)) = self.running_in_parent(path) {
            return self.cancel_child(&parent, c.instance);
        }
        let live = self.live_region(path)?;
        let region_instance = live.instance.instance_id();
        let cancelled = live.instance.cancel();
        self.cancel_children(path, cancelled);
        self.events.push(AuditEvent::NodeCancelled {
            instance_id: self.id,
            node: path.clone(),
            node_instance_id: region_instance,
        });
        Ok(())
    }

    fn cancel_children(&mut self, path: &NodePath, cancelled: Vec<ActiveChild>) {
        for c in cancelled {
            let node = path.child(c.child);
            self.cancel_nested(&node);
            self.events.push(AuditEvent::NodeCancelled {
                instance_id: self.id,
                node,
                node_instance_id: c.instance,
            });
        }
    }

    /// A cancelled child that is itself a live region takes its children
    /// down with it.
    fn cancel_nested(&mut self, node: &NodePath) {
        if let Some(live) = self.regions.get_mut(node) {
            let cancelled = live.instance.cancel();
            self.cancel_children(node, cancelled);
        }
    }

    /// Records region changes as events. A completed region that runs as a
    /// child of another region completes that child.
    fn apply(&mut self, path: &NodePath, changes: Vec<RegionChange>) -> Result<(), RuntimeError> {
        for change in changes {
            match change {
                RegionChange::ChildStarted(c) => self.events.push(AuditEvent::NodeTriggered {
                    instance_id: self.id,
                    node: path.child(c.child),
                    node_instance_id: c.instance,
                }),
                RegionChange::Completed { cancelled } => {
                    self.cancel_children(path, cancelled);
                    info!(instance_id = %self.id, region = %path, "dynamic region completed");
                    if let Some((parent, c)) = self.running_in_parent(path) {
                        self.complete_child(&parent, c.instance)?;
                        continue;
                    }
                    let region_instance = self
                        .regions
                        .get(path)
                        .map(|r| r.instance.instance_id())
                        .unwrap_or_default();
                    self.events.push(AuditEvent::NodeLeft {
                        instance_id: self.id,
                        node: path.clone(),
                        node_instance_id: region_instance,
                    });
                }
            }
        }
        Ok(())
    }

    /// Applies the outcome of a region re-evaluation. A condition fault is
    /// routed; only an unhandled one surfaces as an error.
    fn settle(
        &mut self,
        path: &NodePath,
        result: Result<Vec<RegionChange>, RegionError>,
    ) -> Result<(), RuntimeError> {
        match result {
            Ok(changes) => self.apply(path, changes),
            Err(RegionError::Fault(fault)) => match self.raise(fault) {
                Ok(_) => Ok(()),
                Err(unhandled) => Err(RuntimeError::Faulted {
                    fault: Box::new(unhandled.fault),
                    handled_by: None,
                }),
            },
            Err(other) => Err(region_error(other)),
        }
    }

    // Events and tasks

    /// Delivers an event payload to the event node at `path`, transformed if
    /// the node declares a transformation. The result is stored in the
    /// node's variable, when it names one, and returned.
    pub fn signal_event(&mut self, path: &NodePath, payload: JsonValue) -> Result<JsonValue, RuntimeError> {
        self.ensure_active()?;
        let unit = self.expect_unit(path, NodeType::Event)?;
        let transformed = EventTransformer::new(unit.transformation(), &self.services.transformers)
            .transform(payload);
        let target = unit.event_variable().map(str::to_string);

        let value = match transformed {
            Ok(v) => v,
            Err(e) => {
                let fault = Fault::transformation_failed(path.clone(), e.to_string());
                return Err(self.fail(fault));
            }
        };
        self.events.push(AuditEvent::EventReceived {
            instance_id: self.id,
            node: path.clone(),
            payload: value.clone(),
        });
        if let Some(name) = target {
            let frame = self.enclosing_frame(path);
            self.assign(frame, &name, value.clone())?;
            self.reevaluate_regions()?;
        }
        Ok(value)
    }

    /// Completes the human task at `path` on behalf of `user`, writing its
    /// out-mapped results. A refusal from the authorizer is raised as an
    /// `AuthorizationDenied` fault carrying the reasons.
    pub fn complete_task(
        &mut self,
        path: &NodePath,
        user: &str,
        results: &Variables,
    ) -> Result<(), RuntimeError> {
        self.ensure_active()?;
        let unit = self.expect_unit(path, NodeType::HumanTask)?;
        let request = TaskRequest {
            instance_id: self.id,
            node: path,
            task_name: unit.task_name().unwrap_or_default(),
            actors: unit.actors(),
            groups: unit.groups(),
            user,
        };
        if let Err(denial) = self.services.authorizer.authorize(&request) {
            warn!(instance_id = %self.id, node = %path, user, "task operation denied");
            let fault = Fault::authorization_denied(path.clone(), &denial.reasons);
            return Err(self.fail(fault));
        }

        let writes: Vec<(String, JsonValue)> = unit
            .out_mappings()
            .into_iter()
            .filter_map(|(result, variable)| {
                results.get(result).map(|v| (variable.to_string(), v.clone()))
            })
            .collect();
        let frame = self.enclosing_frame(path);
        for (name, value) in writes {
            self.assign(frame, &name, value)?;
        }

        // A task running as a region child completes that child.
        match self.running_in_parent(path) {
            Some((parent, c)) => self.complete_child(&parent, c.instance)?,
            None => {
                let node_instance_id = self.ids.next_id();
                self.events.push(AuditEvent::NodeLeft {
                    instance_id: self.id,
                    node: path.clone(),
                    node_instance_id,
                });
            }
        }
        self.reevaluate_regions()
    }

    // Faults and lifecycle

    /// Routes `fault` through the handler scopes enclosing its node. An
    /// unhandled fault aborts the instance.
    pub fn raise(&mut self, fault: Fault) -> Result<HandlerMatch, UnhandledFault> {
        let scopes = self.process.exception_scopes(&fault.node_path);
        match self.services.policies.route(&fault, &scopes) {
            Ok(m) => {
                let node_instance_id = self.ids.next_id();
                self.events.push(AuditEvent::FaultHandled {
                    instance_id: self.id,
                    fault,
                    handler: m.clone(),
                });
                self.events.push(AuditEvent::NodeTriggered {
                    instance_id: self.id,
                    node: m.handler.clone(),
                    node_instance_id,
                });
                self.handled.push(m.clone());
                Ok(m)
            }
            Err(unhandled) => {
                self.events.push(AuditEvent::FaultUnhandled {
                    instance_id: self.id,
                    fault: unhandled.fault.clone(),
                });
                self.abort(&unhandled.to_string());
                Err(unhandled)
            }
        }
    }

    /// Raises a fault for a failed operation and turns the outcome into the
    /// operation's error.
    fn fail(&mut self, fault: Fault) -> RuntimeError {
        let handled_by = self.raise(fault.clone()).ok().map(|m| m.handler);
        RuntimeError::Faulted {
            fault: Box::new(fault),
            handled_by,
        }
    }

    /// Marks the instance completed, cancelling regions still running.
    pub fn complete(&mut self) -> Result<(), RuntimeError> {
        self.ensure_active()?;
        self.cancel_all_regions();
        self.status = InstanceStatus::Completed;
        info!(instance_id = %self.id, "process instance completed");
        self.events.push(AuditEvent::ProcessCompleted {
            instance_id: self.id,
        });
        Ok(())
    }

    /// Aborts the instance. Aborting a finished instance does nothing.
    pub fn abort(&mut self, reason: &str) {
        if self.status != InstanceStatus::Active {
            return;
        }
        self.cancel_all_regions();
        self.status = InstanceStatus::Aborted;
        warn!(instance_id = %self.id, reason, "process instance aborted");
        self.events.push(AuditEvent::ProcessAborted {
            instance_id: self.id,
            reason: reason.to_string(),
        });
    }

    fn cancel_all_regions(&mut self) {
        let active: Vec<NodePath> = self
            .regions
            .iter()
            .filter(|(_, r)| r.instance.is_active())
            .map(|(p, _)| p.clone())
            .collect();
        for path in active {
            if let Some(live) = self.regions.get_mut(&path) {
                let region_instance = live.instance.instance_id();
                let cancelled = live.instance.cancel();
                self.cancel_children(&path, cancelled);
                self.events.push(AuditEvent::NodeCancelled {
                    instance_id: self.id,
                    node: path,
                    node_instance_id: region_instance,
                });
            }
        }
    }
}

fn region_error(err: RegionError) -> RuntimeError {
    match err {
        RegionError::NotActive(path) => RuntimeError::RegionNotActive(path),
        RegionError::UnknownChild { region, child } => RuntimeError::UnknownChild { region, child },
        RegionError::UnknownInstance { region, instance } => {
            RuntimeError::UnknownChildInstance { region, instance }
        }
        RegionError::Fault(fault) => RuntimeError::Faulted {
            fault: Box::new(fault),
            handled_by: None,
        },
    }
}

//! Dynamic (ad-hoc) region evaluation.
//!
//! A region has no connections: its children are started by explicit
//! triggers or, for children marked `autoStart`, by the region itself. The
//! activation condition gates both; the completion condition ends the region
//! and cancels whatever is still running.

use std::collections::{BTreeMap, BTreeSet};

use procflow_core::expr::{Bindings, CompiledExpr};
use procflow_core::types::{NodeId, NodeType};
use tracing::debug;

use crate::compile::ExecutableUnit;
use crate::fault::Fault;
use crate::path::{InstanceIds, NodeInstanceId, NodePath};

/// The parts of a compiled dynamic node the evaluator needs.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicRegion {
    path: NodePath,
    activation: Option<CompiledExpr>,
    completion: Option<CompiledExpr>,
    children: Vec<NodeId>,
    auto_start: Vec<NodeId>,
}

impl DynamicRegion {
    /// `None` unless `unit` is a dynamic node.
    pub fn from_unit(path: NodePath, unit: &ExecutableUnit) -> Option<Self> {
        if unit.node_type != NodeType::Dynamic {
            return None;
        }
        Some(Self {
            path,
            activation: unit.activation_condition().cloned(),
            completion: unit.completion_condition().cloned(),
            children: unit.children.iter().map(|c| c.node_id).collect(),
            auto_start: unit.auto_start_children(),
        })
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    pub fn activation_condition(&self) -> Option<&CompiledExpr> {
        self.activation.as_ref()
    }

    pub fn completion_condition(&self) -> Option<&CompiledExpr> {
        self.completion.as_ref()
    }

    pub fn has_child(&self, id: NodeId) -> bool {
        self.children.contains(&id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionState {
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub struct ActiveChild {
    pub instance: NodeInstanceId,
    pub child: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionChange {
    ChildStarted(ActiveChild),
    /// The region completed; these children were still running and have
    /// been cancelled.
    Completed { cancelled: Vec<ActiveChild> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    ActivationFalse,
    Capacity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started(NodeInstanceId),
    Blocked(BlockReason),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegionError {
    #[error("dynamic region {0} is not active")]
    NotActive(NodePath),
    #[error("dynamic region {region} has no child {child}")]
    UnknownChild { region: NodePath, child: NodeId },
    #[error("dynamic region {region} has no child instance {instance}")]
    UnknownInstance {
        region: NodePath,
        instance: NodeInstanceId,
    },
    #[error(transparent)]
    Fault(#[from] Fault),
}

/// Why completion is being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Check {
    Evaluation,
    ChildStarted,
    ChildFinished,
}

/// Live state of one entered dynamic region.
#[derive(Debug, Clone)]
pub struct RegionInstance {
    region: DynamicRegion,
    instance_id: NodeInstanceId,
    state: RegionState,
    active: BTreeMap<NodeInstanceId, NodeId>,
    /// Child instances that finished or were cancelled; later signals for
    /// them are ignored.
    released: BTreeSet<NodeInstanceId>,
    started: usize,
    max_active: Option<usize>,
}

impl RegionInstance {
    pub fn new(region: DynamicRegion, instance_id: NodeInstanceId) -> Self {
        Self {
            region,
            instance_id,
            state: RegionState::Active,
            active: BTreeMap::new(),
            released: BTreeSet::new(),
            started: 0,
            max_active: None,
        }
    }

    /// Caps the number of simultaneously running children.
    pub fn with_max_active(mut self, max: Option<usize>) -> Self {
        self.max_active = max;
        self
    }

    pub fn region(&self) -> &DynamicRegion {
        &self.region
    }

    pub fn instance_id(&self) -> NodeInstanceId {
        self.instance_id
    }

    pub fn state(&self) -> RegionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == RegionState::Active
    }

    pub fn active_children(&self) -> Vec<ActiveChild> {
        self.active
            .iter()
            .map(|(&instance, &child)| ActiveChild { instance, child })
            .collect()
    }

    /// Children started over the region's lifetime.
    pub fn started_count(&self) -> usize {
        self.started
    }

    /// Called once when the region is entered: starts the auto-start
    /// children if activation allows, then checks completion.
    pub fn enter(
        &mut self,
        vars: &dyn Bindings,
        ids: &mut InstanceIds,
    ) -> Result<Vec<RegionChange>, RegionError> {
        self.reevaluate(vars, ids, true)
    }

    /// Called after a variable visible to the region changed.
    pub fn variables_changed(
        &mut self,
        vars: &dyn Bindings,
        ids: &mut InstanceIds,
    ) -> Result<Vec<RegionChange>, RegionError> {
        self.reevaluate(vars, ids, false)
    }

    fn reevaluate(
        &mut self,
        vars: &dyn Bindings,
        ids: &mut InstanceIds,
        entering: bool,
    ) -> Result<Vec<RegionChange>, RegionError> {
        if !self.is_active() {
            return Ok(Vec::new());
        }
        let mut changes = Vec::new();

        // One batch per evaluation. Outside of entry only an explicit
        // activation condition can start children.
        let batch = !self.region.auto_start.is_empty()
            && (entering || self.region.activation.is_some())
            && self.activation_open(vars)?;
        if batch {
            for child in self.region.auto_start.clone() {
                if self.at_capacity() {
                    break;
                }
                changes.push(RegionChange::ChildStarted(self.start(child, ids)));
            }
        }

        changes.extend(self.check_completion(vars, Check::Evaluation)?);
        Ok(changes)
    }

    /// Explicit request to start `child`. Honored only while the region is
    /// active and its activation condition (if any) holds.
    pub fn trigger(
        &mut self,
        child: NodeId,
        vars: &dyn Bindings,
        ids: &mut InstanceIds,
    ) -> Result<(TriggerOutcome, Vec<RegionChange>), RegionError> {
        if !self.is_active() {
            return Err(RegionError::NotActive(self.region.path.clone()));
        }
        if !self.region.has_child(child) {
            return Err(RegionError::UnknownChild {
                region: self.region.path.clone(),
                child,
            });
        }
        if !self.activation_open(vars)? {
            return Ok((TriggerOutcome::Blocked(BlockReason::ActivationFalse), Vec::new()));
        }
        if self.at_capacity() {
            return Ok((TriggerOutcome::Blocked(BlockReason::Capacity), Vec::new()));
        }

        let started = self.start(child, ids);
        let mut changes = vec![RegionChange::ChildStarted(started)];
        changes.extend(self.check_completion(vars, Check::ChildStarted)?);
        Ok((TriggerOutcome::Started(started.instance), changes))
    }

    pub fn child_completed(
        &mut self,
        instance: NodeInstanceId,
        vars: &dyn Bindings,
    ) -> Result<Vec<RegionChange>, RegionError> {
        self.child_finished(instance, vars)
    }

    pub fn cancel_child(
        &mut self,
        instance: NodeInstanceId,
        vars: &dyn Bindings,
    ) -> Result<Vec<RegionChange>, RegionError> {
        self.child_finished(instance, vars)
    }

    /// Cancels the region and returns the children that were still running.
    pub fn cancel(&mut self) -> Vec<ActiveChild> {
        if !self.is_active() {
            return Vec::new();
        }
        self.state = RegionState::Cancelled;
        debug!(region = %self.region.path, "dynamic region cancelled");
        self.release_all()
    }

    fn child_finished(
        &mut self,
        instance: NodeInstanceId,
        vars: &dyn Bindings,
    ) -> Result<Vec<RegionChange>, RegionError> {
        if self.released.contains(&instance) {
            return Ok(Vec::new());
        }
        if self.active.remove(&instance).is_none() {
            return Err(RegionError::UnknownInstance {
                region: self.region.path.clone(),
                instance,
            });
        }
        self.released.insert(instance);
        if !self.is_active() {
            return Ok(Vec::new());
        }
        Ok(self
            .check_completion(vars, Check::ChildFinished)?
            .into_iter()
            .collect())
    }

    fn start(&mut self, child: NodeId, ids: &mut InstanceIds) -> ActiveChild {
        let instance = ids.next_id();
        self.active.insert(instance, child);
        self.started += 1;
        debug!(region = %self.region.path, child, instance, "dynamic child started");
        ActiveChild { instance, child }
    }

    fn at_capacity(&self) -> bool {
        self.max_active.is_some_and(|max| self.active.len() >= max)
    }

    fn activation_open(&self, vars: &dyn Bindings) -> Result<bool, RegionError> {
        match &self.region.activation {
            None => Ok(true),
            Some(cond) => cond
                .test(vars)
                .map_err(|e| self.condition_fault("activation", &e)),
        }
    }

    fn check_completion(
        &mut self,
        vars: &dyn Bindings,
        check: Check,
    ) -> Result<Option<RegionChange>, RegionError> {
        let done = match &self.region.completion {
            Some(cond) => cond
                .test(vars)
                .map_err(|e| self.condition_fault("completion", &e))?,
            // Without a condition the region ends with its last running child.
            None => check == Check::ChildFinished && self.active.is_empty(),
        };
        if !done {
            return Ok(None);
        }
        self.state = RegionState::Completed;
        let cancelled = self.release_all();
        debug!(
            region = %self.region.path,
            cancelled = cancelled.len(),
            "dynamic region completed"
        );
        Ok(Some(RegionChange::Completed { cancelled }))
    }

    fn release_all(&mut self) -> Vec<ActiveChild> {
        let drained = std::mem::take(&mut self.active);
        self.released.extend(drained.keys().copied());
        drained
            .into_iter()
            .map(|(instance, child)| ActiveChild { instance, child })
            .collect()
    }

    fn condition_fault(&self, which: &str, err: &procflow_core::EvalError) -> RegionError {
        RegionError::Fault(Fault::condition_evaluation(
            self.region.path.clone(),
            self.instance_id,
            which,
            err,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procflow_core::expr::{compile_expression, Language};
    use procflow_core::types::VariableType;
    use procflow_core::Scope;
    use serde_json::{json, Value as JsonValue};

    fn expr(src: &str) -> CompiledExpr {
        let mut scope = Scope::root();
        scope.declare("count", VariableType::Integer);
        compile_expression(&Language::Simple, src, &scope).unwrap()
    }

    fn region(activation: Option<&str>, completion: Option<&str>, auto: &[NodeId]) -> DynamicRegion {
        DynamicRegion {
            path: NodePath::new([4]),
            activation: activation.map(expr),
            completion: completion.map(expr),
            children: vec![1, 2],
            auto_start: auto.to_vec(),
        }
    }

    fn vars(count: i64) -> BTreeMap<String, JsonValue> {
        BTreeMap::from([("count".to_string(), json!(count))])
    }

    #[test]
    fn activation_condition_gates_triggers() {
        let mut ids = InstanceIds::default();
        let mut r = RegionInstance::new(region(Some("count < 3"), None, &[]), 100);
        assert!(r.enter(&vars(0), &mut ids).unwrap().is_empty());

        for count in 0..3 {
            let (outcome, _) = r.trigger(1, &vars(count), &mut ids).unwrap();
            assert!(matches!(outcome, TriggerOutcome::Started(_)));
        }
        let (outcome, changes) = r.trigger(1, &vars(3), &mut ids).unwrap();
        assert_eq!(outcome, TriggerOutcome::Blocked(BlockReason::ActivationFalse));
        assert!(changes.is_empty());
        assert_eq!(r.started_count(), 3);
        assert_eq!(r.active_children().len(), 3);
    }

    #[test]
    fn completion_cancels_running_children() {
        let mut ids = InstanceIds::default();
        let mut r = RegionInstance::new(region(Some("count < 3"), Some("count >= 3"), &[]), 100);
        r.enter(&vars(0), &mut ids).unwrap();
        r.trigger(1, &vars(0), &mut ids).unwrap();
        r.trigger(2, &vars(1), &mut ids).unwrap();

        let changes = r.variables_changed(&vars(3), &mut ids).unwrap();
        assert_eq!(
            changes,
            vec![RegionChange::Completed {
                cancelled: vec![
                    ActiveChild { instance: 1, child: 1 },
                    ActiveChild { instance: 2, child: 2 }
                ]
            }]
        );
        assert_eq!(r.state(), RegionState::Completed);

        // A cancelled child finishing later is ignored.
        assert!(r.child_completed(1, &vars(3)).unwrap().is_empty());
        assert!(matches!(
            r.trigger(1, &vars(0), &mut ids),
            Err(RegionError::NotActive(_))
        ));
    }

    #[test]
    fn without_completion_condition_last_child_ends_the_region() {
        let mut ids = InstanceIds::default();
        let mut r = RegionInstance::new(region(None, None, &[]), 100);
        // Entering an empty region does not complete it.
        assert!(r.enter(&vars(0), &mut ids).unwrap().is_empty());
        assert!(r.is_active());

        let (TriggerOutcome::Started(a), _) = r.trigger(1, &vars(0), &mut ids).unwrap() else {
            panic!("expected start");
        };
        let (TriggerOutcome::Started(b), _) = r.trigger(2, &vars(0), &mut ids).unwrap() else {
            panic!("expected start");
        };
        assert!(r.child_completed(a, &vars(0)).unwrap().is_empty());
        let changes = r.cancel_child(b, &vars(0)).unwrap();
        assert_eq!(changes, vec![RegionChange::Completed { cancelled: vec![] }]);
    }

    #[test]
    fn auto_start_children_start_on_entry() {
        let mut ids = InstanceIds::default();
        let mut r = RegionInstance::new(region(None, None, &[2]), 100);
        let changes = r.enter(&vars(0), &mut ids).unwrap();
        assert_eq!(
            changes,
            vec![RegionChange::ChildStarted(ActiveChild { instance: 1, child: 2 })]
        );
        // No activation condition: variable changes start nothing more.
        assert!(r.variables_changed(&vars(1), &mut ids).unwrap().is_empty());
    }

    #[test]
    fn activation_condition_starts_one_batch_per_evaluation() {
        let mut ids = InstanceIds::default();
        let mut r = RegionInstance::new(region(Some("count < 2"), None, &[1, 2]), 100);
        assert!(r.enter(&vars(5), &mut ids).unwrap().is_empty());
        assert_eq!(r.variables_changed(&vars(1), &mut ids).unwrap().len(), 2);
        assert_eq!(r.variables_changed(&vars(1), &mut ids).unwrap().len(), 2);
        assert_eq!(r.started_count(), 4);
    }

    #[test]
    fn capacity_limit_blocks_further_starts() {
        let mut ids = InstanceIds::default();
        let mut r = RegionInstance::new(region(None, None, &[]), 100).with_max_active(Some(1));
        r.trigger(1, &vars(0), &mut ids).unwrap();
        let (outcome, _) = r.trigger(2, &vars(0), &mut ids).unwrap();
        assert_eq!(outcome, TriggerOutcome::Blocked(BlockReason::Capacity));
    }

    #[test]
    fn evaluation_errors_become_faults_local_to_the_region() {
        let mut ids = InstanceIds::default();
        let mut r = RegionInstance::new(region(Some("count < 3"), None, &[]), 100);
        let err = r
            .trigger(1, &BTreeMap::from([("count".to_string(), json!("x"))]), &mut ids)
            .unwrap_err();
        match err {
            RegionError::Fault(f) => {
                assert_eq!(f.node_path, NodePath::new([4]));
                assert_eq!(f.node_instance_id, Some(100));
                assert_eq!(f.cause.type_name, crate::fault::CONDITION_EVALUATION);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn cancelled_region_ignores_evaluations() {
        let mut ids = InstanceIds::default();
        let mut r = RegionInstance::new(region(None, Some("count >= 3"), &[1]), 100);
        r.enter(&vars(0), &mut ids).unwrap();
        assert_eq!(r.cancel(), vec![ActiveChild { instance: 1, child: 1 }]);
        assert!(r.variables_changed(&vars(3), &mut ids).unwrap().is_empty());
        assert_eq!(r.state(), RegionState::Cancelled);
        assert!(r.child_completed(1, &vars(3)).unwrap().is_empty());
        assert!(matches!(
            r.child_completed(42, &vars(3)),
            Err(RegionError::UnknownInstance { .. })
        ));
    }
}

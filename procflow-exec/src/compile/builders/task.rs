use procflow_core::types::{non_blank, NodeDescriptor, NodeKind, NodeType};

use super::wrong_kind;
use crate::compile::{BuildContext, Op, UnitBuilder};
use crate::error::CompileError;
use crate::registry::NodeBuilder;

pub struct HumanTaskBuilder;

impl NodeBuilder for HumanTaskBuilder {
    fn visit_custom_fields(
        &self,
        node: &NodeDescriptor,
        ctx: &BuildContext<'_>,
        out: &mut UnitBuilder,
    ) -> Result<(), CompileError> {
        let NodeKind::HumanTask(task) = &node.kind else {
            return Err(wrong_kind(node, NodeType::HumanTask));
        };
        let name = non_blank(task.task_name.as_deref())
            .ok_or_else(|| CompileError::missing(node.id, "taskName"))?;
        out.push(Op::SetTaskName(name.to_string()));

        for actor in task.actors.iter().filter_map(|a| non_blank(Some(a.as_str()))) {
            out.push(Op::AddActor(actor.to_string()));
        }
        for group in task.groups.iter().filter_map(|g| non_blank(Some(g.as_str()))) {
            out.push(Op::AddGroup(group.to_string()));
        }
        if let Some(p) = task.priority {
            out.push(Op::SetTaskPriority(p));
        }
        out.push(Op::SetSkippable(task.skippable));
        if let Some(comment) = non_blank(task.comment.as_deref()) {
            out.push(Op::SetComment(comment.to_string()));
        }

        for (parameter, variable) in &task.in_mappings {
            ctx.require_variable(node.id, &format!("inMappings.{parameter}"), variable)?;
            out.push(Op::AddInMapping {
                parameter: parameter.clone(),
                variable: variable.clone(),
            });
        }
        for (result, variable) in &task.out_mappings {
            ctx.require_variable(node.id, &format!("outMappings.{result}"), variable)?;
            out.push(Op::AddOutMapping {
                result: result.clone(),
                variable: variable.clone(),
            });
        }
        Ok(())
    }
}

pub struct RuleTaskBuilder;

impl NodeBuilder for RuleTaskBuilder {
    fn visit_custom_fields(
        &self,
        node: &NodeDescriptor,
        _ctx: &BuildContext<'_>,
        out: &mut UnitBuilder,
    ) -> Result<(), CompileError> {
        let NodeKind::RuleTask(rule) = &node.kind else {
            return Err(wrong_kind(node, NodeType::RuleTask));
        };
        let group = non_blank(rule.rule_flow_group.as_deref());
        let decision = non_blank(rule.decision.as_deref());
        if group.is_none() && decision.is_none() {
            return Err(CompileError::missing(node.id, "ruleFlowGroup"));
        }
        if let Some(g) = group {
            out.push(Op::SetRuleFlowGroup(g.to_string()));
        }
        if let Some(lang) = non_blank(rule.language.as_deref()) {
            out.push(Op::SetRuleLanguage(lang.to_string()));
        }
        if let Some(d) = decision {
            out.push(Op::SetDecision(d.to_string()));
        }
        Ok(())
    }
}

pub struct SubProcessBuilder;

impl NodeBuilder for SubProcessBuilder {
    fn visit_custom_fields(
        &self,
        node: &NodeDescriptor,
        _ctx: &BuildContext<'_>,
        out: &mut UnitBuilder,
    ) -> Result<(), CompileError> {
        let NodeKind::SubProcess(sub) = &node.kind else {
            return Err(wrong_kind(node, NodeType::SubProcess));
        };
        let process_id = non_blank(sub.process_id.as_deref())
            .ok_or_else(|| CompileError::missing(node.id, "processId"))?;
        out.extend([
            Op::SetProcessId(process_id.to_string()),
            Op::SetWaitForCompletion(sub.wait_for_completion),
            Op::SetIndependent(sub.independent),
        ]);
        Ok(())
    }
}

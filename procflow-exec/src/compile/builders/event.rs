use procflow_core::types::{non_blank, NodeDescriptor, NodeKind, NodeType};

use super::wrong_kind;
use crate::compile::timer::{compile_timer_value, TimerError, TimerField};
use crate::compile::{BuildContext, Op, TimerExpr, UnitBuilder};
use crate::error::CompileError;
use crate::registry::NodeBuilder;
use crate::transform::EventTransformation;

pub struct TimerBuilder;

impl TimerBuilder {
    fn value(
        node: &NodeDescriptor,
        ctx: &BuildContext<'_>,
        field: TimerField,
        text: &str,
    ) -> Result<TimerExpr, CompileError> {
        compile_timer_value(field, text, ctx.scope).map_err(|e| match e {
            TimerError::Expression(err) => CompileError::expression(node.id, field.as_str(), err),
            TimerError::Invalid(message) => CompileError::Configuration {
                node_id: node.id,
                message,
            },
        })
    }
}

impl NodeBuilder for TimerBuilder {
    fn visit_custom_fields(
        &self,
        node: &NodeDescriptor,
        ctx: &BuildContext<'_>,
        out: &mut UnitBuilder,
    ) -> Result<(), CompileError> {
        let NodeKind::Timer(timer) = &node.kind else {
            return Err(wrong_kind(node, NodeType::Timer));
        };
        let delay = non_blank(timer.delay.as_deref());
        let period = non_blank(timer.period.as_deref());
        let date = non_blank(timer.date.as_deref());
        if delay.is_none() && period.is_none() && date.is_none() {
            return Err(CompileError::Configuration {
                node_id: node.id,
                message: "timer needs a delay, period or date".to_string(),
            });
        }
        if let Some(d) = delay {
            out.push(Op::SetTimerDelay(Self::value(node, ctx, TimerField::Delay, d)?));
        }
        if let Some(p) = period {
            out.push(Op::SetTimerPeriod(Self::value(node, ctx, TimerField::Period, p)?));
        }
        if let Some(d) = date {
            out.push(Op::SetTimerDate(Self::value(node, ctx, TimerField::Date, d)?));
        }
        Ok(())
    }
}

pub struct EventBuilder;

impl NodeBuilder for EventBuilder {
    fn visit_custom_fields(
        &self,
        node: &NodeDescriptor,
        ctx: &BuildContext<'_>,
        out: &mut UnitBuilder,
    ) -> Result<(), CompileError> {
        let NodeKind::Event(event) = &node.kind else {
            return Err(wrong_kind(node, NodeType::Event));
        };
        let event_type = non_blank(event.event_type.as_deref())
            .ok_or_else(|| CompileError::missing(node.id, "eventType"))?;
        out.push(Op::SetEventType(event_type.to_string()));
        out.push(Op::SetEventScope(event.scope));

        if let Some(var) = non_blank(event.variable_name.as_deref()) {
            ctx.require_variable(node.id, "variableName", var)?;
            out.push(Op::SetVariableName(var.to_string()));
        }
        if let Some(spec) = &event.transformation {
            let t = EventTransformation::compile(spec, &ctx.options.event_binding)
                .map_err(|e| CompileError::expression(node.id, "transformation", e))?;
            out.push(Op::SetTransformation(t));
        }
        Ok(())
    }
}

pub struct FaultBuilder;

impl NodeBuilder for FaultBuilder {
    fn visit_custom_fields(
        &self,
        node: &NodeDescriptor,
        ctx: &BuildContext<'_>,
        out: &mut UnitBuilder,
    ) -> Result<(), CompileError> {
        let NodeKind::Fault(fault) = &node.kind else {
            return Err(wrong_kind(node, NodeType::Fault));
        };
        let name = non_blank(fault.fault_name.as_deref())
            .ok_or_else(|| CompileError::missing(node.id, "faultName"))?;
        out.push(Op::SetFaultName(name.to_string()));
        if let Some(var) = non_blank(fault.fault_variable.as_deref()) {
            ctx.require_variable(node.id, "faultVariable", var)?;
            out.push(Op::SetFaultVariable(var.to_string()));
        }
        Ok(())
    }
}

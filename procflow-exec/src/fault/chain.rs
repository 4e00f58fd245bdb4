use std::sync::Arc;

use tracing::{debug, warn};

use super::policy::{
    ErrorCodePolicy, ExceptionPolicy, ExceptionTypePolicy, MessageEqualsPolicy,
    MessageRegexPolicy, SubtypePolicy, WrappedCausePolicy,
};
use super::{Fault, HandlerDeclaration, UnhandledFault};
use crate::path::NodePath;

/// The handlers declared by one scope (a composite, or the process at the
/// root path), in declaration order.
#[derive(Debug, Clone)]
pub struct ExceptionScope<'a> {
    pub path: NodePath,
    pub handlers: Vec<&'a HandlerDeclaration>,
}

/// The handler a policy picked within one scope.
#[derive(Debug, Clone, Copy)]
pub struct Classification<'h> {
    pub policy: &'static str,
    pub handler: &'h HandlerDeclaration,
}

/// Outcome of routing a fault to a handler.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct HandlerMatch {
    pub policy: &'static str,
    pub fault_name: String,
    /// Scope that declared the handler.
    pub scope: NodePath,
    /// Handler node, addressed from the process root.
    pub handler: NodePath,
}

/// Ordered exception policies. Within a scope the first policy (in chain
/// order) that accepts any candidate decides, and among the candidates it
/// accepts the first declared wins.
#[derive(Clone)]
pub struct PolicyChain {
    policies: Vec<Arc<dyn ExceptionPolicy>>,
}

impl Default for PolicyChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for PolicyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.policy_names()).finish()
    }
}

impl PolicyChain {
    pub fn empty() -> Self {
        Self {
            policies: Vec::new(),
        }
    }

    /// Error code, exact type, exact message, wrapped cause, message
    /// pattern, then declared supertype.
    pub fn standard() -> Self {
        Self::empty()
            .append(ErrorCodePolicy)
            .append(ExceptionTypePolicy)
            .append(MessageEqualsPolicy)
            .append(WrappedCausePolicy)
            .append(MessageRegexPolicy)
            .append(SubtypePolicy)
    }

    /// Adds a policy with lower priority than every existing one.
    pub fn append(mut self, policy: impl ExceptionPolicy + 'static) -> Self {
        self.policies.push(Arc::new(policy));
        self
    }

    pub fn policy_names(&self) -> Vec<&'static str> {
        self.policies.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn classify<'h>(
        &self,
        fault: &Fault,
        candidates: &[&'h HandlerDeclaration],
    ) -> Option<Classification<'h>> {
        for policy in &self.policies {
            if let Some(handler) = candidates.iter().copied().find(|h| policy.matches(h, fault)) {
                return Some(Classification {
                    policy: policy.name(),
                    handler,
                });
            }
        }
        None
    }

    /// Tries each scope in order (innermost first) and stops at the first one
    /// with an accepting handler.
    pub fn route(
        &self,
        fault: &Fault,
        scopes: &[ExceptionScope<'_>],
    ) -> Result<HandlerMatch, UnhandledFault> {
        for scope in scopes {
            if let Some(c) = self.classify(fault, &scope.handlers) {
                debug!(
                    fault = %fault.cause,
                    scope = %scope.path,
                    policy = c.policy,
                    handler = c.handler.handler(),
                    "fault handled"
                );
                return Ok(HandlerMatch {
                    policy: c.policy,
                    fault_name: c.handler.fault_name().to_string(),
                    scope: scope.path.clone(),
                    handler: scope.path.child(c.handler.handler()),
                });
            }
        }
        warn!(fault = %fault.cause, node = %fault.node_path, "no handler accepted fault");
        Err(UnhandledFault {
            fault: fault.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::FaultCause;

    fn fault() -> Fault {
        Fault::new(
            NodePath::new([5, 2]),
            FaultCause::new("PaymentFault").with_message("card declined"),
        )
        .with_code("E1")
    }

    #[test]
    fn standard_order() {
        assert_eq!(
            PolicyChain::standard().policy_names(),
            vec![
                "error-code",
                "exception-type",
                "message",
                "wrapped-cause",
                "message-regex",
                "subtype"
            ]
        );
    }

    #[test]
    fn error_code_beats_earlier_declared_type_handler() {
        let by_type = HandlerDeclaration::new("PaymentFault", 10);
        let by_code = HandlerDeclaration::new("E1", 11);
        let c = PolicyChain::standard()
            .classify(&fault(), &[&by_type, &by_code])
            .unwrap();
        assert_eq!(c.policy, "error-code");
        assert_eq!(c.handler.handler(), 11);
    }

    #[test]
    fn declaration_order_breaks_ties_within_a_policy() {
        let h1 = HandlerDeclaration::new("E1", 10);
        let h2 = HandlerDeclaration::new("E1", 11);
        let c = PolicyChain::standard().classify(&fault(), &[&h1, &h2]).unwrap();
        assert_eq!(c.handler.handler(), 10);
    }

    #[test]
    fn inner_scope_wins_over_more_specific_outer_handler() {
        let inner = HandlerDeclaration::new(".*declined", 20);
        let outer = HandlerDeclaration::new("E1", 30);
        let scopes = [
            ExceptionScope {
                path: NodePath::new([5]),
                handlers: vec![&inner],
            },
            ExceptionScope {
                path: NodePath::root(),
                handlers: vec![&outer],
            },
        ];
        let m = PolicyChain::standard().route(&fault(), &scopes).unwrap();
        assert_eq!(m.policy, "message-regex");
        assert_eq!(m.handler, NodePath::new([5, 20]));
    }

    #[test]
    fn appended_policies_run_last() {
        struct AnyFault;
        impl ExceptionPolicy for AnyFault {
            fn name(&self) -> &'static str {
                "catch-all"
            }
            fn matches(&self, handler: &HandlerDeclaration, _: &Fault) -> bool {
                handler.fault_name() == "*"
            }
        }

        let chain = PolicyChain::standard().append(AnyFault);
        assert_eq!(chain.len(), 7);
        let wildcard = HandlerDeclaration::new("*", 1);
        let typed = HandlerDeclaration::new("PaymentFault", 2);
        let c = chain.classify(&fault(), &[&wildcard, &typed]).unwrap();
        assert_eq!(c.policy, "exception-type");
        let c = chain.classify(&fault(), &[&wildcard]).unwrap();
        assert_eq!(c.policy, "catch-all");
    }

    #[test]
    fn empty_scopes_leave_fault_unhandled() {
        let err = PolicyChain::standard()
            .route(&fault(), &[ExceptionScope { path: NodePath::root(), handlers: vec![] }])
            .unwrap_err();
        assert_eq!(err.fault, fault());
    }
}

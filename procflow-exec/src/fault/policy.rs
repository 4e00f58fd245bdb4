use super::{Fault, HandlerDeclaration};

/// One rule for deciding whether a handler accepts a fault.
pub trait ExceptionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn matches(&self, handler: &HandlerDeclaration, fault: &Fault) -> bool;
}

/// The fault carries an error code equal to the handler's fault name.
pub struct ErrorCodePolicy;

impl ExceptionPolicy for ErrorCodePolicy {
    fn name(&self) -> &'static str {
        "error-code"
    }

    fn matches(&self, handler: &HandlerDeclaration, fault: &Fault) -> bool {
        fault.error_code.as_deref() == Some(handler.fault_name())
    }
}

/// The cause's own type name equals the handler's fault name.
pub struct ExceptionTypePolicy;

impl ExceptionPolicy for ExceptionTypePolicy {
    fn name(&self) -> &'static str {
        "exception-type"
    }

    fn matches(&self, handler: &HandlerDeclaration, fault: &Fault) -> bool {
        fault.cause.type_name == handler.fault_name()
    }
}

/// The cause's message equals the handler's fault name.
pub struct MessageEqualsPolicy;

impl ExceptionPolicy for MessageEqualsPolicy {
    fn name(&self) -> &'static str {
        "message"
    }

    fn matches(&self, handler: &HandlerDeclaration, fault: &Fault) -> bool {
        fault.message() == Some(handler.fault_name())
    }
}

/// The cause wraps another whose type name equals the handler's fault name.
/// Only one level is unwrapped.
pub struct WrappedCausePolicy;

impl ExceptionPolicy for WrappedCausePolicy {
    fn name(&self) -> &'static str {
        "wrapped-cause"
    }

    fn matches(&self, handler: &HandlerDeclaration, fault: &Fault) -> bool {
        fault
            .cause
            .source
            .as_ref()
            .is_some_and(|inner| inner.type_name == handler.fault_name())
    }
}

/// The cause's message matches the handler's fault name read as a pattern.
pub struct MessageRegexPolicy;

impl ExceptionPolicy for MessageRegexPolicy {
    fn name(&self) -> &'static str {
        "message-regex"
    }

    fn matches(&self, handler: &HandlerDeclaration, fault: &Fault) -> bool {
        match (handler.pattern(), fault.message()) {
            (Some(re), Some(msg)) => re.is_match(msg),
            _ => false,
        }
    }
}

/// The cause is declared a subtype of the handler's fault name.
pub struct SubtypePolicy;

impl ExceptionPolicy for SubtypePolicy {
    fn name(&self) -> &'static str {
        "subtype"
    }

    fn matches(&self, handler: &HandlerDeclaration, fault: &Fault) -> bool {
        fault.cause.supertypes.iter().any(|s| s == handler.fault_name())
    }
}

use crate::types::NodeId;

/// Exception handler declared on a composite or on the process itself.
///
/// `fault_name` is a single string that each exception policy reads
/// in its own way.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ExceptionHandlerSpec {
    #[serde(rename = "faultName")]
    pub fault_name: String,

    /// Node (inside the declaring scope) that takes over when the handler matches.
    pub handler: NodeId,
}

impl ExceptionHandlerSpec {
    pub fn new(fault_name: impl Into<String>, handler: NodeId) -> Self {
        Self {
            fault_name: fault_name.into(),
            handler,
        }
    }
}

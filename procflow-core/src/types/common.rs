use std::collections::BTreeMap;

/// Process-local node identifier, unique within the enclosing composite.
pub type NodeId = i64;

/// Free-form node metadata carried through compilation unchanged.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Returns the trimmed attribute text, or `None` when it is absent or blank.
///
/// Every optional string attribute goes through this so that `""` and `"   "`
/// behave exactly like a missing attribute.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

//! Plain Rust types exchanged between the provider and the protocol layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One attribute that differs between prior and planned state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// Attribute path, e.g. `name` or `network.0.family`.
    pub path: String,
    /// Value before the change, `None` when the attribute is new.
    pub before: Option<Value>,
    /// Value after the change, `None` when the attribute goes away.
    pub after: Option<Value>,
}

impl AttributeChange {
    /// A value that appears.
    pub fn added(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            before: None,
            after: Some(value),
        }
    }

    /// A value that disappears.
    pub fn removed(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            before: Some(value),
            after: None,
        }
    }

    /// A value that changes.
    pub fn modified(path: impl Into<String>, before: Value, after: Value) -> Self {
        Self {
            path: path.into(),
            before: Some(before),
            after: Some(after),
        }
    }
}

fn decode_optional(bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        None
    } else {
        serde_json::from_slice(bytes).ok()
    }
}

fn encode_optional(value: Option<&Value>) -> Vec<u8> {
    value
        .and_then(|v| serde_json::to_vec(v).ok())
        .unwrap_or_default()
}

impl From<crate::generated::AttributeChange> for AttributeChange {
    fn from(proto: crate::generated::AttributeChange) -> Self {
        Self {
            before: decode_optional(&proto.before),
            after: decode_optional(&proto.after),
            path: proto.path,
        }
    }
}

impl From<AttributeChange> for crate::generated::AttributeChange {
    fn from(change: AttributeChange) -> Self {
        Self {
            before: encode_optional(change.before.as_ref()),
            after: encode_optional(change.after.as_ref()),
            path: change.path,
        }
    }
}

/// Outcome of planning one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// State the resource is expected to have after apply.
    pub planned_state: Value,
    /// Attribute level differences against the prior state.
    pub changes: Vec<AttributeChange>,
    /// A force-new attribute changed, so the resource is destroyed and recreated.
    pub requires_replace: bool,
}

impl PlanResult {
    /// Nothing to do.
    pub fn no_change(state: Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
        }
    }

    /// A plan with the given differences.
    pub fn with_changes(
        planned_state: Value,
        changes: Vec<AttributeChange>,
        requires_replace: bool,
    ) -> Self {
        Self {
            planned_state,
            changes,
            requires_replace,
        }
    }

    /// Whether applying this plan does anything.
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty() || self.requires_replace
    }
}

/// A resource found by an import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// Resource type, e.g. `upcloud_gateway`.
    pub resource_type: String,
    /// State as read from the API.
    pub state: Value,
}

impl ImportedResource {
    /// Create an imported resource.
    pub fn new(resource_type: impl Into<String>, state: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// Names and capabilities returned by GetMetadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// Resource type names.
    pub resources: Vec<String>,
    /// Data source type names.
    pub data_sources: Vec<String>,
    /// Optional protocol features.
    pub capabilities: ServerCapabilities,
}

/// Optional protocol features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    /// Plan is also called for destroys.
    pub plan_destroy: bool,
}

/// Protocol version in the handshake line.
pub const PROTOCOL_VERSION: u32 = 1;

/// First field of the handshake line.
pub const HANDSHAKE_PREFIX: &str = "UPCLOUD_PROVIDER";

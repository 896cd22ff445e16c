//! Schema model for the provider, its resources and data sources.
//!
//! Schemas are built with small builder methods and serialized to the
//! protocol's `Schema` message by the server. The same values drive
//! [`crate::validation`] and [`crate::plan`], so an attribute's flags,
//! `force_new` and default matter at runtime and not only for documentation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;

/// The type of an attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// A string.
    String,
    /// A 64-bit integer.
    Int64,
    /// A boolean.
    Bool,
    /// An ordered list of one element type.
    List(Box<AttributeType>),
    /// An unordered set of one element type.
    Set(Box<AttributeType>),
    /// String keys to one value type, e.g. labels.
    Map(Box<AttributeType>),
}

impl AttributeType {
    /// `list(element_type)`.
    pub fn list(element_type: AttributeType) -> Self {
        Self::List(Box::new(element_type))
    }

    /// `set(element_type)`.
    pub fn set(element_type: AttributeType) -> Self {
        Self::Set(Box::new(element_type))
    }

    /// `map(element_type)`.
    pub fn map(element_type: AttributeType) -> Self {
        Self::Map(Box::new(element_type))
    }
}

/// How an attribute may be used in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeFlags {
    /// Must be set in configuration.
    pub required: bool,
    /// May be set in configuration.
    pub optional: bool,
    /// Set by the provider from the API response.
    pub computed: bool,
    /// Hidden in plan output and logs.
    pub sensitive: bool,
}

impl AttributeFlags {
    /// Required in configuration.
    pub fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }

    /// Optional in configuration.
    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Default::default()
        }
    }

    /// Read-only, set by the provider.
    pub fn computed() -> Self {
        Self {
            computed: true,
            ..Default::default()
        }
    }

    /// Optional, and filled in by the API when left unset.
    pub fn optional_computed() -> Self {
        Self {
            optional: true,
            computed: true,
            ..Default::default()
        }
    }

    /// Also sensitive.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// A single attribute in a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// The value type.
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    /// Usage flags.
    #[serde(flatten)]
    pub flags: AttributeFlags,
    /// Human readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Changing the value destroys and recreates the resource.
    #[serde(default)]
    pub force_new: bool,
    /// Value planned when the configuration leaves the attribute unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Accepted values. Empty means any value of the right type.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<Value>,
}

impl Attribute {
    /// Create an attribute with the given type and flags.
    pub fn new(attr_type: AttributeType, flags: AttributeFlags) -> Self {
        Self {
            attr_type,
            flags,
            description: None,
            force_new: false,
            default: None,
            allowed_values: Vec::new(),
        }
    }

    /// Required string.
    pub fn required_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::required())
    }

    /// Optional string.
    pub fn optional_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional())
    }

    /// Computed string.
    pub fn computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::computed())
    }

    /// Optional string the API fills in when unset.
    pub fn optional_computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional_computed())
    }

    /// Required integer.
    pub fn required_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::required())
    }

    /// Optional integer.
    pub fn optional_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::optional())
    }

    /// Computed integer.
    pub fn computed_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::computed())
    }

    /// Optional integer the API fills in when unset.
    pub fn optional_computed_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::optional_computed())
    }

    /// Required bool.
    pub fn required_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::required())
    }

    /// Optional bool.
    pub fn optional_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::optional())
    }

    /// Computed bool.
    pub fn computed_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::computed())
    }

    /// Optional bool the API fills in when unset.
    pub fn optional_computed_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::optional_computed())
    }

    /// Optional `map(string)`, used for labels.
    pub fn optional_labels() -> Self {
        Self::new(
            AttributeType::map(AttributeType::String),
            AttributeFlags::optional(),
        )
    }

    /// Computed `list(string)`.
    pub fn computed_string_list() -> Self {
        Self::new(
            AttributeType::list(AttributeType::String),
            AttributeFlags::computed(),
        )
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Changing this attribute forces replacement.
    pub fn with_force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Restrict the attribute to the given string values.
    pub fn with_allowed_strings(mut self, values: &[&str]) -> Self {
        self.allowed_values = values.iter().map(|v| Value::from(*v)).collect();
        self
    }

    /// Mark as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.flags.sensitive = true;
        self
    }

    /// Whether the attribute can only be set by the provider.
    pub fn is_read_only(&self) -> bool {
        self.flags.computed && !self.flags.optional && !self.flags.required
    }
}

/// How a nested block repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockNestingMode {
    /// At most one block, stored as a JSON object.
    #[default]
    Single,
    /// Ordered list of blocks.
    List,
    /// Unordered set of blocks.
    Set,
}

/// A block of attributes and nested blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Block {
    /// Attributes by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Attribute>,
    /// Nested blocks by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub blocks: BTreeMap<String, NestedBlock>,
    /// Human readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Block {
    /// Create an empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    /// Add a nested block.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.blocks.insert(name.into(), block);
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A nested block with its nesting mode and item limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedBlock {
    /// The block definition.
    #[serde(flatten)]
    pub block: Block,
    /// How the block repeats.
    #[serde(default)]
    pub nesting_mode: BlockNestingMode,
    /// Minimum number of items.
    #[serde(default)]
    pub min_items: u32,
    /// Maximum number of items, 0 for no limit.
    #[serde(default)]
    pub max_items: u32,
    /// Changing the block contents forces replacement.
    #[serde(default)]
    pub force_new: bool,
}

impl NestedBlock {
    fn with_mode(block: Block, nesting_mode: BlockNestingMode, max_items: u32) -> Self {
        Self {
            block,
            nesting_mode,
            min_items: 0,
            max_items,
            force_new: false,
        }
    }

    /// Zero or one block.
    pub fn single(block: Block) -> Self {
        Self::with_mode(block, BlockNestingMode::Single, 1)
    }

    /// Ordered list of blocks.
    pub fn list(block: Block) -> Self {
        Self::with_mode(block, BlockNestingMode::List, 0)
    }

    /// Unordered set of blocks.
    pub fn set(block: Block) -> Self {
        Self::with_mode(block, BlockNestingMode::Set, 0)
    }

    /// Set the minimum number of items.
    pub fn with_min_items(mut self, min: u32) -> Self {
        self.min_items = min;
        self
    }

    /// Set the maximum number of items.
    pub fn with_max_items(mut self, max: u32) -> Self {
        self.max_items = max;
        self
    }

    /// Changing the block forces replacement.
    pub fn with_force_new(mut self) -> Self {
        self.force_new = true;
        self
    }
}

/// Schema of one resource or data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// State schema version.
    #[serde(default)]
    pub version: u64,
    /// Root block.
    #[serde(flatten)]
    pub block: Block,
}

impl Schema {
    /// Create a schema with the given version.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            block: Block::new(),
        }
    }

    /// Version 0 schema.
    pub fn v0() -> Self {
        Self::new(0)
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.block.description = Some(description.into());
        self
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.block.attributes.insert(name.into(), attr);
        self
    }

    /// Add a nested block.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.block.blocks.insert(name.into(), block);
        self
    }

    /// Add the computed `id` attribute every resource carries.
    pub fn with_id(self, description: impl Into<String>) -> Self {
        self.with_attribute(
            "id",
            Attribute::computed_string().with_description(description),
        )
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::v0()
    }
}

/// Schemas for the provider block, every resource and every data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderSchema {
    /// Provider configuration block.
    #[serde(default)]
    pub provider: Schema,
    /// Resource schemas by type name.
    #[serde(default)]
    pub resources: BTreeMap<String, Schema>,
    /// Data source schemas by type name.
    #[serde(default)]
    pub data_sources: BTreeMap<String, Schema>,
}

impl ProviderSchema {
    /// Create an empty provider schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider configuration schema.
    pub fn with_provider_config(mut self, schema: Schema) -> Self {
        self.provider = schema;
        self
    }

    /// Add a resource schema.
    pub fn with_resource(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.resources.insert(name.into(), schema);
        self
    }

    /// Add a data source schema.
    pub fn with_data_source(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.data_sources.insert(name.into(), schema);
        self
    }
}

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// The operation failed.
    Error,
    /// The operation succeeded but something needs attention.
    Warning,
}

/// A message reported back to the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity.
    pub severity: DiagnosticSeverity,
    /// Short summary.
    pub summary: String,
    /// Longer explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Attribute path the message is about.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    /// An error diagnostic.
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// A warning diagnostic.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// An error diagnostic with `summary` and the error text as detail.
    pub fn from_error(summary: impl Into<String>, err: &ProviderError) -> Self {
        Self::error(summary).with_detail(err.to_string())
    }

    /// Add detail.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set the attribute path.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Set the attribute path unless it is empty (the root).
    pub(crate) fn with_attribute_if_not_empty(self, attribute: &str) -> Self {
        if attribute.is_empty() {
            self
        } else {
            self.with_attribute(attribute)
        }
    }

    /// Whether this is an error.
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

/// Whether any diagnostic is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

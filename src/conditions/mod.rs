//! Conditions
//!
//! Rule eligibility is described by a forest of [`ConditionNode`]s. Leaf nodes name a registered
//! predicate class; compound nodes combine their children with ALL or ANY semantics and can be
//! negated to require every (or any) child to be false instead of true.

use std::{fmt, str::FromStr};

use serde::Deserialize;
use smallvec::SmallVec;
use thiserror::Error;

use crate::{
    context::EvaluationContext,
    fields::{FieldError, Fields},
    legacy::{DecodeError, lenient, lenient_fields, lenient_flag},
};

pub mod cache;
pub mod forest;
pub mod registry;
pub mod tree;
pub mod types;

/// Condition node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct ConditionNodeId(pub u64);

impl fmt::Display for ConditionNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConditionNodeId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Identifier of the rule set a condition forest belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct RuleSetId(pub u64);

impl fmt::Display for RuleSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RuleSetId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Identifier of the rule (or other host) that owns a root condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct HostId(pub u64);

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for HostId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// How a compound node combines its children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConditionType {
    /// Every child must produce the required value
    #[default]
    #[serde(alias = "all")]
    All,

    /// At least one child must produce the required value
    #[serde(alias = "any")]
    Any,
}

impl FromStr for ConditionType {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALL" => Ok(Self::All),
            "ANY" => Ok(Self::Any),
            other => Err(ConditionError::UnknownConditionType(other.to_string())),
        }
    }
}

/// A single node of a condition forest, as loaded from storage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConditionNode {
    /// Node id
    #[serde(deserialize_with = "lenient_required")]
    pub id: ConditionNodeId,

    /// Parent node id, `None` for roots
    #[serde(default, alias = "pid", deserialize_with = "lenient")]
    pub parent_id: Option<ConditionNodeId>,

    /// Rule set the node belongs to
    #[serde(alias = "rule_set", deserialize_with = "lenient_required")]
    pub rule_set_id: RuleSetId,

    /// Host that owns the tree, set on roots
    #[serde(default, alias = "host", deserialize_with = "lenient")]
    pub host_id: Option<HostId>,

    /// Registered condition class
    #[serde(alias = "class")]
    pub class_name: String,

    /// Class specific configuration
    #[serde(default, deserialize_with = "lenient_fields")]
    pub fields: Fields,

    /// Combination mode, used by compound classes
    #[serde(default, alias = "type")]
    pub condition_type: ConditionType,

    /// Whether children must evaluate to false instead of true
    #[serde(default, alias = "negate", deserialize_with = "lenient_flag")]
    pub negate_required_value: bool,
}

fn lenient_required<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    lenient(deserializer)?.ok_or_else(|| serde::de::Error::custom("value is required"))
}

impl ConditionNode {
    /// Create a leaf node.
    pub fn leaf(id: u64, rule_set_id: u64, class_name: impl Into<String>) -> Self {
        Self {
            id: ConditionNodeId(id),
            parent_id: None,
            rule_set_id: RuleSetId(rule_set_id),
            host_id: None,
            class_name: class_name.into(),
            fields: Fields::default(),
            condition_type: ConditionType::All,
            negate_required_value: false,
        }
    }

    /// Create a compound node.
    pub fn compound(
        id: u64,
        rule_set_id: u64,
        class_name: impl Into<String>,
        condition_type: ConditionType,
    ) -> Self {
        Self {
            condition_type,
            ..Self::leaf(id, rule_set_id, class_name)
        }
    }

    /// Make this node the root owned by `host`.
    #[must_use]
    pub fn root_of(mut self, host: u64) -> Self {
        self.host_id = Some(HostId(host));
        self.parent_id = None;
        self
    }

    /// Attach this node under `parent`.
    #[must_use]
    pub fn child_of(mut self, parent: u64) -> Self {
        self.parent_id = Some(ConditionNodeId(parent));
        self
    }

    /// Set a configuration field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Require children to evaluate to false.
    #[must_use]
    pub fn negated(mut self) -> Self {
        self.negate_required_value = true;
        self
    }

    /// Whether this node is a root.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Reference from a rule to the root of its condition tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub struct ConditionRef {
    /// Rule set holding the tree
    pub rule_set_id: RuleSetId,

    /// Host owning the root node
    pub host_id: HostId,
}

impl ConditionRef {
    /// Create a reference.
    pub fn new(rule_set_id: u64, host_id: u64) -> Self {
        Self {
            rule_set_id: RuleSetId(rule_set_id),
            host_id: HostId(host_id),
        }
    }
}

impl fmt::Display for ConditionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule set {} host {}", self.rule_set_id, self.host_id)
    }
}

/// Where a condition class can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Applicability {
    /// Product eligibility checks outside of a cart
    CatalogProduct,

    /// Root of a cart rule
    CartRoot,

    /// Cart level attributes such as subtotal or shipping method
    CartAttribute,

    /// Individual cart lines
    CartItem,
}

/// Applicabilities declared by a condition class. Empty means usable everywhere.
pub type ApplicabilitySet = SmallVec<[Applicability; 2]>;

/// A compiled leaf predicate.
///
/// Predicates must be pure functions of the context and their own configuration.
pub trait Condition: fmt::Debug + Send + Sync {
    /// Whether the predicate holds for `context`.
    fn matches(&self, context: &EvaluationContext<'_>) -> bool;
}

/// Errors related to conditions.
#[derive(Debug, Error)]
pub enum ConditionError {
    /// A node references a class nobody registered.
    #[error("unknown condition class `{0}`")]
    UnknownClass(String),

    /// A class was registered twice.
    #[error("condition class `{0}` is already registered")]
    DuplicateClass(String),

    /// A leaf node's fields could not be turned into its configuration.
    #[error("invalid configuration for condition `{class}` (node {node}): {source}")]
    InvalidField {
        /// Condition class
        class: String,

        /// Offending node
        node: ConditionNodeId,

        /// Field error
        #[source]
        source: FieldError,
    },

    /// No root node exists for a rule's condition reference.
    #[error("no root condition for {0}")]
    MissingRoot(ConditionRef),

    /// An unrecognised combination mode.
    #[error("unknown condition type `{0}`")]
    UnknownConditionType(String),

    /// A stored condition blob could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

//! Discount Actions
//!
//! An action turns a satisfied rule into a monetary adjustment. Per-product actions are invoked
//! once for every eligible cart line; cart-wide actions are invoked once per rule. Both write
//! into a pair of per-line discount maps (net and tax inclusive), and cart-wide actions may
//! also return a scalar cart discount.

use std::fmt;

use decimal_percentage::Percentage;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    cart::{Cart, LineItem, LineKey},
    conditions::ConditionRef,
    fields::{FieldError, Fields},
    legacy::lenient_fields,
    settings::EngineSettings,
};

pub mod registry;
pub mod types;

/// Kind of action, deciding how often it is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Invoked once per eligible cart line
    Product,

    /// Invoked once per rule against the whole cart
    Cart,
}

/// Whether an action changed anything.
///
/// Actions that never report the flag leave it [`AppliedFlag::Unset`], which counts as applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AppliedFlag {
    /// The action did not say
    #[default]
    Unset,

    /// The action changed a discount
    Applied,

    /// The action ran but changed nothing
    NotApplied,
}

impl AppliedFlag {
    /// Flag for an action that did or did not change something.
    pub fn from_changed(changed: bool) -> Self {
        if changed {
            Self::Applied
        } else {
            Self::NotApplied
        }
    }

    /// Observable value of the flag. Unset counts as applied.
    pub fn is_applied(self) -> bool {
        !matches!(self, Self::NotApplied)
    }
}

/// Result of invoking an action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Scalar cart-wide discount, if the action produces one
    pub cart_amount: Option<Decimal>,

    /// Whether the action changed anything
    pub applied: AppliedFlag,
}

impl ActionOutcome {
    /// Outcome of an action that only wrote to the discount maps.
    pub fn changed(changed: bool) -> Self {
        Self {
            cart_amount: None,
            applied: AppliedFlag::from_changed(changed),
        }
    }

    /// Outcome of an action that produced a scalar cart discount.
    pub fn cart_discount(amount: Decimal) -> Self {
        Self {
            cart_amount: Some(amount),
            applied: AppliedFlag::from_changed(!amount.is_zero()),
        }
    }
}

/// Per-line discounts, net and tax inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscountMaps {
    per_line: FxHashMap<LineKey, Decimal>,
    per_line_with_tax: FxHashMap<LineKey, Decimal>,
}

impl DiscountMaps {
    /// Empty maps.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a discount to a line.
    pub fn add(&mut self, key: LineKey, amount: Decimal, amount_with_tax: Decimal) {
        *self.per_line.entry(key).or_default() += amount;
        *self.per_line_with_tax.entry(key).or_default() += amount_with_tax;
    }

    /// Add every discount in `other`.
    pub fn merge(&mut self, other: &DiscountMaps) {
        for (key, amount) in &other.per_line {
            *self.per_line.entry(*key).or_default() += *amount;
        }

        for (key, amount) in &other.per_line_with_tax {
            *self.per_line_with_tax.entry(*key).or_default() += *amount;
        }
    }

    /// Cap every line's discount at that line's total.
    pub fn clamp_to_lines(&mut self, cart: &Cart) {
        for (key, amount) in &mut self.per_line {
            if let Some(line) = cart.get(*key) {
                *amount = (*amount).min(line.total());
            }
        }

        for (key, amount) in &mut self.per_line_with_tax {
            if let Some(line) = cart.get(*key) {
                *amount = (*amount).min(line.total_with_tax());
            }
        }
    }

    /// Net discount of a line.
    pub fn line(&self, key: LineKey) -> Decimal {
        self.per_line.get(&key).copied().unwrap_or_default()
    }

    /// Tax inclusive discount of a line.
    pub fn line_with_tax(&self, key: LineKey) -> Decimal {
        self.per_line_with_tax
            .get(&key)
            .copied()
            .unwrap_or_default()
    }

    /// Sum of net line discounts.
    pub fn total(&self) -> Decimal {
        self.per_line.values().copied().sum()
    }

    /// Sum of tax inclusive line discounts.
    pub fn total_with_tax(&self) -> Decimal {
        self.per_line_with_tax.values().copied().sum()
    }

    /// Whether no line has a discount.
    pub fn is_empty(&self) -> bool {
        self.per_line.is_empty() && self.per_line_with_tax.is_empty()
    }

    /// Iterate over net line discounts.
    pub fn iter(&self) -> impl Iterator<Item = (LineKey, Decimal)> + '_ {
        self.per_line.iter().map(|(key, amount)| (*key, *amount))
    }
}

/// Action invoked once per eligible cart line.
pub trait ProductAction: fmt::Debug + Send + Sync {
    /// Apply the discount to one line.
    ///
    /// # Errors
    ///
    /// Returns an [`ActionError`] if the discount cannot be computed.
    fn apply_to_line(
        &self,
        key: LineKey,
        line: &LineItem,
        discounts: &mut DiscountMaps,
        settings: &EngineSettings,
    ) -> Result<ActionOutcome, ActionError>;
}

/// Action invoked once per rule against the whole cart.
pub trait CartAction: fmt::Debug + Send + Sync {
    /// Apply the discount to the cart.
    ///
    /// # Errors
    ///
    /// Returns an [`ActionError`] if the discount cannot be computed.
    fn apply_to_cart(
        &self,
        cart: &Cart,
        discounts: &mut DiscountMaps,
        settings: &EngineSettings,
    ) -> Result<ActionOutcome, ActionError>;
}

/// An instantiated action.
#[derive(Debug)]
pub enum Action {
    /// Per-product action
    Product(Box<dyn ProductAction>),

    /// Cart-wide action
    Cart(Box<dyn CartAction>),
}

impl Action {
    /// Kind of the action.
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::Product(_) => ActionType::Product,
            Self::Cart(_) => ActionType::Cart,
        }
    }
}

/// The action a rule invokes, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RuleAction {
    /// Registered action class
    #[serde(alias = "class")]
    pub class_name: String,

    /// Class specific configuration
    #[serde(default, deserialize_with = "lenient_fields")]
    pub fields: Fields,

    /// Condition tree limiting which products a per-product action applies to
    #[serde(default)]
    pub product_filter: Option<ConditionRef>,
}

impl RuleAction {
    /// Create an action with no configuration.
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            fields: Fields::default(),
            product_filter: None,
        }
    }

    /// Set a configuration field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Restrict a per-product action to products matching a condition tree.
    #[must_use]
    pub fn with_product_filter(mut self, filter: ConditionRef) -> Self {
        self.product_filter = Some(filter);
        self
    }
}

/// Errors related to actions.
#[derive(Debug, Error)]
pub enum ActionError {
    /// A rule references a class nobody registered.
    #[error("unknown action class `{0}`")]
    UnknownClass(String),

    /// A class was registered twice.
    #[error("action class `{0}` is already registered")]
    DuplicateClass(String),

    /// The class was registered as one action type but built the other.
    #[error("action class `{class}` was registered as {expected:?} but built {actual:?}")]
    TypeMismatch {
        /// Action class
        class: String,

        /// Registered type
        expected: ActionType,

        /// Type the factory built
        actual: ActionType,
    },

    /// A rule's fields do not configure its action.
    #[error("invalid configuration for action `{class}`: {source}")]
    InvalidField {
        /// Action class
        class: String,

        /// Field error
        #[source]
        source: FieldError,
    },

    /// Discount arithmetic overflowed.
    #[error("discount calculation overflowed")]
    Overflow,

    /// The action failed while computing its discount.
    #[error("action failed: {0}")]
    Execution(String),
}

/// `percent` of `amount`.
///
/// # Errors
///
/// Returns [`ActionError::Overflow`] if the product cannot be represented.
pub fn percent_of(percent: &Percentage, amount: Decimal) -> Result<Decimal, ActionError> {
    ((*percent) * Decimal::ONE)
        .checked_mul(amount)
        .ok_or(ActionError::Overflow)
}

/// Tax inclusive counterpart of a net line discount, in proportion to the line's totals.
///
/// # Errors
///
/// Returns [`ActionError::Overflow`] if the proportion cannot be represented.
pub fn with_tax_share(
    line: &LineItem,
    discount: Decimal,
    settings: &EngineSettings,
) -> Result<Decimal, ActionError> {
    let total = line.total();

    if total.is_zero() {
        return Ok(discount);
    }

    discount
        .checked_mul(line.total_with_tax())
        .and_then(|scaled| scaled.checked_div(total))
        .map(|share| settings.round(share))
        .ok_or(ActionError::Overflow)
}

//! Action Registry
//!
//! Action classes are registered under a stable class name and the [`ActionType`] they build.
//! The registry can list classes per type and instantiate the action a rule refers to.

use rustc_hash::FxHashMap;

use crate::{
    actions::{
        Action, ActionError, ActionType, RuleAction,
        types::{
            CartDistributedAmount, CartFixedAmount, CartPercentage, ProductAmountOff,
            ProductFixedPrice, ProductPercentage,
        },
    },
    fields::{FieldError, Fields},
};

/// Builds an action from a rule's fields.
pub type ActionFactory = fn(&Fields) -> Result<Action, FieldError>;

#[derive(Debug)]
struct ActionClass {
    action_type: ActionType,
    factory: ActionFactory,
}

/// Registered action classes.
#[derive(Debug, Default)]
pub struct ActionRegistry {
    classes: FxHashMap<String, ActionClass>,
    order: Vec<String>,
}

impl ActionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in actions.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::DuplicateClass`] if a built-in name is registered twice.
    pub fn with_builtins() -> Result<Self, ActionError> {
        let builtins: [(&str, ActionType, ActionFactory); 6] = [
            ("product_percentage", ActionType::Product, ProductPercentage::from_fields),
            ("product_amount_off", ActionType::Product, ProductAmountOff::from_fields),
            ("product_fixed_price", ActionType::Product, ProductFixedPrice::from_fields),
            ("cart_percentage", ActionType::Cart, CartPercentage::from_fields),
            ("cart_fixed_amount", ActionType::Cart, CartFixedAmount::from_fields),
            ("cart_distributed_amount", ActionType::Cart, CartDistributedAmount::from_fields),
        ];

        let mut registry = Self::new();

        for (name, action_type, factory) in builtins {
            registry.register(name, action_type, factory)?;
        }

        Ok(registry)
    }

    /// Register an action class.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::DuplicateClass`] if the name is taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        action_type: ActionType,
        factory: ActionFactory,
    ) -> Result<(), ActionError> {
        let name = name.into();

        if self.classes.contains_key(&name) {
            return Err(ActionError::DuplicateClass(name));
        }

        self.classes.insert(
            name.clone(),
            ActionClass {
                action_type,
                factory,
            },
        );
        self.order.push(name);

        Ok(())
    }

    /// Registered type of a class.
    pub fn action_type(&self, name: &str) -> Option<ActionType> {
        self.classes.get(name).map(|class| class.action_type)
    }

    /// Class names of one action type, in registration order.
    pub fn classes_for(&self, action_type: ActionType) -> Vec<&str> {
        self.order
            .iter()
            .filter(|name| self.action_type(name) == Some(action_type))
            .map(String::as_str)
            .collect()
    }

    /// Instantiate the action a rule refers to.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::UnknownClass`] for an unregistered class,
    /// [`ActionError::InvalidField`] if the fields do not configure it, or
    /// [`ActionError::TypeMismatch`] if the factory built the wrong kind of action.
    pub fn build(&self, rule_action: &RuleAction) -> Result<Action, ActionError> {
        let class = self
            .classes
            .get(&rule_action.class_name)
            .ok_or_else(|| ActionError::UnknownClass(rule_action.class_name.clone()))?;

        let action = (class.factory)(&rule_action.fields).map_err(|source| {
            ActionError::InvalidField {
                class: rule_action.class_name.clone(),
                source,
            }
        })?;

        if action.action_type() != class.action_type {
            return Err(ActionError::TypeMismatch {
                class: rule_action.class_name.clone(),
                expected: class.action_type,
                actual: action.action_type(),
            });
        }

        Ok(action)
    }
}

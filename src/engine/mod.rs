//! Discount Engine
//!
//! Walks a list of rules against a cart. Each rule's condition tree decides whether it is
//! eligible; an eligible rule's action writes line discounts and/or a cart discount. A rule that
//! fails is reported and contributes nothing, and evaluation carries on with the next rule.

use std::fmt;

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

use crate::{
    actions::{
        Action, ActionError, AppliedFlag, CartAction, DiscountMaps, ProductAction, RuleAction,
        registry::ActionRegistry,
    },
    cart::{Cart, LineKey},
    catalog::ResolvedRecord,
    conditions::{
        ConditionError, ConditionRef,
        cache::{ConditionCache, ConditionSource},
        registry::ConditionRegistry,
        tree::ConditionTree,
    },
    context::{EvaluationContext, Parameters},
    legacy::lenient_flag,
    settings::EngineSettings,
};

pub mod report;

pub use report::{EvaluationReport, ReportError, RuleOutcome};

/// Rule identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub u64);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A discount rule: an optional condition tree and the action it triggers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Rule {
    /// Identifier
    pub id: RuleId,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Inactive rules are skipped
    #[serde(default = "active_by_default", deserialize_with = "lenient_flag")]
    pub active: bool,

    /// Root of the condition tree. A rule without one always applies.
    #[serde(default)]
    pub conditions: Option<ConditionRef>,

    /// Action invoked when the conditions hold
    pub action: RuleAction,
}

fn active_by_default() -> bool {
    true
}

impl Rule {
    /// Create an active, unconditional rule.
    pub fn new(id: u64, name: impl Into<String>, action: RuleAction) -> Self {
        Self {
            id: RuleId(id),
            name: name.into(),
            active: true,
            conditions: None,
            action,
        }
    }

    /// Attach a condition tree.
    #[must_use]
    pub fn with_conditions(mut self, conditions: ConditionRef) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// Mark the rule inactive.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// How a rule failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The rule refers to an unknown or misconfigured condition or action
    Configuration,

    /// The action failed while computing its discount
    ActionExecution,
}

/// Errors that stop a single rule from applying.
#[derive(Debug, Error)]
pub enum RuleError {
    /// Condition tree could not be loaded or compiled.
    #[error(transparent)]
    Condition(#[from] ConditionError),

    /// Action could not be built or failed.
    #[error(transparent)]
    Action(#[from] ActionError),
}

impl RuleError {
    /// Classify the failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Action(ActionError::Overflow | ActionError::Execution(_)) => {
                FailureKind::ActionExecution
            }
            Self::Condition(_) | Self::Action(_) => FailureKind::Configuration,
        }
    }
}

/// A rule that failed during evaluation.
#[derive(Debug)]
pub struct RuleFailure {
    /// Offending rule
    pub rule_id: RuleId,

    /// Failure classification
    pub kind: FailureKind,

    /// Underlying error
    pub error: RuleError,
}

/// Errors raised while setting up an engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Condition registry could not be built.
    #[error(transparent)]
    Condition(#[from] ConditionError),

    /// Action registry could not be built.
    #[error(transparent)]
    Action(#[from] ActionError),
}

/// Cart and per-call inputs for one evaluation.
#[derive(Debug, Clone)]
pub struct Evaluation<'a> {
    cart: &'a Cart,
    parameters: Parameters,
    records: FxHashMap<LineKey, &'a ResolvedRecord>,
}

impl<'a> Evaluation<'a> {
    /// Evaluate `cart` with no extra parameters.
    pub fn new(cart: &'a Cart) -> Self {
        Self {
            cart,
            parameters: Parameters::default(),
            records: FxHashMap::default(),
        }
    }

    /// Extra parameters, such as `shipping_method`, passed to every condition.
    #[must_use]
    pub fn with_parameters(mut self, parameters: &Parameters) -> Self {
        self.parameters.merge(parameters);
        self
    }

    /// Persisted record behind a line, made available to product filters.
    #[must_use]
    pub fn with_record(mut self, key: LineKey, record: &'a ResolvedRecord) -> Self {
        self.records.insert(key, record);
        self
    }

    /// Persisted records behind several lines.
    #[must_use]
    pub fn with_records(mut self, records: &'a FxHashMap<LineKey, ResolvedRecord>) -> Self {
        self.records
            .extend(records.iter().map(|(key, record)| (*key, record)));
        self
    }

    /// Cart being evaluated.
    pub fn cart(&self) -> &'a Cart {
        self.cart
    }

    /// Extra parameters.
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }
}

/// Evaluates discount rules against carts.
#[derive(Debug)]
pub struct DiscountEngine {
    conditions: ConditionRegistry,
    actions: ActionRegistry,
    settings: EngineSettings,
}

impl DiscountEngine {
    /// Create an engine over the given registries.
    pub fn new(
        conditions: ConditionRegistry,
        actions: ActionRegistry,
        settings: EngineSettings,
    ) -> Self {
        Self {
            conditions,
            actions,
            settings,
        }
    }

    /// Create an engine with the built-in conditions and actions.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] if a built-in registry cannot be built.
    pub fn with_builtins(settings: EngineSettings) -> Result<Self, EngineError> {
        Ok(Self::new(
            ConditionRegistry::with_builtins()?,
            ActionRegistry::with_builtins()?,
            settings,
        ))
    }

    /// Condition classes available to rules.
    pub fn conditions(&self) -> &ConditionRegistry {
        &self.conditions
    }

    /// Action classes available to rules.
    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    /// Settings applied to every action.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Evaluate `rules` in order.
    ///
    /// Failing rules are collected in the report rather than returned as errors; the remaining
    /// rules still run.
    #[instrument(
        skip_all,
        fields(rules = rules.len(), lines = evaluation.cart().len())
    )]
    pub fn evaluate(
        &self,
        rules: &[Rule],
        evaluation: &Evaluation<'_>,
        source: &dyn ConditionSource,
        cache: &mut ConditionCache,
    ) -> EvaluationReport {
        let mut report = EvaluationReport::default();

        for rule in rules {
            if !rule.active {
                trace!(rule_id = %rule.id, "skipping inactive rule");
                continue;
            }

            debug!(rule_id = %rule.id, name = %rule.name, "evaluating rule");

            let mut discounts = DiscountMaps::new();

            match self.apply_rule(rule, evaluation, source, cache, &mut discounts) {
                Ok(outcome) => {
                    debug!(
                        rule_id = %rule.id,
                        eligible = outcome.eligible,
                        applied = outcome.applied,
                        cart_discount = %outcome.cart_discount,
                        line_discount = %outcome.line_discount,
                        "rule evaluated"
                    );

                    report.record(outcome, &discounts);
                }
                Err(error) => {
                    let kind = error.kind();

                    warn!(rule_id = %rule.id, ?kind, %error, "rule failed; skipping it");

                    report.fail(RuleFailure {
                        rule_id: rule.id,
                        kind,
                        error,
                    });
                }
            }
        }

        if self.settings.cap_discount_at_line_total {
            report.cap(evaluation.cart());
        }

        debug!(
            applied = report.applied(),
            total_discount = %report.total_discount(),
            failures = report.failures().len(),
            "evaluation finished"
        );

        report
    }

    fn apply_rule(
        &self,
        rule: &Rule,
        evaluation: &Evaluation<'_>,
        source: &dyn ConditionSource,
        cache: &mut ConditionCache,
        discounts: &mut DiscountMaps,
    ) -> Result<RuleOutcome, RuleError> {
        let cart = evaluation.cart();

        if let Some(reference) = rule.conditions {
            let tree = ConditionTree::load(reference, source, cache, &self.conditions)?;
            let context =
                EvaluationContext::for_cart(cart).with_parameters(evaluation.parameters());

            if !tree.evaluate(&context) {
                return Ok(RuleOutcome::ineligible(rule.id, &rule.name));
            }
        }

        let action = self.actions.build(&rule.action)?;

        let (applied, cart_discount) = match &action {
            Action::Product(action) => (
                self.apply_to_lines(rule, action.as_ref(), evaluation, source, cache, discounts)?,
                Decimal::ZERO,
            ),
            Action::Cart(action) => self.apply_to_cart(action.as_ref(), cart, discounts)?,
        };

        Ok(RuleOutcome {
            rule_id: rule.id,
            name: rule.name.clone(),
            eligible: true,
            applied: applied.is_applied(),
            cart_discount,
            line_discount: discounts.total(),
        })
    }

    fn apply_to_lines(
        &self,
        rule: &Rule,
        action: &dyn ProductAction,
        evaluation: &Evaluation<'_>,
        source: &dyn ConditionSource,
        cache: &mut ConditionCache,
        discounts: &mut DiscountMaps,
    ) -> Result<AppliedFlag, RuleError> {
        let cart = evaluation.cart();

        let filter = rule
            .action
            .product_filter
            .map(|reference| ConditionTree::load(reference, source, cache, &self.conditions))
            .transpose()?;

        let mut applied = AppliedFlag::NotApplied;

        for (key, line) in cart.iter() {
            if let Some(filter) = &filter {
                let mut context = EvaluationContext::for_line(cart, line)
                    .with_parameters(evaluation.parameters());

                if let Some(record) = evaluation.records.get(&key) {
                    context = context.with_record(record);
                }

                if !filter.evaluate(&context) {
                    trace!(rule_id = %rule.id, product = %line.product_id(), "line not eligible");
                    continue;
                }
            }

            let outcome = action.apply_to_line(key, line, discounts, &self.settings)?;

            trace!(
                rule_id = %rule.id,
                product = %line.product_id(),
                applied = outcome.applied.is_applied(),
                "product action invoked"
            );

            if outcome.applied.is_applied() {
                applied = outcome.applied;
            }
        }

        Ok(applied)
    }

    fn apply_to_cart(
        &self,
        action: &dyn CartAction,
        cart: &Cart,
        discounts: &mut DiscountMaps,
    ) -> Result<(AppliedFlag, Decimal), RuleError> {
        let outcome = action.apply_to_cart(cart, discounts, &self.settings)?;

        Ok((outcome.applied, outcome.cart_amount.unwrap_or_default()))
    }
}

//! Pricewright prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    actions::{
        Action, ActionError, ActionOutcome, ActionType, AppliedFlag, CartAction, DiscountMaps,
        ProductAction, RuleAction, registry::ActionRegistry,
    },
    cart::{
        AttributeValue, BundleLink, Cart, CartKey, LineItem, LineKey,
        identity::{IdentityError, LineFingerprint},
        merge::{CartLineMerger, MergeOutcome},
    },
    catalog::{CustomerGroupId, ProductId, ResolvedRecord},
    conditions::{
        Applicability, Condition, ConditionError, ConditionNode, ConditionRef, ConditionType,
        cache::{BlobConditionSource, ConditionCache, ConditionSource, InMemoryConditionSource},
        registry::ConditionRegistry,
        tree::ConditionTree,
    },
    context::{EvaluationContext, Parameters},
    engine::{
        DiscountEngine, EngineError, Evaluation, EvaluationReport, FailureKind, Rule, RuleFailure,
        RuleId, RuleOutcome,
    },
    settings::{EngineSettings, SettingsError},
    tiers::{
        TierBreak, TierRow, TierTable, TierTableId,
        cache::{InMemoryTierSource, TierCache, TierSource},
    },
};

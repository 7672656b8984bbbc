//! Condition Trees
//!
//! A [`ConditionTree`] is compiled from a validated forest before it is evaluated, so that every
//! class in the tree is resolved up front. A misconfigured leaf therefore fails the whole rule
//! even when a short-circuit would never have reached it.

use crate::{
    conditions::{
        Condition, ConditionError, ConditionNode, ConditionNodeId, ConditionRef, ConditionType,
        cache::{ConditionCache, ConditionSource},
        forest::ConditionForest,
        registry::ConditionRegistry,
    },
    context::EvaluationContext,
};

/// A compiled condition node.
#[derive(Debug)]
pub enum CompiledCondition {
    /// Registered predicate
    Leaf {
        /// Source node
        id: ConditionNodeId,

        /// Predicate built from the node's fields
        condition: Box<dyn Condition>,
    },

    /// ALL/ANY combination of child nodes
    Compound {
        /// Source node
        id: ConditionNodeId,

        /// Combination mode
        condition_type: ConditionType,

        /// Value every (ALL) or some (ANY) child must produce
        required: bool,

        /// Children in load order
        children: Vec<CompiledCondition>,
    },
}

impl CompiledCondition {
    fn compile(
        forest: &ConditionForest,
        node: &ConditionNode,
        registry: &ConditionRegistry,
    ) -> Result<Self, ConditionError> {
        if !registry.is_compound(&node.class_name) {
            return Ok(Self::Leaf {
                id: node.id,
                condition: registry.build_leaf(node)?,
            });
        }

        let children = forest
            .children(node.id)
            .map(|child| Self::compile(forest, child, registry))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::Compound {
            id: node.id,
            condition_type: node.condition_type,
            required: !node.negate_required_value,
            children,
        })
    }

    /// Evaluate against `context`.
    ///
    /// ALL stops at the first child that does not produce the required value and is true when
    /// it has no children. ANY stops at the first child that does and is false when it has no
    /// children.
    pub fn evaluate(&self, context: &EvaluationContext<'_>) -> bool {
        match self {
            Self::Leaf { condition, .. } => condition.matches(context),
            Self::Compound {
                condition_type: ConditionType::All,
                required,
                children,
                ..
            } => children
                .iter()
                .all(|child| child.evaluate(context) == *required),
            Self::Compound {
                condition_type: ConditionType::Any,
                required,
                children,
                ..
            } => children
                .iter()
                .any(|child| child.evaluate(context) == *required),
        }
    }

    /// Node the condition was compiled from.
    pub fn id(&self) -> ConditionNodeId {
        match self {
            Self::Leaf { id, .. } | Self::Compound { id, .. } => *id,
        }
    }
}

/// A compiled condition tree rooted at one node.
#[derive(Debug)]
pub struct ConditionTree {
    root: CompiledCondition,
}

impl ConditionTree {
    /// Compile the tree below `root`.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionError::UnknownClass`] or [`ConditionError::InvalidField`] if any node
    /// in the tree is misconfigured.
    pub fn compile(
        forest: &ConditionForest,
        root: &ConditionNode,
        registry: &ConditionRegistry,
    ) -> Result<Self, ConditionError> {
        Ok(Self {
            root: CompiledCondition::compile(forest, root, registry)?,
        })
    }

    /// Load and compile the tree a rule refers to.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionError::MissingRoot`] if the rule set has no root for the host, or a
    /// compile error if the tree is misconfigured.
    pub fn load(
        reference: ConditionRef,
        source: &dyn ConditionSource,
        cache: &mut ConditionCache,
        registry: &ConditionRegistry,
    ) -> Result<Self, ConditionError> {
        let forest = cache.forest(source, reference.rule_set_id);

        let root = forest
            .root(reference.host_id)
            .ok_or(ConditionError::MissingRoot(reference))?;

        Self::compile(forest, root, registry)
    }

    /// Evaluate the tree against `context`.
    pub fn evaluate(&self, context: &EvaluationContext<'_>) -> bool {
        self.root.evaluate(context)
    }

    /// Compiled root.
    pub fn root(&self) -> &CompiledCondition {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use rust_decimal::Decimal;
    use rusty_money::iso::GBP;
    use testresult::TestResult;

    use crate::{
        cart::{Cart, LineItem},
        catalog::{CustomerGroupId, ProductId},
        conditions::{RuleSetId, cache::InMemoryConditionSource},
    };

    use super::*;

    #[derive(Debug)]
    struct Fixed {
        result: bool,
        calls: Arc<AtomicUsize>,
    }

    impl Condition for Fixed {
        fn matches(&self, _context: &EvaluationContext<'_>) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
        }
    }

    fn fixed(result: bool, calls: &Arc<AtomicUsize>) -> CompiledCondition {
        CompiledCondition::Leaf {
            id: ConditionNodeId(0),
            condition: Box::new(Fixed {
                result,
                calls: Arc::clone(calls),
            }),
        }
    }

    fn compound(
        condition_type: ConditionType,
        required: bool,
        children: Vec<CompiledCondition>,
    ) -> CompiledCondition {
        CompiledCondition::Compound {
            id: ConditionNodeId(0),
            condition_type,
            required,
            children,
        }
    }

    #[test]
    fn empty_all_is_true_and_empty_any_is_false() {
        let context = EvaluationContext::default();

        assert!(compound(ConditionType::All, true, vec![]).evaluate(&context));
        assert!(!compound(ConditionType::Any, true, vec![]).evaluate(&context));
        assert!(compound(ConditionType::All, false, vec![]).evaluate(&context));
        assert!(!compound(ConditionType::Any, false, vec![]).evaluate(&context));
    }

    #[test]
    fn all_short_circuits_on_the_first_mismatch() {
        let context = EvaluationContext::default();
        let calls = Arc::new(AtomicUsize::new(0));

        for third in [true, false] {
            calls.store(0, Ordering::SeqCst);

            let tree = compound(
                ConditionType::All,
                true,
                vec![fixed(true, &calls), fixed(false, &calls), fixed(third, &calls)],
            );

            assert!(!tree.evaluate(&context));
            assert_eq!(calls.load(Ordering::SeqCst), 2);
        }
    }

    #[test]
    fn negation_flips_the_required_child_value() {
        let context = EvaluationContext::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let none_true = compound(
            ConditionType::All,
            false,
            vec![fixed(false, &calls), fixed(false, &calls)],
        );
        let some_false = compound(
            ConditionType::Any,
            false,
            vec![fixed(true, &calls), fixed(false, &calls)],
        );

        assert!(none_true.evaluate(&context));
        assert!(some_false.evaluate(&context));
    }

    #[test]
    fn trees_load_from_a_source_and_evaluate_against_a_cart() -> TestResult {
        let registry = ConditionRegistry::with_builtins()?;
        let source = InMemoryConditionSource::new([
            ConditionNode::compound(1, 5, "all_of", ConditionType::All).root_of(42),
            ConditionNode::leaf(2, 5, "cart_subtotal")
                .child_of(1)
                .with_field("amount", "50"),
            ConditionNode::leaf(3, 5, "customer_group")
                .child_of(1)
                .with_field("groups", "2"),
        ]);
        let mut cache = ConditionCache::new();

        let tree = ConditionTree::load(ConditionRef::new(5, 42), &source, &mut cache, &registry)?;

        let mut cart = Cart::new(GBP).with_customer_group(CustomerGroupId(2));
        cart.insert(LineItem::new(ProductId(1), 3, Decimal::new(2000, 2)));

        assert!(tree.evaluate(&EvaluationContext::for_cart(&cart)));

        let guest = Cart::new(GBP);

        assert!(!tree.evaluate(&EvaluationContext::for_cart(&guest)));
        assert_eq!(tree.root().id(), ConditionNodeId(1));

        Ok(())
    }

    #[test]
    fn unknown_class_fails_even_behind_a_short_circuit() -> TestResult {
        let registry = ConditionRegistry::with_builtins()?;
        let source = InMemoryConditionSource::new([
            ConditionNode::compound(1, 5, "all_of", ConditionType::Any).root_of(1),
            ConditionNode::leaf(2, 5, "parameter")
                .child_of(1)
                .with_field("name", "a")
                .with_field("value", "b"),
            ConditionNode::leaf(3, 5, "mystery").child_of(1),
        ]);
        let mut cache = ConditionCache::new();

        let result = ConditionTree::load(ConditionRef::new(5, 1), &source, &mut cache, &registry);

        assert!(matches!(result, Err(ConditionError::UnknownClass(class)) if class == "mystery"));

        Ok(())
    }

    #[test]
    fn missing_root_is_reported() -> TestResult {
        let registry = ConditionRegistry::with_builtins()?;
        let source = InMemoryConditionSource::default();
        let mut cache = ConditionCache::new();

        let result = ConditionTree::load(ConditionRef::new(1, 1), &source, &mut cache, &registry);

        assert!(matches!(
            result,
            Err(ConditionError::MissingRoot(reference)) if reference.rule_set_id == RuleSetId(1)
        ));

        Ok(())
    }
}

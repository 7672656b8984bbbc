//! Condition Registry
//!
//! Condition classes are registered explicitly under a stable class name together with the
//! places they can be used. Leaf classes carry a factory that builds the typed predicate from a
//! node's fields; compound classes only declare where they may appear, since their ALL/ANY
//! behaviour is fixed.

use rustc_hash::FxHashMap;
use smallvec::smallvec;

use crate::{
    conditions::{
        Applicability, ApplicabilitySet, Condition, ConditionError, ConditionNode,
        types::{
            CartItemCount, CartQuantity, CartSubtotal, CustomerGroupIs, InStock, LineQuantity,
            ParameterEquals, ProductIs, ProductPrice, ShippingMethodIs,
        },
    },
    fields::{FieldError, Fields},
};

/// Builds a leaf predicate from a node's fields.
pub type LeafFactory = fn(&Fields) -> Result<Box<dyn Condition>, FieldError>;

#[derive(Debug)]
struct LeafClass {
    name: String,
    applicability: ApplicabilitySet,
    factory: LeafFactory,
}

#[derive(Debug)]
struct CompoundClass {
    name: String,
    applicability: ApplicabilitySet,
}

/// Registered condition classes.
#[derive(Debug, Default)]
pub struct ConditionRegistry {
    leaves: Vec<LeafClass>,
    compounds: Vec<CompoundClass>,
    index: FxHashMap<String, ClassSlot>,
}

#[derive(Debug, Clone, Copy)]
enum ClassSlot {
    Leaf(usize),
    Compound(usize),
}

impl ConditionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in classes.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionError::DuplicateClass`] if a built-in name is registered twice.
    pub fn with_builtins() -> Result<Self, ConditionError> {
        use Applicability::{CartAttribute, CartItem, CartRoot, CatalogProduct};

        let leaves: [(&str, ApplicabilitySet, LeafFactory); 10] = [
            ("cart_subtotal", smallvec![CartRoot, CartAttribute], CartSubtotal::from_fields),
            ("cart_quantity", smallvec![CartRoot, CartAttribute], CartQuantity::from_fields),
            ("cart_item_count", smallvec![CartRoot, CartAttribute], CartItemCount::from_fields),
            ("shipping_method", smallvec![CartAttribute], ShippingMethodIs::from_fields),
            ("customer_group", smallvec![], CustomerGroupIs::from_fields),
            ("product_id", smallvec![CatalogProduct, CartItem], ProductIs::from_fields),
            ("product_price", smallvec![CatalogProduct, CartItem], ProductPrice::from_fields),
            ("line_quantity", smallvec![CartItem], LineQuantity::from_fields),
            ("product_in_stock", smallvec![CatalogProduct, CartItem], InStock::from_fields),
            ("parameter", smallvec![], ParameterEquals::from_fields),
        ];

        let mut registry = Self::new();

        registry.register_compound("all_of", smallvec![])?;
        registry.register_compound("product_all_of", smallvec![CatalogProduct, CartItem])?;

        for (name, applicability, factory) in leaves {
            registry.register_leaf(name, applicability, factory)?;
        }

        Ok(registry)
    }

    /// Register a leaf class. An empty applicability set makes the class usable everywhere.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionError::DuplicateClass`] if the name is taken.
    pub fn register_leaf(
        &mut self,
        name: impl Into<String>,
        applicability: ApplicabilitySet,
        factory: LeafFactory,
    ) -> Result<(), ConditionError> {
        let name = self.claim(name.into(), ClassSlot::Leaf(self.leaves.len()))?;

        self.leaves.push(LeafClass {
            name,
            applicability,
            factory,
        });

        Ok(())
    }

    /// Register a compound class. An empty applicability set makes the class usable everywhere.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionError::DuplicateClass`] if the name is taken.
    pub fn register_compound(
        &mut self,
        name: impl Into<String>,
        applicability: ApplicabilitySet,
    ) -> Result<(), ConditionError> {
        let name = self.claim(name.into(), ClassSlot::Compound(self.compounds.len()))?;

        self.compounds.push(CompoundClass {
            name,
            applicability,
        });

        Ok(())
    }

    fn claim(&mut self, name: String, slot: ClassSlot) -> Result<String, ConditionError> {
        if self.index.contains_key(&name) {
            return Err(ConditionError::DuplicateClass(name));
        }

        self.index.insert(name.clone(), slot);

        Ok(name)
    }

    /// Whether `name` is a registered compound class.
    pub fn is_compound(&self, name: &str) -> bool {
        matches!(self.index.get(name), Some(ClassSlot::Compound(_)))
    }

    /// Whether `name` is registered at all.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Build the predicate for a leaf node.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionError::UnknownClass`] if the node's class is not a registered leaf, or
    /// [`ConditionError::InvalidField`] if its fields do not configure the class.
    pub fn build_leaf(&self, node: &ConditionNode) -> Result<Box<dyn Condition>, ConditionError> {
        let class = match self.index.get(&node.class_name) {
            Some(ClassSlot::Leaf(slot)) => self.leaves.get(*slot),
            _ => None,
        }
        .ok_or_else(|| ConditionError::UnknownClass(node.class_name.clone()))?;

        (class.factory)(&node.fields).map_err(|source| ConditionError::InvalidField {
            class: class.name.clone(),
            node: node.id,
            source,
        })
    }

    /// Leaf classes usable for `applicability`, in registration order, followed by the classes
    /// that declared no applicability.
    pub fn leaf_classes_for(&self, applicability: Applicability) -> Vec<&str> {
        partition(
            self.leaves
                .iter()
                .map(|class| (class.name.as_str(), &class.applicability)),
            applicability,
        )
    }

    /// Compound classes usable for `applicability`, followed by the untyped ones.
    pub fn compound_classes_for(&self, applicability: Applicability) -> Vec<&str> {
        partition(
            self.compounds
                .iter()
                .map(|class| (class.name.as_str(), &class.applicability)),
            applicability,
        )
    }
}

fn partition<'a>(
    classes: impl Iterator<Item = (&'a str, &'a ApplicabilitySet)> + Clone,
    applicability: Applicability,
) -> Vec<&'a str> {
    let typed = classes
        .clone()
        .filter(|(_, declared)| declared.contains(&applicability));

    let untyped = classes.filter(|(_, declared)| declared.is_empty());

    typed.chain(untyped).map(|(name, _)| name).collect()
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn untyped_classes_are_appended_to_every_partition() -> TestResult {
        let registry = ConditionRegistry::with_builtins()?;

        let item_classes = registry.leaf_classes_for(Applicability::CartItem);

        assert_eq!(
            item_classes,
            vec![
                "product_id",
                "product_price",
                "line_quantity",
                "product_in_stock",
                "customer_group",
                "parameter"
            ]
        );
        assert_eq!(
            registry.compound_classes_for(Applicability::CartRoot),
            vec!["all_of"]
        );
        assert_eq!(
            registry.compound_classes_for(Applicability::CatalogProduct),
            vec!["product_all_of", "all_of"]
        );

        Ok(())
    }

    #[test]
    fn duplicate_names_are_rejected_across_kinds() -> TestResult {
        let mut registry = ConditionRegistry::with_builtins()?;

        assert!(matches!(
            registry.register_compound("cart_subtotal", smallvec![]),
            Err(ConditionError::DuplicateClass(name)) if name == "cart_subtotal"
        ));

        Ok(())
    }

    #[test]
    fn unknown_and_compound_classes_cannot_be_built_as_leaves() -> TestResult {
        let registry = ConditionRegistry::with_builtins()?;

        assert!(matches!(
            registry.build_leaf(&ConditionNode::leaf(1, 1, "no_such_class")),
            Err(ConditionError::UnknownClass(_))
        ));
        assert!(matches!(
            registry.build_leaf(&ConditionNode::leaf(2, 1, "all_of")),
            Err(ConditionError::UnknownClass(_))
        ));

        Ok(())
    }

    #[test]
    fn misconfigured_leaf_names_the_node() -> TestResult {
        let registry = ConditionRegistry::with_builtins()?;

        let error = registry
            .build_leaf(&ConditionNode::leaf(9, 1, "cart_subtotal"))
            .err()
            .ok_or("Expected a configuration error")?;

        assert!(matches!(
            error,
            ConditionError::InvalidField { ref class, node, .. }
                if class == "cart_subtotal" && node.0 == 9
        ));

        Ok(())
    }
}

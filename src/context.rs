//! Evaluation Context
//!
//! The bag of facts a condition is evaluated against: the cart, the line being considered, the
//! product and its current price, the persisted record behind the line when there is one, the
//! customer group, and any extra per-invocation parameters such as the selected shipping method.

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;

use crate::{
    cart::{Cart, LineItem},
    catalog::{CustomerGroupId, ProductId, ResolvedRecord},
};

/// Extra named parameters supplied by the caller for one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters(FxHashMap<String, String>);

impl Parameters {
    /// Empty parameter bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, replacing any previous value.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Look up a parameter.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Merge `other` into this bag. Values in `other` win.
    pub fn merge(&mut self, other: &Parameters) {
        self.0
            .extend(other.0.iter().map(|(name, value)| (name.clone(), value.clone())));
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Parameters {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

/// Facts available to a condition.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext<'a> {
    /// Cart being evaluated
    pub cart: Option<&'a Cart>,

    /// Line being evaluated, when checking product eligibility
    pub line: Option<&'a LineItem>,

    /// Product being evaluated
    pub product: Option<ProductId>,

    /// Pre-discount unit price of the product
    pub current_price: Option<Decimal>,

    /// Persisted record behind the line
    pub record: Option<&'a ResolvedRecord>,

    /// Customer group of the shopper
    pub customer_group: Option<CustomerGroupId>,

    /// Extra per-invocation parameters
    pub parameters: Parameters,
}

impl<'a> EvaluationContext<'a> {
    /// Context for evaluating a rule against a whole cart.
    pub fn for_cart(cart: &'a Cart) -> Self {
        Self {
            cart: Some(cart),
            customer_group: cart.customer_group(),
            ..Self::default()
        }
    }

    /// Context for evaluating product eligibility of a single cart line.
    pub fn for_line(cart: &'a Cart, line: &'a LineItem) -> Self {
        Self {
            cart: Some(cart),
            line: Some(line),
            product: Some(line.product_id()),
            current_price: Some(line.unit_price()),
            customer_group: cart.customer_group(),
            ..Self::default()
        }
    }

    /// Context for a catalog product outside of any cart.
    pub fn for_product(product: ProductId, current_price: Decimal) -> Self {
        Self {
            product: Some(product),
            current_price: Some(current_price),
            ..Self::default()
        }
    }

    /// Merge caller supplied parameters into the context.
    #[must_use]
    pub fn with_parameters(mut self, parameters: &Parameters) -> Self {
        self.parameters.merge(parameters);
        self
    }

    /// Attach the persisted record behind the line.
    #[must_use]
    pub fn with_record(mut self, record: &'a ResolvedRecord) -> Self {
        self.record = Some(record);
        self
    }

    /// Set the customer group.
    #[must_use]
    pub fn with_customer_group(mut self, group: CustomerGroupId) -> Self {
        self.customer_group = Some(group);
        self
    }
}

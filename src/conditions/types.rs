//! Built-in Leaf Conditions
//!
//! Each leaf class turns its stored field map into a typed configuration once, when the tree
//! is compiled, so evaluation never touches strings.

use std::str::FromStr;

use rust_decimal::Decimal;
use smallvec::SmallVec;
use thiserror::Error;

use crate::{
    catalog::{CustomerGroupId, ProductId},
    conditions::Condition,
    context::EvaluationContext,
    fields::{FieldError, FieldReader, Fields},
};

/// Comparison operator used by threshold conditions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Comparison {
    /// `==`
    Equal,

    /// `!=`
    NotEqual,

    /// `<`
    Less,

    /// `<=`
    LessOrEqual,

    /// `>`
    Greater,

    /// `>=`
    #[default]
    GreaterOrEqual,
}

impl Comparison {
    /// Compare `actual` against the configured `expected` value.
    pub fn holds<T: PartialOrd>(self, actual: &T, expected: &T) -> bool {
        match self {
            Self::Equal => actual == expected,
            Self::NotEqual => actual != expected,
            Self::Less => actual < expected,
            Self::LessOrEqual => actual <= expected,
            Self::Greater => actual > expected,
            Self::GreaterOrEqual => actual >= expected,
        }
    }

    /// Read the optional `operator` field, defaulting to `>=`.
    fn from_fields(reader: &FieldReader<'_>) -> Result<Self, FieldError> {
        match reader.optional("operator") {
            Some(_) => reader.parse("operator", "expected one of ==, !=, <, <=, >, >="),
            None => Ok(Self::default()),
        }
    }
}

/// Unrecognised comparison operator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown comparison operator `{0}`")]
pub struct UnknownComparison(pub String);

impl FromStr for Comparison {
    type Err = UnknownComparison;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "==" | "=" | "eq" => Ok(Self::Equal),
            "!=" | "<>" | "ne" => Ok(Self::NotEqual),
            "<" | "lt" => Ok(Self::Less),
            "<=" | "lte" => Ok(Self::LessOrEqual),
            ">" | "gt" => Ok(Self::Greater),
            ">=" | "gte" => Ok(Self::GreaterOrEqual),
            other => Err(UnknownComparison(other.to_string())),
        }
    }
}

/// Cart subtotal compared against an amount.
#[derive(Debug, Clone, PartialEq)]
pub struct CartSubtotal {
    /// Operator
    pub operator: Comparison,

    /// Threshold
    pub amount: Decimal,
}

impl CartSubtotal {
    /// Build from `amount` and optional `operator` fields.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if a field is missing or invalid.
    pub fn from_fields(fields: &Fields) -> Result<Box<dyn Condition>, FieldError> {
        let reader = FieldReader::new(fields);

        Ok(Box::new(Self {
            operator: Comparison::from_fields(&reader)?,
            amount: reader.decimal("amount")?,
        }))
    }
}

impl Condition for CartSubtotal {
    fn matches(&self, context: &EvaluationContext<'_>) -> bool {
        context
            .cart
            .is_some_and(|cart| self.operator.holds(&cart.subtotal(), &self.amount))
    }
}

/// Total units in the cart compared against a threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartQuantity {
    /// Operator
    pub operator: Comparison,

    /// Threshold
    pub quantity: u64,
}

impl CartQuantity {
    /// Build from `quantity` and optional `operator` fields.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if a field is missing or invalid.
    pub fn from_fields(fields: &Fields) -> Result<Box<dyn Condition>, FieldError> {
        let reader = FieldReader::new(fields);

        Ok(Box::new(Self {
            operator: Comparison::from_fields(&reader)?,
            quantity: reader.parse("quantity", "expected a whole number")?,
        }))
    }
}

impl Condition for CartQuantity {
    fn matches(&self, context: &EvaluationContext<'_>) -> bool {
        context
            .cart
            .is_some_and(|cart| self.operator.holds(&cart.quantity(), &self.quantity))
    }
}

/// Number of distinct cart lines compared against a threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItemCount {
    /// Operator
    pub operator: Comparison,

    /// Threshold
    pub count: usize,
}

impl CartItemCount {
    /// Build from `count` and optional `operator` fields.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if a field is missing or invalid.
    pub fn from_fields(fields: &Fields) -> Result<Box<dyn Condition>, FieldError> {
        let reader = FieldReader::new(fields);

        Ok(Box::new(Self {
            operator: Comparison::from_fields(&reader)?,
            count: reader.parse("count", "expected a whole number")?,
        }))
    }
}

impl Condition for CartItemCount {
    fn matches(&self, context: &EvaluationContext<'_>) -> bool {
        context
            .cart
            .is_some_and(|cart| self.operator.holds(&cart.len(), &self.count))
    }
}

/// Shopper belongs to one of the listed customer groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerGroupIs {
    /// Accepted groups
    pub groups: SmallVec<[CustomerGroupId; 4]>,
}

impl CustomerGroupIs {
    /// Build from the comma separated `groups` field.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if the field is missing or holds a non-numeric id.
    pub fn from_fields(fields: &Fields) -> Result<Box<dyn Condition>, FieldError> {
        let groups = FieldReader::new(fields).parsed_list("groups", "expected group ids")?;

        Ok(Box::new(Self { groups }))
    }
}

impl Condition for CustomerGroupIs {
    fn matches(&self, context: &EvaluationContext<'_>) -> bool {
        context
            .customer_group
            .is_some_and(|group| self.groups.contains(&group))
    }
}

/// Product is one of the listed products.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductIs {
    /// Accepted products
    pub products: SmallVec<[ProductId; 4]>,
}

impl ProductIs {
    /// Build from the comma separated `products` field.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if the field is missing or holds a non-numeric id.
    pub fn from_fields(fields: &Fields) -> Result<Box<dyn Condition>, FieldError> {
        let products = FieldReader::new(fields).parsed_list("products", "expected product ids")?;

        Ok(Box::new(Self { products }))
    }
}

impl Condition for ProductIs {
    fn matches(&self, context: &EvaluationContext<'_>) -> bool {
        context
            .product
            .is_some_and(|product| self.products.contains(&product))
    }
}

/// Current product price compared against an amount.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductPrice {
    /// Operator
    pub operator: Comparison,

    /// Threshold
    pub amount: Decimal,
}

impl ProductPrice {
    /// Build from `amount` and optional `operator` fields.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if a field is missing or invalid.
    pub fn from_fields(fields: &Fields) -> Result<Box<dyn Condition>, FieldError> {
        let reader = FieldReader::new(fields);

        Ok(Box::new(Self {
            operator: Comparison::from_fields(&reader)?,
            amount: reader.decimal("amount")?,
        }))
    }
}

impl Condition for ProductPrice {
    fn matches(&self, context: &EvaluationContext<'_>) -> bool {
        context
            .current_price
            .is_some_and(|price| self.operator.holds(&price, &self.amount))
    }
}

/// Quantity of the line being evaluated compared against a threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineQuantity {
    /// Operator
    pub operator: Comparison,

    /// Threshold
    pub quantity: u32,
}

impl LineQuantity {
    /// Build from `quantity` and optional `operator` fields.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if a field is missing or invalid.
    pub fn from_fields(fields: &Fields) -> Result<Box<dyn Condition>, FieldError> {
        let reader = FieldReader::new(fields);

        Ok(Box::new(Self {
            operator: Comparison::from_fields(&reader)?,
            quantity: reader.u32("quantity")?,
        }))
    }
}

impl Condition for LineQuantity {
    fn matches(&self, context: &EvaluationContext<'_>) -> bool {
        context
            .line
            .is_some_and(|line| self.operator.holds(&line.quantity(), &self.quantity))
    }
}

/// Selected shipping method, supplied as the `shipping_method` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShippingMethodIs {
    /// Accepted method codes
    pub methods: SmallVec<[String; 2]>,
}

impl ShippingMethodIs {
    /// Build from the comma separated `methods` field.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if the field is missing.
    pub fn from_fields(fields: &Fields) -> Result<Box<dyn Condition>, FieldError> {
        let methods = FieldReader::new(fields)
            .list("methods")?
            .into_iter()
            .map(str::to_string)
            .collect();

        Ok(Box::new(Self { methods }))
    }
}

impl Condition for ShippingMethodIs {
    fn matches(&self, context: &EvaluationContext<'_>) -> bool {
        context
            .parameters
            .get("shipping_method")
            .is_some_and(|method| self.methods.iter().any(|accepted| accepted == method))
    }
}

/// Stock status of the persisted record behind a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InStock {
    /// Expected stock status
    pub in_stock: bool,
}

impl InStock {
    /// Build from the optional `in_stock` field, which defaults to `1`.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if the field is not a flag.
    pub fn from_fields(fields: &Fields) -> Result<Box<dyn Condition>, FieldError> {
        let reader = FieldReader::new(fields);

        let in_stock = match reader.optional("in_stock") {
            None | Some("1" | "yes" | "true") => true,
            Some("0" | "no" | "false") => false,
            Some(other) => {
                return Err(FieldError::Invalid {
                    field: "in_stock".to_string(),
                    value: other.to_string(),
                    reason: "expected 1 or 0",
                });
            }
        };

        Ok(Box::new(Self { in_stock }))
    }
}

impl Condition for InStock {
    fn matches(&self, context: &EvaluationContext<'_>) -> bool {
        context
            .record
            .is_some_and(|record| record.in_stock == self.in_stock)
    }
}

/// Generic check of a caller supplied parameter, for extensions without a dedicated class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterEquals {
    /// Parameter name
    pub name: String,

    /// Expected value
    pub value: String,
}

impl ParameterEquals {
    /// Build from `name` and `value` fields.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if either field is missing.
    pub fn from_fields(fields: &Fields) -> Result<Box<dyn Condition>, FieldError> {
        let reader = FieldReader::new(fields);

        Ok(Box::new(Self {
            name: reader.required("name")?.to_string(),
            value: reader.required("value")?.to_string(),
        }))
    }
}

impl Condition for ParameterEquals {
    fn matches(&self, context: &EvaluationContext<'_>) -> bool {
        context.parameters.get(&self.name) == Some(self.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use rusty_money::iso::GBP;
    use testresult::TestResult;

    use crate::{
        cart::{Cart, LineItem},
        catalog::ResolvedRecord,
        context::Parameters,
    };

    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    fn cart() -> Cart {
        let mut cart = Cart::new(GBP).with_customer_group(CustomerGroupId(2));

        cart.insert(LineItem::new(ProductId(1), 2, Decimal::new(2000, 2)));
        cart.insert(LineItem::new(ProductId(2), 1, Decimal::new(1500, 2)));

        cart
    }

    #[test]
    fn comparison_operators_parse_symbols_and_words() {
        assert_eq!("<=".parse::<Comparison>(), Ok(Comparison::LessOrEqual));
        assert_eq!("GT".parse::<Comparison>(), Ok(Comparison::Greater));
        assert_eq!(
            "~".parse::<Comparison>(),
            Err(UnknownComparison("~".to_string()))
        );
    }

    #[test]
    fn cart_thresholds_default_to_at_least() -> TestResult {
        let cart = cart();
        let context = EvaluationContext::for_cart(&cart);

        assert!(CartSubtotal::from_fields(&fields(&[("amount", "55")]))?.matches(&context));
        assert!(!CartSubtotal::from_fields(&fields(&[("amount", "55.01")]))?.matches(&context));
        assert!(
            CartQuantity::from_fields(&fields(&[("quantity", "3"), ("operator", "==")]))?
                .matches(&context)
        );
        assert!(
            CartItemCount::from_fields(&fields(&[("count", "3"), ("operator", "<")]))?
                .matches(&context)
        );

        Ok(())
    }

    #[test]
    fn cart_conditions_do_not_match_without_a_cart() -> TestResult {
        let context = EvaluationContext::for_product(ProductId(1), Decimal::ONE);

        assert!(!CartSubtotal::from_fields(&fields(&[("amount", "0")]))?.matches(&context));

        Ok(())
    }

    #[test]
    fn customer_group_and_product_lists() -> TestResult {
        let cart = cart();
        let context = EvaluationContext::for_cart(&cart);

        assert!(CustomerGroupIs::from_fields(&fields(&[("groups", "1, 2")]))?.matches(&context));
        assert!(!CustomerGroupIs::from_fields(&fields(&[("groups", "3")]))?.matches(&context));

        let product = EvaluationContext::for_product(ProductId(7), Decimal::new(500, 2));

        assert!(ProductIs::from_fields(&fields(&[("products", "5,7")]))?.matches(&product));
        assert!(
            ProductPrice::from_fields(&fields(&[("amount", "5"), ("operator", "==")]))?
                .matches(&product)
        );

        Ok(())
    }

    #[test]
    fn shipping_method_and_generic_parameters_read_the_parameter_bag() -> TestResult {
        let context = EvaluationContext::default()
            .with_parameters(&Parameters::new().with("shipping_method", "express"));

        assert!(
            ShippingMethodIs::from_fields(&fields(&[("methods", "standard,express")]))?
                .matches(&context)
        );
        assert!(
            ParameterEquals::from_fields(&fields(&[
                ("name", "shipping_method"),
                ("value", "express")
            ]))?
            .matches(&context)
        );

        Ok(())
    }

    #[test]
    fn stock_status_reads_the_attached_record() -> TestResult {
        let record = ResolvedRecord {
            product_id: ProductId(1),
            price: Decimal::new(1000, 2),
            sale_price: None,
            in_stock: false,
            volume: None,
            currency: GBP,
        };

        let in_stock = InStock::from_fields(&Fields::default())?;
        let sold_out = InStock::from_fields(&fields(&[("in_stock", "0")]))?;

        let context =
            EvaluationContext::for_product(ProductId(1), record.price).with_record(&record);

        assert!(!in_stock.matches(&context));
        assert!(sold_out.matches(&context));
        assert!(!sold_out.matches(&EvaluationContext::default()));

        Ok(())
    }

    #[test]
    fn invalid_operator_is_a_field_error() {
        assert!(matches!(
            CartSubtotal::from_fields(&fields(&[("amount", "1"), ("operator", "about")])),
            Err(FieldError::Invalid { .. })
        ));
    }
}

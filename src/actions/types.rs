//! Built-in Actions

use decimal_percentage::Percentage;
use rust_decimal::Decimal;

use crate::{
    actions::{
        Action, ActionError, ActionOutcome, CartAction, DiscountMaps, ProductAction, percent_of,
        with_tax_share,
    },
    cart::{Cart, LineItem, LineKey},
    fields::{FieldError, FieldReader, Fields},
    settings::EngineSettings,
};

/// Record a net line discount and its tax inclusive share.
fn discount_line(
    key: LineKey,
    line: &LineItem,
    discount: Decimal,
    discounts: &mut DiscountMaps,
    settings: &EngineSettings,
) -> Result<ActionOutcome, ActionError> {
    let discount = settings.round(discount);

    if discount <= Decimal::ZERO {
        return Ok(ActionOutcome::changed(false));
    }

    discounts.add(key, discount, with_tax_share(line, discount, settings)?);

    Ok(ActionOutcome::changed(true))
}

/// Percentage off every eligible line.
#[derive(Debug, Clone, Copy)]
pub struct ProductPercentage {
    /// Share of the line total taken off
    pub percent: Percentage,
}

impl ProductPercentage {
    /// Build from the `percent` field.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if the field is missing, not a percentage, or negative.
    pub fn from_fields(fields: &Fields) -> Result<Action, FieldError> {
        Ok(Action::Product(Box::new(Self {
            percent: FieldReader::new(fields).non_negative_percentage("percent")?,
        })))
    }
}

impl ProductAction for ProductPercentage {
    fn apply_to_line(
        &self,
        key: LineKey,
        line: &LineItem,
        discounts: &mut DiscountMaps,
        settings: &EngineSettings,
    ) -> Result<ActionOutcome, ActionError> {
        let discount = percent_of(&self.percent, line.total())?;

        discount_line(key, line, discount, discounts, settings)
    }
}

/// Fixed amount off each unit of every eligible line, never more than the unit price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductAmountOff {
    /// Amount taken off each unit
    pub amount: Decimal,
}

impl ProductAmountOff {
    /// Build from the `amount` field.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if the field is missing, not a decimal, or negative.
    pub fn from_fields(fields: &Fields) -> Result<Action, FieldError> {
        Ok(Action::Product(Box::new(Self {
            amount: FieldReader::new(fields).non_negative_decimal("amount")?,
        })))
    }
}

impl ProductAction for ProductAmountOff {
    fn apply_to_line(
        &self,
        key: LineKey,
        line: &LineItem,
        discounts: &mut DiscountMaps,
        settings: &EngineSettings,
    ) -> Result<ActionOutcome, ActionError> {
        let discount = self
            .amount
            .min(line.unit_price())
            .checked_mul(Decimal::from(line.quantity()))
            .ok_or(ActionError::Overflow)?;

        discount_line(key, line, discount, discounts, settings)
    }
}

/// Sell every eligible unit at a fixed price. Lines already at or below it are left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductFixedPrice {
    /// Unit price after the discount
    pub price: Decimal,
}

impl ProductFixedPrice {
    /// Build from the `price` field.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if the field is missing, not a decimal, or negative.
    pub fn from_fields(fields: &Fields) -> Result<Action, FieldError> {
        Ok(Action::Product(Box::new(Self {
            price: FieldReader::new(fields).non_negative_decimal("price")?,
        })))
    }
}

impl ProductAction for ProductFixedPrice {
    fn apply_to_line(
        &self,
        key: LineKey,
        line: &LineItem,
        discounts: &mut DiscountMaps,
        settings: &EngineSettings,
    ) -> Result<ActionOutcome, ActionError> {
        let saving = (line.unit_price() - self.price).max(Decimal::ZERO);

        let discount = saving
            .checked_mul(Decimal::from(line.quantity()))
            .ok_or(ActionError::Overflow)?;

        discount_line(key, line, discount, discounts, settings)
    }
}

/// Percentage off the cart subtotal, returned as a cart discount.
#[derive(Debug, Clone, Copy)]
pub struct CartPercentage {
    /// Share of the subtotal taken off
    pub percent: Percentage,
}

impl CartPercentage {
    /// Build from the `percent` field.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if the field is missing, not a percentage, or negative.
    pub fn from_fields(fields: &Fields) -> Result<Action, FieldError> {
        Ok(Action::Cart(Box::new(Self {
            percent: FieldReader::new(fields).non_negative_percentage("percent")?,
        })))
    }
}

impl CartAction for CartPercentage {
    fn apply_to_cart(
        &self,
        cart: &Cart,
        _discounts: &mut DiscountMaps,
        settings: &EngineSettings,
    ) -> Result<ActionOutcome, ActionError> {
        let discount = percent_of(&self.percent, cart.subtotal())?;

        Ok(ActionOutcome::cart_discount(settings.round(discount)))
    }
}

/// Fixed amount off the cart, never more than the subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartFixedAmount {
    /// Amount taken off
    pub amount: Decimal,
}

impl CartFixedAmount {
    /// Build from the `amount` field.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if the field is missing, not a decimal, or negative.
    pub fn from_fields(fields: &Fields) -> Result<Action, FieldError> {
        Ok(Action::Cart(Box::new(Self {
            amount: FieldReader::new(fields).non_negative_decimal("amount")?,
        })))
    }
}

impl CartAction for CartFixedAmount {
    fn apply_to_cart(
        &self,
        cart: &Cart,
        _discounts: &mut DiscountMaps,
        settings: &EngineSettings,
    ) -> Result<ActionOutcome, ActionError> {
        let discount = self.amount.min(cart.subtotal()).max(Decimal::ZERO);

        Ok(ActionOutcome::cart_discount(settings.round(discount)))
    }
}

/// Fixed amount spread over the cart lines in proportion to their totals.
///
/// Each line's share is rounded; the last line takes whatever rounding left over so the shares
/// always add up to the amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartDistributedAmount {
    /// Amount spread over the lines
    pub amount: Decimal,
}

impl CartDistributedAmount {
    /// Build from the `amount` field.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if the field is missing, not a decimal, or negative.
    pub fn from_fields(fields: &Fields) -> Result<Action, FieldError> {
        Ok(Action::Cart(Box::new(Self {
            amount: FieldReader::new(fields).non_negative_decimal("amount")?,
        })))
    }
}

impl CartAction for CartDistributedAmount {
    fn apply_to_cart(
        &self,
        cart: &Cart,
        discounts: &mut DiscountMaps,
        settings: &EngineSettings,
    ) -> Result<ActionOutcome, ActionError> {
        let subtotal = cart.subtotal();
        let amount = settings.round(self.amount.min(subtotal));

        if amount <= Decimal::ZERO || subtotal <= Decimal::ZERO {
            return Ok(ActionOutcome::changed(false));
        }

        let lines: Vec<(LineKey, &LineItem)> = cart
            .iter()
            .filter(|(_, line)| line.total() > Decimal::ZERO)
            .collect();

        let mut remaining = amount;

        for (position, (key, line)) in lines.iter().enumerate() {
            let share = if position + 1 == lines.len() {
                remaining
            } else {
                amount
                    .checked_mul(line.total())
                    .and_then(|scaled| scaled.checked_div(subtotal))
                    .map(|share| settings.round(share).min(remaining))
                    .ok_or(ActionError::Overflow)?
            };

            remaining -= share;

            discounts.add(*key, share, with_tax_share(line, share, settings)?);
        }

        Ok(ActionOutcome::changed(true))
    }
}

#[cfg(test)]
mod tests {
    use rusty_money::iso::GBP;
    use testresult::TestResult;

    use crate::catalog::ProductId;

    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    fn product(action: Action) -> Result<Box<dyn ProductAction>, &'static str> {
        match action {
            Action::Product(action) => Ok(action),
            Action::Cart(_) => Err("Expected a product action"),
        }
    }

    fn cart_action(action: Action) -> Result<Box<dyn CartAction>, &'static str> {
        match action {
            Action::Cart(action) => Ok(action),
            Action::Product(_) => Err("Expected a cart action"),
        }
    }

    #[test]
    fn product_percentage_discounts_the_line_total() -> TestResult {
        let settings = EngineSettings::default();
        let mut cart = Cart::new(GBP);
        let key = cart.insert(
            LineItem::new(ProductId(1), 3, Decimal::new(999, 2))
                .with_unit_price_with_tax(Decimal::new(1199, 2)),
        );
        let line = cart.get(key).ok_or("Expected line")?;

        let action = product(ProductPercentage::from_fields(&fields(&[("percent", "10%")]))?)?;
        let mut discounts = DiscountMaps::new();

        let outcome = action.apply_to_line(key, line, &mut discounts, &settings)?;

        assert!(outcome.applied.is_applied());
        assert_eq!(outcome.cart_amount, None);
        assert_eq!(discounts.line(key), Decimal::new(300, 2));
        assert_eq!(discounts.line_with_tax(key), Decimal::new(360, 2));

        Ok(())
    }

    #[test]
    fn amount_off_never_exceeds_the_unit_price() -> TestResult {
        let settings = EngineSettings::default();
        let mut cart = Cart::new(GBP);
        let key = cart.insert(LineItem::new(ProductId(1), 2, Decimal::new(300, 2)));
        let line = cart.get(key).ok_or("Expected line")?;

        let action = product(ProductAmountOff::from_fields(&fields(&[("amount", "5")]))?)?;
        let mut discounts = DiscountMaps::new();

        action.apply_to_line(key, line, &mut discounts, &settings)?;

        assert_eq!(discounts.line(key), Decimal::new(600, 2));

        Ok(())
    }

    #[test]
    fn fixed_price_leaves_cheaper_lines_alone() -> TestResult {
        let settings = EngineSettings::default();
        let mut cart = Cart::new(GBP);
        let dear = cart.insert(LineItem::new(ProductId(1), 2, Decimal::new(1500, 2)));
        let cheap = cart.insert(LineItem::new(ProductId(2), 1, Decimal::new(800, 2)));

        let action = product(ProductFixedPrice::from_fields(&fields(&[("price", "10")]))?)?;
        let mut discounts = DiscountMaps::new();

        let dear_outcome = action.apply_to_line(
            dear,
            cart.get(dear).ok_or("Expected line")?,
            &mut discounts,
            &settings,
        )?;
        let cheap_outcome = action.apply_to_line(
            cheap,
            cart.get(cheap).ok_or("Expected line")?,
            &mut discounts,
            &settings,
        )?;

        assert!(dear_outcome.applied.is_applied());
        assert!(!cheap_outcome.applied.is_applied());
        assert_eq!(discounts.line(dear), Decimal::new(1000, 2));
        assert_eq!(discounts.line(cheap), Decimal::ZERO);

        Ok(())
    }

    #[test]
    fn cart_actions_return_scalar_discounts() -> TestResult {
        let settings = EngineSettings::default();
        let mut cart = Cart::new(GBP);
        cart.insert(LineItem::new(ProductId(1), 3, Decimal::new(2000, 2)));

        let mut discounts = DiscountMaps::new();

        let percentage = cart_action(CartPercentage::from_fields(&fields(&[("percent", "10%")]))?)?;
        let fixed = cart_action(CartFixedAmount::from_fields(&fields(&[("amount", "75")]))?)?;

        let percentage = percentage.apply_to_cart(&cart, &mut discounts, &settings)?;
        let fixed = fixed.apply_to_cart(&cart, &mut discounts, &settings)?;

        assert_eq!(percentage.cart_amount, Some(Decimal::new(600, 2)));
        assert_eq!(fixed.cart_amount, Some(Decimal::new(6000, 2)));
        assert!(discounts.is_empty());

        Ok(())
    }

    #[test]
    fn negative_configuration_is_rejected() {
        assert!(CartPercentage::from_fields(&fields(&[("percent", "-10%")])).is_err());
        assert!(CartFixedAmount::from_fields(&fields(&[("amount", "-1")])).is_err());
        assert!(CartDistributedAmount::from_fields(&fields(&[("amount", "-1")])).is_err());
        assert!(ProductPercentage::from_fields(&fields(&[("percent", "-0.5")])).is_err());
        assert!(ProductAmountOff::from_fields(&fields(&[("amount", "-2.50")])).is_err());
        assert!(ProductFixedPrice::from_fields(&fields(&[("price", "-3")])).is_err());
        assert!(CartPercentage::from_fields(&fields(&[("percent", "0%")])).is_ok());
    }

    #[test]
    fn distributed_amount_adds_up_exactly() -> TestResult {
        let settings = EngineSettings::default();
        let mut cart = Cart::new(GBP);
        let keys = [
            cart.insert(LineItem::new(ProductId(1), 1, Decimal::new(1000, 2))),
            cart.insert(LineItem::new(ProductId(2), 1, Decimal::new(1000, 2))),
            cart.insert(LineItem::new(ProductId(3), 1, Decimal::new(1000, 2))),
        ];

        let action =
            cart_action(CartDistributedAmount::from_fields(&fields(&[("amount", "10")]))?)?;
        let mut discounts = DiscountMaps::new();

        let outcome = action.apply_to_cart(&cart, &mut discounts, &settings)?;

        assert!(outcome.applied.is_applied());
        assert_eq!(outcome.cart_amount, None);
        assert_eq!(discounts.total(), Decimal::new(1000, 2));
        assert_eq!(discounts.total_with_tax(), Decimal::new(1000, 2));

        for key in keys {
            assert!(discounts.line(key) >= Decimal::new(333, 2));
        }

        Ok(())
    }

    #[test]
    fn distributed_amount_on_an_empty_cart_changes_nothing() -> TestResult {
        let action =
            cart_action(CartDistributedAmount::from_fields(&fields(&[("amount", "10")]))?)?;
        let mut discounts = DiscountMaps::new();

        let outcome =
            action.apply_to_cart(&Cart::new(GBP), &mut discounts, &EngineSettings::default())?;

        assert!(!outcome.applied.is_applied());
        assert!(discounts.is_empty());

        Ok(())
    }
}

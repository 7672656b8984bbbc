//! Cart Fixtures

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use rusty_money::iso::Currency;
use serde::Deserialize;

use crate::{
    cart::{AttributeValue, BundleLink, CartKey, LineItem},
    catalog::{CustomerGroupId, ProductId},
    currency::currency_from_code,
    fixtures::FixtureError,
    tiers::TierTableId,
};

/// Wrapper for a cart in YAML
#[derive(Debug, Deserialize)]
pub struct CartFixture {
    /// Currency code; taken from the first line when absent
    #[serde(default)]
    pub currency: Option<String>,

    /// Customer group of the shopper
    #[serde(default)]
    pub customer_group: Option<CustomerGroupId>,

    /// Extra evaluation parameters
    #[serde(default)]
    pub parameters: FxHashMap<String, String>,

    /// Lines in the order they are added
    pub lines: Vec<LineFixture>,
}

/// Line Fixture
#[derive(Debug, Deserialize)]
pub struct LineFixture {
    /// Product identifier
    pub product: ProductId,

    /// Number of units
    #[serde(default = "one")]
    pub quantity: u32,

    /// Net unit price (e.g., "20.00 GBP")
    pub price: String,

    /// Tax-inclusive unit price
    #[serde(default)]
    pub price_with_tax: Option<String>,

    /// Selected options
    #[serde(default)]
    pub options: FxHashMap<String, AttributeValue>,

    /// Selected extras
    #[serde(default)]
    pub extras: FxHashMap<String, AttributeValue>,

    /// Custom data
    #[serde(default)]
    pub custom_data: FxHashMap<String, AttributeValue>,

    /// Uploaded file fingerprints
    #[serde(default)]
    pub files: Vec<String>,

    /// Key bundle components attach to
    #[serde(default)]
    pub cart_key: Option<CartKey>,

    /// Link to a bundle master line
    #[serde(default)]
    pub bundle: Option<BundleLink>,

    /// Tier table pricing this line
    #[serde(default)]
    pub tier_table: Option<TierTableId>,
}

fn one() -> u32 {
    1
}

impl LineFixture {
    /// Build the cart line, checking its prices are in `currency`.
    ///
    /// # Errors
    ///
    /// Returns an error if a price is malformed or in another currency.
    pub fn to_line(&self, currency: &'static Currency) -> Result<LineItem, FixtureError> {
        let unit_price = price_in(&self.price, currency)?;

        let mut line = LineItem::new(self.product, self.quantity, unit_price);

        if let Some(price_with_tax) = &self.price_with_tax {
            line = line.with_unit_price_with_tax(price_in(price_with_tax, currency)?);
        }

        for (name, value) in &self.options {
            line = line.with_option(name.clone(), value.clone());
        }

        for (name, value) in &self.extras {
            line = line.with_extra(name.clone(), value.clone());
        }

        for (name, value) in &self.custom_data {
            line = line.with_custom_data(name.clone(), value.clone());
        }

        for file in &self.files {
            line = line.with_uploaded_file(file.clone());
        }

        if let Some(key) = &self.cart_key {
            line = line.with_cart_key(key.clone());
        }

        if let Some(link) = &self.bundle {
            line = line.as_component_of(link.clone());
        }

        Ok(line)
    }

    /// Currency of the line's net price.
    ///
    /// # Errors
    ///
    /// Returns an error if the price is malformed.
    pub fn currency(&self) -> Result<&'static Currency, FixtureError> {
        parse_price(&self.price).map(|(_, currency)| currency)
    }
}

pub(crate) fn price_in(s: &str, currency: &'static Currency) -> Result<Decimal, FixtureError> {
    let (amount, found) = parse_price(s)?;

    if found != currency {
        return Err(FixtureError::CurrencyMismatch(
            currency.iso_alpha_code.to_string(),
            found.iso_alpha_code.to_string(),
        ));
    }

    Ok(amount)
}

/// Parse price string (e.g., "2.99 GBP") into an amount and currency
///
/// # Errors
///
/// Returns an error if the string is not in the format "AMOUNT CURRENCY", if the amount is not a
/// decimal, or if the currency code is not recognized.
pub fn parse_price(s: &str) -> Result<(Decimal, &'static Currency), FixtureError> {
    let mut parts = s.split_whitespace();

    let (Some(amount), Some(code), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(FixtureError::InvalidPrice(format!(
            "Expected format 'AMOUNT CURRENCY', got: {s}"
        )));
    };

    let amount = amount
        .parse::<Decimal>()
        .map_err(|_err| FixtureError::InvalidPrice(s.to_string()))?;

    let currency =
        currency_from_code(code).ok_or_else(|| FixtureError::UnknownCurrency(code.to_string()))?;

    Ok((amount, currency))
}

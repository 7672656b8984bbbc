//! Currency Conversion
//!
//! Prices are stored in a record's native currency. Conversion into the display currency is
//! delegated to a [`CurrencyConverter`] and only happens when the two currencies differ.

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use rustc_hash::FxHashMap;
use rusty_money::iso::{Currency, EUR, GBP, USD};
use thiserror::Error;

/// Errors raised by a currency converter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CurrencyError {
    /// No exchange rate is known between the two currencies.
    #[error("no exchange rate from {from} to {to}")]
    MissingRate {
        /// Source currency code
        from: &'static str,

        /// Target currency code
        to: &'static str,
    },

    /// The converted amount could not be represented.
    #[error("converting {amount} from {from} overflowed")]
    Overflow {
        /// Amount that was being converted
        amount: Decimal,

        /// Source currency code
        from: &'static str,
    },
}

/// Converts amounts between currencies.
pub trait CurrencyConverter: fmt::Debug {
    /// Convert `amount` from one currency into another, rounded to `precision` decimal places.
    ///
    /// # Errors
    ///
    /// Returns a [`CurrencyError`] if the conversion is not possible.
    fn convert(
        &self,
        amount: Decimal,
        from: &'static Currency,
        to: &'static Currency,
        precision: u32,
    ) -> Result<Decimal, CurrencyError>;
}

/// Convert `amount` only when `from` and `to` are different currencies.
///
/// # Errors
///
/// Returns a [`CurrencyError`] if a conversion was needed and failed.
pub fn convert_if_needed(
    converter: &dyn CurrencyConverter,
    amount: Decimal,
    from: &'static Currency,
    to: &'static Currency,
    precision: u32,
) -> Result<Decimal, CurrencyError> {
    if from.iso_alpha_code == to.iso_alpha_code {
        return Ok(amount);
    }

    converter.convert(amount, from, to, precision)
}

/// Look up one of the supported currencies by ISO code.
pub fn currency_from_code(code: &str) -> Option<&'static Currency> {
    match code.trim().to_ascii_uppercase().as_str() {
        "GBP" => Some(GBP),
        "USD" => Some(USD),
        "EUR" => Some(EUR),
        _ => None,
    }
}

/// Converter backed by a fixed table of exchange rates.
///
/// A rate registered for `A -> B` is also used, inverted, for `B -> A` when no explicit reverse
/// rate exists.
#[derive(Debug, Clone, Default)]
pub struct FixedRateConverter {
    rates: FxHashMap<(&'static str, &'static str), Decimal>,
}

impl FixedRateConverter {
    /// Create a converter with no rates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the rate used to convert one unit of `from` into `to`.
    #[must_use]
    pub fn with_rate(
        mut self,
        from: &'static Currency,
        to: &'static Currency,
        rate: Decimal,
    ) -> Self {
        self.rates
            .insert((from.iso_alpha_code, to.iso_alpha_code), rate);

        self
    }

    fn rate(&self, from: &'static Currency, to: &'static Currency) -> Option<Decimal> {
        let key = (from.iso_alpha_code, to.iso_alpha_code);

        if let Some(rate) = self.rates.get(&key) {
            return Some(*rate);
        }

        self.rates
            .get(&(to.iso_alpha_code, from.iso_alpha_code))
            .and_then(|rate| Decimal::ONE.checked_div(*rate))
    }
}

impl CurrencyConverter for FixedRateConverter {
    fn convert(
        &self,
        amount: Decimal,
        from: &'static Currency,
        to: &'static Currency,
        precision: u32,
    ) -> Result<Decimal, CurrencyError> {
        let rate = self.rate(from, to).ok_or(CurrencyError::MissingRate {
            from: from.iso_alpha_code,
            to: to.iso_alpha_code,
        })?;

        amount
            .checked_mul(rate)
            .map(|converted| {
                converted.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero)
            })
            .ok_or(CurrencyError::Overflow {
                amount,
                from: from.iso_alpha_code,
            })
    }
}

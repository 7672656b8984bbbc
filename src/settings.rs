//! Engine Settings
//!
//! Rounding and capping behaviour shared by every discount action, and the currency prices are
//! displayed in. Settings are loaded from YAML; any key left out keeps its default.

use std::{fs, path::Path};

use rust_decimal::{Decimal, RoundingStrategy};
use rusty_money::iso::Currency;
use serde::Deserialize;
use thiserror::Error;

use crate::currency::currency_from_code;

/// Largest number of decimal places a [`Decimal`] can hold.
const MAX_PRECISION: u32 = 28;

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Settings file could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Settings were not valid YAML or did not match the expected shape.
    #[error(transparent)]
    Yaml(#[from] serde_norway::Error),

    /// Display currency is not supported.
    #[error("unsupported display currency `{0}`")]
    UnknownCurrency(String),

    /// Precision is larger than a decimal can represent.
    #[error("price precision {0} exceeds the maximum of 28")]
    Precision(u32),
}

/// How amounts are rounded to the configured precision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rounding {
    /// Round half away from zero
    #[default]
    MidpointAwayFromZero,

    /// Round half to even
    Bankers,
}

impl From<Rounding> for RoundingStrategy {
    fn from(rounding: Rounding) -> Self {
        match rounding {
            Rounding::MidpointAwayFromZero => RoundingStrategy::MidpointAwayFromZero,
            Rounding::Bankers => RoundingStrategy::MidpointNearestEven,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    /// Decimal places discounts and converted prices are rounded to
    pub price_precision: u32,

    /// Rounding mode
    pub rounding: Rounding,

    /// Whether a line's accumulated discount is capped at the line total
    pub cap_discount_at_line_total: bool,

    /// ISO code of the currency prices are displayed in
    pub display_currency: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            price_precision: 2,
            rounding: Rounding::default(),
            cap_discount_at_line_total: true,
            display_currency: "GBP".to_string(),
        }
    }
}

impl EngineSettings {
    /// Parse settings from YAML.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingsError`] if the YAML is malformed or holds unsupported values.
    pub fn from_yaml(yaml: &str) -> Result<Self, SettingsError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let settings: Self = serde_norway::from_str(yaml)?;

        settings.validate()?;

        Ok(settings)
    }

    /// Load settings from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingsError`] if the file cannot be read or holds invalid settings.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        Self::from_yaml(&fs::read_to_string(path)?)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.price_precision > MAX_PRECISION {
            return Err(SettingsError::Precision(self.price_precision));
        }

        self.display_currency().map(|_| ())
    }

    /// Round `amount` to the configured precision.
    pub fn round(&self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.price_precision, self.rounding.into())
    }

    /// Currency prices are displayed in.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::UnknownCurrency`] if the configured code is not supported.
    pub fn display_currency(&self) -> Result<&'static Currency, SettingsError> {
        currency_from_code(&self.display_currency)
            .ok_or_else(|| SettingsError::UnknownCurrency(self.display_currency.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use testresult::TestResult;

    use super::*;

    #[test]
    fn missing_keys_keep_their_defaults() -> TestResult {
        let settings = EngineSettings::from_yaml("rounding: bankers\n")?;

        assert_eq!(settings.rounding, Rounding::Bankers);
        assert_eq!(settings.price_precision, 2);
        assert!(settings.cap_discount_at_line_total);

        Ok(())
    }

    #[test]
    fn rounding_follows_the_configured_mode() -> TestResult {
        let away = EngineSettings::default();
        let bankers = EngineSettings::from_yaml("rounding: bankers")?;

        assert_eq!(away.round(Decimal::new(1125, 3)), Decimal::new(113, 2));
        assert_eq!(bankers.round(Decimal::new(1125, 3)), Decimal::new(112, 2));

        Ok(())
    }

    #[test]
    fn invalid_settings_are_rejected() {
        assert!(matches!(
            EngineSettings::from_yaml("display_currency: XYZ"),
            Err(SettingsError::UnknownCurrency(code)) if code == "XYZ"
        ));
        assert!(matches!(
            EngineSettings::from_yaml("price_precision: 40"),
            Err(SettingsError::Precision(40))
        ));
        assert!(matches!(
            EngineSettings::from_yaml("unknown_key: 1"),
            Err(SettingsError::Yaml(_))
        ));
    }

    #[test]
    fn settings_load_from_a_file() -> TestResult {
        let mut file = tempfile::NamedTempFile::new()?;

        writeln!(file, "price_precision: 3\ndisplay_currency: usd")?;

        let settings = EngineSettings::load(file.path())?;

        assert_eq!(settings.price_precision, 3);
        assert_eq!(settings.display_currency()?.iso_alpha_code, "USD");

        Ok(())
    }
}

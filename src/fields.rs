//! Field Bags
//!
//! Condition and action hosts are persisted with a flat string key/value configuration. Every
//! built-in condition and action reads its typed configuration out of that bag through
//! [`FieldReader`] once, when it is instantiated.

use std::str::FromStr;

use decimal_percentage::Percentage;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use thiserror::Error;

/// Raw key/value configuration of a condition or action host.
pub type Fields = FxHashMap<String, String>;

/// Errors raised while reading a typed value out of a field bag.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FieldError {
    /// A required field was absent or blank.
    #[error("missing field `{0}`")]
    Missing(String),

    /// A field was present but its value could not be parsed.
    #[error("field `{field}` has invalid value `{value}`: {reason}")]
    Invalid {
        /// Field name
        field: String,

        /// Raw value found in the bag
        value: String,

        /// What was expected
        reason: &'static str,
    },
}

/// Typed reader over a [`Fields`] bag.
#[derive(Debug, Clone, Copy)]
pub struct FieldReader<'a> {
    fields: &'a Fields,
}

impl<'a> FieldReader<'a> {
    /// Create a reader over the given fields.
    pub fn new(fields: &'a Fields) -> Self {
        Self { fields }
    }

    /// Return the trimmed value of a field, treating blank values as absent.
    pub fn optional(&self, name: &str) -> Option<&'a str> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Return the trimmed value of a required field.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Missing`] if the field is absent or blank.
    pub fn required(&self, name: &str) -> Result<&'a str, FieldError> {
        self.optional(name)
            .ok_or_else(|| FieldError::Missing(name.to_string()))
    }

    /// Parse a required field with [`FromStr`].
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Missing`] if the field is absent, or [`FieldError::Invalid`] if it
    /// does not parse.
    pub fn parse<T: FromStr>(&self, name: &str, reason: &'static str) -> Result<T, FieldError> {
        let raw = self.required(name)?;

        raw.parse::<T>().map_err(|_err| FieldError::Invalid {
            field: name.to_string(),
            value: raw.to_string(),
            reason,
        })
    }

    /// Parse a required decimal amount.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if the field is missing or not a decimal number.
    pub fn decimal(&self, name: &str) -> Result<Decimal, FieldError> {
        self.parse(name, "expected a decimal amount")
    }

    /// Parse a required decimal amount that is zero or more.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if the field is missing, not a decimal number, or negative.
    pub fn non_negative_decimal(&self, name: &str) -> Result<Decimal, FieldError> {
        let amount = self.decimal(name)?;

        if amount < Decimal::ZERO {
            return Err(self.negative(name));
        }

        Ok(amount)
    }

    /// Parse a required non-negative integer.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if the field is missing or not an unsigned integer.
    pub fn u32(&self, name: &str) -> Result<u32, FieldError> {
        self.parse(name, "expected an unsigned integer")
    }

    /// Parse a required percentage, given either as `"15%"` or as a fraction such as `"0.15"`.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if the field is missing or is not a number.
    pub fn percentage(&self, name: &str) -> Result<Percentage, FieldError> {
        self.fraction(name).map(Percentage::from)
    }

    /// Parse a required percentage that is zero or more.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if the field is missing, is not a number, or is negative.
    pub fn non_negative_percentage(&self, name: &str) -> Result<Percentage, FieldError> {
        let fraction = self.fraction(name)?;

        if fraction < Decimal::ZERO {
            return Err(self.negative(name));
        }

        Ok(Percentage::from(fraction))
    }

    fn fraction(&self, name: &str) -> Result<Decimal, FieldError> {
        let raw = self.required(name)?;
        let invalid = || FieldError::Invalid {
            field: name.to_string(),
            value: raw.to_string(),
            reason: "expected a percentage such as `15%` or `0.15`",
        };

        let fraction = if let Some(points) = raw.strip_suffix('%') {
            points
                .trim()
                .parse::<Decimal>()
                .ok()
                .and_then(|points| points.checked_div(Decimal::ONE_HUNDRED))
                .ok_or_else(invalid)?
        } else {
            raw.parse::<Decimal>().map_err(|_err| invalid())?
        };

        Ok(fraction.normalize())
    }

    fn negative(&self, name: &str) -> FieldError {
        FieldError::Invalid {
            field: name.to_string(),
            value: self.optional(name).unwrap_or_default().to_string(),
            reason: "expected a value of zero or more",
        }
    }

    /// Parse a required comma-separated list into its trimmed, non-empty entries.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Missing`] if the field is absent or lists nothing.
    pub fn list(&self, name: &str) -> Result<SmallVec<[&'a str; 4]>, FieldError> {
        let entries: SmallVec<[&'a str; 4]> = self
            .required(name)?
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .collect();

        if entries.is_empty() {
            return Err(FieldError::Missing(name.to_string()));
        }

        Ok(entries)
    }

    /// Parse every entry of a required comma-separated list with [`FromStr`].
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] if the list is missing or any entry does not parse.
    pub fn parsed_list<T: FromStr>(
        &self,
        name: &str,
        reason: &'static str,
    ) -> Result<SmallVec<[T; 4]>, FieldError> {
        self.list(name)?
            .into_iter()
            .map(|entry| {
                entry.parse::<T>().map_err(|_err| FieldError::Invalid {
                    field: name.to_string(),
                    value: entry.to_string(),
                    reason,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect()
    }

    #[test]
    fn blank_values_are_treated_as_missing() {
        let bag = fields(&[("amount", "   ")]);
        let reader = FieldReader::new(&bag);

        assert_eq!(reader.optional("amount"), None);
        assert_eq!(
            reader.required("amount"),
            Err(FieldError::Missing("amount".to_string()))
        );
    }

    #[test]
    fn decimal_parses_and_reports_invalid_values() -> TestResult {
        let bag = fields(&[("amount", "12.50"), ("broken", "twelve")]);
        let reader = FieldReader::new(&bag);

        assert_eq!(reader.decimal("amount")?, Decimal::new(1250, 2));
        assert!(matches!(
            reader.decimal("broken"),
            Err(FieldError::Invalid { field, .. }) if field == "broken"
        ));

        Ok(())
    }

    #[test]
    fn percentage_accepts_points_and_fractions() -> TestResult {
        let bag = fields(&[("points", "10%"), ("fraction", "0.1")]);
        let reader = FieldReader::new(&bag);

        let hundred = Decimal::new(100, 0);

        assert_eq!(reader.percentage("points")? * hundred, Decimal::new(10, 0));
        assert_eq!(reader.percentage("fraction")? * hundred, Decimal::new(10, 0));

        Ok(())
    }

    #[test]
    fn negative_amounts_and_percentages_are_rejected() -> TestResult {
        let bag = fields(&[("amount", "-5"), ("percent", "-10%"), ("zero", "0")]);
        let reader = FieldReader::new(&bag);

        assert!(matches!(
            reader.non_negative_decimal("amount"),
            Err(FieldError::Invalid { value, .. }) if value == "-5"
        ));
        assert!(matches!(
            reader.non_negative_percentage("percent"),
            Err(FieldError::Invalid { .. })
        ));
        assert_eq!(reader.non_negative_decimal("zero")?, Decimal::ZERO);
        assert_eq!(reader.decimal("amount")?, Decimal::new(-5, 0));

        Ok(())
    }

    #[test]
    fn list_splits_and_trims_entries() -> TestResult {
        let bag = fields(&[("groups", " 1, 2 ,,3 "), ("empty", " , ")]);
        let reader = FieldReader::new(&bag);

        let groups: SmallVec<[u32; 4]> = reader.parsed_list("groups", "expected group ids")?;

        assert_eq!(groups.as_slice(), &[1, 2, 3]);
        assert!(matches!(reader.list("empty"), Err(FieldError::Missing(_))));

        Ok(())
    }
}

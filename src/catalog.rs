//! Catalog
//!
//! Identifiers shared across the engine, the product lookup collaborator, and resolution of
//! option-matrix variant records against their base product.

use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use rusty_money::iso::Currency;
use serde::Deserialize;
use thiserror::Error;
use tracing::trace;

use crate::currency::{CurrencyConverter, CurrencyError, convert_if_needed};

/// Product identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub u64);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProductId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Customer group identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct CustomerGroupId(pub u32);

impl fmt::Display for CustomerGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CustomerGroupId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Option-matrix variant identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct VariantId(pub u64);

/// Errors raised while resolving catalog records.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// The product lookup collaborator does not know the product.
    #[error("unknown product {0}")]
    UnknownProduct(ProductId),

    /// A price could not be converted into the display currency.
    #[error(transparent)]
    Currency(#[from] CurrencyError),
}

/// Base product properties as returned by the product lookup collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    /// Regular price
    pub price: Decimal,

    /// Sale price, if the product is on sale
    pub sale_price: Option<Decimal>,

    /// Whether the product can currently be purchased
    pub in_stock: bool,

    /// Shipping volume
    pub volume: Option<Decimal>,

    /// Currency the prices are stored in
    pub currency: &'static Currency,
}

/// Product lookup collaborator.
pub trait ProductLookup: fmt::Debug {
    /// Return the current record for a product.
    fn product(&self, id: ProductId) -> Option<ProductRecord>;
}

/// In-memory product lookup.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    products: FxHashMap<ProductId, ProductRecord>,
}

impl InMemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a product record.
    #[must_use]
    pub fn with_product(mut self, id: ProductId, record: ProductRecord) -> Self {
        self.products.insert(id, record);

        self
    }
}

impl ProductLookup for InMemoryCatalog {
    fn product(&self, id: ProductId) -> Option<ProductRecord> {
        self.products.get(&id).cloned()
    }
}

/// Option-matrix variant record. Every `None` property falls back to the base product.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantRecord {
    /// Variant identifier
    pub id: VariantId,

    /// Base product the variant belongs to
    pub product_id: ProductId,

    /// Price override
    pub price: Option<Decimal>,

    /// Sale price override
    pub sale_price: Option<Decimal>,

    /// Stock status override
    pub in_stock: Option<bool>,

    /// Volume override
    pub volume: Option<Decimal>,

    /// Currency the variant's own prices are stored in, if different from the product's
    pub currency: Option<&'static Currency>,
}

impl VariantRecord {
    /// Create a variant that overrides nothing.
    pub fn new(id: VariantId, product_id: ProductId) -> Self {
        Self {
            id,
            product_id,
            price: None,
            sale_price: None,
            in_stock: None,
            volume: None,
            currency: None,
        }
    }
}

/// Fully resolved properties of a purchasable record, in the display currency.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRecord {
    /// Base product
    pub product_id: ProductId,

    /// Regular price
    pub price: Decimal,

    /// Sale price
    pub sale_price: Option<Decimal>,

    /// Stock status
    pub in_stock: bool,

    /// Shipping volume
    pub volume: Option<Decimal>,

    /// Display currency
    pub currency: &'static Currency,
}

impl ResolvedRecord {
    /// The price a customer pays before discounts: the sale price when set, else the regular price.
    pub fn current_price(&self) -> Decimal {
        self.sale_price.unwrap_or(self.price)
    }
}

/// Resolves variant records against the product lookup, caching results for one request.
#[derive(Debug)]
pub struct RecordResolver<'a> {
    lookup: &'a dyn ProductLookup,
    converter: &'a dyn CurrencyConverter,
    display_currency: &'static Currency,
    precision: u32,
    cache: FxHashMap<VariantId, ResolvedRecord>,
}

impl<'a> RecordResolver<'a> {
    /// Create a resolver producing prices in `display_currency`, rounded to `precision` places.
    pub fn new(
        lookup: &'a dyn ProductLookup,
        converter: &'a dyn CurrencyConverter,
        display_currency: &'static Currency,
        precision: u32,
    ) -> Self {
        Self {
            lookup,
            converter,
            display_currency,
            precision,
            cache: FxHashMap::default(),
        }
    }

    /// Resolve a base product without any variant overrides.
    ///
    /// # Errors
    ///
    /// Returns a [`CatalogError`] if the product is unknown or its prices cannot be converted.
    pub fn resolve_product(&self, id: ProductId) -> Result<ResolvedRecord, CatalogError> {
        let product = self
            .lookup
            .product(id)
            .ok_or(CatalogError::UnknownProduct(id))?;

        Ok(ResolvedRecord {
            product_id: id,
            price: self.display(product.price, product.currency)?,
            sale_price: product
                .sale_price
                .map(|price| self.display(price, product.currency))
                .transpose()?,
            in_stock: product.in_stock,
            volume: product.volume,
            currency: self.display_currency,
        })
    }

    /// Resolve a variant, falling back to its base product for every property it does not set.
    ///
    /// The base product is only consulted when at least one property is missing.
    ///
    /// # Errors
    ///
    /// Returns a [`CatalogError`] if a fallback is needed for an unknown product, or a price
    /// cannot be converted.
    pub fn resolve(&mut self, variant: &VariantRecord) -> Result<&ResolvedRecord, CatalogError> {
        if !self.cache.contains_key(&variant.id) {
            let resolved = self.resolve_uncached(variant)?;

            self.cache.insert(variant.id, resolved);
        }

        self.cache
            .get(&variant.id)
            .ok_or(CatalogError::UnknownProduct(variant.product_id))
    }

    /// Drop every cached record.
    pub fn reset(&mut self) {
        self.cache.clear();
    }

    /// Number of cached records.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn resolve_uncached(&self, variant: &VariantRecord) -> Result<ResolvedRecord, CatalogError> {
        let complete = variant.price.is_some()
            && variant.sale_price.is_some()
            && variant.in_stock.is_some()
            && variant.volume.is_some();

        let product = if complete {
            None
        } else {
            trace!(variant = variant.id.0, "variant falls back to product lookup");

            Some(
                self.lookup
                    .product(variant.product_id)
                    .ok_or(CatalogError::UnknownProduct(variant.product_id))?,
            )
        };

        let variant_currency = variant
            .currency
            .or_else(|| product.as_ref().map(|product| product.currency))
            .unwrap_or(self.display_currency);

        let price = match (variant.price, &product) {
            (Some(price), _) => self.display(price, variant_currency)?,
            (None, Some(product)) => self.display(product.price, product.currency)?,
            (None, None) => return Err(CatalogError::UnknownProduct(variant.product_id)),
        };

        let sale_price = match (variant.sale_price, &product) {
            (Some(price), _) => Some(self.display(price, variant_currency)?),
            (None, Some(product)) => product
                .sale_price
                .map(|price| self.display(price, product.currency))
                .transpose()?,
            (None, None) => None,
        };

        Ok(ResolvedRecord {
            product_id: variant.product_id,
            price,
            sale_price,
            in_stock: variant
                .in_stock
                .or_else(|| product.as_ref().map(|product| product.in_stock))
                .unwrap_or(false),
            volume: variant
                .volume
                .or_else(|| product.as_ref().and_then(|product| product.volume)),
            currency: self.display_currency,
        })
    }

    fn display(&self, amount: Decimal, from: &'static Currency) -> Result<Decimal, CurrencyError> {
        convert_if_needed(
            self.converter,
            amount,
            from,
            self.display_currency,
            self.precision,
        )
    }
}

//! Catalog Fixtures

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::{
    cart::{Attributes, LineItem},
    catalog::{InMemoryCatalog, ProductId, ProductRecord, VariantId, VariantRecord},
    fixtures::{
        FixtureError,
        carts::{parse_price, price_in},
    },
    legacy::lenient,
};

/// Wrapper for catalog products and their option-matrix variants in YAML
#[derive(Debug, Deserialize)]
pub struct CatalogFixture {
    /// Base products by id
    #[serde(default)]
    pub products: FxHashMap<ProductId, ProductFixture>,

    /// Variants, matched to cart lines by product and options
    #[serde(default)]
    pub variants: Vec<VariantFixture>,
}

/// Product Fixture
#[derive(Debug, Deserialize)]
pub struct ProductFixture {
    /// Regular price (e.g., "12.50 GBP")
    pub price: String,

    /// Sale price, in the same currency
    #[serde(default)]
    pub sale_price: Option<String>,

    /// Stock status
    #[serde(default = "in_stock")]
    pub in_stock: bool,

    /// Shipping volume
    #[serde(default, deserialize_with = "lenient")]
    pub volume: Option<Decimal>,
}

/// Variant Fixture
#[derive(Debug, Deserialize)]
pub struct VariantFixture {
    /// Variant identifier
    pub id: VariantId,

    /// Base product
    pub product: ProductId,

    /// Options a line must carry to be this variant
    #[serde(default)]
    pub options: Attributes,

    /// Price override
    #[serde(default)]
    pub price: Option<String>,

    /// Sale price override, in the price's currency
    #[serde(default)]
    pub sale_price: Option<String>,

    /// Stock status override
    #[serde(default)]
    pub in_stock: Option<bool>,

    /// Volume override
    #[serde(default, deserialize_with = "lenient")]
    pub volume: Option<Decimal>,
}

fn in_stock() -> bool {
    true
}

/// A variant and the options that select it.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionVariant {
    /// Options a line must carry
    pub options: Attributes,

    /// Stored variant record
    pub record: VariantRecord,
}

impl OptionVariant {
    /// Whether `line` is this variant: same product, and every variant option set on the line.
    pub fn matches(&self, line: &LineItem) -> bool {
        self.record.product_id == line.product_id()
            && self
                .options
                .iter()
                .all(|(name, value)| line.options().get(name) == Some(value))
    }
}

impl CatalogFixture {
    /// Build the product lookup and the variant list.
    ///
    /// # Errors
    ///
    /// Returns an error if a price is malformed, or a sale price is in another currency than its
    /// price.
    pub fn into_parts(self) -> Result<(InMemoryCatalog, Vec<OptionVariant>), FixtureError> {
        let mut catalog = InMemoryCatalog::new();

        for (id, product) in self.products {
            let (price, currency) = parse_price(&product.price)?;

            let record = ProductRecord {
                price,
                sale_price: product
                    .sale_price
                    .map(|sale| price_in(&sale, currency))
                    .transpose()?,
                in_stock: product.in_stock,
                volume: product.volume,
                currency,
            };

            catalog = catalog.with_product(id, record);
        }

        let variants = self
            .variants
            .into_iter()
            .map(VariantFixture::into_variant)
            .collect::<Result<_, _>>()?;

        Ok((catalog, variants))
    }
}

impl VariantFixture {
    fn into_variant(self) -> Result<OptionVariant, FixtureError> {
        let mut record = VariantRecord::new(self.id, self.product);

        if let Some(price) = &self.price {
            let (price, currency) = parse_price(price)?;

            record.price = Some(price);
            record.currency = Some(currency);
        }

        if let Some(sale) = &self.sale_price {
            record.sale_price = Some(match record.currency {
                Some(currency) => price_in(sale, currency)?,
                None => {
                    let (sale, currency) = parse_price(sale)?;

                    record.currency = Some(currency);

                    sale
                }
            });
        }

        record.in_stock = self.in_stock;
        record.volume = self.volume;

        Ok(OptionVariant {
            options: self.options,
            record,
        })
    }
}

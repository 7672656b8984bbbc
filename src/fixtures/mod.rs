//! Fixtures
//!
//! YAML fixture sets for demos and tests. A set named `wholesale` is read from
//! `rules/wholesale.yml`, `carts/wholesale.yml` and, when present, `tiers/wholesale.yml` and
//! `catalog/wholesale.yml`.

use std::{fs, path::PathBuf};

use rustc_hash::FxHashMap;
use rusty_money::iso::Currency;
use thiserror::Error;

use crate::{
    cart::{Cart, LineKey, merge::CartLineMerger},
    catalog::{CatalogError, CustomerGroupId, InMemoryCatalog, RecordResolver, ResolvedRecord},
    conditions::{ConditionNode, cache::InMemoryConditionSource},
    context::Parameters,
    currency::{FixedRateConverter, currency_from_code},
    engine::Rule,
    fixtures::{
        carts::CartFixture,
        catalog::{CatalogFixture, OptionVariant},
        rules::RulesFixture,
        tiers::TiersFixture,
    },
    settings::EngineSettings,
    tiers::{
        TierTable, TierTableId,
        cache::{InMemoryTierSource, TierCache},
    },
};

pub mod carts;
pub mod catalog;
pub mod rules;
pub mod tiers;

/// Fixture Parsing Errors
#[derive(Debug, Error)]
pub enum FixtureError {
    /// IO error reading fixture files
    #[error("Failed to read fixture file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_norway::Error),

    /// Invalid price format
    #[error("Invalid price format: {0}")]
    InvalidPrice(String),

    /// Unknown currency code
    #[error("Unknown currency code: {0}")]
    UnknownCurrency(String),

    /// Currency mismatch between lines
    #[error("Currency mismatch: expected {0}, found {1}")]
    CurrencyMismatch(String, String),

    /// No cart loaded yet
    #[error("No cart loaded")]
    NoCart,

    /// Cart has neither a currency nor any lines to take one from
    #[error("Cart currency unknown")]
    NoCurrency,

    /// A catalog record could not be resolved
    #[error("Failed to resolve catalog record: {0}")]
    Catalog(#[from] CatalogError),
}

/// Fixture
#[derive(Debug)]
pub struct Fixture {
    /// Base path for fixture files
    base_path: PathBuf,

    /// Rules in evaluation order
    rules: Vec<Rule>,

    /// Condition nodes referenced by the rules
    conditions: InMemoryConditionSource,

    /// Stored tier tables
    tiers: InMemoryTierSource,

    /// Base products
    catalog: InMemoryCatalog,

    /// Option-matrix variants of the base products
    variants: Vec<OptionVariant>,

    /// Cart as described, before merging
    cart: Option<CartFixture>,
}

impl Fixture {
    /// Create a new empty fixture with default base path
    pub fn new() -> Self {
        Self::with_base_path("./fixtures")
    }

    /// Create a new empty fixture with custom base path
    pub fn with_base_path(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            rules: Vec::new(),
            conditions: InMemoryConditionSource::default(),
            tiers: InMemoryTierSource::default(),
            catalog: InMemoryCatalog::default(),
            variants: Vec::new(),
            cart: None,
        }
    }

    /// Load rules and their condition nodes from a YAML fixture file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_rules(&mut self, name: &str) -> Result<&mut Self, FixtureError> {
        let file_path = self.base_path.join("rules").join(format!("{name}.yml"));
        let contents = fs::read_to_string(&file_path)?;
        let fixture: RulesFixture = serde_norway::from_str(&contents)?;

        for node in fixture.conditions {
            self.conditions.push(node);
        }

        self.rules.extend(fixture.rules);

        Ok(self)
    }

    /// Load a cart from a YAML fixture file, replacing any cart loaded before
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_cart(&mut self, name: &str) -> Result<&mut Self, FixtureError> {
        let file_path = self.base_path.join("carts").join(format!("{name}.yml"));
        let contents = fs::read_to_string(&file_path)?;

        self.cart = Some(serde_norway::from_str(&contents)?);

        Ok(self)
    }

    /// Load tier tables from a YAML fixture file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_tiers(&mut self, name: &str) -> Result<&mut Self, FixtureError> {
        let file_path = self.base_path.join("tiers").join(format!("{name}.yml"));
        let contents = fs::read_to_string(&file_path)?;
        let fixture: TiersFixture = serde_norway::from_str(&contents)?;

        self.tiers = fixture.into_source(std::mem::take(&mut self.tiers));

        Ok(self)
    }

    /// Load catalog products and variants from a YAML fixture file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or a price is invalid.
    pub fn load_catalog(&mut self, name: &str) -> Result<&mut Self, FixtureError> {
        let file_path = self.base_path.join("catalog").join(format!("{name}.yml"));
        let contents = fs::read_to_string(&file_path)?;
        let fixture: CatalogFixture = serde_norway::from_str(&contents)?;
        let (catalog, variants) = fixture.into_parts()?;

        self.catalog = catalog;
        self.variants = variants;

        Ok(self)
    }

    /// Load a complete fixture set (rules, cart and, if present, tier tables and catalog with the
    /// same name)
    ///
    /// # Errors
    ///
    /// Returns an error if any of the fixture files cannot be loaded.
    pub fn from_set(name: &str) -> Result<Self, FixtureError> {
        Self::from_set_in("./fixtures", name)
    }

    /// Load a complete fixture set from `base_path`
    ///
    /// # Errors
    ///
    /// Returns an error if any of the fixture files cannot be loaded.
    pub fn from_set_in(base_path: impl Into<PathBuf>, name: &str) -> Result<Self, FixtureError> {
        let mut fixture = Self::with_base_path(base_path);

        fixture.load_rules(name)?.load_cart(name)?;

        if fixture.has_file("tiers", name) {
            fixture.load_tiers(name)?;
        }

        if fixture.has_file("catalog", name) {
            fixture.load_catalog(name)?;
        }

        Ok(fixture)
    }

    fn has_file(&self, category: &str, name: &str) -> bool {
        self.base_path
            .join(category)
            .join(format!("{name}.yml"))
            .exists()
    }

    /// Get all rules
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Get the condition source
    pub fn conditions(&self) -> &InMemoryConditionSource {
        &self.conditions
    }

    /// Add a condition node, e.g. to break a loaded tree in a test
    pub fn push_condition(&mut self, node: ConditionNode) {
        self.conditions.push(node);
    }

    /// Get the tier table source
    pub fn tiers(&self) -> &InMemoryTierSource {
        &self.tiers
    }

    /// Get the evaluation parameters of the loaded cart
    ///
    /// # Errors
    ///
    /// Returns an error if no cart is loaded.
    pub fn parameters(&self) -> Result<Parameters, FixtureError> {
        let cart = self.cart.as_ref().ok_or(FixtureError::NoCart)?;

        Ok(cart
            .parameters
            .iter()
            .fold(Parameters::new(), |parameters, (name, value)| {
                parameters.with(name.clone(), value.clone())
            }))
    }

    /// Get the currency of the loaded cart
    ///
    /// # Errors
    ///
    /// Returns an error if no cart is loaded or its currency cannot be determined.
    pub fn currency(&self) -> Result<&'static Currency, FixtureError> {
        let cart = self.cart.as_ref().ok_or(FixtureError::NoCart)?;

        match &cart.currency {
            Some(code) => {
                currency_from_code(code).ok_or_else(|| FixtureError::UnknownCurrency(code.clone()))
            }
            None => cart
                .lines
                .first()
                .ok_or(FixtureError::NoCurrency)?
                .currency(),
        }
    }

    /// Build the cart: lines are added through the merger in fixture order, then lines with a
    /// tier table are repriced for their merged quantity and the cart's customer group.
    ///
    /// # Errors
    ///
    /// Returns an error if no cart is loaded or a line is invalid.
    pub fn cart(&self) -> Result<Cart, FixtureError> {
        let fixture = self.cart.as_ref().ok_or(FixtureError::NoCart)?;
        let currency = self.currency()?;

        let mut cart = Cart::new(currency);

        if let Some(group) = fixture.customer_group {
            cart = cart.with_customer_group(group);
        }

        let merger = CartLineMerger::new();
        let mut tiered: FxHashMap<LineKey, TierTableId> = FxHashMap::default();

        for line in &fixture.lines {
            let key = merger.add(&mut cart, line.to_line(currency)?).key();

            if let Some(table) = line.tier_table {
                tiered.entry(key).or_insert(table);
            }
        }

        let mut cache = TierCache::new();

        for (key, table) in tiered {
            reprice(&mut cart, key, cache.table(&self.tiers, table), fixture.customer_group);
        }

        Ok(cart)
    }

    /// Resolve the catalog record behind every line of `cart`, in the cart's currency.
    ///
    /// A line carrying every option of a variant of its product resolves through that variant;
    /// other lines resolve to their base product. Lines of products missing from the catalog
    /// have no record.
    ///
    /// # Errors
    ///
    /// Returns an error if a record's prices cannot be converted into the cart's currency.
    pub fn records(
        &self,
        cart: &Cart,
        settings: &EngineSettings,
    ) -> Result<FxHashMap<LineKey, ResolvedRecord>, FixtureError> {
        let converter = FixedRateConverter::new();
        let mut resolver = RecordResolver::new(
            &self.catalog,
            &converter,
            cart.currency(),
            settings.price_precision,
        );

        let mut records = FxHashMap::default();

        for (key, line) in cart.iter() {
            let record = match self.variants.iter().find(|variant| variant.matches(line)) {
                Some(variant) => resolver.resolve(&variant.record).cloned(),
                None => resolver.resolve_product(line.product_id()),
            };

            match record {
                Ok(record) => {
                    records.insert(key, record);
                }
                Err(CatalogError::UnknownProduct(_)) => {}
                Err(error) => return Err(error.into()),
            }
        }

        Ok(records)
    }
}

fn reprice(
    cart: &mut Cart,
    key: LineKey,
    table: &TierTable,
    group: Option<CustomerGroupId>,
) {
    if let Some(line) = cart.get_mut(key) {
        let price = table.resolve(group, line.quantity(), line.unit_price());

        line.set_unit_price(price);
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use rust_decimal::Decimal;
    use rusty_money::iso::GBP;
    use testresult::TestResult;

    use super::*;

    fn write_fixture(base: &Path, category: &str, name: &str, contents: &str) -> TestResult {
        let dir = base.join(category);

        fs::create_dir_all(&dir)?;
        fs::write(dir.join(format!("{name}.yml")), contents)?;

        Ok(())
    }

    #[test]
    fn fixture_from_set_loads_rules_cart_and_tiers() -> TestResult {
        let fixture = Fixture::from_set("wholesale")?;

        assert!(!fixture.rules().is_empty());
        assert_eq!(fixture.currency()?, GBP);
        assert!(!fixture.cart()?.is_empty());

        Ok(())
    }

    #[test]
    fn fixture_cart_merges_lines_and_applies_tier_prices() -> TestResult {
        let dir = tempfile::tempdir()?;

        write_fixture(
            dir.path(),
            "rules",
            "tiny",
            "rules:\n  - {id: 1, action: {class: cart_percentage, fields: {percent: 10%}}}\n",
        )?;
        write_fixture(
            dir.path(),
            "carts",
            "tiny",
            "customer_group: 2\n\
             lines:\n\
             \x20 - {product: 1, quantity: 3, price: 10.00 GBP, tier_table: 1}\n\
             \x20 - {product: 1, quantity: 3, price: 10.00 GBP, tier_table: 1}\n",
        )?;
        write_fixture(
            dir.path(),
            "tiers",
            "tiny",
            "tables:\n\
             \x20 1:\n\
             \x20   blob: '- {quantity: 5, customer_group_id: 2, price: 8}'\n",
        )?;

        let fixture = Fixture::from_set_in(dir.path(), "tiny")?;
        let cart = fixture.cart()?;

        assert_eq!(cart.len(), 1);
        assert_eq!(cart.quantity(), 6);
        assert_eq!(cart.subtotal(), Decimal::new(48, 0));

        Ok(())
    }

    #[test]
    fn fixture_cart_rejects_mixed_currencies() -> TestResult {
        let dir = tempfile::tempdir()?;

        write_fixture(
            dir.path(),
            "carts",
            "mixed",
            "lines:\n\
             \x20 - {product: 1, price: 1.00 GBP}\n\
             \x20 - {product: 2, price: 1.00 USD}\n",
        )?;

        let mut fixture = Fixture::with_base_path(dir.path());

        fixture.load_cart("mixed")?;

        assert!(matches!(fixture.cart(), Err(FixtureError::CurrencyMismatch(_, _))));

        Ok(())
    }

    #[test]
    fn fixture_without_cart_returns_error() {
        let fixture = Fixture::new();

        assert!(matches!(fixture.cart(), Err(FixtureError::NoCart)));
        assert!(matches!(fixture.parameters(), Err(FixtureError::NoCart)));
    }

    #[test]
    fn fixture_empty_cart_without_currency_returns_error() -> TestResult {
        let dir = tempfile::tempdir()?;

        write_fixture(dir.path(), "carts", "empty", "lines: []\n")?;

        let mut fixture = Fixture::with_base_path(dir.path());

        fixture.load_cart("empty")?;

        assert!(matches!(fixture.currency(), Err(FixtureError::NoCurrency)));

        Ok(())
    }

    #[test]
    fn fixture_default_matches_new() {
        let fixture = Fixture::default();

        assert_eq!(fixture.base_path, PathBuf::from("./fixtures"));
        assert!(fixture.rules.is_empty());
        assert!(fixture.cart.is_none());
    }
}

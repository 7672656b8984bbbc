//! Cart
//!
//! Cart lines, the bundle linkage between a master line and its component lines, and the
//! per-line attribute maps that make up a line's purchasable configuration.

use std::fmt;

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use rusty_money::iso::Currency;
use serde::Deserialize;
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use crate::catalog::{CustomerGroupId, ProductId};

pub mod identity;
pub mod merge;

new_key_type! {
    /// Cart line key
    pub struct LineKey;
}

/// Key a master line exposes so that bundle component lines can attach to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct CartKey(String);

impl CartKey {
    /// Create a cart key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the key as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CartKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an item slot within a bundle offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct BundleItemId(pub u64);

/// Links a bundle component line to its master line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BundleLink {
    /// Cart key of the master line
    pub master_cart_key: CartKey,

    /// Bundle item slot the component fills
    pub master_item_id: BundleItemId,

    /// Product configured for the bundle item slot
    pub master_item_product_id: ProductId,
}

/// Value of a line option, extra or custom data entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Boolean flag
    Bool(bool),

    /// Integer value
    Integer(i64),

    /// Text value
    Text(String),

    /// Multiple values. Not a scalar, so lines carrying one cannot be fingerprinted.
    List(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Whether the value is a single scalar.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Self::List(_))
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Named attribute values attached to a line.
pub type Attributes = FxHashMap<String, AttributeValue>;

/// A single cart line.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    product_id: ProductId,
    quantity: u32,
    unit_price: Decimal,
    unit_price_with_tax: Option<Decimal>,
    options: Attributes,
    extras: Attributes,
    custom_data: Attributes,
    uploaded_files: SmallVec<[String; 2]>,
    cart_key: Option<CartKey>,
    bundle: Option<BundleLink>,
}

impl LineItem {
    /// Create a line for `quantity` units of a product at `unit_price`.
    pub fn new(product_id: ProductId, quantity: u32, unit_price: Decimal) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
            unit_price_with_tax: None,
            options: Attributes::default(),
            extras: Attributes::default(),
            custom_data: Attributes::default(),
            uploaded_files: SmallVec::new(),
            cart_key: None,
            bundle: None,
        }
    }

    /// Set an option value.
    #[must_use]
    pub fn with_option(
        mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    /// Set an extra value.
    #[must_use]
    pub fn with_extra(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.extras.insert(name.into(), value.into());
        self
    }

    /// Set a custom data value.
    #[must_use]
    pub fn with_custom_data(
        mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.custom_data.insert(name.into(), value.into());
        self
    }

    /// Attach the fingerprint of an uploaded file.
    #[must_use]
    pub fn with_uploaded_file(mut self, fingerprint: impl Into<String>) -> Self {
        self.uploaded_files.push(fingerprint.into());
        self
    }

    /// Set the tax-inclusive unit price.
    #[must_use]
    pub fn with_unit_price_with_tax(mut self, price: Decimal) -> Self {
        self.unit_price_with_tax = Some(price);
        self
    }

    /// Set the key bundle components use to attach to this line.
    #[must_use]
    pub fn with_cart_key(mut self, key: CartKey) -> Self {
        self.cart_key = Some(key);
        self
    }

    /// Mark this line as a component of a bundle master.
    #[must_use]
    pub fn as_component_of(mut self, link: BundleLink) -> Self {
        self.bundle = Some(link);
        self
    }

    /// Product of the line.
    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    /// Number of units.
    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Net unit price.
    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    /// Tax-inclusive unit price, defaulting to the net price.
    pub fn unit_price_with_tax(&self) -> Decimal {
        self.unit_price_with_tax.unwrap_or(self.unit_price)
    }

    /// Net line total.
    pub fn total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    /// Tax-inclusive line total.
    pub fn total_with_tax(&self) -> Decimal {
        self.unit_price_with_tax() * Decimal::from(self.quantity)
    }

    /// Selected options.
    pub fn options(&self) -> &Attributes {
        &self.options
    }

    /// Selected extras.
    pub fn extras(&self) -> &Attributes {
        &self.extras
    }

    /// Custom data.
    pub fn custom_data(&self) -> &Attributes {
        &self.custom_data
    }

    /// Fingerprints of uploaded files, in upload order.
    pub fn uploaded_files(&self) -> &[String] {
        &self.uploaded_files
    }

    /// Key components use to attach to this line.
    pub fn cart_key(&self) -> Option<&CartKey> {
        self.cart_key.as_ref()
    }

    /// Bundle linkage, when this line is a component.
    pub fn bundle(&self) -> Option<&BundleLink> {
        self.bundle.as_ref()
    }

    /// Whether this line is a component of a bundle master.
    pub fn is_bundle_component(&self) -> bool {
        self.bundle.is_some()
    }

    /// Whether this line is a component attached under `key`.
    pub fn is_component_of(&self, key: &CartKey) -> bool {
        self.bundle
            .as_ref()
            .is_some_and(|link| &link.master_cart_key == key)
    }

    /// Replace the net unit price, e.g. after tier resolution.
    pub fn set_unit_price(&mut self, price: Decimal) {
        self.unit_price = price;
    }

    /// Add units to the line.
    pub fn add_quantity(&mut self, quantity: u32) {
        self.quantity = self.quantity.saturating_add(quantity);
    }

    /// Re-attach a component line to a different master.
    pub fn relink(&mut self, master_cart_key: CartKey) {
        if let Some(link) = self.bundle.as_mut() {
            link.master_cart_key = master_cart_key;
        }
    }
}

/// Cart
#[derive(Debug, Clone)]
pub struct Cart {
    lines: SlotMap<LineKey, LineItem>,
    customer_group: Option<CustomerGroupId>,
    currency: &'static Currency,
}

impl Cart {
    /// Create an empty cart.
    pub fn new(currency: &'static Currency) -> Self {
        Self {
            lines: SlotMap::with_key(),
            customer_group: None,
            currency,
        }
    }

    /// Set the customer group of the cart's owner.
    #[must_use]
    pub fn with_customer_group(mut self, group: CustomerGroupId) -> Self {
        self.customer_group = Some(group);
        self
    }

    /// Customer group of the cart's owner.
    pub fn customer_group(&self) -> Option<CustomerGroupId> {
        self.customer_group
    }

    /// Currency of the cart.
    pub fn currency(&self) -> &'static Currency {
        self.currency
    }

    /// Insert a new line without attempting to merge it.
    pub fn insert(&mut self, line: LineItem) -> LineKey {
        self.lines.insert(line)
    }

    /// Remove a line.
    pub fn remove(&mut self, key: LineKey) -> Option<LineItem> {
        self.lines.remove(key)
    }

    /// Get a line.
    pub fn get(&self, key: LineKey) -> Option<&LineItem> {
        self.lines.get(key)
    }

    /// Get a line mutably.
    pub fn get_mut(&mut self, key: LineKey) -> Option<&mut LineItem> {
        self.lines.get_mut(key)
    }

    /// Iterate over every line.
    pub fn iter(&self) -> impl Iterator<Item = (LineKey, &LineItem)> {
        self.lines.iter()
    }

    /// Iterate over the lines that are not bundle components.
    pub fn top_level_lines(&self) -> impl Iterator<Item = (LineKey, &LineItem)> {
        self.lines
            .iter()
            .filter(|(_, line)| !line.is_bundle_component())
    }

    /// Iterate over the component lines attached under `key`.
    pub fn components_of<'a>(
        &'a self,
        key: &'a CartKey,
    ) -> impl Iterator<Item = (LineKey, &'a LineItem)> + 'a {
        self.lines
            .iter()
            .filter(move |(_, line)| line.is_component_of(key))
    }

    /// Net total of every line.
    pub fn subtotal(&self) -> Decimal {
        self.lines.values().map(LineItem::total).sum()
    }

    /// Tax-inclusive total of every line.
    pub fn subtotal_with_tax(&self) -> Decimal {
        self.lines.values().map(LineItem::total_with_tax).sum()
    }

    /// Total number of units across every line.
    pub fn quantity(&self) -> u64 {
        self.lines
            .values()
            .map(|line| u64::from(line.quantity()))
            .sum()
    }

    /// Number of lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the cart has no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

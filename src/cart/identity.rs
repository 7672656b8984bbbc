//! Line Identity
//!
//! A [`LineFingerprint`] is a one-way digest over everything that makes a cart line a distinct
//! purchasable configuration: product, options, extras, custom data, uploaded files, bundle
//! linkage and, for master lines, the normalised composition of their bundle components.
//!
//! Attribute maps are folded in key order, so two lines whose maps hold the same pairs always
//! produce the same fingerprint regardless of insertion order.

use std::{collections::BTreeMap, fmt};

use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use smallvec::SmallVec;
use thiserror::Error;

use crate::cart::{AttributeValue, Attributes, BundleItemId, Cart, LineItem};

/// Errors raised while building a fingerprint from malformed line data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// An attribute value is not a scalar.
    #[error("{section} attribute `{name}` is not a scalar value")]
    NonScalarAttribute {
        /// Attribute map the value was found in
        section: &'static str,

        /// Attribute name
        name: String,
    },

    /// A master line with components has no units, so component ratios are undefined.
    #[error("bundle master has zero quantity")]
    ZeroMasterQuantity,
}

/// Deterministic digest identifying a cart line configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineFingerprint(String);

impl LineFingerprint {
    /// Fingerprint `line`, folding in the composition of the given component lines.
    ///
    /// Only siblings attached under the line's own cart key are considered; anything else passed
    /// in is ignored. The line's quantity is part of the digest only when the line is itself a
    /// bundle component.
    ///
    /// # Errors
    ///
    /// Returns an [`IdentityError`] if the line or one of its components carries a non-scalar
    /// attribute, or if the line has components but no units.
    pub fn of<'a>(
        line: &LineItem,
        siblings: impl IntoIterator<Item = &'a LineItem>,
    ) -> Result<Self, IdentityError> {
        let composition = match line.cart_key() {
            Some(key) => composition(
                line,
                siblings
                    .into_iter()
                    .filter(|sibling| sibling.is_component_of(key)),
            )?,
            None => BTreeMap::new(),
        };

        let mut digest = Material::default();

        digest.field("product", &line.product_id().to_string());
        digest.attributes("options", line.options())?;
        digest.attributes("extras", line.extras())?;
        digest.attributes("custom_data", line.custom_data())?;

        for file in line.uploaded_files() {
            digest.field("file", file);
        }

        if let Some(link) = line.bundle() {
            digest.field("bundle_master_cart_key", link.master_cart_key.as_str());
            digest.field("bundle_master_item_id", &link.master_item_id.0.to_string());
            digest.field(
                "bundle_master_item_product_id",
                &link.master_item_product_id.to_string(),
            );
            digest.field("quantity", &line.quantity().to_string());
        }

        for (item_id, shapes) in &composition {
            digest.field("bundle_item", &item_id.0.to_string());

            for shape in shapes {
                digest.field("component", shape);
            }
        }

        Ok(Self(digest.finish()))
    }

    /// Fingerprint a line against the component lines currently in `cart`.
    ///
    /// # Errors
    ///
    /// See [`LineFingerprint::of`].
    pub fn in_cart(cart: &Cart, line: &LineItem) -> Result<Self, IdentityError> {
        Self::of(line, cart.iter().map(|(_, sibling)| sibling))
    }

    /// Hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LineFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Signature of a component line that ignores which master it hangs off and how many units it
/// has. Two components with equal signatures fill the same bundle slot in the same way.
///
/// # Errors
///
/// Returns an [`IdentityError`] if the component carries a non-scalar attribute.
pub fn component_signature(component: &LineItem) -> Result<String, IdentityError> {
    let mut signature = String::new();

    if let Some(link) = component.bundle() {
        signature.push_str(&format!(
            "slot={};slot_product={};",
            link.master_item_id.0, link.master_item_product_id
        ));
    }

    signature.push_str(&format!("product={};", component.product_id()));
    signature.push_str(&canonical_attributes("options", component.options())?);
    signature.push_str(&canonical_attributes("extras", component.extras())?);
    signature.push_str(&canonical_attributes("custom_data", component.custom_data())?);

    Ok(signature)
}

/// Group components by bundle item and describe each relative to the master's quantity.
fn composition<'a>(
    master: &LineItem,
    components: impl Iterator<Item = &'a LineItem>,
) -> Result<BTreeMap<BundleItemId, SmallVec<[String; 2]>>, IdentityError> {
    let mut groups: BTreeMap<BundleItemId, SmallVec<[String; 2]>> = BTreeMap::new();
    let master_quantity = Decimal::from(master.quantity());

    for component in components {
        let Some(link) = component.bundle() else {
            continue;
        };

        let ratio = Decimal::from(component.quantity())
            .checked_div(master_quantity)
            .ok_or(IdentityError::ZeroMasterQuantity)?
            .normalize();

        let shape = format!("{}ratio={ratio};", component_signature(component)?);

        groups.entry(link.master_item_id).or_default().push(shape);
    }

    for shapes in groups.values_mut() {
        shapes.sort_unstable();
    }

    Ok(groups)
}

fn canonical_attributes(
    section: &'static str,
    attributes: &Attributes,
) -> Result<String, IdentityError> {
    let mut entries: SmallVec<[(&str, &AttributeValue); 8]> = attributes
        .iter()
        .map(|(name, value)| (name.as_str(), value))
        .collect();

    entries.sort_unstable_by(|left, right| left.0.cmp(right.0));

    let mut canonical = format!("{section}{{");

    for (name, value) in entries {
        let value = canonical_value(value).ok_or_else(|| IdentityError::NonScalarAttribute {
            section,
            name: name.to_string(),
        })?;

        canonical.push_str(&format!("{}:{name}={value};", name.len()));
    }

    canonical.push('}');

    Ok(canonical)
}

fn canonical_value(value: &AttributeValue) -> Option<String> {
    match value {
        AttributeValue::Bool(flag) => Some(format!("b:{}", u8::from(*flag))),
        AttributeValue::Integer(number) => Some(format!("i:{number}")),
        AttributeValue::Text(text) => Some(format!("s:{}:{text}", text.len())),
        AttributeValue::List(_) => None,
    }
}

/// Length-prefixed, labelled input to the digest, so adjacent fields can never run together.
#[derive(Default)]
struct Material {
    hasher: Sha256,
}

impl Material {
    fn field(&mut self, label: &str, value: &str) {
        self.hasher.update(label.as_bytes());
        self.hasher.update([0x1f]);
        self.hasher.update(value.len().to_le_bytes());
        self.hasher.update(value.as_bytes());
        self.hasher.update([0x1e]);
    }

    fn attributes(
        &mut self,
        section: &'static str,
        attributes: &Attributes,
    ) -> Result<(), IdentityError> {
        let canonical = canonical_attributes(section, attributes)?;

        self.field(section, &canonical);

        Ok(())
    }

    fn finish(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

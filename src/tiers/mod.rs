//! Tier Prices
//!
//! A tier table lists quantity breaks, optionally per customer group. Rows of the requesting
//! group replace the general rows as a whole; the two sets are never blended. Resolution picks
//! the largest break not above the requested quantity.
//!
//! Tables are stored as blobs (legacy array serialization or YAML). A table layered over a parent
//! table may leave a row's quantity and group out and refer to a parent row with `tier_id`
//! instead, overriding only the price.

use std::fmt;

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use smallvec::SmallVec;
use tracing::warn;

use crate::{
    catalog::CustomerGroupId,
    legacy::{DecodeError, decode_records, lenient},
};

pub mod cache;

/// Tier table identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct TierTableId(pub u64);

impl fmt::Display for TierTableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A quantity break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierRow {
    /// Smallest quantity the price applies to, at least 1
    pub quantity: u32,

    /// Group the row is limited to; `None` applies to everyone
    pub customer_group_id: Option<CustomerGroupId>,

    /// Unit price
    pub price: Decimal,
}

impl TierRow {
    /// Row for every customer.
    pub fn general(quantity: u32, price: Decimal) -> Self {
        Self {
            quantity,
            customer_group_id: None,
            price,
        }
    }

    /// Row limited to one customer group.
    pub fn for_group(quantity: u32, group: CustomerGroupId, price: Decimal) -> Self {
        Self {
            quantity,
            customer_group_id: Some(group),
            price,
        }
    }
}

/// Effective price at one quantity break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierBreak {
    /// Break quantity
    pub quantity: u32,

    /// Unit price from that quantity up
    pub price: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StoredRow {
    #[serde(default, deserialize_with = "lenient")]
    id: Option<String>,

    #[serde(default, alias = "qty", deserialize_with = "lenient")]
    quantity: Option<u32>,

    #[serde(
        default,
        alias = "customer_group",
        alias = "group",
        deserialize_with = "lenient"
    )]
    customer_group_id: Option<CustomerGroupId>,

    #[serde(default, deserialize_with = "lenient")]
    price: Option<Decimal>,

    #[serde(default, alias = "parent", deserialize_with = "lenient")]
    tier_id: Option<String>,
}

/// Quantity breaks of one product or variant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierTable {
    rows: SmallVec<[TierRow; 8]>,
}

impl TierTable {
    /// Build a table from rows. Rows with a zero quantity are dropped.
    pub fn from_rows(rows: impl IntoIterator<Item = TierRow>) -> Self {
        Self {
            rows: rows.into_iter().filter(|row| row.quantity >= 1).collect(),
        }
    }

    /// Decode a stored table, optionally layered over a parent table.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if either blob is malformed.
    pub fn try_decode(blob: &str, parent_blob: Option<&str>) -> Result<Self, DecodeError> {
        let parents: FxHashMap<String, StoredRow> = match parent_blob {
            Some(parent_blob) => decode_records::<StoredRow>(parent_blob)?
                .into_iter()
                .enumerate()
                .map(|(index, (key, row))| {
                    let id = row.id.clone().or(key).unwrap_or_else(|| index.to_string());

                    (id, row)
                })
                .collect(),
            None => FxHashMap::default(),
        };

        let rows = decode_records::<StoredRow>(blob)?
            .into_iter()
            .filter_map(|(_, row)| {
                let parent = row.tier_id.as_ref().and_then(|id| parents.get(id));

                let (quantity, customer_group_id) = match parent {
                    Some(parent) => (parent.quantity, parent.customer_group_id),
                    None => (row.quantity, row.customer_group_id),
                };

                Some(TierRow {
                    quantity: quantity?,
                    customer_group_id,
                    price: row.price?,
                })
            });

        Ok(Self::from_rows(rows))
    }

    /// Decode a stored table, treating a malformed blob as an empty table.
    pub fn decode(blob: &str, parent_blob: Option<&str>) -> Self {
        Self::try_decode(blob, parent_blob).unwrap_or_else(|error| {
            warn!(%error, "failed to decode tier table; using an empty table");

            Self::default()
        })
    }

    /// Stored rows, in stored order.
    pub fn rows(&self) -> &[TierRow] {
        &self.rows
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct customer groups with their own rows, ascending.
    pub fn customer_groups(&self) -> SmallVec<[CustomerGroupId; 4]> {
        let mut groups: SmallVec<[CustomerGroupId; 4]> = self
            .rows
            .iter()
            .filter_map(|row| row.customer_group_id)
            .collect();

        groups.sort_unstable();
        groups.dedup();

        groups
    }

    /// Effective breaks for `group`, ascending by quantity.
    ///
    /// The group's own rows are used when it has any, otherwise the general rows. A break at
    /// quantity 1 priced at `default_price` is added when missing. When two rows share a
    /// quantity the first one stored wins.
    pub fn breaks(
        &self,
        group: Option<CustomerGroupId>,
        default_price: Decimal,
    ) -> SmallVec<[TierBreak; 8]> {
        let group_rows: SmallVec<[&TierRow; 8]> = match group {
            Some(group) => self
                .rows
                .iter()
                .filter(|row| row.customer_group_id == Some(group))
                .collect(),
            None => SmallVec::new(),
        };

        let effective = if group_rows.is_empty() {
            self.rows
                .iter()
                .filter(|row| row.customer_group_id.is_none())
                .collect()
        } else {
            group_rows
        };

        let mut breaks: SmallVec<[TierBreak; 8]> = effective
            .into_iter()
            .map(|row| TierBreak {
                quantity: row.quantity,
                price: row.price,
            })
            .collect();

        if !breaks.iter().any(|tier| tier.quantity == 1) {
            breaks.push(TierBreak {
                quantity: 1,
                price: default_price,
            });
        }

        breaks.sort_by_key(|tier| tier.quantity);
        breaks.dedup_by_key(|tier| tier.quantity);

        breaks
    }

    /// Unit price for `quantity` units bought by `group`.
    ///
    /// Falls back to `default_price` when no break is at or below `quantity`.
    pub fn resolve(
        &self,
        group: Option<CustomerGroupId>,
        quantity: u32,
        default_price: Decimal,
    ) -> Decimal {
        self.breaks(group, default_price)
            .iter()
            .rev()
            .find(|tier| tier.quantity <= quantity)
            .map_or(default_price, |tier| tier.price)
    }
}

/// Resolve the unit price straight from stored blobs.
///
/// Malformed blobs count as empty tables.
pub fn resolve(
    blob: &str,
    group: Option<CustomerGroupId>,
    quantity: u32,
    default_price: Decimal,
    parent_blob: Option<&str>,
) -> Decimal {
    TierTable::decode(blob, parent_blob).resolve(group, quantity, default_price)
}

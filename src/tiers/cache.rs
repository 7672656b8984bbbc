//! Tier Cache
//!
//! Decoded tier tables, kept for one request. Alongside each table the cache indexes which
//! customer groups have their own rows, so callers can tell cheaply whether a group needs its
//! own price lookup.

use std::fmt;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::debug;

use crate::{
    catalog::CustomerGroupId,
    tiers::{TierTable, TierTableId},
};

/// A tier table as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTierTable {
    /// Serialized rows
    pub blob: String,

    /// Table this one is layered over
    pub parent: Option<TierTableId>,
}

/// Supplies stored tier tables.
pub trait TierSource: fmt::Debug {
    /// Stored table `id`, if it exists.
    fn table(&self, id: TierTableId) -> Option<StoredTierTable>;
}

/// Tier tables held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTierSource {
    tables: FxHashMap<TierTableId, StoredTierTable>,
}

impl InMemoryTierSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a table.
    #[must_use]
    pub fn with_table(
        mut self,
        id: TierTableId,
        blob: impl Into<String>,
        parent: Option<TierTableId>,
    ) -> Self {
        self.tables.insert(
            id,
            StoredTierTable {
                blob: blob.into(),
                parent,
            },
        );

        self
    }
}

impl TierSource for InMemoryTierSource {
    fn table(&self, id: TierTableId) -> Option<StoredTierTable> {
        self.tables.get(&id).cloned()
    }
}

#[derive(Debug)]
struct CachedTable {
    table: TierTable,
    groups: SmallVec<[CustomerGroupId; 4]>,
}

/// Request-scoped cache of decoded tier tables.
#[derive(Debug, Default)]
pub struct TierCache {
    tables: FxHashMap<TierTableId, CachedTable>,
}

impl TierCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table `id`, decoding it on first use. Unknown or malformed tables are empty.
    pub fn table(&mut self, source: &dyn TierSource, id: TierTableId) -> &TierTable {
        &self.entry(source, id).table
    }

    /// Customer groups with their own rows in table `id`.
    pub fn customer_groups(
        &mut self,
        source: &dyn TierSource,
        id: TierTableId,
    ) -> &[CustomerGroupId] {
        &self.entry(source, id).groups
    }

    /// Whether table `id` has been decoded.
    pub fn contains(&self, id: TierTableId) -> bool {
        self.tables.contains_key(&id)
    }

    /// Forget every decoded table.
    pub fn reset(&mut self) {
        self.tables.clear();
    }

    fn entry(&mut self, source: &dyn TierSource, id: TierTableId) -> &CachedTable {
        self.tables.entry(id).or_insert_with(|| {
            let table = match source.table(id) {
                Some(stored) => {
                    let parent = stored.parent.and_then(|parent| source.table(parent));
                    let parent_blob = parent.as_ref().map(|parent| parent.blob.as_str());

                    TierTable::decode(&stored.blob, parent_blob)
                }
                None => TierTable::default(),
            };

            let groups = table.customer_groups();

            debug!(table = %id, rows = table.rows().len(), "loaded tier table");

            CachedTable { table, groups }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use rust_decimal::Decimal;

    use super::*;

    #[derive(Debug, Default)]
    struct CountingSource {
        loads: Cell<usize>,
    }

    impl TierSource for CountingSource {
        fn table(&self, _id: TierTableId) -> Option<StoredTierTable> {
            self.loads.set(self.loads.get() + 1);

            Some(StoredTierTable {
                blob: "- {quantity: 1, customer_group_id: 4, price: 5}".to_string(),
                parent: None,
            })
        }
    }

    #[test]
    fn tables_decode_once_until_reset() {
        let source = CountingSource::default();
        let mut cache = TierCache::new();

        cache.table(&source, TierTableId(1));
        cache.customer_groups(&source, TierTableId(1));

        assert_eq!(source.loads.get(), 1);

        cache.reset();

        assert!(!cache.contains(TierTableId(1)));
        assert_eq!(cache.customer_groups(&source, TierTableId(1)), &[CustomerGroupId(4)]);
        assert_eq!(source.loads.get(), 2);
    }

    #[test]
    fn layered_tables_read_their_parent() {
        let source = InMemoryTierSource::new()
            .with_table(TierTableId(1), "- {id: base, quantity: 10, price: 9}", None)
            .with_table(TierTableId(2), "- {tier_id: base, price: 7}", Some(TierTableId(1)));
        let mut cache = TierCache::new();

        let table = cache.table(&source, TierTableId(2));

        assert_eq!(table.resolve(None, 12, Decimal::TEN), Decimal::new(7, 0));
        assert_eq!(table.resolve(None, 2, Decimal::TEN), Decimal::TEN);
    }

    #[test]
    fn unknown_tables_are_empty() {
        let source = InMemoryTierSource::new();
        let mut cache = TierCache::new();

        assert!(cache.table(&source, TierTableId(3)).is_empty());
    }
}

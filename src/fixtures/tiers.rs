//! Tier Table Fixtures

use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::tiers::{TierTableId, cache::InMemoryTierSource};

/// Wrapper for stored tier tables in YAML
#[derive(Debug, Deserialize)]
pub struct TiersFixture {
    /// Tables by id
    pub tables: FxHashMap<TierTableId, TableFixture>,
}

/// Table Fixture
#[derive(Debug, Deserialize)]
pub struct TableFixture {
    /// Serialized rows, exactly as stored
    pub blob: String,

    /// Table this one is layered over
    #[serde(default)]
    pub parent: Option<TierTableId>,
}

impl TiersFixture {
    /// Add every table to `source`.
    pub fn into_source(self, source: InMemoryTierSource) -> InMemoryTierSource {
        self.tables
            .into_iter()
            .fold(source, |source, (id, table)| {
                source.with_table(id, table.blob, table.parent)
            })
    }
}

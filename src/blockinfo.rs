use std::collections::HashMap;

use crate::abbrev::AbbrevTable;

/// Metadata attached to a block id via a BLOCKINFO block: an optional block
/// name, names for individual record codes, and a seed [`AbbrevTable`] that
/// every future block of this id starts from (copied, not shared).
#[derive(Debug, Clone, Default)]
pub struct BlockInfo {
    pub name: Option<String>,
    pub record_names: HashMap<u64, String>,
    pub abbrev_defs: AbbrevTable,
}

/// Per-document mapping from block id to [`BlockInfo`], populated by any
/// BLOCKINFO block encountered while parsing and consulted whenever a block
/// is entered (to seed its abbreviation table) or named for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct BlockInfoStore {
    entries: HashMap<u32, BlockInfo>,
}

impl BlockInfoStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, block_id: u32) -> Option<&BlockInfo> {
        self.entries.get(&block_id)
    }

    pub(crate) fn entry(&mut self, block_id: u32) -> &mut BlockInfo {
        self.entries.entry(block_id).or_default()
    }

    /// The `AbbrevTable` a freshly entered block of this id should start
    /// from: a copy of the BLOCKINFO seed table, or empty if none was
    /// recorded.
    #[must_use]
    pub fn seed_table(&self, block_id: u32) -> AbbrevTable {
        self.entries
            .get(&block_id)
            .map(|info| info.abbrev_defs.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn block_name(&self, block_id: u32) -> Option<&str> {
        self.entries.get(&block_id).and_then(|info| info.name.as_deref())
    }

    #[must_use]
    pub fn record_name(&self, block_id: u32, record_code: u64) -> Option<&str> {
        self.entries
            .get(&block_id)
            .and_then(|info| info.record_names.get(&record_code))
            .map(String::as_str)
    }
}

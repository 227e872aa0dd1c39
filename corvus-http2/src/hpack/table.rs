//! The per-connection dynamic header table (RFC 7541 §2.3.2): a deque of
//! `(name, value)` pairs with a byte-size budget, entries added at the
//! front and evicted from the back once the cumulative size exceeds the
//! budget. Addressing is relative: dynamic index 0 (decoder index
//! [`static_table::DYNAMIC_TABLE_START`]) is always the most recently
//! added entry.

use std::collections::VecDeque;
use std::sync::Arc;

use super::static_table::{self, STATIC_TABLE};

/// Per-entry overhead RFC 7541 §4.1 charges against the table's budget,
/// on top of the raw name/value byte lengths.
const ENTRY_OVERHEAD: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    name: Arc<str>,
    value: Arc<str>,
}

impl Entry {
    fn size(&self) -> usize {
        self.name.len() + self.value.len() + ENTRY_OVERHEAD
    }
}

/// The shared header table addressing space: static entries (1-61) then
/// dynamic entries (62+), each connection's encoder and decoder owning an
/// independent `DynamicTable` but agreeing on the same `max_size` via
/// SETTINGS_HEADER_TABLE_SIZE negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicTable {
    entries: VecDeque<Entry>,
    size: usize,
    max_size: usize,
}

impl DynamicTable {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            size: 0,
            max_size,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply a dynamic-table-size-update instruction or a SETTINGS-driven
    /// resize: evicts until the new, possibly smaller, budget is met.
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        self.evict_to_budget();
    }

    /// Add a new entry at the front, evicting from the back as needed. If
    /// the entry alone exceeds the budget the table ends up empty and the
    /// entry is not stored (RFC 7541 §4.4), though the header itself is
    /// still emitted by the caller.
    pub fn add(&mut self, name: Arc<str>, value: Arc<str>) {
        let entry = Entry { name, value };
        self.size += entry.size();
        self.entries.push_front(entry);
        self.evict_to_budget();
    }

    fn evict_to_budget(&mut self) {
        while self.size > self.max_size {
            match self.entries.pop_back() {
                Some(entry) => self.size -= entry.size(),
                None => {
                    self.size = 0;
                    break;
                }
            }
        }
    }

    /// Resolve a decoder index (1-based, static table first) to a
    /// `(name, value)` pair.
    pub fn resolve(&self, index: usize) -> Option<(Arc<str>, Arc<str>)> {
        if index == 0 {
            return None;
        }
        if index <= STATIC_TABLE.len() {
            let (name, value) = STATIC_TABLE[index - 1];
            return Some((Arc::from(name), Arc::from(value)));
        }
        let dynamic_index = index - static_table::DYNAMIC_TABLE_START;
        self.entries
            .get(dynamic_index)
            .map(|e| (Arc::clone(&e.name), Arc::clone(&e.value)))
    }

    /// Resolve a name-only match against the dynamic table, for encoders
    /// that fell through the static table.
    pub fn index_of_name(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| &*e.name == name)
            .map(|i| i + static_table::DYNAMIC_TABLE_START)
    }

    /// Resolve an exact `(name, value)` match against the dynamic table.
    pub fn index_of_pair(&self, name: &str, value: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| &*e.name == name && &*e.value == value)
            .map(|i| i + static_table::DYNAMIC_TABLE_START)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: &str, v: &str) -> (Arc<str>, Arc<str>) {
        (Arc::from(n), Arc::from(v))
    }

    #[test]
    fn add_and_resolve_newest_first() {
        let mut table = DynamicTable::new(4096);
        let (n, v) = entry("custom-key", "custom-value");
        table.add(n, v);
        let resolved = table.resolve(static_table::DYNAMIC_TABLE_START);
        assert_eq!(
            resolved,
            Some((Arc::from("custom-key"), Arc::from("custom-value")))
        );
    }

    #[test]
    fn eviction_respects_budget() {
        // one entry costs 10 + 10 + 32 = 52 bytes
        let mut table = DynamicTable::new(52);
        let (n, v) = entry("aaaaaaaaaa", "bbbbbbbbbb");
        table.add(n, v);
        assert_eq!(table.len(), 1);
        let (n2, v2) = entry("cccccccccc", "dddddddddd");
        table.add(n2, v2);
        // adding a second same-sized entry evicts the first
        assert_eq!(table.len(), 1);
        assert_eq!(table.size(), 52);
    }

    #[test]
    fn entry_larger_than_budget_empties_table() {
        let mut table = DynamicTable::new(52);
        let (n, v) = entry("aaaaaaaaaa", "bbbbbbbbbb");
        table.add(n, v);
        assert_eq!(table.len(), 1);
        let (big_n, big_v) = entry(&"x".repeat(100), "y");
        table.add(big_n, big_v);
        assert_eq!(table.len(), 0);
        assert_eq!(table.size(), 0);
    }

    #[test]
    fn shrinking_max_size_evicts() {
        let mut table = DynamicTable::new(200);
        table.add(Arc::from("a"), Arc::from("1"));
        table.add(Arc::from("b"), Arc::from("2"));
        assert_eq!(table.len(), 2);
        table.set_max_size(34); // fits exactly one 34-byte entry
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn static_table_resolves_through_same_index_space() {
        let table = DynamicTable::new(4096);
        assert_eq!(table.resolve(2), Some((Arc::from(":method"), Arc::from("GET"))));
    }
}

//! Cross-block row counts

use std::collections::BTreeMap;

/// Total rows archived per target table
///
/// Only updated after a block has been written and registered.
#[derive(Debug, Default, Clone)]
pub struct TableRowLedger {
    rows: BTreeMap<String, u64>,
}

impl TableRowLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` rows to `table`, returning the new total
    pub fn add(&mut self, table: &str, count: u64) -> u64 {
        let total = self.rows.entry(table.to_string()).or_insert(0);
        *total += count;
        *total
    }

    pub fn get(&self, table: &str) -> u64 {
        self.rows.get(table).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.rows.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.rows.iter().map(|(t, n)| (t.as_str(), *n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_per_table() {
        let mut ledger = TableRowLedger::new();
        assert_eq!(ledger.add("PERSON", 500), 500);
        assert_eq!(ledger.add("PERSON", 300), 800);
        ledger.add("ADDRESS", 2);

        assert_eq!(ledger.get("PERSON"), 800);
        assert_eq!(ledger.get("MISSING"), 0);
        assert_eq!(ledger.total(), 802);
        assert_eq!(ledger.iter().map(|(t, _)| t).collect::<Vec<_>>(), vec!["ADDRESS", "PERSON"]);
    }
}

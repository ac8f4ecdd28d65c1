//! The shrinking claim pool owned by the engine

use claimscan_core::{Claim, ClaimTable, RowKey, Schema};
use std::collections::HashSet;
use std::sync::Arc;

use crate::evaluator::MatchSet;

/// Claims not yet attributed to any rule
///
/// Row keys are computed once, when the pool is built, and travel with
/// their rows as the pool shrinks.
#[derive(Debug, Clone)]
pub struct ClaimPool {
    table: ClaimTable,
    keys: Vec<RowKey>,
}

impl ClaimPool {
    pub fn new(table: ClaimTable) -> Self {
        let keys = table.rows().iter().map(Claim::key).collect();
        Self { table, keys }
    }

    /// Current pool contents
    pub fn table(&self) -> &ClaimTable {
        &self.table
    }

    pub fn schema_arc(&self) -> Arc<Schema> {
        self.table.schema_arc()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Remove every row whose full-row key equals that of a matched row
    ///
    /// Returns the number of rows removed, which exceeds the match count
    /// when unmatched rows are identical to matched ones.
    pub fn remove(&mut self, matches: &MatchSet) -> usize {
        if matches.is_empty() {
            return 0;
        }

        let doomed: HashSet<RowKey> = matches
            .rows()
            .iter()
            .filter_map(|&i| self.keys.get(i).cloned())
            .collect();

        let table = std::mem::replace(&mut self.table, ClaimTable::empty(Schema::default()));
        let (schema, rows) = table.into_parts();
        let before = rows.len();

        let (rows, keys): (Vec<Claim>, Vec<RowKey>) = rows
            .into_iter()
            .zip(std::mem::take(&mut self.keys))
            .filter(|(_, key)| !doomed.contains(key))
            .unzip();

        self.table = ClaimTable::from_parts(schema, rows);
        self.keys = keys;
        before - self.keys.len()
    }

    pub fn into_table(self) -> ClaimTable {
        self.table
    }
}

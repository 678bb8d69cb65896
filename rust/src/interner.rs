//! Worker row interning.
//!
//! Maps normalized worker identifiers to dense row indices so grid cells can
//! live in flat vectors.

use rustc_hash::FxHashMap;

use crate::models::normalize_worker_id;

/// Dense row index of a worker in the grid.
pub type WorkerRow = u32;

/// Bidirectional worker id <-> row map. Rows keep insertion order.
#[derive(Debug, Clone, Default)]
pub struct WorkerInterner {
    to_row: FxHashMap<String, WorkerRow>,
    from_row: Vec<String>,
}

impl WorkerInterner {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            to_row: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            from_row: Vec::with_capacity(capacity),
        }
    }

    /// Intern a worker id (normalized first), returning its row.
    pub fn intern(&mut self, raw: &str) -> WorkerRow {
        let id = normalize_worker_id(raw);
        if let Some(&row) = self.to_row.get(&id) {
            return row;
        }
        let row = self.from_row.len() as WorkerRow;
        self.from_row.push(id.clone());
        self.to_row.insert(id, row);
        row
    }

    /// Row for a worker id, matching case-insensitively.
    #[inline]
    pub fn get(&self, raw: &str) -> Option<WorkerRow> {
        self.to_row.get(&normalize_worker_id(raw)).copied()
    }

    #[inline]
    pub fn resolve(&self, row: WorkerRow) -> Option<&str> {
        self.from_row.get(row as usize).map(|s| s.as_str())
    }

    /// Worker ids in row order.
    pub fn ids(&self) -> &[String] {
        &self.from_row
    }

    pub fn len(&self) -> usize {
        self.from_row.len()
    }

    pub fn is_empty(&self) -> bool {
        self.from_row.is_empty()
    }
}

//! The slot grid: one row per worker, one column per day of the horizon.
//!
//! Cells written by the loader (`prefill`) and by the engine (`write`) are
//! immutable afterwards. Engine writes are kept in a mutation log so callers
//! can persist a diff instead of the whole grid.

use chrono::{Datelike, NaiveDate};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::interner::{WorkerInterner, WorkerRow};
use crate::models::column_label;

/// Errors raised by grid construction and writes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    #[error("Invalid horizon: {start} is after {end}")]
    InvalidHorizon { start: NaiveDate, end: NaiveDate },
    #[error("Worker not found: {0}")]
    UnknownWorker(String),
    #[error("Date outside horizon: {0}")]
    DateOutsideHorizon(NaiveDate),
    #[error("Cell {worker}/{label} already holds {existing}")]
    CellOccupied {
        worker: String,
        label: String,
        existing: String,
    },
    #[error("{category} on {label} already belongs to {holder}")]
    CategoryTaken {
        category: String,
        label: String,
        holder: String,
    },
}

/// One day of the horizon.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub date: NaiveDate,
    pub label: String,
}

/// A write performed by the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellWrite {
    pub date: NaiveDate,
    pub worker: String,
    pub category: String,
}

/// Rectangular worker x column grid of optional category values.
#[derive(Clone, Debug)]
pub struct SlotGrid {
    columns: Vec<Column>,
    workers: WorkerInterner,
    /// Row-major: `row * columns.len() + col`
    cells: Vec<Option<String>>,
    label_index: FxHashMap<String, Vec<usize>>,
    mutations: Vec<CellWrite>,
}

impl SlotGrid {
    /// Create an empty grid covering `start..=end` for the given workers.
    ///
    /// Duplicate worker ids (after normalization) share one row.
    pub fn new<I, S>(start: NaiveDate, end: NaiveDate, workers: I) -> Result<Self, GridError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if start > end {
            return Err(GridError::InvalidHorizon { start, end });
        }

        let columns: Vec<Column> = start
            .iter_days()
            .take_while(|d| *d <= end)
            .map(|date| Column {
                date,
                label: column_label(date),
            })
            .collect();

        let mut label_index: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        for (idx, col) in columns.iter().enumerate() {
            label_index.entry(col.label.clone()).or_default().push(idx);
        }

        let workers: Vec<S> = workers.into_iter().collect();
        let mut interner = WorkerInterner::with_capacity(workers.len());
        for w in &workers {
            interner.intern(w.as_ref());
        }

        let cells = vec![None; interner.len() * columns.len()];

        Ok(Self {
            columns,
            workers: interner,
            cells,
            label_index,
            mutations: Vec::new(),
        })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, col: usize) -> Option<&Column> {
        self.columns.get(col)
    }

    /// Worker ids in row order.
    pub fn worker_ids(&self) -> &[String] {
        self.workers.ids()
    }

    pub fn row(&self, worker: &str) -> Option<WorkerRow> {
        self.workers.get(worker)
    }

    pub fn worker_at(&self, row: WorkerRow) -> Option<&str> {
        self.workers.resolve(row)
    }

    /// Column index of an exact date, if inside the horizon.
    pub fn column_index(&self, date: NaiveDate) -> Option<usize> {
        let first = self.columns.first()?.date;
        let offset = (date - first).num_days();
        if offset < 0 || offset as usize >= self.columns.len() {
            return None;
        }
        Some(offset as usize)
    }

    /// Columns carrying a label such as `THU-07`.
    pub fn columns_for_label(&self, label: &str) -> &[usize] {
        self.label_index
            .get(label)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Candidate columns for a requested date.
    ///
    /// An exact date inside the horizon resolves to its own column. Otherwise
    /// the date's label is looked up and matches are ordered nearest first.
    pub fn resolve_date(&self, date: NaiveDate) -> Vec<usize> {
        if let Some(col) = self.column_index(date) {
            return vec![col];
        }
        let mut cols = self.columns_for_label(&column_label(date)).to_vec();
        self.sort_by_distance(&mut cols, date);
        cols
    }

    /// Columns on the same weekday as `date`, nearest first.
    pub fn same_weekday_columns(&self, date: NaiveDate) -> Vec<usize> {
        let weekday = date.weekday();
        let mut cols: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.date.weekday() == weekday)
            .map(|(idx, _)| idx)
            .collect();
        self.sort_by_distance(&mut cols, date);
        cols
    }

    fn sort_by_distance(&self, cols: &mut [usize], date: NaiveDate) {
        cols.sort_by_key(|&c| ((self.columns[c].date - date).num_days().abs(), c));
    }

    #[inline]
    fn offset(&self, row: WorkerRow, col: usize) -> usize {
        row as usize * self.columns.len() + col
    }

    /// Value of a cell, `None` if empty or out of range.
    pub fn cell(&self, row: WorkerRow, col: usize) -> Option<&str> {
        if col >= self.columns.len() || row as usize >= self.workers.len() {
            return None;
        }
        self.cells[self.offset(row, col)].as_deref()
    }

    pub fn cell_at(&self, worker: &str, date: NaiveDate) -> Option<&str> {
        let row = self.row(worker)?;
        let col = self.column_index(date)?;
        self.cell(row, col)
    }

    pub fn is_empty(&self, row: WorkerRow, col: usize) -> bool {
        col < self.columns.len()
            && (row as usize) < self.workers.len()
            && self.cells[self.offset(row, col)].is_none()
    }

    /// Row already holding `category` in a column, if any.
    pub fn category_holder(&self, col: usize, category: &str) -> Option<WorkerRow> {
        (0..self.workers.len() as WorkerRow).find(|&row| self.cell(row, col) == Some(category))
    }

    /// Set a cell as part of loading. Not recorded as a mutation.
    pub fn prefill(
        &mut self,
        worker: &str,
        date: NaiveDate,
        category: &str,
    ) -> Result<(), GridError> {
        let row = self
            .row(worker)
            .ok_or_else(|| GridError::UnknownWorker(worker.to_string()))?;
        let col = self
            .column_index(date)
            .ok_or(GridError::DateOutsideHorizon(date))?;
        self.set(row, col, category)
    }

    /// Engine write into an empty cell.
    pub fn write(&mut self, row: WorkerRow, col: usize, category: &str) -> Result<(), GridError> {
        self.set(row, col, category)?;
        self.mutations.push(CellWrite {
            date: self.columns[col].date,
            worker: self.workers.resolve(row).unwrap_or_default().to_string(),
            category: category.to_string(),
        });
        Ok(())
    }

    /// Engine write for a category held by at most one worker per column.
    pub fn write_exclusive(
        &mut self,
        row: WorkerRow,
        col: usize,
        category: &str,
    ) -> Result<(), GridError> {
        if let Some(holder) = self.category_holder(col, category) {
            return Err(GridError::CategoryTaken {
                category: category.to_string(),
                label: self.columns[col].label.clone(),
                holder: self.workers.resolve(holder).unwrap_or_default().to_string(),
            });
        }
        self.write(row, col, category)
    }

    fn set(&mut self, row: WorkerRow, col: usize, category: &str) -> Result<(), GridError> {
        if col >= self.columns.len() {
            return Err(GridError::DateOutsideHorizon(
                self.columns.last().map(|c| c.date).unwrap_or(NaiveDate::MIN),
            ));
        }
        let worker = self
            .workers
            .resolve(row)
            .ok_or_else(|| GridError::UnknownWorker(format!("row {}", row)))?
            .to_string();
        let offset = self.offset(row, col);
        if let Some(existing) = &self.cells[offset] {
            return Err(GridError::CellOccupied {
                worker,
                label: self.columns[col].label.clone(),
                existing: existing.clone(),
            });
        }
        self.cells[offset] = Some(category.to_string());
        Ok(())
    }

    /// Engine writes since construction, in order.
    pub fn mutations(&self) -> &[CellWrite] {
        &self.mutations
    }

    /// All non-empty cells as (worker, date, category), row-major.
    pub fn occupied_cells(&self) -> Vec<(String, NaiveDate, String)> {
        let mut out = Vec::new();
        for (row, worker) in self.workers.ids().iter().enumerate() {
            for (col, column) in self.columns.iter().enumerate() {
                if let Some(value) = &self.cells[self.offset(row as WorkerRow, col)] {
                    out.push((worker.clone(), column.date, value.clone()));
                }
            }
        }
        out
    }
}

use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, trace};

use crate::table::Table;

/// Lazily computed value that is either missing or up to date. Readers compute
/// it on demand, writers only ever reset it to `Absent`.
#[derive(Debug, Clone, PartialEq)]
pub enum Cached<T> {
    Absent,
    Valid(T),
}

impl<T> Default for Cached<T> {
    fn default() -> Self {
        Cached::Absent
    }
}

impl<T> Cached<T> {
    pub fn invalidate(&mut self) {
        *self = Cached::Absent;
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Cached::Valid(_))
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Cached::Valid(v) => Some(v),
            Cached::Absent => None,
        }
    }
}

/// Inclusion mask for one table instance.
#[derive(Debug)]
struct Mask {
    table_id: u64,
    included: Vec<bool>,
}

/// Case-insensitive substring filter over the space-joined display strings of
/// a row. The mask is computed at most once per (needle, table) pair.
#[derive(Debug, Default)]
pub struct FilterEngine {
    needle: String,
    mask: Cached<Mask>,
    computations: usize,
}

impl FilterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn needle(&self) -> &str {
        &self.needle
    }

    /// Number of full mask computations performed so far.
    pub fn computations(&self) -> usize {
        self.computations
    }

    /// Stages a new query. Returns `false` if the normalized query equals the
    /// current one, in which case nothing is invalidated.
    pub fn set_query(&mut self, text: &str) -> bool {
        let needle = normalize(text);
        if needle == self.needle {
            trace!("Query {needle:?} unchanged");
            return false;
        }
        trace!("Query changed {:?} => {needle:?}", self.needle);
        self.needle = needle;
        self.mask.invalidate();
        true
    }

    pub fn invalidate(&mut self) {
        self.mask.invalidate();
    }

    pub fn is_valid_for(&self, table: &Table) -> bool {
        self.mask
            .get()
            .is_some_and(|m| m.table_id == table.id())
    }

    /// Fail-open: rows outside the computed mask are reported as included.
    pub fn is_row_included(&mut self, table: &Table, row: usize) -> bool {
        self.mask(table).get(row).copied().unwrap_or(true)
    }

    pub fn mask(&mut self, table: &Table) -> &[bool] {
        if !self.is_valid_for(table) {
            self.mask = Cached::Valid(Mask {
                table_id: table.id(),
                included: self.compute(table),
            });
        }
        match &self.mask {
            Cached::Valid(m) => &m.included,
            Cached::Absent => &[],
        }
    }

    /// Underlying row indices that pass the filter, in table order.
    pub fn included_rows(&mut self, table: &Table) -> Vec<usize> {
        (0..table.row_count())
            .filter(|&ridx| self.is_row_included(table, ridx))
            .collect()
    }

    fn compute(&mut self, table: &Table) -> Vec<bool> {
        self.computations += 1;
        if self.needle.is_empty() {
            return vec![true; table.row_count()];
        }

        let start_time = Instant::now();
        let needle = self.needle.as_str();
        let mask: Vec<bool> = (0..table.row_count())
            .into_par_iter()
            .map(|ridx| row_matches(table, ridx, needle))
            .collect();

        debug!(
            "Filter {:?} matched {}/{} rows in {}ms",
            needle,
            mask.iter().filter(|&&m| m).count(),
            mask.len(),
            start_time.elapsed().as_millis()
        );
        mask
    }
}

pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

fn row_matches(table: &Table, row: usize, needle: &str) -> bool {
    let Some(values) = table.row(row) else {
        return true;
    };
    let joined = values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<String>>()
        .join(" ")
        .to_lowercase();
    joined.contains(needle)
}

use std::cmp::Ordering;
use std::time::Instant;
use tracing::{debug, trace};

use crate::domain::TVError;
use crate::filter::{Cached, FilterEngine};
use crate::table::{CellChanged, Table};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            SortDirection::Ascending => "▲",
            SortDirection::Descending => "▼",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortSpec {
    pub column: usize,
    pub direction: SortDirection,
}

/// Bridges a `Table` and its `FilterEngine` to a virtualized grid. Visible rows
/// are the filtered rows in sort order; the table itself is never reordered.
#[derive(Debug, Default)]
pub struct TableView {
    table: Table,
    filter: FilterEngine,
    sort: Option<SortSpec>,
    rows: Cached<Vec<usize>>, // Mapping of visible row index to table row index
    rebuilds: usize,
}

impl TableView {
    pub fn new(table: Table) -> Self {
        TableView {
            table,
            ..Default::default()
        }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn query(&self) -> &str {
        self.filter.needle()
    }

    pub fn sort(&self) -> Option<SortSpec> {
        self.sort
    }

    pub fn filter_computations(&self) -> usize {
        self.filter.computations()
    }

    /// Number of times the visible ordering was rebuilt.
    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }

    /// Installs a new table, returning the old one. The query is kept and
    /// re-evaluated against the new data; a sort on a column that no longer
    /// exists is dropped.
    pub fn replace_table(&mut self, table: Table) -> Table {
        if let Some(spec) = self.sort
            && spec.column >= table.column_count()
        {
            debug!("Dropping sort on column {} after table swap", spec.column);
            self.sort = None;
        }
        let old = std::mem::replace(&mut self.table, table);
        self.invalidate();
        old
    }

    pub fn set_query(&mut self, text: &str) -> bool {
        let changed = self.filter.set_query(text);
        if changed {
            self.rows.invalidate();
        }
        changed
    }

    /// Drops the cached mask and ordering, e.g. after a cell was edited.
    pub fn invalidate(&mut self) {
        self.filter.invalidate();
        self.rows.invalidate();
    }

    pub fn apply_change(&mut self, change: CellChanged) {
        if change.table_id != self.table.id() {
            trace!("Ignoring change for table {}", change.table_id);
            return;
        }
        trace!("Cell {}:{} changed, invalidating", change.row, change.column);
        self.invalidate();
    }

    /// Toggles the boolean cell shown at `visible_row`. Caches are left alone;
    /// the caller hands the returned notification to `apply_change`.
    pub fn toggle_bool(&mut self, visible_row: usize, column: usize) -> Result<CellChanged, TVError> {
        let row = self.visible_row_to_underlying(visible_row)?;
        self.table.toggle_bool(row, column)
    }

    pub fn set_sort(&mut self, column: usize, direction: SortDirection) -> Result<(), TVError> {
        if column >= self.table.column_count() {
            return Err(TVError::IndexOutOfRange {
                what: "column",
                index: column,
                len: self.table.column_count(),
            });
        }
        self.sort = Some(SortSpec { column, direction });
        self.rows.invalidate();
        self.visible_rows();
        Ok(())
    }

    pub fn clear_sort(&mut self) {
        if self.sort.take().is_some() {
            self.rows.invalidate();
        }
    }

    pub fn visible_rows(&mut self) -> &[usize] {
        if !self.rows.is_valid() || !self.filter.is_valid_for(&self.table) {
            let rows = self.build_rows();
            self.rows = Cached::Valid(rows);
        }
        self.rows.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn visible_row_count(&mut self) -> usize {
        self.visible_rows().len()
    }

    pub fn visible_row_to_underlying(&mut self, visible_row: usize) -> Result<usize, TVError> {
        let rows = self.visible_rows();
        rows.get(visible_row)
            .copied()
            .ok_or(TVError::IndexOutOfRange {
                what: "visible row",
                index: visible_row,
                len: rows.len(),
            })
    }

    pub fn cell_text(&mut self, visible_row: usize, column: usize) -> Result<String, TVError> {
        let row = self.visible_row_to_underlying(visible_row)?;
        self.table.display(row, column)
    }

    pub fn header_text(&self, column: usize) -> Result<String, TVError> {
        let name = self.table.column_name(column)?;
        Ok(match self.sort {
            Some(spec) if spec.column == column => format!("{name} {}", spec.direction.symbol()),
            _ => name.to_string(),
        })
    }

    fn build_rows(&mut self) -> Vec<usize> {
        self.rebuilds += 1;
        let start_time = Instant::now();
        let mut rows = self.filter.included_rows(&self.table);
        if let Some(spec) = self.sort {
            sort_rows(&self.table, &mut rows, spec);
        }
        debug!(
            "Built {} visible rows (sort {:?}) in {}ms",
            rows.len(),
            self.sort,
            start_time.elapsed().as_millis()
        );
        rows
    }
}

/// Stable sort of `rows` by the display text of one column. If every value
/// parses as a number the numeric order is used instead.
fn sort_rows(table: &Table, rows: &mut Vec<usize>, spec: SortSpec) {
    let keys: Vec<String> = rows
        .iter()
        .map(|&ridx| table.display(ridx, spec.column).unwrap_or_default())
        .collect();
    // "NaN" and "inf" parse as f64 but are text here
    let numbers: Option<Vec<f64>> = keys
        .iter()
        .map(|k| k.trim().parse::<f64>().ok().filter(|n| n.is_finite()))
        .collect();

    let mut order: Vec<usize> = (0..rows.len()).collect();
    match &numbers {
        Some(numbers) => {
            trace!("Sorting column {} numerically", spec.column);
            order.sort_by(|&a, &b| {
                directed(numbers[a].total_cmp(&numbers[b]), spec.direction)
            });
        }
        None => {
            trace!("Sorting column {} as text", spec.column);
            order.sort_by(|&a, &b| directed(keys[a].cmp(&keys[b]), spec.direction));
        }
    }
    *rows = order.into_iter().map(|i| rows[i]).collect();
}

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Ascending => ordering,
        SortDirection::Descending => ordering.reverse(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tests::players;
    use crate::table::Value;

    fn names(view: &mut TableView) -> Vec<String> {
        (0..view.visible_row_count())
            .map(|r| view.cell_text(r, 0).unwrap())
            .collect()
    }

    fn sets() -> Table {
        Table::load(
            vec!["Player".into(), "Year".into(), "Set".into()],
            vec![
                vec!["Ken Griffey Jr.".into(), Value::Number(1989.0), "Upper Deck".into()],
                vec!["Derek Jeter".into(), Value::Number(1993.0), "SP".into()],
                vec!["Chipper Jones".into(), Value::Number(1991.0), "Topps".into()],
                vec!["Alex Rodriguez".into(), Value::Number(1994.0), "SP".into()],
                vec!["Frank Thomas".into(), Value::Number(1990.0), "Topps".into()],
                vec!["Mike Piazza".into(), Value::Number(1992.0), "Bowman".into()],
                vec!["Kerry Wood".into(), Value::Number(200.0), "Topps".into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_end_to_end_players() {
        let mut view = TableView::new(players());

        view.set_query("tro");
        assert_eq!(view.visible_rows(), &[0]);
        assert_eq!(view.cell_text(0, 0).unwrap(), "Mike Trout");

        view.set_query("ph");
        assert_eq!(view.visible_rows(), &[1]);
        assert_eq!(view.cell_text(0, 1).unwrap(), "Phillies");

        view.set_query("");
        assert_eq!(view.visible_rows(), &[0, 1]);

        view.set_sort(0, SortDirection::Ascending).unwrap();
        assert_eq!(names(&mut view), vec!["Bryce Harper", "Mike Trout"]);
        assert_eq!(view.cell_text(0, 2).unwrap(), "True");
    }

    #[test]
    fn test_visible_row_to_underlying_out_of_range() {
        let mut view = TableView::new(players());
        view.set_query("angels");
        assert_eq!(view.visible_row_to_underlying(0).unwrap(), 0);
        assert!(matches!(
            view.visible_row_to_underlying(1),
            Err(TVError::IndexOutOfRange { index: 1, len: 1, .. })
        ));
        assert!(view.cell_text(1, 0).is_err());
    }

    #[test]
    fn test_numeric_sort() {
        let mut view = TableView::new(sets());
        view.set_sort(1, SortDirection::Ascending).unwrap();
        let years: Vec<String> = (0..view.visible_row_count())
            .map(|r| view.cell_text(r, 1).unwrap())
            .collect();
        // 200 sorts before 1989 numerically, after it as text
        assert_eq!(years, vec!["200", "1989", "1990", "1991", "1992", "1993", "1994"]);
    }

    #[test]
    fn test_text_sort_when_a_value_is_not_numeric() {
        let table = Table::load(
            vec!["No".into(), "Team".into()],
            vec![
                vec!["10".into(), "A".into()],
                vec!["9".into(), "A".into()],
                vec!["RC".into(), "B".into()],
                vec!["2".into(), "A".into()],
            ],
        )
        .unwrap();
        let mut view = TableView::new(table);
        view.set_sort(0, SortDirection::Ascending).unwrap();
        assert_eq!(names(&mut view), vec!["10", "2", "9", "RC"]);

        // Only included values count: without "RC" the column is numeric
        view.set_query("a");
        assert_eq!(names(&mut view), vec!["2", "9", "10"]);
    }

    #[test]
    fn test_non_finite_values_sort_as_text() {
        let table = Table::load(
            vec!["Price".into()],
            vec![
                vec![Value::Number(3.0)],
                vec![Value::Number(f64::NAN)],
                vec![Value::Number(1.0)],
                vec![Value::Number(2.0)],
            ],
        )
        .unwrap();
        let mut view = TableView::new(table);
        view.set_sort(0, SortDirection::Ascending).unwrap();
        assert_eq!(names(&mut view), vec!["1", "2", "3", "NaN"]);

        let table = Table::load(
            vec!["Card".into()],
            vec![vec!["Nan".into()], vec!["10".into()], vec!["9".into()], vec!["inf".into()]],
        )
        .unwrap();
        view.replace_table(table);
        assert_eq!(names(&mut view), vec!["10", "9", "Nan", "inf"]);
    }

    #[test]
    fn test_sort_is_stable_and_idempotent() {
        let mut view = TableView::new(sets());
        view.set_sort(2, SortDirection::Ascending).unwrap();
        let first = view.visible_rows().to_vec();
        // Ties keep table order: SP rows 1, 3 and Topps rows 2, 4, 6
        assert_eq!(first, vec![5, 1, 3, 2, 4, 6, 0]);

        view.set_sort(2, SortDirection::Ascending).unwrap();
        assert_eq!(view.visible_rows(), first.as_slice());

        view.set_sort(0, SortDirection::Descending).unwrap();
        view.set_sort(2, SortDirection::Ascending).unwrap();
        assert_eq!(view.visible_rows(), first.as_slice());
    }

    #[test]
    fn test_descending_sort_keeps_ties_in_table_order() {
        let mut view = TableView::new(sets());
        view.set_sort(2, SortDirection::Descending).unwrap();
        assert_eq!(view.visible_rows(), &[0, 2, 4, 6, 1, 3, 5]);
    }

    #[test]
    fn test_filter_change_keeps_sort() {
        let mut view = TableView::new(sets());
        view.set_sort(1, SortDirection::Descending).unwrap();
        view.set_query("topps");
        assert_eq!(view.sort().map(|s| s.column), Some(1));
        assert_eq!(names(&mut view), vec!["Chipper Jones", "Frank Thomas", "Kerry Wood"]);
    }

    #[test]
    fn test_sort_change_does_not_recompute_filter() {
        let mut view = TableView::new(sets());
        view.set_query("sp");
        assert_eq!(view.visible_row_count(), 2);
        assert_eq!(view.filter_computations(), 1);

        view.set_sort(0, SortDirection::Ascending).unwrap();
        view.set_sort(0, SortDirection::Descending).unwrap();
        view.clear_sort();
        assert_eq!(view.visible_rows(), &[1, 3]);
        assert_eq!(view.filter_computations(), 1);
    }

    #[test]
    fn test_ordering_is_cached_between_reads() {
        let mut view = TableView::new(sets());
        view.set_sort(0, SortDirection::Ascending).unwrap();
        let rebuilds = view.rebuilds();
        for r in 0..view.visible_row_count() {
            for c in 0..3 {
                view.cell_text(r, c).unwrap();
            }
        }
        assert_eq!(view.rebuilds(), rebuilds);
        assert_eq!(view.filter_computations(), 1);
    }

    #[test]
    fn test_set_sort_rejects_unknown_column() {
        let mut view = TableView::new(players());
        assert!(view.set_sort(3, SortDirection::Ascending).is_err());
        assert_eq!(view.sort(), None);
    }

    #[test]
    fn test_replace_table_reapplies_query() {
        let mut view = TableView::new(players());
        view.set_query("topps");
        assert_eq!(view.visible_row_count(), 0);

        let old = view.replace_table(sets());
        assert_eq!(old.row_count(), 2);
        assert_eq!(view.query(), "topps");
        assert_eq!(view.visible_row_count(), 3);
    }

    #[test]
    fn test_replace_table_drops_sort_on_missing_column() {
        let mut view = TableView::new(sets());
        view.set_sort(2, SortDirection::Ascending).unwrap();
        view.replace_table(Table::load(vec!["Player".into()], vec![]).unwrap());
        assert_eq!(view.sort(), None);
        assert_eq!(view.visible_row_count(), 0);

        view.set_sort(0, SortDirection::Ascending).unwrap();
        view.replace_table(players());
        assert_eq!(view.sort().map(|s| s.column), Some(0));
        assert_eq!(names(&mut view), vec!["Bryce Harper", "Mike Trout"]);
    }

    #[test]
    fn test_toggle_needs_explicit_invalidation() {
        let mut view = TableView::new(players());
        view.set_query("false");
        assert_eq!(view.visible_rows(), &[0]);

        let change = view.toggle_bool(0, 2).unwrap();
        // Still showing the stale mask until the change is applied
        assert_eq!(view.visible_rows(), &[0]);
        assert_eq!(view.cell_text(0, 2).unwrap(), "True");

        view.apply_change(change);
        assert_eq!(view.visible_row_count(), 0);
    }

    #[test]
    fn test_header_text_marks_sort_column() {
        let mut view = TableView::new(players());
        view.set_sort(1, SortDirection::Descending).unwrap();
        assert_eq!(view.header_text(0).unwrap(), "Player");
        assert_eq!(view.header_text(1).unwrap(), "Team ▼");
        assert!(view.header_text(5).is_err());
    }
}

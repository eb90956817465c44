//! # Logical Grid
//!
//! Rebuilds the rectangular grid of a table from its physical cells. Merged
//! regions are resolved so that every logical position knows which physical
//! cell (its anchor) owns it.
//!
//! The grid is a flat row-major arena; anchors are plain `(row, column)`
//! coordinates into it.
use crate::document::PhysicalCell;
use crate::document::Table;
use crate::document::VerticalMerge;

/// How a vertical merge marker without an explicit value is interpreted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum UnsetMergePolicy {
    /// Treat the cell as continuing the merge above it
    #[default]
    Continue,
    /// Treat the cell as starting a new region
    Restart,
}

impl UnsetMergePolicy {
    /// Whether a cell with the given merge state continues the region above it
    pub fn continues(&self, merge: VerticalMerge) -> bool {
        match merge {
            VerticalMerge::Continue => true,
            VerticalMerge::Unset => *self == Self::Continue,
            VerticalMerge::None | VerticalMerge::Start => false,
        }
    }
}

/// One position of the logical grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogicalCell {
    /// Coordinate of the owning cell
    pub anchor: (usize, usize),
    /// True only at the owning position
    pub is_anchor: bool,
    /// Cell text, empty except at the owning position
    pub text: String,
    /// Rows covered, meaningful at the owning position
    pub row_span: usize,
    /// Columns covered, meaningful at the owning position
    pub col_span: usize,
}

impl LogicalCell {
    fn owner(anchor: (usize, usize), text: String, col_span: usize) -> Self {
        Self {
            anchor,
            is_anchor: true,
            text,
            row_span: 1,
            col_span,
        }
    }

    fn covered(anchor: (usize, usize)) -> Self {
        Self {
            anchor,
            is_anchor: false,
            text: String::new(),
            row_span: 1,
            col_span: 1,
        }
    }

    fn placeholder(position: (usize, usize)) -> Self {
        Self::owner(position, String::new(), 1)
    }
}

/// Reconstructed logical grid of one table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Grid {
    rows: usize,
    cols: usize,
    cells: Vec<LogicalCell>,
}

impl Grid {
    /// Builds the logical grid of a table.
    ///
    /// Never fails: malformed span or merge metadata degrades to defaults and
    /// positions no physical cell reaches become empty self-owning cells.
    pub fn build(table: &Table, policy: UnsetMergePolicy) -> Grid {
        let cols = table.rows
            .iter()
            .map(|row| row.iter().map(PhysicalCell::span).fold(0usize, usize::saturating_add))
            .max()
            .unwrap_or(0);
        let rows = table.rows.len();
        let size = match rows.checked_mul(cols) {
            Some(size) if size > 0 => size,
            _ => return Grid::default(),
        };

        let mut builder = GridBuilder {
            cols,
            slots: vec![None; size],
        };
        for (row, cells) in table.rows.iter().enumerate() {
            builder.place_row(row, cells, policy);
        }
        builder.reconcile_row_spans(rows);

        let cells = builder.slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| slot.unwrap_or_else(|| LogicalCell::placeholder((index / cols, index % cols))))
            .collect();
        Grid { rows, cols, cells }
    }

    /// Number of logical rows
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Number of logical columns
    pub fn col_count(&self) -> usize {
        self.cols
    }

    /// Returns true if the grid has no positions
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell record at a logical position
    pub fn get(&self, row: usize, col: usize) -> Option<&LogicalCell> {
        if row < self.rows && col < self.cols {
            self.cells.get(row * self.cols + col)
        } else {
            None
        }
    }

    /// Owning cell of a logical position
    pub fn resolve(&self, row: usize, col: usize) -> Option<&LogicalCell> {
        let (anchor_row, anchor_col) = self.get(row, col)?.anchor;
        self.get(anchor_row, anchor_col)
    }

    /// Text shown at a logical position, empty when out of bounds
    pub fn text_at(&self, row: usize, col: usize) -> &str {
        self.resolve(row, col).map(|cell| cell.text.as_str()).unwrap_or("")
    }

    /// All positions in row-major order with their coordinates
    pub fn cells(&self) -> impl Iterator<Item = ((usize, usize), &LogicalCell)> + '_ {
        let cols = self.cols;
        self.cells
            .iter()
            .enumerate()
            .map(move |(index, cell)| ((index / cols, index % cols), cell))
    }
}

/// Grid under construction; `None` marks a position no cell has claimed yet
struct GridBuilder {
    cols: usize,
    slots: Vec<Option<LogicalCell>>,
}

impl GridBuilder {
    fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    fn is_claimed(&self, row: usize, col: usize) -> bool {
        self.slots[self.index(row, col)].is_some()
    }

    fn place_row(&mut self, row: usize, cells: &[PhysicalCell], policy: UnsetMergePolicy) {
        let mut col = 0usize;
        for cell in cells {
            while col < self.cols && self.is_claimed(row, col) {
                col += 1;
            }
            if col >= self.cols {
                break;
            }

            let colspan = cell.span();
            let anchor = if policy.continues(cell.vertical_merge) {
                self.find_anchor_above(row, col)
            } else {
                None
            };
            match anchor {
                Some(anchor) => self.continue_region(row, col, colspan, anchor),
                None => self.start_region(row, col, colspan, &cell.text),
            }
            col = col.saturating_add(colspan);
        }
    }

    /// Nearest claimed position above `(row, col)` and its anchor
    fn find_anchor_above(&self, row: usize, col: usize) -> Option<(usize, usize)> {
        (0..row)
            .rev()
            .find_map(|above| self.slots[self.index(above, col)].as_ref())
            .map(|cell| cell.anchor)
    }

    fn continue_region(&mut self, row: usize, col: usize, colspan: usize, anchor: (usize, usize)) {
        let anchor_index = self.index(anchor.0, anchor.1);
        let anchor_cols = match self.slots[anchor_index].as_mut() {
            Some(owner) => {
                owner.row_span += 1;
                anchor.1..anchor.1 + owner.col_span
            }
            None => return,
        };
        for target in col..col.saturating_add(colspan).min(self.cols) {
            if anchor_cols.contains(&target) && !self.is_claimed(row, target) {
                let index = self.index(row, target);
                self.slots[index] = Some(LogicalCell::covered(anchor));
            }
        }
    }

    fn start_region(&mut self, row: usize, col: usize, colspan: usize, text: &str) {
        let col_span = (col..col.saturating_add(colspan).min(self.cols))
            .take_while(|target| !self.is_claimed(row, *target))
            .count()
            .max(1);
        let index = self.index(row, col);
        self.slots[index] = Some(LogicalCell::owner((row, col), normalize_text(text), col_span));
        for target in col + 1..col + col_span {
            let index = self.index(row, target);
            self.slots[index] = Some(LogicalCell::covered((row, col)));
        }
    }

    /// Recounts every owner's row span from the rows it covers across its
    /// full width. Positions left referencing an owner outside its footprint
    /// become empty placeholders.
    fn reconcile_row_spans(&mut self, rows: usize) {
        for row in (0..rows).rev() {
            for col in 0..self.cols {
                let index = self.index(row, col);
                let columns = match &self.slots[index] {
                    Some(cell) if cell.is_anchor => col..col + cell.col_span,
                    _ => continue,
                };
                let row_span = (row..rows)
                    .take_while(|below| columns.clone().all(|target| self.references(*below, target, (row, col))))
                    .count()
                    .max(1);
                if let Some(cell) = self.slots[index].as_mut() {
                    cell.row_span = row_span;
                }
                for below in row + row_span..rows {
                    for target in columns.clone() {
                        if self.references(below, target, (row, col)) {
                            let index = self.index(below, target);
                            self.slots[index] = Some(LogicalCell::placeholder((below, target)));
                        }
                    }
                }
            }
        }
    }

    fn references(&self, row: usize, col: usize, anchor: (usize, usize)) -> bool {
        matches!(&self.slots[self.index(row, col)], Some(cell) if cell.anchor == anchor)
    }
}

/// Trims cell text and turns line breaks into spaces
pub(crate) fn normalize_text(text: &str) -> String {
    text.trim().replace("\r\n", " ").replace(['\r', '\n'], " ")
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Table layout: resolves rows and cells of a table-like container into a
//! dense grid.
//!
//! ## Resolution
//!
//! Rows are found by walking the container's descendants through ignored
//! nodes and pass-through roles (generic containers, row groups). Cells are
//! found inside each row the same way. Each cell gets the coordinate
//!
//! - row: the larger of the row counter and the cell's declared row index,
//! - column: the larger of the running column and the declared column index,
//!
//! and is then shifted right while any slot its spans would cover is already
//! taken by an earlier cell. Coordinates therefore never go backwards
//! relative to the declared attributes or to the scan order.

use alloc::{rc::Rc, vec, vec::Vec};

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::tree::Tree;
use crate::types::{IntAttribute, NodeId, Role};

/// Declared indices and spans are clamped so that a malformed table cannot
/// request an unbounded grid.
const MAX_DIMENSION: usize = 1000;

/// Header cells attached to one row or column.
pub type Headers = SmallVec<[NodeId; 2]>;

/// Where a cell landed in its table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CellData {
    /// First row covered.
    pub row_index: usize,
    /// First column covered.
    pub col_index: usize,
    /// Rows covered, at least 1.
    pub row_span: usize,
    /// Columns covered, at least 1.
    pub col_span: usize,
    /// 1-based row index exposed to assistive technology.
    pub aria_row_index: i32,
    /// 1-based column index exposed to assistive technology.
    pub aria_col_index: i32,
    /// Position in [`TableInfo::unique_cell_ids`].
    pub index: usize,
}

/// Resolved layout of a table-like container.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableInfo {
    /// Number of rows, at least the authored row count.
    pub row_count: usize,
    /// Number of columns, at least the authored column count.
    pub col_count: usize,
    /// Authored ARIA row count, if any.
    pub aria_row_count: Option<i32>,
    /// Authored ARIA column count, if any.
    pub aria_col_count: Option<i32>,
    /// Dense `row_count × col_count` grid. Spanning cells fill every slot they cover.
    pub cell_ids: Vec<Vec<Option<NodeId>>>,
    /// Every cell once, in scan order.
    pub unique_cell_ids: Vec<NodeId>,
    /// Row header cells per row.
    pub row_headers: Vec<Headers>,
    /// Column header cells per column.
    pub col_headers: Vec<Headers>,
    /// Row nodes in scan order.
    pub row_nodes: Vec<NodeId>,
    /// Caption node, if any.
    pub caption_id: Option<NodeId>,
    cell_data: HashMap<NodeId, CellData>,
}

impl TableInfo {
    /// Compute the layout of `table_id`. Returns `None` if the node is not
    /// table-like.
    pub(crate) fn compute(tree: &Tree, table_id: NodeId) -> Option<Self> {
        let table = tree.node(table_id)?;
        if !table.role().is_table_like() {
            return None;
        }

        let mut info = Self {
            aria_row_count: table.data().int_attribute(IntAttribute::AriaRowCount),
            aria_col_count: table.data().int_attribute(IntAttribute::AriaColumnCount),
            ..Self::default()
        };

        let rows = collect(tree, table_id, classify_table_child, &mut info.caption_id);

        let mut grid: Vec<Vec<Option<NodeId>>> = Vec::new();
        let mut next_row = 0_usize;
        for &row_id in &rows {
            let Some(row) = tree.node(row_id) else {
                continue;
            };
            let mut row_index = next_row;
            if let Some(declared) = declared(row.data().int_attribute(IntAttribute::TableRowIndex)) {
                row_index = row_index.max(declared);
            }
            info.row_nodes.push(row_id);

            let cells = collect(tree, row_id, classify_row_child, &mut None);

            let mut col = 0_usize;
            for cell_id in cells {
                let Some(cell) = tree.node(cell_id) else {
                    continue;
                };
                let data = cell.data();
                let mut r = row_index;
                if let Some(declared) = declared(data.int_attribute(IntAttribute::TableCellRowIndex)) {
                    r = r.max(declared);
                }
                let mut c = col;
                if let Some(declared) =
                    declared(data.int_attribute(IntAttribute::TableCellColumnIndex))
                {
                    c = c.max(declared);
                }
                let row_span = span(data.int_attribute(IntAttribute::TableCellRowSpan), r);
                let declared_col_span = data.int_attribute(IntAttribute::TableCellColumnSpan);
                while c < MAX_DIMENSION - 1
                    && occupied(&grid, r, c, row_span, span(declared_col_span, c))
                {
                    c += 1;
                }
                let col_span = span(declared_col_span, c);

                for rr in r..r + row_span {
                    for cc in c..c + col_span {
                        place(&mut grid, rr, cc, cell_id);
                    }
                }

                let index = info.unique_cell_ids.len();
                info.unique_cell_ids.push(cell_id);
                info.cell_data.insert(
                    cell_id,
                    CellData {
                        row_index: r,
                        col_index: c,
                        row_span,
                        col_span,
                        aria_row_index: data
                            .int_attribute(IntAttribute::AriaCellRowIndex)
                            .unwrap_or_else(|| one_based(r)),
                        aria_col_index: data
                            .int_attribute(IntAttribute::AriaCellColumnIndex)
                            .unwrap_or_else(|| one_based(c)),
                        index,
                    },
                );
                col = c + col_span;
            }
            next_row = row_index + 1;
        }

        let authored = |attr| declared(table.data().int_attribute(attr)).unwrap_or(0);
        info.row_count = grid.len().max(authored(IntAttribute::TableRowCount));
        info.col_count = grid
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
            .max(authored(IntAttribute::TableColumnCount));
        grid.resize_with(info.row_count, Vec::new);
        for row in &mut grid {
            row.resize(info.col_count, None);
        }

        info.row_headers = vec![Headers::new(); info.row_count];
        info.col_headers = vec![Headers::new(); info.col_count];
        for &cell_id in &info.unique_cell_ids {
            let (Some(cell), Some(data)) = (tree.node(cell_id), info.cell_data.get(&cell_id)) else {
                continue;
            };
            match cell.role() {
                Role::RowHeader => {
                    for r in data.row_index..data.row_index + data.row_span {
                        info.row_headers[r].push(cell_id);
                    }
                }
                Role::ColumnHeader => {
                    for c in data.col_index..data.col_index + data.col_span {
                        info.col_headers[c].push(cell_id);
                    }
                }
                _ => {}
            }
        }

        info.cell_ids = grid;
        Some(info)
    }

    /// Layout of one cell.
    pub fn cell_data(&self, cell: NodeId) -> Option<&CellData> {
        self.cell_data.get(&cell)
    }

    /// Cell covering `(row, col)`.
    pub fn cell_at(&self, row: usize, col: usize) -> Option<NodeId> {
        *self.cell_ids.get(row)?.get(col)?
    }
}

enum Found {
    Take,
    Caption,
    Skip,
}

fn classify_table_child(role: Role) -> Found {
    if role.is_table_row() {
        Found::Take
    } else if role == Role::Caption {
        Found::Caption
    } else {
        Found::Skip
    }
}

fn classify_row_child(role: Role) -> Found {
    if role.is_cell_or_table_header() {
        Found::Take
    } else {
        Found::Skip
    }
}

/// Descendants of `id` matched by `classify`, walking through ignored nodes
/// and pass-through roles.
fn collect(
    tree: &Tree,
    id: NodeId,
    classify: fn(Role) -> Found,
    caption: &mut Option<NodeId>,
) -> Vec<NodeId> {
    let mut out = Vec::new();
    let Some(node) = tree.node(id) else {
        return out;
    };
    let mut stack: Vec<NodeId> = node.children().iter().rev().copied().collect();
    while let Some(current) = stack.pop() {
        let Some(child) = tree.node(current) else {
            continue;
        };
        if child.is_ignored() {
            stack.extend(child.children().iter().rev().copied());
            continue;
        }
        match classify(child.role()) {
            Found::Take => out.push(current),
            Found::Caption => {
                caption.get_or_insert(current);
            }
            Found::Skip if child.role().is_pass_through() => {
                stack.extend(child.children().iter().rev().copied());
            }
            Found::Skip => {}
        }
    }
    out
}

fn declared(value: Option<i32>) -> Option<usize> {
    let value = usize::try_from(value?).ok()?;
    Some(value.min(MAX_DIMENSION - 1))
}

fn span(value: Option<i32>, start: usize) -> usize {
    let span = value.and_then(|v| usize::try_from(v).ok()).unwrap_or(1).max(1);
    span.min(MAX_DIMENSION - start.min(MAX_DIMENSION - 1))
}

fn one_based(index: usize) -> i32 {
    i32::try_from(index + 1).unwrap_or(i32::MAX)
}

fn occupied(grid: &[Vec<Option<NodeId>>], row: usize, col: usize, rows: usize, cols: usize) -> bool {
    grid.iter()
        .skip(row)
        .take(rows)
        .any(|r| r.iter().skip(col).take(cols).any(Option::is_some))
}

fn place(grid: &mut Vec<Vec<Option<NodeId>>>, row: usize, col: usize, id: NodeId) {
    if grid.len() <= row {
        grid.resize_with(row + 1, Vec::new);
    }
    let cells = &mut grid[row];
    if cells.len() <= col {
        cells.resize(col + 1, None);
    }
    cells[col] = Some(id);
}

impl Tree {
    /// Layout of the table-like node `id`.
    ///
    /// Computed on first access after any update and cached until the next
    /// one. Returns `None` if `id` is not a live table-like node or while an
    /// update is in progress.
    pub fn table_info(&self, id: NodeId) -> Option<Rc<TableInfo>> {
        if self.update_in_progress() {
            return None;
        }
        let generation = self.generation();
        if let Some((built, info)) = self.table_cache.borrow().get(&id)
            && *built == generation
        {
            return info.clone();
        }
        let info = TableInfo::compute(self, id).map(Rc::new);
        tracing::trace!(table = %id, found = info.is_some(), "computed table info");
        self.table_cache
            .borrow_mut()
            .insert(id, (generation, info.clone()));
        info
    }

    /// Cell of `table` covering `(row, col)`.
    pub fn table_cell_from_indices(&self, table: NodeId, row: usize, col: usize) -> Option<NodeId> {
        self.table_info(table)?.cell_at(row, col)
    }

    /// Nearest table-like ancestor of `id`.
    pub fn containing_table(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.node(id)?.parent();
        while let Some(candidate) = current {
            let node = self.node(candidate)?;
            if node.role().is_table_like() {
                return Some(candidate);
            }
            current = node.parent();
        }
        None
    }

    /// Row index of the cell `id` within its table.
    pub fn table_cell_row_index(&self, id: NodeId) -> Option<usize> {
        self.cell_data(id).map(|c| c.row_index)
    }

    /// Column index of the cell `id` within its table.
    pub fn table_cell_col_index(&self, id: NodeId) -> Option<usize> {
        self.cell_data(id).map(|c| c.col_index)
    }

    /// Row header cells of `row` in `table`.
    pub fn table_row_headers(&self, table: NodeId, row: usize) -> Vec<NodeId> {
        self.table_info(table)
            .and_then(|info| info.row_headers.get(row).map(|h| h.to_vec()))
            .unwrap_or_default()
    }

    /// Column header cells of `col` in `table`.
    pub fn table_col_headers(&self, table: NodeId, col: usize) -> Vec<NodeId> {
        self.table_info(table)
            .and_then(|info| info.col_headers.get(col).map(|h| h.to_vec()))
            .unwrap_or_default()
    }

    fn cell_data(&self, id: NodeId) -> Option<CellData> {
        let table = self.containing_table(id)?;
        self.table_info(table)?.cell_data(id).copied()
    }
}

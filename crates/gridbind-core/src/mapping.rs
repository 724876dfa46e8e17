//! The compiled execution plan shared by both engines.

use std::fmt;
use std::sync::Arc;

use gridbind_common::{CellRef, CellValue, ValueKind};
use rustc_hash::FxHashMap;

use crate::schema::{CollectionAccessor, ItemBuffer, ScalarAccessor};

/// Item blocks assumed per collection when estimating the grid.
pub const DEFAULT_COLLECTION_HEIGHT: u32 = 100;
/// Items per collection sampled when estimating the pattern height.
pub const PATTERN_SAMPLE_ITEMS: u32 = 2;
/// Pattern heights at or above this are not treated as repeating records.
pub const MAX_PATTERN_HEIGHT: u32 = 20;
/// Root type plus one level of nested records.
pub const MAX_NESTING_DEPTH: usize = 2;

/// Rectangle occupied by a mapping plus its pattern metadata. Rows and
/// columns are 1-based and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundaries {
    pub min_row: u32,
    pub max_row: u32,
    pub min_col: u32,
    pub max_col: u32,
    /// Most items any single collection can hold inside the grid.
    pub max_item_capacity: u32,
    pub has_dynamic_collections: bool,
    /// Rows spanned by one repeating root item; 0 when not a pattern.
    pub pattern_height: u32,
    pub is_multi_item_pattern: bool,
}

impl Boundaries {
    pub fn grid_width(&self) -> u32 {
        self.max_col - self.min_col + 1
    }

    pub fn grid_height(&self) -> u32 {
        self.max_row - self.min_row + 1
    }

    /// Top-left cell of the grid.
    pub fn top_left(&self) -> CellRef {
        // Bounds are derived from parsed addresses and always valid.
        CellRef::new(self.min_row, self.min_col).unwrap_or(CellRef::A1)
    }

    pub fn contains(&self, cell: CellRef) -> bool {
        (self.min_row..=self.max_row).contains(&cell.row())
            && (self.min_col..=self.max_col).contains(&cell.col())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HandlerKind {
    #[default]
    Empty,
    Property,
    Formula,
    CollectionItem,
}

/// What a handler extracts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Slot {
    #[default]
    None,
    Property(usize),
    Item {
        collection: usize,
        member: usize,
        /// Item index within the collection.
        index: u32,
        /// Row offset inside the item block.
        phase: u32,
    },
}

/// Compiled plan for one grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellHandler {
    pub kind: HandlerKind,
    pub slot: Slot,
    /// Row of the owning binding's start cell.
    pub start_row: u32,
    /// Rows per item (block height plus spacing); 0 for properties.
    pub stride: u32,
    /// First row the binding no longer owns, or -1 when unbounded.
    pub boundary_row: i64,
    pub format: Option<Arc<str>>,
    pub formula: Option<Arc<str>>,
}

impl Default for CellHandler {
    fn default() -> Self {
        Self {
            kind: HandlerKind::Empty,
            slot: Slot::None,
            start_row: 0,
            stride: 0,
            boundary_row: -1,
            format: None,
            formula: None,
        }
    }
}

impl CellHandler {
    pub fn is_empty(&self) -> bool {
        self.kind == HandlerKind::Empty
    }

    pub fn boundary(&self) -> Option<u32> {
        u32::try_from(self.boundary_row).ok()
    }

    /// Bound extractor: the value this cell takes for `owner`.
    pub fn extract<T>(&self, mapping: &CompiledMapping<T>, owner: &T) -> CellValue {
        match self.slot {
            Slot::Property(idx) => mapping.properties[idx].accessor.get(owner),
            Slot::Item {
                collection,
                member,
                index,
                ..
            } => mapping.collections[collection].item_value(owner, index as usize, member),
            Slot::None => CellValue::Empty,
        }
    }
}

/// Row-major handler grid addressed by `(row - min_row, col - min_col)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CellGrid {
    width: u32,
    height: u32,
    cells: Vec<CellHandler>,
}

impl CellGrid {
    pub fn new(height: u32, width: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![CellHandler::default(); (width as usize) * (height as usize)],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, row: u32, col: u32) -> Option<&CellHandler> {
        self.index(row, col).map(|i| &self.cells[i])
    }

    pub fn row(&self, row: u32) -> Option<&[CellHandler]> {
        if row >= self.height {
            return None;
        }
        let start = (row * self.width) as usize;
        Some(&self.cells[start..start + self.width as usize])
    }

    /// Stamp a handler unless the cell already holds one. Returns whether it
    /// was placed.
    pub(crate) fn stamp(&mut self, row: u32, col: u32, handler: CellHandler) -> bool {
        match self.index(row, col) {
            Some(i) if self.cells[i].is_empty() => {
                self.cells[i] = handler;
                true
            }
            _ => false,
        }
    }

    fn index(&self, row: u32, col: u32) -> Option<usize> {
        (row < self.height && col < self.width)
            .then(|| (row as usize) * (self.width as usize) + col as usize)
    }
}

/// Column → property lookup for mappings whose properties share one row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnHandlers {
    row: Option<u32>,
    by_col: FxHashMap<u32, usize>,
}

impl ColumnHandlers {
    pub(crate) fn new(row: Option<u32>, by_col: FxHashMap<u32, usize>) -> Self {
        Self { row, by_col }
    }

    /// Shared property row, when there is one.
    pub fn row(&self) -> Option<u32> {
        self.row
    }

    pub fn is_valid(&self) -> bool {
        self.row.is_some()
    }

    pub fn property_at(&self, col: u32) -> Option<usize> {
        self.by_col.get(&col).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadStrategy {
    /// One source row per item.
    Table,
    /// Fixed-shape root items with simple collections; items are delimited
    /// by row signals.
    RepeatingPattern,
    /// Best-effort lookahead scanning.
    Heuristic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteStrategy {
    /// Properties only.
    Rows,
    /// Collections walked through per-item cursors.
    Streaming,
    /// Collections buffered once per item before layout.
    Snapshot,
}

/// Per-cell accessor of a collection item member.
pub type MemberGetter<T> = Arc<dyn Fn(&T, usize) -> CellValue + Send + Sync>;
/// Creates an empty buffer that accumulates items during a read.
pub type BufferFactory<T> = Arc<dyn Fn() -> Box<dyn ItemBuffer<T>> + Send + Sync>;

/// One cell of an item block.
pub struct ItemMember<T> {
    pub name: String,
    pub col_offset: u32,
    pub row_offset: u32,
    pub kind: ValueKind,
    pub format: Option<Arc<str>>,
    pub get: MemberGetter<T>,
}

impl<T> fmt::Debug for ItemMember<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemMember")
            .field("name", &self.name)
            .field("col_offset", &self.col_offset)
            .field("row_offset", &self.row_offset)
            .field("kind", &self.kind)
            .field("format", &self.format)
            .finish()
    }
}

/// Per-item layout of a collection. For nested records the item type's own
/// mapping is flattened into members relative to its top-left cell; simple
/// collections have a single member at offset (0, 0).
pub struct NestedMappingInfo<T> {
    pub type_name: String,
    pub nested: bool,
    pub members: Vec<ItemMember<T>>,
    pub block_height: u32,
    pub block_width: u32,
    pub new_buffer: BufferFactory<T>,
}

impl<T> fmt::Debug for NestedMappingInfo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedMappingInfo")
            .field("type_name", &self.type_name)
            .field("nested", &self.nested)
            .field("members", &self.members)
            .field("block_height", &self.block_height)
            .field("block_width", &self.block_width)
            .finish()
    }
}

pub struct CompiledProperty<T> {
    pub(crate) name: String,
    pub(crate) cell: CellRef,
    pub(crate) format: Option<Arc<str>>,
    pub(crate) formula: Option<Arc<str>>,
    pub(crate) accessor: Arc<dyn ScalarAccessor<T>>,
}

impl<T> CompiledProperty<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cell(&self) -> CellRef {
        self.cell
    }

    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    pub fn formula(&self) -> Option<&str> {
        self.formula.as_deref()
    }

    pub fn kind(&self) -> ValueKind {
        self.accessor.kind()
    }

    pub fn accessor(&self) -> &Arc<dyn ScalarAccessor<T>> {
        &self.accessor
    }
}

pub struct CompiledCollection<T> {
    pub(crate) name: String,
    pub(crate) start: CellRef,
    pub(crate) row_spacing: u32,
    pub(crate) stride: u32,
    /// First row owned by a later binding in an overlapping column.
    pub(crate) boundary: Option<u32>,
    pub(crate) info: NestedMappingInfo<T>,
    pub(crate) accessor: Arc<dyn CollectionAccessor<T>>,
}

impl<T> CompiledCollection<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> CellRef {
        self.start
    }

    pub fn row_spacing(&self) -> u32 {
        self.row_spacing
    }

    /// Rows between the starts of consecutive items.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn boundary(&self) -> Option<u32> {
        self.boundary
    }

    pub fn is_nested(&self) -> bool {
        self.info.nested
    }

    pub fn info(&self) -> &NestedMappingInfo<T> {
        &self.info
    }

    pub fn item_count(&self, owner: &T) -> usize {
        self.accessor.item_count(owner)
    }

    pub fn item_value(&self, owner: &T, index: usize, member: usize) -> CellValue {
        self.info
            .members
            .get(member)
            .map(|m| (m.get)(owner, index))
            .unwrap_or_default()
    }

    pub fn new_buffer(&self) -> Box<dyn ItemBuffer<T>> {
        (self.info.new_buffer)()
    }

    /// First template row of item `index`.
    pub(crate) fn item_row(&self, index: u32) -> u64 {
        self.start.row() as u64 + index as u64 * self.stride as u64
    }

    /// Last template row occupied by `count` items, if any.
    pub(crate) fn last_row_for(&self, count: usize) -> Option<u64> {
        (count > 0).then(|| self.item_row(count as u32 - 1) + self.info.block_height as u64 - 1)
    }

    pub(crate) fn last_col(&self) -> u32 {
        self.start.col() + self.info.block_width - 1
    }

    pub(crate) fn covers_col(&self, col: u32) -> bool {
        (self.start.col()..=self.last_col()).contains(&col)
    }

    /// Geometry lookup for template rows outside the grid: member and item
    /// index occupying `(row, col)`, if any.
    pub(crate) fn locate(&self, row: u32, col: u32) -> Option<(usize, u32, u32)> {
        if row < self.start.row() || !self.covers_col(col) {
            return None;
        }
        if self.boundary.is_some_and(|b| row >= b) {
            return None;
        }
        let rel = row - self.start.row();
        let index = rel / self.stride;
        let phase = rel % self.stride;
        let col_offset = col - self.start.col();
        self.info
            .members
            .iter()
            .position(|m| m.row_offset == phase && m.col_offset == col_offset)
            .map(|member| (member, index, phase))
    }
}

/// Immutable plan for one mapped type.
pub struct CompiledMapping<T> {
    pub(crate) type_name: String,
    pub(crate) sheet: String,
    pub(crate) properties: Vec<CompiledProperty<T>>,
    pub(crate) collections: Vec<CompiledCollection<T>>,
    pub(crate) boundaries: Boundaries,
    pub(crate) grid: CellGrid,
    pub(crate) column_handlers: ColumnHandlers,
    pub(crate) read_strategy: ReadStrategy,
    pub(crate) write_strategy: WriteStrategy,
    pub(crate) item_spacing: u32,
    /// Row of the first property, when there are properties.
    pub(crate) anchor_row: Option<u32>,
    pub(crate) factory: fn() -> Option<T>,
}

impl<T> CompiledMapping<T> {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    pub fn properties(&self) -> &[CompiledProperty<T>] {
        &self.properties
    }

    pub fn collections(&self) -> &[CompiledCollection<T>] {
        &self.collections
    }

    pub fn boundaries(&self) -> &Boundaries {
        &self.boundaries
    }

    pub fn grid(&self) -> &CellGrid {
        &self.grid
    }

    pub fn column_handlers(&self) -> &ColumnHandlers {
        &self.column_handlers
    }

    pub fn read_strategy(&self) -> ReadStrategy {
        self.read_strategy
    }

    pub fn write_strategy(&self) -> WriteStrategy {
        self.write_strategy
    }

    pub fn item_spacing(&self) -> u32 {
        self.item_spacing
    }

    pub fn factory(&self) -> fn() -> Option<T> {
        self.factory
    }

    /// Handler at absolute template coordinates, if inside the grid.
    pub fn handler_at(&self, row: u32, col: u32) -> Option<&CellHandler> {
        let b = &self.boundaries;
        if row < b.min_row || col < b.min_col {
            return None;
        }
        self.grid.get(row - b.min_row, col - b.min_col)
    }

    /// Last template row holding a property.
    pub(crate) fn max_property_row(&self) -> Option<u32> {
        self.properties.iter().map(|p| p.cell.row()).max()
    }

    /// Comparable projection of the plan, free of function pointers.
    pub fn structure(&self) -> MappingStructure {
        MappingStructure {
            type_name: self.type_name.clone(),
            sheet: self.sheet.clone(),
            properties: self
                .properties
                .iter()
                .map(|p| (p.name.clone(), p.cell, p.accessor.kind()))
                .collect(),
            collections: self
                .collections
                .iter()
                .map(|c| CollectionStructure {
                    name: c.name.clone(),
                    start: c.start,
                    stride: c.stride,
                    boundary: c.boundary,
                    item_type: c.info.type_name.clone(),
                    members: c
                        .info
                        .members
                        .iter()
                        .map(|m| (m.name.clone(), m.col_offset, m.row_offset))
                        .collect(),
                })
                .collect(),
            boundaries: self.boundaries,
            grid: self.grid.clone(),
            column_handlers: self.column_handlers.clone(),
            read_strategy: self.read_strategy,
            write_strategy: self.write_strategy,
            item_spacing: self.item_spacing,
        }
    }
}

impl<T> fmt::Debug for CompiledMapping<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledMapping")
            .field("type_name", &self.type_name)
            .field("sheet", &self.sheet)
            .field("boundaries", &self.boundaries)
            .field("read_strategy", &self.read_strategy)
            .field("write_strategy", &self.write_strategy)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionStructure {
    pub name: String,
    pub start: CellRef,
    pub stride: u32,
    pub boundary: Option<u32>,
    pub item_type: String,
    pub members: Vec<(String, u32, u32)>,
}

/// Structural view of a [`CompiledMapping`], used to compare plans.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingStructure {
    pub type_name: String,
    pub sheet: String,
    pub properties: Vec<(String, CellRef, ValueKind)>,
    pub collections: Vec<CollectionStructure>,
    pub boundaries: Boundaries,
    pub grid: CellGrid,
    pub column_handlers: ColumnHandlers,
    pub read_strategy: ReadStrategy,
    pub write_strategy: WriteStrategy,
    pub item_spacing: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_is_bounds_checked_and_stamps_once() {
        let mut grid = CellGrid::new(2, 3);
        assert!(grid.get(2, 0).is_none());
        assert!(grid.get(0, 3).is_none());

        let prop = CellHandler {
            kind: HandlerKind::Property,
            slot: Slot::Property(0),
            boundary_row: -1,
            ..CellHandler::default()
        };
        assert!(grid.stamp(1, 2, prop.clone()));
        assert!(!grid.stamp(1, 2, CellHandler {
            kind: HandlerKind::Formula,
            ..prop.clone()
        }));
        assert_eq!(grid.get(1, 2), Some(&prop));
        assert_eq!(grid.row(1).map(|r| r.len()), Some(3));
        assert!(grid.row(2).is_none());
        assert!(!grid.stamp(5, 5, prop));
    }

    #[test]
    fn boundaries_derive_dimensions() {
        let b = Boundaries {
            min_row: 2,
            max_row: 5,
            min_col: 3,
            max_col: 3,
            max_item_capacity: 0,
            has_dynamic_collections: false,
            pattern_height: 0,
            is_multi_item_pattern: false,
        };
        assert_eq!(b.grid_height(), 4);
        assert_eq!(b.grid_width(), 1);
        assert!(b.contains(CellRef::new(5, 3).unwrap()));
        assert!(!b.contains(CellRef::new(6, 3).unwrap()));
    }

    #[test]
    fn handler_boundary_sentinel() {
        let unbounded = CellHandler {
            boundary_row: -1,
            ..CellHandler::default()
        };
        assert_eq!(unbounded.boundary(), None);
        let bounded = CellHandler {
            boundary_row: 10,
            ..CellHandler::default()
        };
        assert_eq!(bounded.boundary(), Some(10));
    }
}

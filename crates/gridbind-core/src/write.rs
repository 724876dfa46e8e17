//! Streaming write engine.
//!
//! Items are laid out one after another. Each item occupies the template rows
//! of the grid, shifted down to the item's start row; rows below the grid are
//! served from collection geometry. Rows reach the sink strictly in order and
//! row numbering stays contiguous from row 1.
//!
//! A repeating-pattern mapping gives every item a slot of `pattern_height`
//! rows, padded with empty rows, so its reader can address items by slot.

use std::borrow::Borrow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use gridbind_common::{CellValue, DefaultConverter, MAX_ROW, ValueConverter};
use gridbind_io::{CellSink, SheetCell};
use smallvec::SmallVec;

use crate::error::MappingError;
use crate::mapping::{CompiledMapping, HandlerKind, ReadStrategy, Slot, WriteStrategy};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Enumerate every collection once per item into a buffer before laying
    /// it out, instead of reading items through cursors.
    pub snapshot_collections: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub items: usize,
    /// Last row handed to the sink, placeholders included.
    pub rows: u32,
}

pub struct WriteEngine<'m, T> {
    mapping: &'m CompiledMapping<T>,
    converter: Arc<dyn ValueConverter>,
    options: WriteOptions,
}

impl<'m, T> WriteEngine<'m, T> {
    pub fn new(mapping: &'m CompiledMapping<T>) -> Self {
        Self {
            mapping,
            converter: Arc::new(DefaultConverter),
            options: WriteOptions::default(),
        }
    }

    pub fn with_converter(mut self, converter: Arc<dyn ValueConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_options(mut self, options: WriteOptions) -> Self {
        self.options = options;
        self
    }

    pub fn write<I, S>(&self, items: I, sink: &mut S) -> Result<WriteSummary, MappingError>
    where
        I: IntoIterator,
        I::Item: Borrow<T>,
        S: CellSink + ?Sized,
    {
        self.run(items, sink, None)
    }

    /// Like [`write`](Self::write), checking `cancel_flag` before every row.
    /// Rows already handed to the sink stay as written.
    pub fn write_cancellable<I, S>(
        &self,
        items: I,
        sink: &mut S,
        cancel_flag: &AtomicBool,
    ) -> Result<WriteSummary, MappingError>
    where
        I: IntoIterator,
        I::Item: Borrow<T>,
        S: CellSink + ?Sized,
    {
        self.run(items, sink, Some(cancel_flag))
    }

    fn strategy(&self) -> WriteStrategy {
        match self.mapping.write_strategy {
            WriteStrategy::Streaming if self.options.snapshot_collections => {
                WriteStrategy::Snapshot
            }
            other => other,
        }
    }

    fn run<I, S>(
        &self,
        items: I,
        sink: &mut S,
        cancel: Option<&AtomicBool>,
    ) -> Result<WriteSummary, MappingError>
    where
        I: IntoIterator,
        I::Item: Borrow<T>,
        S: CellSink + ?Sized,
    {
        let mapping = self.mapping;
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!(
            "write_items",
            type_name = mapping.type_name(),
            sheet = mapping.sheet()
        )
        .entered();

        let min_row = mapping.boundaries.min_row;
        let snapshot = self.strategy() == WriteStrategy::Snapshot;
        let mut out = RowWriter {
            sink,
            next_row: 1,
            cancel,
        };
        out.sink.start_sheet(mapping.sheet())?;
        out.pad_to(min_row as u64)?;

        let bounds = &mapping.boundaries;
        let slot = if bounds.is_multi_item_pattern {
            bounds.pattern_height as u64
        } else {
            0
        };
        let fixed_slots = slot > 0 && mapping.read_strategy == ReadStrategy::RepeatingPattern;

        let mut start = min_row as u64;
        let mut count = 0;
        let mut items = items.into_iter().peekable();
        while let Some(item) = items.next() {
            let state = ItemState::open(mapping, item.borrow(), start, snapshot)?;
            let last = match state.last_template_row(mapping) {
                Some(last) => {
                    for template in min_row..=last {
                        let row = start + (template - min_row) as u64;
                        out.pad_to(row)?;
                        let cells = self.row_cells(&state, template, row);
                        out.emit(row, &cells)?;
                    }
                    start + (last - min_row) as u64
                }
                None => start - 1,
            };
            count += 1;
            if fixed_slots && last >= start + slot && items.peek().is_some() {
                return Err(state.slot_overflow(mapping, start, slot));
            }
            start = (start + mapping.item_spacing as u64).max(start + slot).max(last + 1);
        }
        if slot > 0 {
            out.pad_to(start)?;
        }
        out.sink.finish_sheet()?;

        #[cfg(feature = "tracing")]
        tracing::debug!(items = count, rows = out.next_row - 1, "write finished");

        Ok(WriteSummary {
            items: count,
            rows: out.next_row - 1,
        })
    }

    fn row_cells(&self, state: &ItemState<'_, T>, template: u32, row: u64) -> Vec<SheetCell> {
        let mapping = self.mapping;
        let b = &mapping.boundaries;
        let row = row as u32;
        let mut cells = Vec::new();

        let Some(handlers) = mapping.grid.row(template - b.min_row) else {
            return self.geometry_cells(state, template, row);
        };
        for (offset, handler) in handlers.iter().enumerate() {
            let col = b.min_col + offset as u32;
            let value = match (handler.kind, handler.slot) {
                (HandlerKind::Empty, _) | (_, Slot::None) => continue,
                (HandlerKind::Property | HandlerKind::Formula, _) => {
                    handler.extract(mapping, state.item)
                }
                (
                    HandlerKind::CollectionItem,
                    Slot::Item {
                        collection,
                        member,
                        index,
                        ..
                    },
                ) => {
                    let index = index as usize;
                    if index >= state.lens[collection] {
                        continue;
                    }
                    state.value(mapping, collection, index, member)
                }
                (HandlerKind::CollectionItem, Slot::Property(_)) => continue,
            };
            let value = self.converter.to_cell(value, handler.format.as_deref());
            let mut cell = SheetCell::new(row, col, value);
            if let Some(formula) = &handler.formula {
                cell = cell.with_formula(formula.replace("{row}", &row.to_string()));
            } else if cell.value.is_blank() {
                continue;
            }
            cells.push(cell);
        }
        cells
    }

    /// Cells of a template row below the grid: only unbounded collections
    /// reach that far.
    fn geometry_cells(&self, state: &ItemState<'_, T>, template: u32, row: u32) -> Vec<SheetCell> {
        let mapping = self.mapping;
        let mut found: SmallVec<[(u32, usize, usize, u32); 8]> = SmallVec::new();
        for (ci, coll) in mapping.collections.iter().enumerate() {
            if coll.boundary.is_some() || template < coll.start.row() {
                continue;
            }
            let rel = template - coll.start.row();
            let (index, phase) = (rel / coll.stride, rel % coll.stride);
            if index as usize >= state.lens[ci] {
                continue;
            }
            for (mi, m) in coll.info.members.iter().enumerate() {
                if m.row_offset == phase {
                    found.push((coll.start.col() + m.col_offset, ci, mi, index));
                }
            }
        }
        found.sort_by_key(|(col, ..)| *col);
        found.dedup_by_key(|(col, ..)| *col);

        found
            .into_iter()
            .filter_map(|(col, ci, mi, index)| {
                let member = &mapping.collections[ci].info.members[mi];
                let value = state.value(mapping, ci, index as usize, mi);
                let value = self.converter.to_cell(value, member.format.as_deref());
                (!value.is_blank()).then(|| SheetCell::new(row, col, value))
            })
            .collect()
    }
}

/// Write `items` through `mapping` with the default converter.
pub fn write_items<T, I, S>(
    mapping: &CompiledMapping<T>,
    items: I,
    sink: &mut S,
) -> Result<WriteSummary, MappingError>
where
    I: IntoIterator,
    I::Item: Borrow<T>,
    S: CellSink + ?Sized,
{
    WriteEngine::new(mapping).write(items, sink)
}

struct RowWriter<'s, 'c, S: ?Sized> {
    sink: &'s mut S,
    next_row: u32,
    cancel: Option<&'c AtomicBool>,
}

impl<S: CellSink + ?Sized> RowWriter<'_, '_, S> {
    fn emit(&mut self, row: u64, cells: &[SheetCell]) -> Result<(), MappingError> {
        if self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Err(MappingError::Cancelled);
        }
        if row > MAX_ROW as u64 {
            return Err(MappingError::RowLimit(row));
        }
        self.sink.write_row(row as u32, cells)?;
        self.next_row = row as u32 + 1;
        Ok(())
    }

    /// Emit empty rows up to, but excluding, `row`.
    fn pad_to(&mut self, row: u64) -> Result<(), MappingError> {
        while (self.next_row as u64) < row {
            self.emit(self.next_row as u64, &[])?;
        }
        Ok(())
    }
}

/// Per-item view of the collections: their lengths and, on the snapshot
/// path, every member value enumerated once.
struct ItemState<'i, T> {
    item: &'i T,
    lens: SmallVec<[usize; 4]>,
    snapshot: Option<Vec<Vec<Vec<CellValue>>>>,
}

impl<'i, T> ItemState<'i, T> {
    fn open(
        mapping: &CompiledMapping<T>,
        item: &'i T,
        start: u64,
        snapshot: bool,
    ) -> Result<Self, MappingError> {
        let min_row = mapping.boundaries.min_row as u64;
        let mut lens = SmallVec::with_capacity(mapping.collections.len());
        for coll in &mapping.collections {
            let len = coll.item_count(item);
            if let (Some(boundary), Some(last)) = (coll.boundary, coll.last_row_for(len)) {
                if last >= boundary as u64 {
                    return Err(MappingError::CollectionOverflow {
                        property: coll.name.clone(),
                        row: (start + last - min_row) as u32,
                        boundary: (start + boundary as u64 - min_row) as u32,
                    });
                }
            }
            lens.push(len);
        }
        let snapshot = snapshot.then(|| {
            mapping
                .collections
                .iter()
                .zip(&lens)
                .map(|(coll, &len)| {
                    (0..len)
                        .map(|index| {
                            coll.info
                                .members
                                .iter()
                                .map(|m| (m.get)(item, index))
                                .collect()
                        })
                        .collect()
                })
                .collect()
        });
        Ok(Self {
            item,
            lens,
            snapshot,
        })
    }

    fn value(
        &self,
        mapping: &CompiledMapping<T>,
        collection: usize,
        index: usize,
        member: usize,
    ) -> CellValue {
        match &self.snapshot {
            Some(values) => values[collection][index][member].clone(),
            None => mapping.collections[collection].item_value(self.item, index, member),
        }
    }

    /// Last template row this item occupies; `None` when it has no rows.
    ///
    /// An empty collection still holds the rows above its start, so the next
    /// item never begins where this item's first block would be read.
    fn last_template_row(&self, mapping: &CompiledMapping<T>) -> Option<u32> {
        let min_row = mapping.boundaries.min_row as u64;
        let collections = mapping
            .collections
            .iter()
            .zip(&self.lens)
            .filter_map(|(coll, &len)| {
                coll.last_row_for(len)
                    .or_else(|| Some(coll.start.row() as u64 - 1).filter(|&row| row >= min_row))
            })
            .map(|row| row.min(MAX_ROW as u64) as u32);
        mapping.max_property_row().into_iter().chain(collections).max()
    }

    /// Error for an item whose collections run past its pattern slot while
    /// more items follow.
    fn slot_overflow(&self, mapping: &CompiledMapping<T>, start: u64, slot: u64) -> MappingError {
        let min_row = mapping.boundaries.min_row as u64;
        let (property, last) = mapping
            .collections
            .iter()
            .zip(&self.lens)
            .filter_map(|(coll, &len)| Some((coll.name.as_str(), coll.last_row_for(len)?)))
            .max_by_key(|(_, last)| *last)
            .unwrap_or(("", min_row));
        MappingError::CollectionOverflow {
            property: property.to_string(),
            row: (start + last - min_row).min(MAX_ROW as u64) as u32,
            boundary: (start + slot).min(MAX_ROW as u64) as u32,
        }
    }
}

//! Lookahead reader for mappings without a fixed item height.
//!
//! Items are assumed to start `item_spacing` rows apart. Collection lengths
//! are inferred by scanning item blocks forward until a stop condition is
//! met; the item after a collection starts below the last block read.

use gridbind_common::{CellValue, MAX_ROW};
use gridbind_io::RowSource;

use super::assemble::{ItemAssembler, ReadContext};
use super::window::RowWindow;
use crate::error::MappingError;

/// Most item blocks scanned per collection and root item.
pub const MAX_SCAN_ITEMS: u32 = 1000;
/// Consecutive empty item blocks that end a collection.
pub const MAX_EMPTY_RUN: u32 = 10;

pub(crate) struct HeuristicReader {
    start: u32,
}

impl HeuristicReader {
    pub(crate) fn new(origin: u32) -> Self {
        Self { start: origin }
    }

    pub(crate) fn next_item<T, S: RowSource>(
        &mut self,
        window: &mut RowWindow<'_, S>,
        ctx: &ReadContext<'_, T>,
    ) -> Result<Option<T>, MappingError> {
        let mapping = ctx.mapping;
        let min_row = mapping.boundaries.min_row;
        let skip_blank = mapping.anchor_row.is_none_or(|row| row == min_row);
        let property_floor = mapping.max_property_row().map_or(0, |row| row - min_row);

        loop {
            let start = self.start;
            let Some(first) = window.get(start)? else {
                return Ok(None);
            };
            if skip_blank && first.is_blank() {
                self.start += 1;
                window.release_before(self.start);
                continue;
            }

            let mut item = ItemAssembler::start(ctx)?;
            let mut last = start - 1;
            for (idx, prop) in mapping.properties.iter().enumerate() {
                let (row, col) = (ctx.sheet_row(start, prop.cell.row()), prop.cell.col());
                if let Some(value) = cell(window, row, col)? {
                    item.set_property(ctx, idx, &value, row, col)?;
                    last = last.max(row);
                }
            }

            for (idx, coll) in mapping.collections.iter().enumerate() {
                let first_block = ctx.sheet_row(start, coll.start.row()) as u64;
                let boundary = coll.boundary.map(|b| ctx.sheet_row(start, b) as u64);
                let height = coll.info.block_height as u64;
                let mut empty_run = 0;
                for index in 0..MAX_SCAN_ITEMS {
                    let block = first_block + index as u64 * coll.stride as u64;
                    if block > MAX_ROW as u64 || boundary.is_some_and(|b| block + height > b) {
                        break;
                    }
                    let block = block as u32;
                    if window.get(block)?.is_none() {
                        break;
                    }
                    if block > start + property_floor && majority_at(window, ctx, block)? {
                        break;
                    }

                    let mut any = false;
                    for (member, m) in coll.info.members.iter().enumerate() {
                        let (row, col) = (block + m.row_offset, coll.start.col() + m.col_offset);
                        if let Some(value) = cell(window, row, col)? {
                            item.set_item(ctx, idx, index as usize, member, &value, row, col)?;
                            any = true;
                        }
                    }
                    if any {
                        empty_run = 0;
                        last = last.max(block + coll.info.block_height - 1);
                    } else {
                        empty_run += 1;
                        if empty_run >= MAX_EMPTY_RUN {
                            break;
                        }
                    }
                }
            }

            self.start = (start + mapping.item_spacing).max(last + 1);
            window.release_before(self.start);
            if let Some(item) = item.finish() {
                return Ok(Some(item));
            }
        }
    }
}

fn cell<S: RowSource>(
    window: &mut RowWindow<'_, S>,
    row: u32,
    col: u32,
) -> Result<Option<CellValue>, MappingError> {
    Ok(window
        .get(row)?
        .and_then(|r| r.get(col))
        .filter(|v| !v.is_blank())
        .cloned())
}

/// Whether enough properties are populated for `row` to start a new item.
fn majority_at<T, S: RowSource>(
    window: &mut RowWindow<'_, S>,
    ctx: &ReadContext<'_, T>,
    row: u32,
) -> Result<bool, MappingError> {
    let properties = &ctx.mapping.properties;
    if properties.is_empty() {
        return Ok(false);
    }
    let needed = (properties.len() / 2).max(2);
    let mut hits = 0;
    for prop in properties {
        if cell(window, ctx.sheet_row(row, prop.cell.row()), prop.cell.col())?.is_some() {
            hits += 1;
        }
    }
    Ok(hits >= needed)
}

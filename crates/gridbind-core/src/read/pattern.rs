//! Fixed-height reader for repeating root items.
//!
//! Rows are grouped into slots of `pattern_height` rows counted from the
//! origin: the item index of a row is `(row - origin) / height` and its grid
//! row is `min_row + (row - origin) % height`. Items whose cells are all blank
//! are dropped, and collections keep only the items up to their last value.
//!
//! The last item may run past its slot when its collections are longer than
//! the slot holds. A slot cut short by the end of the source therefore stays
//! with the item before it, provided every value in it lands in one of that
//! item's collections.

use gridbind_io::RowSource;

use super::assemble::{ItemAssembler, ReadContext};
use super::window::RowWindow;
use crate::error::MappingError;
use crate::mapping::Slot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    Property(usize),
    Item {
        collection: usize,
        index: u32,
        member: usize,
    },
}

struct Current<T> {
    item: ItemAssembler<T>,
    start: u32,
}

pub(crate) struct PatternReader<T> {
    row: u32,
    height: u32,
    /// First row of the next slot; `None` once the current item runs to the
    /// end of the source.
    slot_end: Option<u32>,
    current: Option<Current<T>>,
}

impl<T> PatternReader<T> {
    pub(crate) fn new(origin: u32, height: u32) -> Self {
        Self {
            row: origin,
            height: height.max(1),
            slot_end: Some(origin),
            current: None,
        }
    }

    pub(crate) fn next_item<S: RowSource>(
        &mut self,
        window: &mut RowWindow<'_, S>,
        ctx: &ReadContext<'_, T>,
    ) -> Result<Option<T>, MappingError> {
        loop {
            let row = self.row;
            let mut finished = None;
            if self.slot_end == Some(row) && window.get(row)?.is_some() {
                if self.continues_current(window, ctx, row)? {
                    self.slot_end = None;
                } else {
                    finished = self.current.take().and_then(|c| c.item.finish());
                    self.current = Some(Current {
                        item: ItemAssembler::start(ctx)?,
                        start: row,
                    });
                    self.slot_end = Some(row + self.height);
                }
            }

            let Some(source) = window.get(row)? else {
                return Ok(self.current.take().and_then(|c| c.item.finish()));
            };
            self.row += 1;
            if let Some(current) = self.current.as_mut() {
                let template = ctx.template_row(current.start, row);
                for (&col, value) in &source.cells {
                    match claim(ctx, template, col) {
                        Some(Claim::Property(idx)) => {
                            current.item.set_property(ctx, idx, value, row, col)?;
                        }
                        Some(Claim::Item {
                            collection,
                            index,
                            member,
                        }) => {
                            current.item.set_item(
                                ctx,
                                collection,
                                index as usize,
                                member,
                                value,
                                row,
                                col,
                            )?;
                        }
                        None => {}
                    }
                }
            }
            window.release_before(self.row);

            if finished.is_some() {
                return Ok(finished);
            }
        }
    }

    /// Whether the slot starting at `row` is a short tail that belongs to the
    /// current item's collections rather than a new item.
    fn continues_current<S: RowSource>(
        &self,
        window: &mut RowWindow<'_, S>,
        ctx: &ReadContext<'_, T>,
        row: u32,
    ) -> Result<bool, MappingError> {
        let Some(current) = &self.current else {
            return Ok(false);
        };
        let last = row + (self.height - 1);
        if window.get(last)?.is_some() {
            return Ok(false);
        }
        for r in row..last {
            let Some(source) = window.get(r)? else {
                break;
            };
            let template = ctx.template_row(current.start, r);
            let stray = source.cells.iter().any(|(&col, value)| {
                !value.is_blank() && !matches!(claim(ctx, template, col), Some(Claim::Item { .. }))
            });
            if stray {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Binding that owns template cell `(template, col)` of an item.
fn claim<T>(ctx: &ReadContext<'_, T>, template: u32, col: u32) -> Option<Claim> {
    let mapping = ctx.mapping;
    if template <= mapping.boundaries.max_row {
        return match mapping.handler_at(template, col)?.slot {
            Slot::Property(idx) => Some(Claim::Property(idx)),
            Slot::Item {
                collection,
                member,
                index,
                ..
            } => Some(Claim::Item {
                collection,
                index,
                member,
            }),
            Slot::None => None,
        };
    }
    mapping
        .collections
        .iter()
        .enumerate()
        .find_map(|(idx, coll)| {
            let (member, index, _) = coll.locate(template, col)?;
            Some(Claim::Item {
                collection: idx,
                index,
                member,
            })
        })
}

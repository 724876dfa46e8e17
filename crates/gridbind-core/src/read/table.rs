use gridbind_io::RowSource;

use super::assemble::{ItemAssembler, ReadContext};
use super::window::RowWindow;
use crate::error::MappingError;

/// One source row per item, columns resolved through the column handlers.
pub(crate) struct TableReader {
    row: u32,
}

impl TableReader {
    pub(crate) fn new(origin: u32) -> Self {
        Self { row: origin }
    }

    pub(crate) fn next_item<T, S: RowSource>(
        &mut self,
        window: &mut RowWindow<'_, S>,
        ctx: &ReadContext<'_, T>,
    ) -> Result<Option<T>, MappingError> {
        let handlers = &ctx.mapping.column_handlers;
        loop {
            let row = self.row;
            let Some(source) = window.get(row)? else {
                return Ok(None);
            };
            self.row += 1;
            if source.is_blank() {
                window.release_before(self.row);
                continue;
            }
            let mut item = ItemAssembler::start(ctx)?;
            for (&col, value) in &source.cells {
                if let Some(property) = handlers.property_at(col) {
                    item.set_property(ctx, property, value, row, col)?;
                }
            }
            window.release_before(self.row);
            if let Some(item) = item.finish() {
                return Ok(Some(item));
            }
        }
    }
}

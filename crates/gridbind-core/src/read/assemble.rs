use std::sync::Arc;

use gridbind_common::{CellValue, ValueConverter, column_to_letters};

use crate::error::{FieldError, MappingError};
use crate::mapping::CompiledMapping;
use crate::schema::ItemBuffer;

/// Shared, read-only state of one read pass.
pub(crate) struct ReadContext<'a, T> {
    pub(crate) mapping: &'a CompiledMapping<T>,
    pub(crate) converter: Arc<dyn ValueConverter>,
    /// Sheet row where the first item starts.
    pub(crate) origin: u32,
}

impl<T> ReadContext<'_, T> {
    /// Template row of `row` for an item starting at `start`.
    pub(crate) fn template_row(&self, start: u32, row: u32) -> u32 {
        self.mapping.boundaries.min_row + (row - start)
    }

    /// Sheet row of `template` for an item starting at `start`.
    pub(crate) fn sheet_row(&self, start: u32, template: u32) -> u32 {
        start + (template - self.mapping.boundaries.min_row)
    }

    fn conversion_error(
        &self,
        err: FieldError,
        row: u32,
        col: u32,
        property: &str,
    ) -> MappingError {
        let cell = format!("{}{row}", column_to_letters(col));
        MappingError::from_field(err, &self.mapping.sheet, cell, property)
    }
}

/// One item under construction plus its collection buffers.
pub(crate) struct ItemAssembler<T> {
    item: T,
    buffers: Vec<Option<Box<dyn ItemBuffer<T>>>>,
    touched: bool,
}

impl<T> ItemAssembler<T> {
    pub(crate) fn start(ctx: &ReadContext<'_, T>) -> Result<Self, MappingError> {
        let item = (ctx.mapping.factory)().ok_or_else(|| MappingError::ItemFactory {
            type_name: ctx.mapping.type_name.clone(),
        })?;
        let mut buffers = Vec::with_capacity(ctx.mapping.collections.len());
        buffers.resize_with(ctx.mapping.collections.len(), || None);
        Ok(Self {
            item,
            buffers,
            touched: false,
        })
    }

    /// Convert and assign a property cell. Blank cells leave the default.
    pub(crate) fn set_property(
        &mut self,
        ctx: &ReadContext<'_, T>,
        property: usize,
        value: &CellValue,
        row: u32,
        col: u32,
    ) -> Result<(), MappingError> {
        if value.is_blank() {
            return Ok(());
        }
        let prop = &ctx.mapping.properties[property];
        ctx.converter
            .from_cell(value, prop.kind(), prop.format())
            .and_then(|converted| prop.accessor.set(&mut self.item, &converted))
            .map_err(|err| ctx.conversion_error(err.into(), row, col, &prop.name))?;
        self.touched = true;
        Ok(())
    }

    /// Convert and buffer one member of collection item `index`.
    pub(crate) fn set_item(
        &mut self,
        ctx: &ReadContext<'_, T>,
        collection: usize,
        index: usize,
        member: usize,
        value: &CellValue,
        row: u32,
        col: u32,
    ) -> Result<(), MappingError> {
        if value.is_blank() {
            return Ok(());
        }
        let coll = &ctx.mapping.collections[collection];
        let Some(m) = coll.info.members.get(member) else {
            return Ok(());
        };
        let converted = ctx
            .converter
            .from_cell(value, m.kind, m.format.as_deref())
            .map_err(|err| ctx.conversion_error(err.into(), row, col, &m.name))?;
        self.buffers[collection]
            .get_or_insert_with(|| coll.new_buffer())
            .set(index, member, &converted)
            .map_err(|err| ctx.conversion_error(err, row, col, &m.name))?;
        self.touched = true;
        Ok(())
    }

    /// The finished item, or `None` when no cell was assigned.
    pub(crate) fn finish(mut self) -> Option<T> {
        if !self.touched {
            return None;
        }
        for buffer in self.buffers.into_iter().flatten() {
            buffer.finish(&mut self.item);
        }
        Some(self.item)
    }
}

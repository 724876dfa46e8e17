//! Binding → [`CompiledMapping`] compilation.
//!
//! Compilation is a pure function of the binding and the schema: all address
//! parsing, accessor resolution, geometry and strategy selection happen here
//! so the engines only ever index into the resulting plan.

use std::sync::Arc;

use gridbind_common::{CellRef, MAX_COL, MAX_ROW};
use gridbind_spec::{CollectionSpec, Layout, PropertySpec, TypeBinding};
use rustc_hash::FxHashMap;

use crate::error::CompileError;
use crate::mapping::{
    Boundaries, CellGrid, CellHandler, ColumnHandlers, CompiledCollection, CompiledMapping,
    CompiledProperty, DEFAULT_COLLECTION_HEIGHT, HandlerKind, MAX_PATTERN_HEIGHT,
    PATTERN_SAMPLE_ITEMS, ReadStrategy, Slot, WriteStrategy,
};
use crate::registry::Registry;
use crate::schema::{FieldAccess, NestedContext, Record, Schema};

/// Knobs for [`compile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// When false, reads use the heuristic strategy and writes the snapshot
    /// path regardless of the mapping's shape.
    pub optimize: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self { optimize: true }
    }
}

/// Compile `binding` for `T`. Nested item types are looked up in `registry`.
pub fn compile<T: Record>(
    binding: &TypeBinding,
    registry: &Registry,
    options: CompileOptions,
) -> Result<CompiledMapping<T>, CompileError> {
    let schema = T::schema();
    let type_name = schema.type_name().to_string();

    #[cfg(feature = "tracing")]
    let _span = tracing::info_span!("compile_mapping", type_name = %type_name).entered();

    let properties = resolve_properties(&schema, &binding.properties)?;
    let mut ctx = NestedContext::new(registry, 1);
    let mut collections = resolve_collections(&schema, &binding.collections, &mut ctx)?;

    assign_collection_boundaries(&properties, &mut collections);
    let mut boundaries = compute_boundaries(&properties, &collections);
    detect_pattern(&mut boundaries, &properties, &collections);

    let (grid, capacity) = build_grid(&boundaries, &properties, &collections);
    boundaries.max_item_capacity = capacity;

    let column_handlers = column_handlers(&properties);
    let anchor_row = properties.iter().map(|p| p.cell.row()).min();

    let max_property_row = properties.iter().map(|p| p.cell.row()).max();
    let item_spacing = match (column_handlers.is_valid(), max_property_row) {
        (true, _) | (false, None) => 1,
        (false, Some(max_row)) => max_row - boundaries.min_row + 2,
    };

    let read_strategy = if !options.optimize {
        ReadStrategy::Heuristic
    } else if collections.is_empty() && column_handlers.is_valid() {
        ReadStrategy::Table
    } else if boundaries.is_multi_item_pattern && anchor_row == Some(boundaries.min_row) {
        ReadStrategy::RepeatingPattern
    } else {
        ReadStrategy::Heuristic
    };
    let write_strategy = if !options.optimize {
        WriteStrategy::Snapshot
    } else if collections.is_empty() {
        WriteStrategy::Rows
    } else {
        WriteStrategy::Streaming
    };

    #[cfg(feature = "tracing")]
    tracing::debug!(
        type_name = %type_name,
        ?read_strategy,
        ?write_strategy,
        pattern_height = boundaries.pattern_height,
        grid_height = boundaries.grid_height(),
        grid_width = boundaries.grid_width(),
        "compiled mapping"
    );

    Ok(CompiledMapping {
        type_name,
        sheet: binding.sheet.clone(),
        properties,
        collections,
        boundaries,
        grid,
        column_handlers,
        read_strategy,
        write_strategy,
        item_spacing,
        anchor_row,
        factory: schema.factory(),
    })
}

fn parse_address(
    type_name: &str,
    property: &str,
    address: Option<&str>,
) -> Result<CellRef, CompileError> {
    let address = address.ok_or_else(|| CompileError::MissingAddress {
        type_name: type_name.to_string(),
        property: property.to_string(),
    })?;
    CellRef::parse_a1(address).map_err(|source| CompileError::InvalidAddress {
        type_name: type_name.to_string(),
        property: property.to_string(),
        address: address.to_string(),
        source,
    })
}

fn resolve_properties<T: Record>(
    schema: &Schema<T>,
    specs: &[PropertySpec],
) -> Result<Vec<CompiledProperty<T>>, CompileError> {
    let type_name = schema.type_name();
    specs
        .iter()
        .map(|spec| {
            let cell = parse_address(type_name, &spec.property, spec.cell.as_deref())?;
            let field = schema.field_named(&spec.property).ok_or_else(|| {
                CompileError::UnresolvedProperty {
                    type_name: type_name.to_string(),
                    property: spec.property.clone(),
                }
            })?;
            let FieldAccess::Scalar(accessor) = field.access() else {
                return Err(CompileError::WrongKind {
                    type_name: type_name.to_string(),
                    property: spec.property.clone(),
                    expected: "scalar property",
                    actual: field.kind_label(),
                });
            };
            Ok(CompiledProperty {
                name: spec.property.clone(),
                cell,
                format: spec.format.as_deref().map(Arc::from),
                formula: spec.formula.as_deref().map(Arc::from),
                accessor: Arc::clone(accessor),
            })
        })
        .collect()
}

fn resolve_collections<T: Record>(
    schema: &Schema<T>,
    specs: &[CollectionSpec],
    ctx: &mut NestedContext<'_>,
) -> Result<Vec<CompiledCollection<T>>, CompileError> {
    let type_name = schema.type_name();
    let mut out = Vec::with_capacity(specs.len());
    for spec in specs {
        if spec.layout != Layout::Vertical {
            return Err(CompileError::UnsupportedLayout {
                property: spec.property.clone(),
                layout: spec.layout,
            });
        }
        let start = parse_address(type_name, &spec.property, spec.start.as_deref())?;
        let field = schema.field_named(&spec.property).ok_or_else(|| {
            CompileError::UnresolvedProperty {
                type_name: type_name.to_string(),
                property: spec.property.clone(),
            }
        })?;
        let FieldAccess::Collection(accessor) = field.access() else {
            return Err(CompileError::WrongKind {
                type_name: type_name.to_string(),
                property: spec.property.clone(),
                expected: "collection",
                actual: field.kind_label(),
            });
        };

        let actual = accessor.item_type();
        if let Some(nested) = &spec.nested {
            if !accessor.is_nested() || *nested != actual {
                return Err(CompileError::ItemTypeMismatch {
                    property: spec.property.clone(),
                    declared: nested.clone(),
                    actual,
                });
            }
        }
        if let Some(declared) = &spec.item_type {
            if *declared != actual {
                return Err(CompileError::ItemTypeMismatch {
                    property: spec.property.clone(),
                    declared: declared.clone(),
                    actual,
                });
            }
        }

        let info = accessor.layout(&spec.property, spec.format.as_deref(), ctx)?;
        let stride = info.block_height + spec.row_spacing;
        out.push(CompiledCollection {
            name: spec.property.clone(),
            start,
            row_spacing: spec.row_spacing,
            stride,
            boundary: None,
            info,
            accessor: Arc::clone(accessor),
        });
    }
    Ok(out)
}

/// A collection ends where a later binding in one of its columns begins.
fn assign_collection_boundaries<T>(
    properties: &[CompiledProperty<T>],
    collections: &mut [CompiledCollection<T>],
) {
    let limits: Vec<Option<u32>> = collections
        .iter()
        .enumerate()
        .map(|(idx, coll)| {
            let start_row = coll.start.row();
            let from_collections = collections
                .iter()
                .enumerate()
                .filter(|(other, c)| {
                    *other != idx
                        && c.start.row() > start_row
                        && c.start.col() <= coll.last_col()
                        && coll.start.col() <= c.last_col()
                })
                .map(|(_, c)| c.start.row());
            let from_properties = properties
                .iter()
                .filter(|p| p.cell.row() > start_row && coll.covers_col(p.cell.col()))
                .map(|p| p.cell.row());
            from_collections.chain(from_properties).min()
        })
        .collect();
    for (coll, limit) in collections.iter_mut().zip(limits) {
        coll.boundary = limit;
    }
}

fn estimated_last_row<T>(coll: &CompiledCollection<T>, items: u32) -> u32 {
    let last = coll.item_row(items - 1) + coll.info.block_height as u64 - 1;
    last.min(MAX_ROW as u64) as u32
}

fn compute_boundaries<T>(
    properties: &[CompiledProperty<T>],
    collections: &[CompiledCollection<T>],
) -> Boundaries {
    let mut rows = Vec::new();
    let mut cols = Vec::new();
    for p in properties {
        rows.push(p.cell.row());
        cols.push(p.cell.col());
    }
    for c in collections {
        rows.push(c.start.row());
        rows.push(estimated_last_row(c, DEFAULT_COLLECTION_HEIGHT));
        cols.push(c.start.col());
        cols.push(c.last_col().min(MAX_COL));
    }
    Boundaries {
        min_row: rows.iter().copied().min().unwrap_or(1),
        max_row: rows.iter().copied().max().unwrap_or(1),
        min_col: cols.iter().copied().min().unwrap_or(1),
        max_col: cols.iter().copied().max().unwrap_or(1),
        max_item_capacity: 0,
        has_dynamic_collections: !collections.is_empty(),
        pattern_height: 0,
        is_multi_item_pattern: false,
    }
}

/// Small-sample estimate of how tall one root item is. Only mappings with
/// properties and simple collections qualify.
fn detect_pattern<T>(
    boundaries: &mut Boundaries,
    properties: &[CompiledProperty<T>],
    collections: &[CompiledCollection<T>],
) {
    if properties.is_empty() || collections.is_empty() || collections.iter().any(|c| c.is_nested())
    {
        return;
    }
    let first_row = properties.iter().map(|p| p.cell.row()).min().unwrap_or(1);
    let last_property = properties.iter().map(|p| p.cell.row()).max().unwrap_or(first_row);
    let last_estimate = collections
        .iter()
        .map(|c| estimated_last_row(c, PATTERN_SAMPLE_ITEMS))
        .chain(std::iter::once(last_property))
        .max()
        .unwrap_or(last_property);
    let height = last_estimate.saturating_sub(first_row) + 1;
    let multi = height > 0 && height < MAX_PATTERN_HEIGHT;

    #[cfg(feature = "tracing")]
    tracing::debug!(pattern_height = height, multi_item = multi, "pattern detection");

    if multi {
        boundaries.pattern_height = height;
        boundaries.is_multi_item_pattern = true;
    }
}

fn build_grid<T>(
    boundaries: &Boundaries,
    properties: &[CompiledProperty<T>],
    collections: &[CompiledCollection<T>],
) -> (CellGrid, u32) {
    let mut grid = CellGrid::new(boundaries.grid_height(), boundaries.grid_width());
    let (row0, col0) = (boundaries.min_row, boundaries.min_col);

    for (idx, p) in properties.iter().enumerate() {
        let kind = if p.formula.is_some() {
            HandlerKind::Formula
        } else {
            HandlerKind::Property
        };
        grid.stamp(
            p.cell.row() - row0,
            p.cell.col() - col0,
            CellHandler {
                kind,
                slot: Slot::Property(idx),
                start_row: p.cell.row(),
                stride: 0,
                boundary_row: -1,
                format: p.format.clone(),
                formula: p.formula.clone(),
            },
        );
    }

    let mut order: Vec<usize> = (0..collections.len()).collect();
    order.sort_by_key(|&i| (collections[i].start.row(), collections[i].start.col()));

    let mut capacity = 0;
    for idx in order {
        let coll = &collections[idx];
        let limit = coll
            .boundary
            .map_or(boundaries.max_row as u64 + 1, |b| b as u64)
            .min(boundaries.max_row as u64 + 1);
        let boundary_row = coll.boundary.map_or(-1, i64::from);
        let mut fitted = 0;
        for index in 0u32.. {
            let item_row = coll.item_row(index);
            if item_row >= limit {
                break;
            }
            if item_row + coll.info.block_height as u64 <= limit {
                fitted += 1;
            }
            for (member, m) in coll.info.members.iter().enumerate() {
                let row = item_row + m.row_offset as u64;
                if row >= limit {
                    continue;
                }
                grid.stamp(
                    row as u32 - row0,
                    coll.start.col() + m.col_offset - col0,
                    CellHandler {
                        kind: HandlerKind::CollectionItem,
                        slot: Slot::Item {
                            collection: idx,
                            member,
                            index,
                            phase: m.row_offset,
                        },
                        start_row: coll.start.row(),
                        stride: coll.stride,
                        boundary_row,
                        format: m.format.clone(),
                        formula: None,
                    },
                );
            }
        }
        capacity = capacity.max(fitted);
    }
    (grid, capacity)
}

fn column_handlers<T>(properties: &[CompiledProperty<T>]) -> ColumnHandlers {
    let Some(first) = properties.first() else {
        return ColumnHandlers::default();
    };
    let row = first.cell.row();
    if properties.iter().any(|p| p.cell.row() != row) {
        return ColumnHandlers::default();
    }
    let mut by_col = FxHashMap::default();
    for (idx, p) in properties.iter().enumerate() {
        by_col.entry(p.cell.col()).or_insert(idx);
    }
    ColumnHandlers::new(Some(row), by_col)
}

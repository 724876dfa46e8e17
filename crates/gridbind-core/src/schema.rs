//! Self-description of mapped types.
//!
//! Rust has no runtime reflection, so a mapped type lists its fields once in
//! [`Record::schema`]. Each field is captured as a pair of plain function
//! pointers; the compiler turns those into the per-cell extractors and setters
//! the engines call, so nothing is inspected at stream time.

use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use gridbind_common::{CellConvert, CellValue, ConversionError, ValueKind};
use smallvec::SmallVec;

use crate::error::{CompileError, FieldError};
use crate::mapping::{CompiledMapping, ItemMember, MAX_NESTING_DEPTH, NestedMappingInfo};
use crate::registry::Registry;

/// A type that can be bound to spreadsheet cells.
///
/// The schema names its owner with a turbofish so the accessor closures
/// have a concrete argument type:
///
/// ```
/// use gridbind_core::{Record, Schema};
///
/// #[derive(Default)]
/// struct Person {
///     name: String,
///     age: i64,
///     nicknames: Vec<String>,
/// }
///
/// impl Record for Person {
///     fn schema() -> Schema<Self> {
///         Schema::<Self>::new()
///             .field("Name", |p| &p.name, |p| &mut p.name)
///             .field("Age", |p| &p.age, |p| &mut p.age)
///             .values("Nicknames", |p| &p.nicknames, |p| &mut p.nicknames)
///     }
/// }
///
/// assert_eq!(Person::schema().type_name(), "Person");
/// ```
pub trait Record: Sized + Send + Sync + 'static {
    fn schema() -> Schema<Self>;
}

/// Owning collection type of a collection property.
pub trait Sequence<U>: Send + Sync + 'static {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn item(&self, index: usize) -> Option<&U>;

    /// Build the collection from items read back from a sheet.
    fn from_items(items: Vec<U>) -> Self;
}

impl<U: Send + Sync + 'static> Sequence<U> for Vec<U> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn item(&self, index: usize) -> Option<&U> {
        self.get(index)
    }

    fn from_items(items: Vec<U>) -> Self {
        items
    }
}

impl<U: Send + Sync + 'static> Sequence<U> for Box<[U]> {
    fn len(&self) -> usize {
        <[U]>::len(self)
    }

    fn item(&self, index: usize) -> Option<&U> {
        self.get(index)
    }

    fn from_items(items: Vec<U>) -> Self {
        items.into_boxed_slice()
    }
}

impl<U: Send + Sync + 'static> Sequence<U> for VecDeque<U> {
    fn len(&self) -> usize {
        VecDeque::len(self)
    }

    fn item(&self, index: usize) -> Option<&U> {
        self.get(index)
    }

    fn from_items(items: Vec<U>) -> Self {
        VecDeque::from(items)
    }
}

impl<A> Sequence<A::Item> for SmallVec<A>
where
    A: smallvec::Array + Send + Sync + 'static,
    A::Item: Send + Sync + 'static,
    SmallVec<A>: Send + Sync,
{
    fn len(&self) -> usize {
        SmallVec::len(self)
    }

    fn item(&self, index: usize) -> Option<&A::Item> {
        self.as_slice().get(index)
    }

    fn from_items(items: Vec<A::Item>) -> Self {
        SmallVec::from_vec(items)
    }
}

/// Typed access to one scalar property.
pub trait ScalarAccessor<T>: Send + Sync {
    fn kind(&self) -> ValueKind;

    fn get(&self, owner: &T) -> CellValue;

    fn is_writable(&self) -> bool;

    /// Assign a cell value. Read-only accessors ignore the call.
    fn set(&self, owner: &mut T, value: &CellValue) -> Result<(), ConversionError>;
}

/// Typed access to one collection property.
pub trait CollectionAccessor<T>: Send + Sync {
    /// `true` when items are records laid out through their own binding.
    fn is_nested(&self) -> bool;

    /// Name of the item type, as used by `item_type`/`nested` in bindings.
    fn item_type(&self) -> String;

    fn item_count(&self, owner: &T) -> usize;

    /// Flatten the item type into per-cell members.
    fn layout(
        &self,
        property: &str,
        format: Option<&str>,
        ctx: &mut NestedContext<'_>,
    ) -> Result<NestedMappingInfo<T>, CompileError>;
}

/// Accumulates collection items while a sheet is read.
pub trait ItemBuffer<T>: Send {
    /// Store `value` into `member` of item `index`, creating padding items
    /// through the item factory as needed.
    fn set(&mut self, index: usize, member: usize, value: &CellValue) -> Result<(), FieldError>;

    /// Number of items up to and including the last assigned index.
    fn assigned(&self) -> usize;

    /// Hand the items to the owner through the sequence's `from_items`.
    fn finish(self: Box<Self>, owner: &mut T);
}

/// Lookup state handed to collection accessors while compiling nested items.
pub struct NestedContext<'r> {
    registry: &'r Registry,
    depth: usize,
}

impl<'r> NestedContext<'r> {
    pub(crate) fn new(registry: &'r Registry, depth: usize) -> Self {
        Self { registry, depth }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Compiled mapping of a nested item type. Nested items may only hold
    /// scalar properties.
    pub fn resolve<U: Record>(
        &mut self,
        property: &str,
    ) -> Result<Arc<CompiledMapping<U>>, CompileError> {
        let type_name = U::schema().type_name().to_string();
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(CompileError::NestingTooDeep {
                type_name,
                max: MAX_NESTING_DEPTH,
            });
        }
        let mapping = self.registry.mapping::<U>().map_err(|err| match err {
            CompileError::NotConfigured { type_name } => CompileError::NestedNotConfigured {
                type_name,
                property: property.to_string(),
            },
            other => other,
        })?;
        if !mapping.collections().is_empty() {
            return Err(CompileError::NestingTooDeep {
                type_name,
                max: MAX_NESTING_DEPTH,
            });
        }
        Ok(mapping)
    }
}

/// One declared field of a schema.
pub struct Field<T> {
    name: &'static str,
    access: FieldAccess<T>,
}

pub enum FieldAccess<T> {
    Scalar(Arc<dyn ScalarAccessor<T>>),
    Collection(Arc<dyn CollectionAccessor<T>>),
}

impl<T> Clone for FieldAccess<T> {
    fn clone(&self) -> Self {
        match self {
            FieldAccess::Scalar(a) => FieldAccess::Scalar(Arc::clone(a)),
            FieldAccess::Collection(a) => FieldAccess::Collection(Arc::clone(a)),
        }
    }
}

impl<T> Field<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn access(&self) -> &FieldAccess<T> {
        &self.access
    }

    pub(crate) fn kind_label(&self) -> &'static str {
        match self.access {
            FieldAccess::Scalar(_) => "scalar property",
            FieldAccess::Collection(_) => "collection",
        }
    }
}

/// Field list, name, and item factory of a mapped type.
pub struct Schema<T> {
    type_name: &'static str,
    factory: fn() -> Option<T>,
    fields: Vec<Field<T>>,
}

fn default_factory<T: Default>() -> Option<T> {
    Some(T::default())
}

pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

impl<T: Default + Send + Sync + 'static> Schema<T> {
    /// Schema whose instances come from `T::default()`. Call it as
    /// `Schema::<Self>::new()` inside [`Record::schema`].
    pub fn new() -> Self {
        Self::with_factory(default_factory::<T>)
    }
}

impl<T: Default + Send + Sync + 'static> Default for Schema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> Schema<T> {
    /// Schema for types without a usable `Default`. A factory returning
    /// `None` surfaces as [`MappingError::ItemFactory`](crate::MappingError::ItemFactory)
    /// when a sheet is read.
    pub fn with_factory(factory: fn() -> Option<T>) -> Self {
        Self {
            type_name: short_type_name::<T>(),
            factory,
            fields: Vec::new(),
        }
    }

    /// Override the type name used to match bindings (defaults to the
    /// unqualified Rust type name).
    pub fn named(mut self, type_name: &'static str) -> Self {
        self.type_name = type_name;
        self
    }

    pub fn field<V: CellConvert>(
        self,
        name: &'static str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> Self {
        self.push_scalar(name, ScalarField { get, get_mut: Some(get_mut) })
    }

    /// Scalar property that is written but never assigned on read.
    pub fn read_only<V: CellConvert>(self, name: &'static str, get: fn(&T) -> &V) -> Self {
        self.push_scalar(name, ScalarField { get, get_mut: None })
    }

    /// Collection of scalar values, one cell per item.
    pub fn values<S, V>(
        mut self,
        name: &'static str,
        get: fn(&T) -> &S,
        get_mut: fn(&mut T) -> &mut S,
    ) -> Self
    where
        S: Sequence<V>,
        V: CellConvert + Default,
    {
        self.fields.push(Field {
            name,
            access: FieldAccess::Collection(Arc::new(ValueCollection::<T, S, V> {
                get,
                get_mut,
                _item: PhantomData,
            })),
        });
        self
    }

    /// Collection of nested records laid out through their own binding.
    pub fn records<S, U>(
        mut self,
        name: &'static str,
        get: fn(&T) -> &S,
        get_mut: fn(&mut T) -> &mut S,
    ) -> Self
    where
        S: Sequence<U>,
        U: Record,
    {
        self.fields.push(Field {
            name,
            access: FieldAccess::Collection(Arc::new(RecordCollection::<T, S, U> {
                get,
                get_mut,
                _item: PhantomData,
            })),
        });
        self
    }

    fn push_scalar<V: CellConvert>(mut self, name: &'static str, field: ScalarField<T, V>) -> Self {
        self.fields.push(Field {
            name,
            access: FieldAccess::Scalar(Arc::new(field)),
        });
        self
    }
}

impl<T> Schema<T> {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn factory(&self) -> fn() -> Option<T> {
        self.factory
    }

    pub fn fields(&self) -> &[Field<T>] {
        &self.fields
    }

    pub fn field_named(&self, name: &str) -> Option<&Field<T>> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl<T> fmt::Debug for Schema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("type_name", &self.type_name)
            .field(
                "fields",
                &self.fields.iter().map(|fd| fd.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

struct ScalarField<T, V> {
    get: fn(&T) -> &V,
    get_mut: Option<fn(&mut T) -> &mut V>,
}

impl<T: Send + Sync + 'static, V: CellConvert> ScalarAccessor<T> for ScalarField<T, V> {
    fn kind(&self) -> ValueKind {
        V::KIND
    }

    fn get(&self, owner: &T) -> CellValue {
        (self.get)(owner).to_cell()
    }

    fn is_writable(&self) -> bool {
        self.get_mut.is_some()
    }

    fn set(&self, owner: &mut T, value: &CellValue) -> Result<(), ConversionError> {
        if let Some(get_mut) = self.get_mut {
            *get_mut(owner) = V::from_cell(value)?;
        }
        Ok(())
    }
}

struct ValueCollection<T, S, V> {
    get: fn(&T) -> &S,
    get_mut: fn(&mut T) -> &mut S,
    _item: PhantomData<fn() -> V>,
}

impl<T, S, V> CollectionAccessor<T> for ValueCollection<T, S, V>
where
    T: Send + Sync + 'static,
    S: Sequence<V>,
    V: CellConvert + Default,
{
    fn is_nested(&self) -> bool {
        false
    }

    fn item_type(&self) -> String {
        short_type_name::<V>().to_string()
    }

    fn item_count(&self, owner: &T) -> usize {
        (self.get)(owner).len()
    }

    fn layout(
        &self,
        property: &str,
        format: Option<&str>,
        _ctx: &mut NestedContext<'_>,
    ) -> Result<NestedMappingInfo<T>, CompileError> {
        let get = self.get;
        let get_mut = self.get_mut;
        let member = ItemMember {
            name: property.to_string(),
            col_offset: 0,
            row_offset: 0,
            kind: V::KIND,
            format: format.map(Arc::from),
            get: Arc::new(move |owner: &T, index: usize| {
                get(owner).item(index).map(V::to_cell).unwrap_or_default()
            }),
        };
        Ok(NestedMappingInfo {
            type_name: self.item_type(),
            nested: false,
            members: vec![member],
            block_height: 1,
            block_width: 1,
            new_buffer: Arc::new(move || {
                Box::new(ValueBuffer::<T, S, V> {
                    items: Vec::new(),
                    get_mut,
                }) as Box<dyn ItemBuffer<T>>
            }),
        })
    }
}

struct ValueBuffer<T, S, V> {
    items: Vec<V>,
    get_mut: fn(&mut T) -> &mut S,
}

impl<T, S, V> ItemBuffer<T> for ValueBuffer<T, S, V>
where
    T: Send + Sync + 'static,
    S: Sequence<V>,
    V: CellConvert + Default,
{
    fn set(&mut self, index: usize, _member: usize, value: &CellValue) -> Result<(), FieldError> {
        let value = V::from_cell(value)?;
        if self.items.len() <= index {
            self.items.resize_with(index + 1, V::default);
        }
        self.items[index] = value;
        Ok(())
    }

    fn assigned(&self) -> usize {
        self.items.len()
    }

    fn finish(self: Box<Self>, owner: &mut T) {
        *(self.get_mut)(owner) = S::from_items(self.items);
    }
}

struct RecordCollection<T, S, U> {
    get: fn(&T) -> &S,
    get_mut: fn(&mut T) -> &mut S,
    _item: PhantomData<fn() -> U>,
}

impl<T, S, U> CollectionAccessor<T> for RecordCollection<T, S, U>
where
    T: Send + Sync + 'static,
    S: Sequence<U>,
    U: Record,
{
    fn is_nested(&self) -> bool {
        true
    }

    fn item_type(&self) -> String {
        U::schema().type_name().to_string()
    }

    fn item_count(&self, owner: &T) -> usize {
        (self.get)(owner).len()
    }

    fn layout(
        &self,
        property: &str,
        _format: Option<&str>,
        ctx: &mut NestedContext<'_>,
    ) -> Result<NestedMappingInfo<T>, CompileError> {
        let nested = ctx.resolve::<U>(property)?;
        let bounds = *nested.boundaries();
        let get = self.get;
        let get_mut = self.get_mut;

        let mut members = Vec::with_capacity(nested.properties().len());
        let mut setters: Vec<Arc<dyn ScalarAccessor<U>>> = Vec::with_capacity(members.capacity());
        for prop in nested.properties() {
            let accessor = Arc::clone(prop.accessor());
            if !accessor.is_writable() {
                return Err(CompileError::MissingSetter {
                    type_name: nested.type_name().to_string(),
                    property: prop.name().to_string(),
                });
            }
            let getter = Arc::clone(&accessor);
            members.push(ItemMember {
                name: format!("{property}.{}", prop.name()),
                col_offset: prop.cell().col() - bounds.min_col,
                row_offset: prop.cell().row() - bounds.min_row,
                kind: accessor.kind(),
                format: prop.format().map(Arc::from),
                get: Arc::new(move |owner: &T, index: usize| {
                    get(owner)
                        .item(index)
                        .map(|item| getter.get(item))
                        .unwrap_or_default()
                }),
            });
            setters.push(accessor);
        }

        let setters: Arc<[Arc<dyn ScalarAccessor<U>>]> = setters.into();
        let factory = nested.factory();
        let type_name: Arc<str> = Arc::from(nested.type_name());
        Ok(NestedMappingInfo {
            type_name: nested.type_name().to_string(),
            nested: true,
            members,
            block_height: bounds.grid_height(),
            block_width: bounds.grid_width(),
            new_buffer: Arc::new(move || {
                Box::new(RecordBuffer::<T, S, U> {
                    items: Vec::new(),
                    factory,
                    setters: Arc::clone(&setters),
                    type_name: Arc::clone(&type_name),
                    get_mut,
                }) as Box<dyn ItemBuffer<T>>
            }),
        })
    }
}

struct RecordBuffer<T, S, U> {
    items: Vec<U>,
    factory: fn() -> Option<U>,
    setters: Arc<[Arc<dyn ScalarAccessor<U>>]>,
    type_name: Arc<str>,
    get_mut: fn(&mut T) -> &mut S,
}

impl<T, S, U> ItemBuffer<T> for RecordBuffer<T, S, U>
where
    T: Send + Sync + 'static,
    S: Sequence<U>,
    U: Record,
{
    fn set(&mut self, index: usize, member: usize, value: &CellValue) -> Result<(), FieldError> {
        while self.items.len() <= index {
            let item = (self.factory)()
                .ok_or_else(|| FieldError::Factory(self.type_name.to_string()))?;
            self.items.push(item);
        }
        if let Some(setter) = self.setters.get(member) {
            setter.set(&mut self.items[index], value)?;
        }
        Ok(())
    }

    fn assigned(&self) -> usize {
        self.items.len()
    }

    fn finish(self: Box<Self>, owner: &mut T) {
        let this = *self;
        *(this.get_mut)(owner) = S::from_items(this.items);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Sample {
        name: String,
        id: i64,
        scores: VecDeque<f64>,
    }

    impl Record for Sample {
        fn schema() -> Schema<Self> {
            Schema::<Self>::new()
                .field("Name", |s| &s.name, |s| &mut s.name)
                .read_only("Id", |s| &s.id)
                .values("Scores", |s| &s.scores, |s| &mut s.scores)
        }
    }

    #[test]
    fn schema_lists_fields_and_defaults_name() {
        let schema = Sample::schema();
        assert_eq!(schema.type_name(), "Sample");
        let names: Vec<_> = schema.fields().iter().map(Field::name).collect();
        assert_eq!(names, ["Name", "Id", "Scores"]);
        assert!(schema.field_named("Missing").is_none());
        assert_eq!(schema.field_named("Scores").unwrap().kind_label(), "collection");
    }

    #[test]
    fn scalar_accessors_convert_and_respect_read_only() {
        let schema = Sample::schema();
        let mut sample = Sample {
            id: 9,
            ..Sample::default()
        };
        let FieldAccess::Scalar(name) = schema.field_named("Name").unwrap().access() else {
            panic!("Name should be scalar");
        };
        name.set(&mut sample, &CellValue::Text("Ann".into())).unwrap();
        assert_eq!(name.get(&sample), CellValue::Text("Ann".into()));

        let FieldAccess::Scalar(id) = schema.field_named("Id").unwrap().access() else {
            panic!("Id should be scalar");
        };
        assert!(!id.is_writable());
        id.set(&mut sample, &CellValue::Int(1)).unwrap();
        assert_eq!(sample.id, 9);
        assert!(id.set(&mut sample, &CellValue::Text("x".into())).is_ok());
    }

    #[test]
    fn value_buffer_pads_and_finishes() {
        let registry = Registry::new();
        let mut ctx = NestedContext::new(&registry, 1);
        let schema = Sample::schema();
        let FieldAccess::Collection(scores) = schema.field_named("Scores").unwrap().access() else {
            panic!("Scores should be a collection");
        };
        let info = scores.layout("Scores", None, &mut ctx).unwrap();
        assert_eq!(info.type_name, "f64");
        let mut buffer = (info.new_buffer)();
        buffer.set(2, 0, &CellValue::Number(3.5)).unwrap();
        buffer.set(0, 0, &CellValue::Number(1.5)).unwrap();
        assert_eq!(buffer.assigned(), 3);

        let mut sample = Sample::default();
        buffer.finish(&mut sample);
        assert_eq!(sample.scores, VecDeque::from(vec![1.5, 0.0, 3.5]));
        assert_eq!((info.members[0].get)(&sample, 2), CellValue::Number(3.5));
        assert_eq!((info.members[0].get)(&sample, 7), CellValue::Empty);
    }

    #[test]
    fn short_names_strip_paths_and_generics() {
        assert_eq!(short_type_name::<Vec<String>>(), "Vec");
        assert_eq!(short_type_name::<Sample>(), "Sample");
        assert_eq!(short_type_name::<f64>(), "f64");
    }

    #[test]
    fn sequences_rebuild_from_items() {
        let boxed = <Box<[i64]> as Sequence<i64>>::from_items(vec![1, 2]);
        assert_eq!(Sequence::len(&boxed), 2);
        let small = <SmallVec<[i64; 4]> as Sequence<i64>>::from_items(vec![3]);
        assert_eq!(small.item(0), Some(&3));
        assert!(Sequence::<i64>::is_empty(&Vec::<i64>::new()));
    }
}

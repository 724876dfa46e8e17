use crate::{MemoryWorkbook, Record, Registry, write_items};

/// Write `items` with the mapping registered for `T` into a fresh in-memory
/// workbook.
///
/// This helper is intended for documentation examples to avoid repetitive setup.
///
/// # Example
///
/// ```rust
/// # use gridbind::doc_examples::write_to_memory;
/// # use gridbind::{CellValue, Record, Registry, Schema};
/// #[derive(Default)]
/// struct Person {
///     name: String,
///     age: i64,
/// }
///
/// impl Record for Person {
///     fn schema() -> Schema<Self> {
///         Schema::<Self>::new()
///             .field("Name", |p| &p.name, |p| &mut p.name)
///             .field("Age", |p| &p.age, |p| &mut p.age)
///     }
/// }
///
/// let registry = Registry::new();
/// registry.configure_with::<Person>(|b| b.property("Name", "A1").property("Age", "B1"))?;
///
/// let people = [Person { name: "Ann".into(), age: 30 }];
/// let wb = write_to_memory(&registry, &people)?;
/// assert_eq!(wb.value_a1("Sheet1", "B1"), Some(&CellValue::Int(30)));
/// # Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
/// ```
pub fn write_to_memory<T: Record>(
    registry: &Registry,
    items: &[T],
) -> Result<MemoryWorkbook, Box<dyn std::error::Error + Send + Sync>> {
    let mapping = registry.mapping::<T>()?;
    let mut workbook = MemoryWorkbook::new();
    write_items(&mapping, items, &mut workbook)?;
    Ok(workbook)
}

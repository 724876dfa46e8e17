mod common;

use common::{Invoice, Order, Person, order_registry, sample_orders};
use gridbind_common::{CellRef, CellValue};
use gridbind_core::{
    CompileOptions, ReadStrategy, Registry, WriteEngine, WriteOptions, WriteStrategy, read_items,
    write_items,
};
use gridbind_io::MemoryWorkbook;
use gridbind_spec::TypeBinding;

fn people() -> Vec<Person> {
    vec![
        Person {
            name: "Ann".into(),
            age: 30,
        },
        Person {
            name: "Bo".into(),
            age: 40,
        },
    ]
}

#[test]
fn table_records_round_trip() {
    let registry = Registry::new();
    registry
        .configure::<Person>(TypeBinding::new("Person").property("Name", "A1").property("Age", "B1"))
        .unwrap();
    let mapping = registry.mapping::<Person>().unwrap();
    assert_eq!(mapping.read_strategy(), ReadStrategy::Table);

    let mut wb = MemoryWorkbook::new();
    let summary = write_items(&mapping, &people(), &mut wb).unwrap();
    assert_eq!(summary.items, 2);
    assert_eq!(summary.rows, 2);
    assert_eq!(
        wb.row_values("Sheet1", 1),
        vec![CellValue::Text("Ann".into()), CellValue::Int(30)]
    );
    assert_eq!(
        wb.row_values("Sheet1", 2),
        vec![CellValue::Text("Bo".into()), CellValue::Int(40)]
    );

    let back: Vec<Person> = read_items(&mapping, &mut wb)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(back, people());
}

fn invoice_registry(options: CompileOptions) -> Registry {
    let registry = Registry::with_options(options);
    registry
        .configure::<Invoice>(TypeBinding::new("Invoice").property("Id", "A1").collection("Items", "A2"))
        .unwrap();
    registry
}

#[test]
fn vertical_collection_is_written_below_its_owner() {
    let registry = invoice_registry(CompileOptions::default());
    let mapping = registry.mapping::<Invoice>().unwrap();
    assert_eq!(mapping.read_strategy(), ReadStrategy::RepeatingPattern);

    let invoice = Invoice {
        id: 7,
        items: vec![1.5, 2.5, 3.5],
    };
    let mut wb = MemoryWorkbook::new();
    write_items(&mapping, [&invoice], &mut wb).unwrap();

    assert_eq!(wb.value_a1("Sheet1", "A1"), Some(&CellValue::Int(7)));
    assert_eq!(wb.value_a1("Sheet1", "A2"), Some(&CellValue::Number(1.5)));
    assert_eq!(wb.value_a1("Sheet1", "A3"), Some(&CellValue::Number(2.5)));
    assert_eq!(wb.value_a1("Sheet1", "A4"), Some(&CellValue::Number(3.5)));
    assert_eq!(wb.row_count("Sheet1"), 4);

    let back: Vec<Invoice> = read_items(&mapping, &mut wb)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(back, vec![invoice]);
}

fn invoices() -> Vec<Invoice> {
    vec![
        Invoice {
            id: 1,
            items: vec![1.0, 2.0],
        },
        Invoice { id: 2, items: vec![] },
        Invoice {
            id: 3,
            items: vec![3.0],
        },
    ]
}

#[test]
fn repeating_items_fill_fixed_height_slots() {
    let registry = invoice_registry(CompileOptions::default());
    let mapping = registry.mapping::<Invoice>().unwrap();
    assert_eq!(mapping.boundaries().pattern_height, 3);

    let mut wb = MemoryWorkbook::new();
    let summary = write_items(&mapping, &invoices(), &mut wb).unwrap();
    assert_eq!(summary.rows, 9);
    assert_eq!(wb.row_count("Sheet1"), 9);

    let column_a: Vec<Option<CellValue>> = (1..=9)
        .map(|row| wb.value("Sheet1", CellRef::new(row, 1).unwrap()).cloned())
        .collect();
    assert_eq!(
        column_a,
        vec![
            Some(CellValue::Int(1)),
            Some(CellValue::Number(1.0)),
            Some(CellValue::Number(2.0)),
            Some(CellValue::Int(2)),
            None,
            None,
            Some(CellValue::Int(3)),
            Some(CellValue::Number(3.0)),
            None,
        ]
    );

    let back: Vec<Invoice> = read_items(&mapping, &mut wb)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(back, invoices());
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Batch {
    id: i64,
    label: String,
    items: Vec<f64>,
}

impl gridbind_core::Record for Batch {
    fn schema() -> gridbind_core::Schema<Self> {
        gridbind_core::Schema::<Self>::new()
            .field("Id", |b| &b.id, |b| &mut b.id)
            .field("Label", |b| &b.label, |b| &mut b.label)
            .values("Items", |b| &b.items, |b| &mut b.items)
    }
}

fn batches() -> Vec<Batch> {
    let batch = |id: i64, label: &str, items: Vec<f64>| Batch {
        id,
        label: label.into(),
        items,
    };
    vec![
        batch(1, "a", vec![1.0, 2.0]),
        batch(2, "b", vec![]),
        batch(3, "c", vec![3.0]),
    ]
}

#[test]
fn legacy_paths_read_and_write_the_same_sheet() {
    let configure = |options| {
        let registry = Registry::with_options(options);
        registry
            .configure::<Batch>(
                TypeBinding::new("Batch")
                    .property("Id", "A1")
                    .property("Label", "B1")
                    .collection("Items", "A2"),
            )
            .unwrap();
        registry
    };
    let fast = configure(CompileOptions::default());
    let legacy = configure(CompileOptions { optimize: false });
    let fast_mapping = fast.mapping::<Batch>().unwrap();
    let legacy_mapping = legacy.mapping::<Batch>().unwrap();
    assert_eq!(fast_mapping.read_strategy(), ReadStrategy::RepeatingPattern);
    assert_eq!(legacy_mapping.write_strategy(), WriteStrategy::Snapshot);
    assert_eq!(legacy_mapping.read_strategy(), ReadStrategy::Heuristic);

    let mut a = MemoryWorkbook::new();
    let mut b = MemoryWorkbook::new();
    write_items(&fast_mapping, &batches(), &mut a).unwrap();
    write_items(&legacy_mapping, &batches(), &mut b).unwrap();
    assert_eq!(a.cells("Sheet1"), b.cells("Sheet1"));

    // The heuristic reader tells a new batch from an item by its populated
    // properties.
    let back: Vec<Batch> = read_items(&legacy_mapping, &mut b)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(back, batches());
    let back: Vec<Batch> = read_items(&fast_mapping, &mut a)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(back, batches());
}

#[test]
fn sibling_collection_bounds_the_first_one() {
    #[derive(Debug, Default, Clone, PartialEq)]
    struct Pair {
        left: Vec<i64>,
        right: Vec<i64>,
    }

    impl gridbind_core::Record for Pair {
        fn schema() -> gridbind_core::Schema<Self> {
            gridbind_core::Schema::<Self>::new()
                .values("Left", |p| &p.left, |p| &mut p.left)
                .values("Right", |p| &p.right, |p| &mut p.right)
        }
    }

    let registry = Registry::new();
    registry
        .configure_with::<Pair>(|b| b.collection("Left", "A1").collection("Right", "A10"))
        .unwrap();
    let mapping = registry.mapping::<Pair>().unwrap();

    for row in 10..=109 {
        let handler = mapping.handler_at(row, 1).unwrap();
        assert!(
            !matches!(handler.slot, gridbind_core::Slot::Item { collection: 0, .. }),
            "row {row} claimed by the first collection"
        );
    }

    let pair = Pair {
        left: (1..=9).collect(),
        right: vec![100, 200],
    };
    let mut wb = MemoryWorkbook::new();
    write_items(&mapping, [&pair], &mut wb).unwrap();
    assert_eq!(wb.value_a1("Sheet1", "A9"), Some(&CellValue::Int(9)));
    assert_eq!(wb.value_a1("Sheet1", "A10"), Some(&CellValue::Int(100)));
    assert_eq!(wb.value_a1("Sheet1", "A11"), Some(&CellValue::Int(200)));

    let back: Vec<Pair> = read_items(&mapping, &mut wb)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(back, vec![pair]);
}

#[test]
fn nested_orders_round_trip() {
    let registry = Registry::new();
    order_registry(&registry);
    let mapping = registry.mapping::<Order>().unwrap();
    assert_eq!(mapping.sheet(), "Orders");
    assert!(mapping.collections()[0].is_nested());

    let mut wb = MemoryWorkbook::new();
    write_items(&mapping, &sample_orders(), &mut wb).unwrap();

    assert_eq!(wb.value_a1("Orders", "D1"), Some(&CellValue::Text("12.50".into())));
    assert_eq!(wb.value_a1("Orders", "C3"), Some(&CellValue::Text("A-1".into())));
    assert_eq!(wb.value_a1("Orders", "E4"), Some(&CellValue::Text("5.00".into())));
    assert_eq!(wb.value_a1("Orders", "B5"), Some(&CellValue::Text("Bolt".into())));
    // The empty order keeps the row above its lines.
    assert_eq!(wb.row_values("Orders", 6), Vec::<CellValue>::new());
    assert_eq!(wb.value_a1("Orders", "A7"), Some(&CellValue::Int(3)));
    assert_eq!(wb.value_a1("Orders", "C9"), Some(&CellValue::Text("C-3".into())));

    let back: Vec<Order> = read_items(&mapping, &mut wb)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(back, sample_orders());
}

#[test]
fn streaming_and_snapshot_writes_match() {
    let registry = Registry::new();
    order_registry(&registry);
    let mapping = registry.mapping::<Order>().unwrap();
    assert_eq!(mapping.write_strategy(), WriteStrategy::Streaming);

    let mut streamed = MemoryWorkbook::new();
    let mut buffered = MemoryWorkbook::new();
    let a = WriteEngine::new(&mapping)
        .write(&sample_orders(), &mut streamed)
        .unwrap();
    let b = WriteEngine::new(&mapping)
        .with_options(WriteOptions {
            snapshot_collections: true,
        })
        .write(&sample_orders(), &mut buffered)
        .unwrap();

    assert_eq!(a, b);
    assert_eq!(streamed.cells("Orders"), buffered.cells("Orders"));
    assert_eq!(streamed.row_count("Orders"), buffered.row_count("Orders"));
}

mod common;

use std::sync::atomic::AtomicBool;

use common::{Invoice, Person};
use gridbind_common::{CellRef, CellValue};
use gridbind_core::{
    MappingError, ReadEngine, ReadOptions, ReadStrategy, Record, Registry, Schema, read_items,
};
use gridbind_io::MemoryWorkbook;

fn at(a1: &str) -> CellRef {
    CellRef::parse_a1(a1).unwrap()
}

fn people_registry() -> Registry {
    let registry = Registry::new();
    registry
        .configure_with::<Person>(|b| b.property("Name", "A1").property("Age", "B1"))
        .unwrap();
    registry
}

#[test]
fn blank_rows_are_not_items() {
    let registry = people_registry();
    let mapping = registry.mapping::<Person>().unwrap();

    let mut wb = MemoryWorkbook::new();
    wb.set_value("Sheet1", at("A1"), "Ann");
    wb.set_value("Sheet1", at("B3"), 40i64);
    wb.set_value("Sheet1", at("Z5"), "ignored");

    let people: Vec<Person> = read_items(&mapping, &mut wb)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        people,
        vec![
            Person {
                name: "Ann".into(),
                age: 0
            },
            Person {
                name: String::new(),
                age: 40
            },
        ]
    );
}

#[test]
fn header_row_is_skipped() {
    let registry = people_registry();
    let mapping = registry.mapping::<Person>().unwrap();

    let mut wb = MemoryWorkbook::new();
    wb.set_value("Sheet1", at("A1"), "Name");
    wb.set_value("Sheet1", at("B1"), "Age");
    wb.set_value("Sheet1", at("A2"), "Ann");
    wb.set_value("Sheet1", at("B2"), 30i64);

    let items = ReadEngine::new(&mapping)
        .with_options(ReadOptions {
            has_header: true,
            ..ReadOptions::default()
        })
        .read(&mut wb)
        .unwrap();
    assert_eq!(items.origin(), 2);
    let people: Vec<Person> = items.collect::<Result<_, _>>().unwrap();
    assert_eq!(people.len(), 1);
    assert_eq!(people[0].age, 30);
}

#[test]
fn conversion_errors_name_the_cell_and_property() {
    let registry = people_registry();
    let mapping = registry.mapping::<Person>().unwrap();

    let mut wb = MemoryWorkbook::new();
    wb.set_value("Sheet1", at("A1"), "Ann");
    wb.set_value("Sheet1", at("B1"), 30i64);
    wb.set_value("Sheet1", at("A2"), "Bo");
    wb.set_value("Sheet1", at("B2"), "old");
    wb.set_value("Sheet1", at("A3"), "Cy");

    let mut items = read_items(&mapping, &mut wb).unwrap();
    assert_eq!(items.next().unwrap().unwrap().name, "Ann");
    match items.next().unwrap() {
        Err(MappingError::Conversion {
            sheet,
            cell,
            property,
            ..
        }) => {
            assert_eq!(sheet, "Sheet1");
            assert_eq!(cell, "B2");
            assert_eq!(property, "Age");
        }
        other => panic!("expected a conversion error, got {other:?}"),
    }
    // The pass is over after the first error.
    assert!(items.next().is_none());
}

#[derive(Debug, Clone, PartialEq)]
struct Sealed {
    code: String,
}

impl Record for Sealed {
    fn schema() -> Schema<Self> {
        Schema::<Self>::with_factory(|| None).field("Code", |s| &s.code, |s| &mut s.code)
    }
}

#[test]
fn failing_factory_surfaces_as_item_factory_error() {
    let registry = Registry::new();
    registry.configure_with::<Sealed>(|b| b.property("Code", "A1")).unwrap();
    let mapping = registry.mapping::<Sealed>().unwrap();

    let mut wb = MemoryWorkbook::new();
    wb.set_value("Sheet1", at("A1"), "x");

    let mut items = read_items(&mapping, &mut wb).unwrap();
    let err = items.next().unwrap().unwrap_err();
    assert!(
        matches!(err, MappingError::ItemFactory { ref type_name } if type_name == "Sealed"),
        "{err}"
    );
    assert!(items.next().is_none());
}

#[test]
fn missing_sheet_fails_on_open() {
    let registry = people_registry();
    let mapping = registry.mapping::<Person>().unwrap();
    let mut wb = MemoryWorkbook::new();
    let err = read_items(&mapping, &mut wb).err().unwrap();
    assert!(matches!(err, MappingError::Io(_)));
}

#[test]
fn cancelled_reads_stop_with_an_error() {
    let registry = people_registry();
    let mapping = registry.mapping::<Person>().unwrap();
    let mut wb = MemoryWorkbook::new();
    wb.set_value("Sheet1", at("A1"), "Ann");

    let cancel = AtomicBool::new(true);
    let mut items = ReadEngine::new(&mapping)
        .read_cancellable(&mut wb, &cancel)
        .unwrap();
    assert!(matches!(items.next(), Some(Err(MappingError::Cancelled))));
    assert!(items.next().is_none());
}

#[test]
fn pattern_slots_drop_blank_items_and_trim_collections() {
    let registry = Registry::new();
    registry
        .configure_with::<Invoice>(|b| b.property("Id", "A1").collection("Items", "B2"))
        .unwrap();
    let mapping = registry.mapping::<Invoice>().unwrap();
    assert_eq!(mapping.read_strategy(), ReadStrategy::RepeatingPattern);
    assert_eq!(mapping.boundaries().pattern_height, 3);

    let mut wb = MemoryWorkbook::new();
    wb.set_value("Sheet1", at("A1"), 1i64);
    wb.set_value("Sheet1", at("B3"), 3.0);
    wb.set_value("Sheet1", at("A4"), 2i64);
    wb.set_value("Sheet1", at("B5"), 4.0);
    // Rows 7-9 hold nothing the mapping reads.
    wb.set_value("Sheet1", at("Z8"), "note");
    wb.set_value("Sheet1", at("A10"), 3i64);
    wb.set_value("Sheet1", at("B11"), 5.0);
    wb.set_value("Sheet1", at("Z12"), "end");

    let invoices: Vec<Invoice> = read_items(&mapping, &mut wb)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        invoices,
        vec![
            Invoice {
                id: 1,
                items: vec![0.0, 3.0]
            },
            Invoice {
                id: 2,
                items: vec![4.0]
            },
            Invoice {
                id: 3,
                items: vec![5.0]
            },
        ]
    );
}

fn shared_column_invoices() -> Registry {
    let registry = Registry::new();
    registry
        .configure_with::<Invoice>(|b| b.property("Id", "A1").collection("Items", "A2"))
        .unwrap();
    registry
}

#[test]
fn items_in_a_shared_column_are_addressed_by_slot() {
    let registry = shared_column_invoices();
    let mapping = registry.mapping::<Invoice>().unwrap();
    assert_eq!(mapping.boundaries().pattern_height, 3);

    let mut wb = MemoryWorkbook::new();
    for (row, value) in [(1, 1.0), (2, 1.5), (3, 2.5), (4, 2.0), (5, 3.5), (6, 4.5)] {
        wb.set_value("Sheet1", CellRef::new(row, 1).unwrap(), value);
    }

    let invoices: Vec<Invoice> = read_items(&mapping, &mut wb)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        invoices,
        vec![
            Invoice {
                id: 1,
                items: vec![1.5, 2.5]
            },
            Invoice {
                id: 2,
                items: vec![3.5, 4.5]
            },
        ]
    );
}

#[test]
fn short_final_slot_joins_the_last_item_only_when_its_collections_take_it() {
    let registry = shared_column_invoices();
    let mapping = registry.mapping::<Invoice>().unwrap();

    let mut wb = MemoryWorkbook::new();
    for (row, value) in [(1, 7.0), (2, 1.5), (3, 2.5), (4, 3.5)] {
        wb.set_value("Sheet1", CellRef::new(row, 1).unwrap(), value);
    }
    let invoices: Vec<Invoice> = read_items(&mapping, &mut wb)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        invoices,
        vec![Invoice {
            id: 7,
            items: vec![1.5, 2.5, 3.5]
        }]
    );

    // Items in column B: a value in column A of the short slot is a new item.
    let registry = Registry::new();
    registry
        .configure_with::<Invoice>(|b| b.property("Id", "A1").collection("Items", "B2"))
        .unwrap();
    let mapping = registry.mapping::<Invoice>().unwrap();
    let mut wb = MemoryWorkbook::new();
    wb.set_value("Sheet1", at("A1"), 1i64);
    wb.set_value("Sheet1", at("B2"), 1.0);
    wb.set_value("Sheet1", at("A4"), 2i64);
    let invoices: Vec<Invoice> = read_items(&mapping, &mut wb)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        invoices,
        vec![
            Invoice {
                id: 1,
                items: vec![1.0]
            },
            Invoice {
                id: 2,
                items: vec![]
            },
        ]
    );
}

#[test]
fn strategy_can_be_overridden() {
    let registry = Registry::new();
    registry
        .configure_with::<Invoice>(|b| b.property("Id", "A1").collection("Items", "A2"))
        .unwrap();
    let mapping = registry.mapping::<Invoice>().unwrap();

    let mut wb = MemoryWorkbook::new();
    wb.set_value("Sheet1", at("A1"), 5i64);
    wb.set_value("Sheet1", at("A2"), CellValue::Number(0.5));

    let items = ReadEngine::new(&mapping)
        .with_options(ReadOptions {
            strategy: Some(ReadStrategy::Heuristic),
            ..ReadOptions::default()
        })
        .read(&mut wb)
        .unwrap();
    assert_eq!(items.strategy(), ReadStrategy::Heuristic);
    let invoices: Vec<Invoice> = items.collect::<Result<_, _>>().unwrap();
    assert_eq!(
        invoices,
        vec![Invoice {
            id: 5,
            items: vec![0.5]
        }]
    );
}

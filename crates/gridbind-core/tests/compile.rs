mod common;

use std::sync::Arc;

use common::{Invoice, Order, OrderLine, Person, order_registry};
use gridbind_common::CellRef;
use gridbind_core::{
    CompileError, CompileOptions, HandlerKind, Record, Registry, Schema, Slot, compile,
};
use gridbind_spec::{BindingManifest, CollectionSpec, Layout, PropertySpec, TypeBinding};
use proptest::prelude::*;

fn compile_err<T: Record>(binding: TypeBinding) -> CompileError {
    compile::<T>(&binding, &Registry::new(), CompileOptions::default()).unwrap_err()
}

#[test]
fn unresolvable_bindings_are_rejected() {
    let err = compile_err::<Person>(TypeBinding::new("Person").with_property(PropertySpec::new("Name")));
    assert!(matches!(err, CompileError::MissingAddress { ref property, .. } if property == "Name"));

    let err = compile_err::<Person>(TypeBinding::new("Person").property("Height", "A1"));
    assert!(matches!(err, CompileError::UnresolvedProperty { ref property, .. } if property == "Height"));

    let err = compile_err::<Invoice>(TypeBinding::new("Invoice").property("Items", "A1"));
    assert!(matches!(err, CompileError::WrongKind { expected: "scalar property", .. }));

    let err = compile_err::<Invoice>(TypeBinding::new("Invoice").collection("Id", "A1"));
    assert!(matches!(err, CompileError::WrongKind { expected: "collection", .. }));
}

#[test]
fn only_vertical_collections_compile() {
    let err = compile_err::<Invoice>(
        TypeBinding::new("Invoice")
            .with_collection(CollectionSpec::vertical("Items", "A2").layout(Layout::Horizontal)),
    );
    assert!(matches!(
        err,
        CompileError::UnsupportedLayout {
            layout: Layout::Horizontal,
            ..
        }
    ));
}

#[test]
fn declared_item_types_are_checked() {
    let err = compile_err::<Invoice>(
        TypeBinding::new("Invoice").with_collection(CollectionSpec::vertical("Items", "A2").item_type("i64")),
    );
    match err {
        CompileError::ItemTypeMismatch { declared, actual, .. } => {
            assert_eq!(declared, "i64");
            assert_eq!(actual, "f64");
        }
        other => panic!("unexpected: {other}"),
    }

    // Scalar items cannot be declared as nested records.
    let err = compile_err::<Invoice>(
        TypeBinding::new("Invoice").with_collection(CollectionSpec::vertical("Items", "A2").nested("f64")),
    );
    assert!(matches!(err, CompileError::ItemTypeMismatch { .. }));
}

#[test]
fn nested_types_need_their_own_binding() {
    let registry = Registry::new();
    let manifest = BindingManifest::from_yaml_str(common::ORDERS_YAML).unwrap();
    registry.configure_manifest::<Order>(&manifest).unwrap();

    let err = registry.mapping::<Order>().unwrap_err();
    assert!(
        matches!(err, CompileError::NestedNotConfigured { ref type_name, ref property }
            if type_name == "OrderLine" && property == "Lines"),
        "{err}"
    );

    registry.configure_manifest::<OrderLine>(&manifest).unwrap();
    assert!(registry.mapping::<Order>().is_ok());
}

#[derive(Debug, Default)]
struct Ledger {
    invoices: Vec<Invoice>,
}

impl Record for Ledger {
    fn schema() -> Schema<Self> {
        Schema::<Self>::new().records("Invoices", |l| &l.invoices, |l| &mut l.invoices)
    }
}

#[test]
fn nested_items_may_not_hold_collections() {
    let registry = Registry::new();
    registry
        .configure_with::<Invoice>(|b| b.property("Id", "A1").collection("Items", "A2"))
        .unwrap();
    registry
        .configure_with::<Ledger>(|b| b.collection("Invoices", "A1"))
        .unwrap();
    let err = registry.mapping::<Ledger>().unwrap_err();
    assert!(matches!(err, CompileError::NestingTooDeep { max: 2, .. }), "{err}");
}

#[test]
fn compiling_twice_yields_the_same_plan() {
    let registry = Registry::new();
    order_registry(&registry);
    let binding = registry.binding::<Order>().unwrap();

    let first = compile::<Order>(&binding, &registry, CompileOptions::default()).unwrap();
    let second = compile::<Order>(&binding, &registry, CompileOptions::default()).unwrap();
    assert_eq!(first.structure(), second.structure());

    let structure = first.structure();
    let lines = &structure.collections[0];
    assert_eq!(lines.item_type, "OrderLine");
    assert_eq!(
        lines.members,
        vec![
            ("Lines.Sku".to_string(), 0, 0),
            ("Lines.Qty".to_string(), 1, 0),
            ("Lines.Price".to_string(), 2, 0),
        ]
    );
}

#[test]
fn published_plans_are_shared_across_threads() {
    let registry = Registry::new();
    order_registry(&registry);

    let plans: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| registry.mapping::<Order>().unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for plan in &plans[1..] {
        assert!(Arc::ptr_eq(&plans[0], plan));
    }
}

#[test]
fn global_registry_is_a_single_instance() {
    assert!(std::ptr::eq(Registry::global(), Registry::global()));
}

fn distinct_cells() -> impl Strategy<Value = (CellRef, CellRef)> {
    ((1u32..60, 1u32..30), (1u32..60, 1u32..30))
        .prop_filter("cells must differ", |(a, b)| a != b)
        .prop_map(|((r1, c1), (r2, c2))| {
            (CellRef::new(r1, c1).unwrap(), CellRef::new(r2, c2).unwrap())
        })
}

proptest! {
    #[test]
    fn grid_covers_every_property((name, age) in distinct_cells()) {
        let binding = TypeBinding::new("Person")
            .property("Name", name.to_string())
            .property("Age", age.to_string());
        let mapping = compile::<Person>(&binding, &Registry::new(), CompileOptions::default()).unwrap();
        let b = *mapping.boundaries();

        prop_assert!(b.contains(name) && b.contains(age));
        prop_assert_eq!(b.min_row, name.row().min(age.row()));
        prop_assert_eq!(b.max_col, name.col().max(age.col()));
        prop_assert_eq!(mapping.grid().height(), b.grid_height());
        prop_assert_eq!(mapping.grid().width(), b.grid_width());
        prop_assert!(!b.has_dynamic_collections);

        for (idx, cell) in [name, age].into_iter().enumerate() {
            let handler = mapping.handler_at(cell.row(), cell.col()).unwrap();
            prop_assert_eq!(handler.kind, HandlerKind::Property);
            prop_assert_eq!(handler.slot, Slot::Property(idx));
        }
        let spacing = if name.row() == age.row() {
            1
        } else {
            name.row().max(age.row()) - b.min_row + 2
        };
        prop_assert_eq!(mapping.item_spacing(), spacing);
    }
}

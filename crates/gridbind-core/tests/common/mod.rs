#![allow(dead_code)]

use gridbind_core::{Record, Registry, Schema};
use gridbind_spec::BindingManifest;

pub const ORDERS_YAML: &str = include_str!("../../../gridbind-spec/tests/fixtures/orders.yaml");

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Person {
    pub name: String,
    pub age: i64,
}

impl Record for Person {
    fn schema() -> Schema<Self> {
        Schema::<Self>::new()
            .field("Name", |p| &p.name, |p| &mut p.name)
            .field("Age", |p| &p.age, |p| &mut p.age)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invoice {
    pub id: i64,
    pub items: Vec<f64>,
}

impl Record for Invoice {
    fn schema() -> Schema<Self> {
        Schema::<Self>::new()
            .field("Id", |i| &i.id, |i| &mut i.id)
            .values("Items", |i| &i.items, |i| &mut i.items)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderLine {
    pub sku: String,
    pub qty: i64,
    pub price: f64,
}

impl Record for OrderLine {
    fn schema() -> Schema<Self> {
        Schema::<Self>::new()
            .field("Sku", |l| &l.sku, |l| &mut l.sku)
            .field("Qty", |l| &l.qty, |l| &mut l.qty)
            .field("Price", |l| &l.price, |l| &mut l.price)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Order {
    pub id: i64,
    pub customer: String,
    pub total: f64,
    pub lines: Vec<OrderLine>,
}

impl Record for Order {
    fn schema() -> Schema<Self> {
        Schema::<Self>::new()
            .field("Id", |o| &o.id, |o| &mut o.id)
            .field("Customer", |o| &o.customer, |o| &mut o.customer)
            .field("Total", |o| &o.total, |o| &mut o.total)
            .records("Lines", |o| &o.lines, |o| &mut o.lines)
    }
}

pub fn line(sku: &str, qty: i64, price: f64) -> OrderLine {
    OrderLine {
        sku: sku.to_string(),
        qty,
        price,
    }
}

pub fn order(id: i64, customer: &str, total: f64, lines: Vec<OrderLine>) -> Order {
    Order {
        id,
        customer: customer.to_string(),
        total,
        lines,
    }
}

pub fn sample_orders() -> Vec<Order> {
    vec![
        order(1, "Acme", 12.5, vec![line("A-1", 1, 2.5), line("B-2", 2, 5.0)]),
        order(2, "Bolt", 0.0, vec![]),
        order(3, "Core", 9.99, vec![line("C-3", 1, 9.99)]),
    ]
}

pub fn order_registry(registry: &Registry) {
    let manifest = BindingManifest::from_yaml_str(ORDERS_YAML).unwrap();
    registry.configure_manifest::<OrderLine>(&manifest).unwrap();
    registry.configure_manifest::<Order>(&manifest).unwrap();
}

use gridbind_spec::{BindingManifest, Layout, ManifestError};

fn load_fixture(name: &str) -> BindingManifest {
    let path = format!("tests/fixtures/{}.yaml", name);
    BindingManifest::from_path(path).expect("fixture should load")
}

#[test]
fn orders_fixture_validates() {
    let manifest = load_fixture("orders");
    manifest.validate().expect("fixture should validate");

    let order = manifest.binding_for("Order").expect("order binding");
    assert_eq!(order.sheet, "Orders");
    assert_eq!(order.collections[0].nested.as_deref(), Some("OrderLine"));
    assert_eq!(order.collections[0].layout, Layout::Vertical);

    let line = manifest.binding_for("OrderLine").expect("line binding");
    assert_eq!(line.sheet, "Sheet1");
    assert_eq!(line.properties.len(), 3);
}

#[test]
fn duplicate_types_are_rejected() {
    let mut manifest = load_fixture("orders");
    let copy = manifest.types[1].clone();
    manifest.types.push(copy);

    let err = manifest.validate().expect_err("validation should fail");
    assert_eq!(err.issues().len(), 1);
    assert_eq!(err.issues()[0].path, "types[2].type");
    assert!(err.to_string().contains("duplicate binding for type `OrderLine`"));
}

#[test]
fn json_and_yaml_agree() {
    let manifest = load_fixture("orders");
    let json = serde_json::to_string(&manifest).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orders.json");
    std::fs::write(&path, json).unwrap();

    let from_json = BindingManifest::from_path(&path).unwrap();
    assert_eq!(from_json, manifest);

    let yaml = manifest.to_yaml().unwrap();
    assert_eq!(BindingManifest::from_yaml_str(&yaml).unwrap(), manifest);
}

#[test]
fn unknown_fields_fail_to_parse() {
    let yaml = r#"
version: "1.0.0"
types:
  - type: Person
    properties:
      - property: Name
        cell: A1
        colour: red
"#;
    let err = BindingManifest::from_yaml_str(yaml).unwrap_err();
    assert!(matches!(err, ManifestError::Yaml(_)));
}

#[test]
fn legacy_layouts_still_deserialize() {
    let yaml = r#"
version: "1.0.0"
types:
  - type: Sheet
    collections:
      - property: Cells
        start: B2
        layout: horizontal
"#;
    let manifest = BindingManifest::from_yaml_str(yaml).unwrap();
    manifest.validate().unwrap();
    assert_eq!(manifest.types[0].collections[0].layout, Layout::Horizontal);
}

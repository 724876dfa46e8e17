use gridbind_common::{CellRef, CellValue};
use gridbind_io::{CellSink, IoError, MemoryWorkbook, RowSource, SheetCell};

#[test]
fn out_of_order_cells_are_rejected() {
    let mut wb = MemoryWorkbook::new();
    wb.start_sheet("S").unwrap();
    wb.write_row(2, &[SheetCell::new(2, 1, "a".into())]).unwrap();

    let err = wb.write_row(1, &[SheetCell::new(1, 1, "b".into())]).unwrap_err();
    assert!(matches!(err, IoError::OutOfOrder { .. }));
    assert!(err.to_string().contains("row-major"));

    let err = wb.write_row(2, &[SheetCell::new(2, 1, "c".into())]).unwrap_err();
    assert!(matches!(err, IoError::DuplicateCell(ref c) if c == "A2"));
}

#[test]
fn restarting_a_sheet_replaces_its_contents() {
    let mut wb = MemoryWorkbook::new();
    for pass in 0..2i64 {
        wb.start_sheet("S").unwrap();
        wb.write_row(1, &[SheetCell::new(1, 1, pass.into())]).unwrap();
        wb.finish_sheet().unwrap();
    }
    assert_eq!(wb.sheet_names(), ["S".to_string()]);
    assert_eq!(wb.value_a1("S", "A1"), Some(&CellValue::Int(1)));
}

#[test]
fn sink_through_mutable_reference() {
    fn fill(mut sink: impl CellSink) {
        sink.start_sheet("R").unwrap();
        sink.write_row(1, &[SheetCell::new(1, 2, "b".into())]).unwrap();
        sink.finish_sheet().unwrap();
    }
    let mut wb = MemoryWorkbook::new();
    fill(&mut wb);
    wb.open("R", CellRef::A1, false).unwrap();
    let row = wb.next_row().unwrap().unwrap();
    assert_eq!(row.get(2), Some(&CellValue::Text("b".into())));
}

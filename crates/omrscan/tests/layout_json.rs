use omrscan::{LayoutError, Scanner, SheetLayout, SHEET_SCHEMA_V1};

#[test]
fn default_layout_survives_a_file_roundtrip() {
    let layout = SheetLayout::default();
    let dir = std::env::temp_dir().join(format!("omrscan-layout-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("layout.json");
    std::fs::write(&path, layout.to_json_string().unwrap()).unwrap();

    let scanner = Scanner::from_layout_json_file(&path).unwrap();
    assert_eq!(scanner.layout().groups, layout.groups);
    assert_eq!(scanner.layout().marker_region, layout.marker_region);
    assert_eq!(
        scanner.layout().to_json_string().unwrap(),
        layout.to_json_string().unwrap()
    );

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn layout_json_carries_the_schema_tag() {
    let json = SheetLayout::default().to_json_string().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["schema"], SHEET_SCHEMA_V1);
}

#[test]
fn missing_layout_file_is_an_io_error() {
    let err = Scanner::from_layout_json_file(std::path::Path::new("/nonexistent/layout.json"))
        .unwrap_err();
    assert!(matches!(err, LayoutError::Io(_)));
}

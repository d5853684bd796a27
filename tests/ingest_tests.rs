//! Ingestion, validation and normalization of uploaded files

use std::io::Write;

use report_pipeline::catalog::{ReportSchema, SchemaCatalog};
use report_pipeline::import::{FileIngestor, FileKind, IngestError};
use report_pipeline::models::CellValue;
use report_pipeline::normalize::{DataNormalizer, ExchangeRateTable};
use report_pipeline::validation::{Rule, SchemaValidator};

fn assets_schema() -> ReportSchema {
    SchemaCatalog::builtin()
        .unwrap()
        .get("campus_assets")
        .unwrap()
        .clone()
}

/// A workbook with only a worksheet and shared strings
fn build_xlsx(shared: &[&str], sheet_rows: &str) -> Vec<u8> {
    let mut strings = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    );
    for s in shared {
        strings.push_str(&format!("<si><t>{s}</t></si>"));
    }
    strings.push_str("</sst>");
    let sheet = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{sheet_rows}</sheetData></worksheet>"#
    );

    let mut buffer = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buffer);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("xl/sharedStrings.xml", options).unwrap();
        zip.write_all(strings.as_bytes()).unwrap();
        zip.start_file("xl/worksheets/sheet1.xml", options).unwrap();
        zip.write_all(sheet.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buffer.into_inner()
}

mod three_row_example {
    use super::*;

    const CSV: &str = "Device,Qty,Description,Purchase Date,Room,Price\n\
        Projector,1,Epson EB-X41,2023-04-01,Lab 1,45000\n\
        Projector,1,Epson EB-X41,2023-04-01,Lab 1,45000\n\
        Laptop,1,Dell Latitude,2023-05-10,Lab 2,\n";

    #[test]
    fn test_one_violation_two_valid_rows() {
        let schema = assets_schema();
        let table = FileIngestor::new()
            .ingest(CSV.as_bytes(), FileKind::Csv)
            .unwrap();
        assert_eq!(table.row_count(), 3);

        let report = SchemaValidator::new(&schema).validate(&table).unwrap();
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.valid_count(), 2);
        let violation = &report.violations[0];
        assert_eq!(violation.row_index, 2);
        assert_eq!(violation.column, "cost");
        assert_eq!(violation.rule, Rule::Required);
    }

    #[test]
    fn test_duplicates_merge() {
        let schema = assets_schema();
        let rates = ExchangeRateTable::identity("INR");
        let table = FileIngestor::new()
            .ingest(CSV.as_bytes(), FileKind::Csv)
            .unwrap();
        let report = SchemaValidator::new(&schema).validate(&table).unwrap();

        let normalized = DataNormalizer::new(&schema, &rates)
            .normalize(&table, &report)
            .unwrap();
        assert_eq!(normalized.row_count(), 1);
        assert_eq!(normalized.rows[0].merge_count, 2);
        assert_eq!(normalized.rows[0].source_index, 0);
    }

    #[test]
    fn test_normalizing_twice_is_identical() {
        let schema = assets_schema();
        let rates = ExchangeRateTable::identity("INR");
        let table = FileIngestor::new()
            .ingest(CSV.as_bytes(), FileKind::Csv)
            .unwrap();
        let report = SchemaValidator::new(&schema).validate(&table).unwrap();
        let normalizer = DataNormalizer::new(&schema, &rates);

        let first = normalizer.normalize(&table, &report).unwrap();
        let second = normalizer.normalize(&table, &report).unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}

mod file_format_tests {
    use super::*;

    #[test]
    fn test_xlsx_with_shared_strings() {
        let bytes = build_xlsx(
            &["Device", "Qty", "Room", "Laptop"],
            r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c><c r="C1" t="s"><v>2</v></c></row>
               <row r="2"><c r="A2" t="s"><v>3</v></c><c r="B2"><v>4</v></c><c r="C2" t="inlineStr"><is><t>Lab 3</t></is></c></row>"#,
        );
        let table = FileIngestor::new().ingest(&bytes, FileKind::Xlsx).unwrap();

        assert_eq!(table.row_count(), 1);
        assert_eq!(table.cell(0, 0), &CellValue::text("Laptop"));
        assert_eq!(table.cell(0, 1), &CellValue::Number(4.0));
        assert_eq!(table.cell(0, 2), &CellValue::text("Lab 3"));
    }

    #[test]
    fn test_xlsx_garbage_is_unreadable() {
        let err = FileIngestor::new()
            .ingest(b"PK but not really a workbook", FileKind::Xlsx)
            .unwrap_err();
        assert!(matches!(err, IngestError::UnreadableFile { .. }), "{err:?}");
    }

    #[test]
    fn test_xlsx_reference_beyond_sheet_bounds() {
        for rows in [
            r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row><row r="2"><c r="ZZZZZZZZZZZZZZZ2"><v>1</v></c></row>"#,
            r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row><row r="4000000000"><c r="A4000000000"><v>1</v></c></row>"#,
        ] {
            let bytes = build_xlsx(&["Device"], rows);
            let err = FileIngestor::new()
                .ingest(&bytes, FileKind::Xlsx)
                .unwrap_err();
            assert!(matches!(err, IngestError::UnreadableFile { .. }), "{err:?}");
        }
    }

    #[test]
    fn test_tsv_and_json_agree() {
        let tsv = "Device\tQty\nLaptop\t4\n";
        let json = r#"[{"Device": "Laptop", "Qty": 4}]"#;

        let from_tsv = FileIngestor::new()
            .ingest(tsv.as_bytes(), FileKind::Tsv)
            .unwrap();
        let from_json = FileIngestor::new()
            .ingest(json.as_bytes(), FileKind::Json)
            .unwrap();

        assert_eq!(from_tsv.columns(), from_json.columns());
        assert_eq!(from_tsv.row_count(), 1);
        assert_eq!(from_json.cell(0, 0), &CellValue::text("Laptop"));
    }

    #[test]
    fn test_ingest_path_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.csv");
        std::fs::write(&path, "Device,Qty\nLaptop,4\nMouse,10\n").unwrap();

        let table = FileIngestor::new().ingest_path(&path).unwrap();
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_empty_upload() {
        let err = FileIngestor::new()
            .ingest(b"", FileKind::Csv)
            .unwrap_err();
        assert!(matches!(err, IngestError::EmptyFile));
    }

    #[test]
    fn test_xls_is_rejected() {
        assert!(FileKind::from_file_name("legacy.xls").is_err());
    }
}

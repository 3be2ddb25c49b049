//! CSV export and import of inventory items.
//!
//! The format is plain RFC 4180-style CSV with a header row:
//! `name,sku,quantity,unit,supplier,min_stock`. Import is lenient about column
//! order, header case, a leading UTF-8 BOM, CRLF line endings and blank lines;
//! rows that fail validation are reported individually and do not stop the
//! rest of the file from importing.

use serde::Serialize;
use thiserror::Error;

use crate::item::{InventoryItem, NewItem};

pub const HEADER: [&str; 6] = ["name", "sku", "quantity", "unit", "supplier", "min_stock"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CsvError {
    #[error("csv input is empty")]
    Empty,

    #[error("unterminated quoted field starting on line {line}")]
    UnterminatedQuote { line: usize },

    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("column '{0}' appears more than once")]
    DuplicateColumn(String),
}

/// A row that could not be turned into an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    /// 1-based physical line the record starts on.
    pub line: usize,
    pub message: String,
}

/// One parsed record and the line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRecord {
    pub line: usize,
    pub fields: Vec<String>,
}

/// Result of reading an import file: valid rows and per-row failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvImport {
    pub rows: Vec<(usize, NewItem)>,
    pub errors: Vec<RowError>,
}

// -------------------------
// Export
// -------------------------

fn needs_quoting(field: &str) -> bool {
    field.contains(|c: char| matches!(c, ',' | '"' | '\r' | '\n'))
        || field.starts_with(char::is_whitespace)
        || field.ends_with(char::is_whitespace)
}

fn push_field(out: &mut String, field: &str) {
    if needs_quoting(field) {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}

fn push_record<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_field(out, field);
    }
    out.push('\n');
}

/// Render items as CSV text (header included).
pub fn export_items<'a>(items: impl IntoIterator<Item = &'a InventoryItem>) -> String {
    let mut out = String::new();
    push_record(&mut out, HEADER);

    for item in items {
        let quantity = item.quantity.to_string();
        let min_stock = item.min_stock.map(|m| m.to_string()).unwrap_or_default();
        push_record(
            &mut out,
            [
                item.name.as_str(),
                item.sku.as_deref().unwrap_or(""),
                quantity.as_str(),
                item.unit.as_str(),
                item.supplier.as_deref().unwrap_or(""),
                min_stock.as_str(),
            ],
        );
    }

    out
}

// -------------------------
// Import
// -------------------------

fn is_blank(fields: &[String]) -> bool {
    fields.iter().all(|f| f.trim().is_empty())
}

/// Split CSV text into records.
///
/// Quotes only open a quoted section at the start of a field; elsewhere they
/// are literal. Inside quotes, `""` is an escaped quote and line breaks
/// (`\r` included) are kept verbatim. Blank records are dropped.
pub fn parse_records(input: &str) -> Result<Vec<CsvRecord>, CsvError> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);

    let mut records = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_started_quoted = false;
    let mut quote_line = 0;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push('\n');
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() && !field_started_quoted => {
                in_quotes = true;
                field_started_quoted = true;
                quote_line = line;
            }
            ',' => {
                fields.push(std::mem::take(&mut field));
                field_started_quoted = false;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\r' | '\n' => {
                fields.push(std::mem::take(&mut field));
                field_started_quoted = false;
                let done = std::mem::take(&mut fields);
                if !is_blank(&done) {
                    records.push(CsvRecord {
                        line: record_line,
                        fields: done,
                    });
                }
                line += 1;
                record_line = line;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(CsvError::UnterminatedQuote { line: quote_line });
    }

    if !field.is_empty() || !fields.is_empty() || field_started_quoted {
        fields.push(field);
        if !is_blank(&fields) {
            records.push(CsvRecord {
                line: record_line,
                fields,
            });
        }
    }

    Ok(records)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Name,
    Sku,
    Quantity,
    Unit,
    Supplier,
    MinStock,
}

impl Column {
    fn from_header(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();

        match normalized.as_str() {
            "name" => Some(Column::Name),
            "sku" => Some(Column::Sku),
            "quantity" | "qty" => Some(Column::Quantity),
            "unit" => Some(Column::Unit),
            "supplier" => Some(Column::Supplier),
            "min_stock" | "minimum_stock" => Some(Column::MinStock),
            _ => None,
        }
    }
}

/// Column positions resolved from the header row. Unknown columns are ignored.
struct Layout {
    width: usize,
    columns: Vec<(usize, Column)>,
}

impl Layout {
    fn from_header(header: &[String]) -> Result<Self, CsvError> {
        let mut columns: Vec<(usize, Column)> = Vec::new();
        for (idx, raw) in header.iter().enumerate() {
            let Some(col) = Column::from_header(raw) else {
                continue;
            };
            if columns.iter().any(|(_, c)| *c == col) {
                return Err(CsvError::DuplicateColumn(raw.trim().to_string()));
            }
            columns.push((idx, col));
        }

        if !columns.iter().any(|(_, c)| *c == Column::Name) {
            return Err(CsvError::MissingColumn("name"));
        }

        Ok(Self {
            width: header.len(),
            columns,
        })
    }

    fn to_new_item(&self, record: &CsvRecord) -> Result<NewItem, String> {
        if record.fields.len() > self.width {
            return Err(format!(
                "expected at most {} fields, found {}",
                self.width,
                record.fields.len()
            ));
        }

        let mut item = NewItem::default();
        for &(idx, col) in &self.columns {
            // Short rows are allowed; missing trailing fields read as empty.
            let raw = record.fields.get(idx).map(String::as_str).unwrap_or("");
            let value = raw.trim();
            match col {
                Column::Name => item.name = value.to_string(),
                Column::Sku => item.sku = non_empty(value),
                Column::Quantity => item.quantity = parse_int("quantity", value)?.unwrap_or(0),
                Column::Unit => item.unit = non_empty(value),
                Column::Supplier => item.supplier = non_empty(value),
                Column::MinStock => item.min_stock = parse_int("min_stock", value)?,
            }
        }

        item.validate().map_err(|e| e.to_string())?;
        Ok(item)
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_int(column: &str, value: &str) -> Result<Option<i64>, String> {
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<i64>()
        .map(Some)
        .map_err(|_| format!("{column} must be a whole number, got '{value}'"))
}

/// Parse CSV text into validated item inputs plus per-row errors.
pub fn import_items(input: &str) -> Result<CsvImport, CsvError> {
    let mut records = parse_records(input)?.into_iter();
    let header = records.next().ok_or(CsvError::Empty)?;
    let layout = Layout::from_header(&header.fields)?;

    let mut import = CsvImport::default();
    for record in records {
        match layout.to_new_item(&record) {
            Ok(item) => import.rows.push((record.line, item)),
            Err(message) => import.errors.push(RowError {
                line: record.line,
                message,
            }),
        }
    }

    Ok(import)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockroom_core::OwnerId;

    fn fields(rec: &CsvRecord) -> Vec<&str> {
        rec.fields.iter().map(String::as_str).collect()
    }

    #[test]
    fn parses_plain_and_quoted_fields() {
        let recs = parse_records("a,b,c\n\"x, y\",\"say \"\"hi\"\"\",z\n").unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(fields(&recs[1]), vec!["x, y", "say \"hi\"", "z"]);
        assert_eq!(recs[1].line, 2);
    }

    #[test]
    fn quoted_newlines_stay_in_field_and_advance_line_numbers() {
        let recs = parse_records("name\n\"two\nlines\"\nnext\n").unwrap();
        assert_eq!(fields(&recs[1]), vec!["two\nlines"]);
        assert_eq!(recs[1].line, 2);
        assert_eq!(recs[2].line, 4);
    }

    #[test]
    fn carriage_returns_inside_quotes_are_kept() {
        let recs = parse_records("name,qty\r\n\"two\r\nlines\",1\r\n").unwrap();
        assert_eq!(fields(&recs[1]), vec!["two\r\nlines", "1"]);
        assert_eq!(recs[1].line, 2);
    }

    #[test]
    fn handles_crlf_bom_blank_lines_and_missing_final_newline() {
        let recs = parse_records("\u{feff}name,qty\r\n\r\nbolt,3\r\n  \nnut,4").unwrap();
        assert_eq!(recs.len(), 3);
        assert_eq!(fields(&recs[0]), vec!["name", "qty"]);
        assert_eq!(fields(&recs[1]), vec!["bolt", "3"]);
        assert_eq!(recs[1].line, 3);
        assert_eq!(fields(&recs[2]), vec!["nut", "4"]);
        assert_eq!(recs[2].line, 5);
    }

    #[test]
    fn empty_fields_are_preserved() {
        let recs = parse_records("a,,\"\",d").unwrap();
        assert_eq!(fields(&recs[0]), vec!["a", "", "", "d"]);
    }

    #[test]
    fn quote_in_middle_of_field_is_literal() {
        let recs = parse_records("5\" pipe,x").unwrap();
        assert_eq!(fields(&recs[0]), vec!["5\" pipe", "x"]);
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        let err = parse_records("name\n\"oops,1\nmore").unwrap_err();
        assert_eq!(err, CsvError::UnterminatedQuote { line: 2 });
    }

    #[test]
    fn import_requires_header_with_name() {
        assert_eq!(import_items("").unwrap_err(), CsvError::Empty);
        assert_eq!(
            import_items("sku,quantity\nA,1").unwrap_err(),
            CsvError::MissingColumn("name")
        );
        assert!(matches!(
            import_items("name,Name\nx,y").unwrap_err(),
            CsvError::DuplicateColumn(_)
        ));
    }

    #[test]
    fn import_accepts_reordered_headers_and_aliases() {
        let csv = "Qty,Supplier,NAME,Minimum Stock,notes\n7,Acme,Bolt,2,ignored\n";
        let import = import_items(csv).unwrap();
        assert!(import.errors.is_empty());
        let (line, item) = &import.rows[0];
        assert_eq!(*line, 2);
        assert_eq!(item.name, "Bolt");
        assert_eq!(item.quantity, 7);
        assert_eq!(item.supplier.as_deref(), Some("Acme"));
        assert_eq!(item.min_stock, Some(2));
    }

    #[test]
    fn import_reports_bad_rows_and_keeps_good_ones() {
        let csv = "name,quantity,min_stock\n\
                   Good,1,\n\
                   ,5,\n\
                   Bad qty,five,\n\
                   Negative,-2,\n\
                   Too,1,2,3\n\
                   Short\n";
        let import = import_items(csv).unwrap();

        let good: Vec<_> = import.rows.iter().map(|(l, i)| (*l, i.name.as_str())).collect();
        assert_eq!(good, vec![(2, "Good"), (7, "Short")]);

        let bad_lines: Vec<_> = import.errors.iter().map(|e| e.line).collect();
        assert_eq!(bad_lines, vec![3, 4, 5, 6]);
        assert!(import.errors[1].message.contains("quantity must be a whole number"));
    }

    #[test]
    fn export_quotes_only_when_needed() {
        let mut item = InventoryItem::create(
            OwnerId::new(),
            NewItem {
                name: "Bolt, \"large\"".to_string(),
                sku: Some("B-1".to_string()),
                quantity: 12,
                unit: Some("box".to_string()),
                supplier: None,
                min_stock: Some(3),
            },
            Utc::now(),
        )
        .unwrap();
        item.supplier = Some("Line1\nLine2".to_string());

        let csv = export_items([&item]);
        let expected = "name,sku,quantity,unit,supplier,min_stock\n\
                        \"Bolt, \"\"large\"\"\",B-1,12,box,\"Line1\nLine2\",3\n";
        assert_eq!(csv, expected);
    }

    #[test]
    fn export_of_nothing_is_just_the_header() {
        let none: Vec<InventoryItem> = Vec::new();
        assert_eq!(export_items(&none), "name,sku,quantity,unit,supplier,min_stock\n");
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: exported text imports back to the same field values,
            /// including commas, quotes and newlines inside fields.
            #[test]
            fn export_then_import_preserves_fields(
                name in "[A-Za-z][A-Za-z0-9,\"\r\n ]{0,30}[A-Za-z0-9]",
                supplier in proptest::option::of("[A-Za-z][A-Za-z ,\"]{0,20}[a-z]"),
                quantity in 0i64..1_000_000,
                min_stock in proptest::option::of(0i64..1000),
            ) {
                let item = InventoryItem::create(
                    OwnerId::new(),
                    NewItem {
                        name: name.clone(),
                        sku: None,
                        quantity,
                        unit: None,
                        supplier: supplier.clone(),
                        min_stock,
                    },
                    Utc::now(),
                )
                .unwrap();

                let import = import_items(&export_items([&item])).unwrap();
                prop_assert!(import.errors.is_empty());
                prop_assert_eq!(import.rows.len(), 1);
                let (_, back) = &import.rows[0];
                prop_assert_eq!(&back.name, &item.name);
                prop_assert_eq!(&back.supplier, &item.supplier);
                prop_assert_eq!(back.quantity, quantity);
                prop_assert_eq!(back.min_stock, min_stock);
            }
        }
    }
}

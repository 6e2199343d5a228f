//! # Delimited Text Parsing
//!
//! Header-row CSV parsing with dynamic cell typing. Problems with individual
//! records are collected as warnings and never abort the parse: whatever rows
//! could be read are returned, and an empty table is still a valid result.

use csv::{ReaderBuilder, StringRecord, Trim};
use serde_json::{Map, Number, Value};

use crate::transform::RawRow;

/// Rows plus the non-fatal problems met while reading them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
    pub warnings: Vec<String>,
}

/// Types one cell: empty is null, `true`/`false` are booleans, numeric text
/// is a number, anything else stays a string.
pub fn coerce_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    match trimmed {
        "true" | "TRUE" | "True" => return Value::Bool(true),
        "false" | "FALSE" | "False" => return Value::Bool(false),
        _ => {}
    }
    if looks_numeric(trimmed) {
        if let Ok(int) = trimmed.parse::<i64>() {
            return Value::Number(int.into());
        }
        if let Some(number) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(number);
        }
    }
    Value::String(raw.to_string())
}

/// Plain decimal or exponent notation only; rejects `inf`, `NaN`, `+5`,
/// and anything with embedded separators such as timestamps.
fn looks_numeric(text: &str) -> bool {
    let body = text.strip_prefix('-').unwrap_or(text);
    let mut chars = body.chars().peekable();
    let mut digits = 0;
    let mut seen_dot = false;
    while let Some(&c) = chars.peek() {
        match c {
            '0'..='9' => digits += 1,
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        chars.next();
    }
    if digits == 0 {
        return false;
    }
    match chars.next() {
        None => true,
        Some('e') | Some('E') => {
            let rest: String = chars.collect();
            let exp = rest.strip_prefix(['+', '-']).unwrap_or(rest.as_str());
            !exp.is_empty() && exp.bytes().all(|b| b.is_ascii_digit())
        }
        Some(_) => false,
    }
}

fn record_to_row(headers: &[String], record: &StringRecord) -> RawRow {
    let mut row = Map::with_capacity(headers.len());
    for (header, field) in headers.iter().zip(record.iter()) {
        row.insert(header.clone(), coerce_cell(field));
    }
    row
}

/// Parses CSV text with a header row.
///
/// Blank lines are skipped. Records with too few fields keep only the
/// columns present; extra fields are dropped. Both are reported as warnings.
pub fn parse_csv(text: &str) -> ParsedTable {
    let mut table = ParsedTable::default();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::Headers)
        .from_reader(text.as_bytes());

    table.headers = match reader.headers() {
        Ok(headers) => headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                if i == 0 {
                    h.trim_start_matches('\u{feff}').to_string()
                } else {
                    h.to_string()
                }
            })
            .collect(),
        Err(e) => {
            table.warnings.push(format!("unreadable header row: {e}"));
            return table;
        }
    };

    for (index, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                table.warnings.push(format!("record {}: {e}", index + 1));
                continue;
            }
        };
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        if record.len() != table.headers.len() {
            let kind = if record.len() < table.headers.len() { "few" } else { "many" };
            table.warnings.push(format!(
                "record {}: too {kind} fields (expected {}, got {})",
                index + 1,
                table.headers.len(),
                record.len()
            ));
        }
        table.rows.push(record_to_row(&table.headers, &record));
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cells_are_typed_dynamically() {
        assert_eq!(coerce_cell(""), Value::Null);
        assert_eq!(coerce_cell("  "), Value::Null);
        assert_eq!(coerce_cell("42"), json!(42));
        assert_eq!(coerce_cell("-3.5"), json!(-3.5));
        assert_eq!(coerce_cell("1e3"), json!(1000.0));
        assert_eq!(coerce_cell("true"), json!(true));
        assert_eq!(coerce_cell("2026-02-05 08:00:00"), json!("2026-02-05 08:00:00"));
        assert_eq!(coerce_cell("NaN"), json!("NaN"));
        assert_eq!(coerce_cell("inf"), json!("inf"));
        assert_eq!(coerce_cell("ALINTA_WGP"), json!("ALINTA_WGP"));
    }

    #[test]
    fn parses_header_row_and_skips_blank_lines() {
        let text =
            "FACILITY_CODE,I01,AS_AT\nG1,200,2026-02-05 08:30:00\n\n,,\nG2,,2026-02-05 08:30:00\n";
        let table = parse_csv(text);
        assert!(table.warnings.is_empty());
        assert_eq!(table.headers, vec!["FACILITY_CODE", "I01", "AS_AT"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0]["I01"], json!(200));
        assert_eq!(table.rows[1]["I01"], Value::Null);
    }

    #[test]
    fn ragged_records_warn_but_survive() {
        let text = "\u{feff}A,B,C\n1,2\n4,5,6,7\n";
        let table = parse_csv(text);
        assert_eq!(table.headers[0], "A");
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.warnings.len(), 2);
        assert!(!table.rows[0].contains_key("C"));
        assert_eq!(table.rows[1]["C"], json!(6));
    }

    #[test]
    fn empty_body_is_an_empty_table() {
        let table = parse_csv("");
        assert!(table.rows.is_empty());
        assert!(table.warnings.is_empty());
    }

    #[test]
    fn quoted_fields_keep_commas() {
        let table = parse_csv("DISPLAY_NAME,LATITUDE\n\"Albany, Grasmere\",\"-35.06\"\n");
        assert_eq!(table.rows[0]["DISPLAY_NAME"], json!("Albany, Grasmere"));
        assert_eq!(table.rows[0]["LATITUDE"], json!(-35.06));
    }
}

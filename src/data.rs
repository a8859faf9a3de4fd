//! Input loading: CSV exports into typed events, events into Polars frames
//!
//! Two relations are supported:
//!   transactions: InvoiceNo, StockCode, Description, Quantity, InvoiceDate,
//!                 UnitPrice, CustomerID, Country
//!   events:       user_id, event_timestamp, purchase_revenue
//!
//! Empty cells are read as nulls. Rows are never dropped here; null
//! filtering belongs to the engines so the counts can be logged in one
//! place. A cell that is present but malformed is a parse error.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::Deserialize;

use crate::dates::{self, WeekStart};
use crate::error::ClvError;

/// One invoice line item.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionEvent {
    pub customer_id: Option<String>,
    pub invoice_id: String,
    pub invoice_timestamp: Option<NaiveDateTime>,
    pub description: Option<String>,
    pub unit_price: Option<f64>,
    pub quantity: Option<i64>,
    pub country: String,
}

/// One behavioural event; a purchase when `purchase_revenue` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitEvent {
    pub user_id: Option<String>,
    pub event_timestamp: Option<NaiveDateTime>,
    pub purchase_revenue: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TransactionRecord {
    #[serde(rename = "InvoiceNo")]
    invoice_no: String,
    #[serde(rename = "Description")]
    description: Option<String>,
    #[serde(rename = "Quantity")]
    quantity: Option<i64>,
    #[serde(rename = "InvoiceDate")]
    invoice_date: Option<String>,
    #[serde(rename = "UnitPrice")]
    unit_price: Option<f64>,
    #[serde(rename = "CustomerID")]
    customer_id: Option<String>,
    #[serde(rename = "Country")]
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventRecord {
    user_id: Option<String>,
    event_timestamp: Option<String>,
    purchase_revenue: Option<f64>,
}

/// Spreadsheet exports turn numeric ids into floats ("17850.0").
fn normalize_id(raw: Option<String>) -> Option<String> {
    let raw = raw?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.strip_suffix(".0") {
        Some(digits) if digits.parse::<i64>().is_ok() => Some(digits.to_string()),
        _ => Some(trimmed.to_string()),
    }
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.filter(|s| !s.trim().is_empty())
}

/// Blank timestamps load as `None`; anything else must parse.
fn timestamp_at(raw: Option<String>, line: usize) -> Result<Option<NaiveDateTime>, ClvError> {
    let Some(raw) = non_empty(raw) else {
        return Ok(None);
    };
    dates::parse_timestamp(&raw)
        .map(Some)
        .ok_or_else(|| ClvError::Parse {
            line,
            message: format!("unrecognised timestamp '{}'", raw),
        })
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader)
}

/// Load transaction line items from a CSV reader.
pub fn load_transactions<R: Read>(reader: R) -> Result<Vec<TransactionEvent>, ClvError> {
    let mut rdr = csv_reader(reader);
    let mut events = Vec::new();

    for (idx, result) in rdr.deserialize::<TransactionRecord>().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|e| ClvError::Parse {
            line,
            message: e.to_string(),
        })?;

        events.push(TransactionEvent {
            customer_id: normalize_id(record.customer_id),
            invoice_id: record.invoice_no,
            invoice_timestamp: timestamp_at(record.invoice_date, line)?,
            description: non_empty(record.description),
            unit_price: record.unit_price,
            quantity: record.quantity,
            country: record.country.unwrap_or_default(),
        });
    }

    tracing::debug!(rows = events.len(), "loaded transactions");
    Ok(events)
}

pub fn load_transactions_file(path: &Path) -> Result<Vec<TransactionEvent>, ClvError> {
    load_transactions(File::open(path)?)
}

/// Load visit/purchase events from a CSV reader.
pub fn load_events<R: Read>(reader: R) -> Result<Vec<VisitEvent>, ClvError> {
    let mut rdr = csv_reader(reader);
    let mut events = Vec::new();

    for (idx, result) in rdr.deserialize::<EventRecord>().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|e| ClvError::Parse {
            line,
            message: e.to_string(),
        })?;

        events.push(VisitEvent {
            user_id: normalize_id(record.user_id),
            event_timestamp: timestamp_at(record.event_timestamp, line)?,
            purchase_revenue: record.purchase_revenue,
        });
    }

    tracing::debug!(rows = events.len(), "loaded events");
    Ok(events)
}

pub fn load_events_file(path: &Path) -> Result<Vec<VisitEvent>, ClvError> {
    load_events(File::open(path)?)
}

/// Columnar view of transactions with the invoice date as a day number.
pub fn transactions_frame(events: &[TransactionEvent]) -> PolarsResult<DataFrame> {
    let customer_id: Vec<Option<&str>> = events.iter().map(|e| e.customer_id.as_deref()).collect();
    let description: Vec<Option<&str>> = events.iter().map(|e| e.description.as_deref()).collect();
    let invoice_id: Vec<&str> = events.iter().map(|e| e.invoice_id.as_str()).collect();
    let country: Vec<&str> = events.iter().map(|e| e.country.as_str()).collect();
    let invoice_day: Vec<Option<i64>> = events
        .iter()
        .map(|e| e.invoice_timestamp.map(|ts| dates::day_number(ts.date())))
        .collect();
    let unit_price: Vec<Option<f64>> = events.iter().map(|e| e.unit_price).collect();
    let quantity: Vec<Option<i64>> = events.iter().map(|e| e.quantity).collect();

    DataFrame::new(vec![
        Series::new("customer_id", customer_id),
        Series::new("description", description),
        Series::new("invoice_id", invoice_id),
        Series::new("country", country),
        Series::new("invoice_day", invoice_day),
        Series::new("unit_price", unit_price),
        Series::new("quantity", quantity),
    ])
}

/// Columnar view of events with the week index of every event.
///
/// Missing revenue becomes 0.0 so visits count toward cohort membership
/// without contributing revenue.
pub fn events_frame(events: &[VisitEvent], week_start: WeekStart) -> PolarsResult<DataFrame> {
    let user_id: Vec<Option<&str>> = events.iter().map(|e| e.user_id.as_deref()).collect();
    let event_day: Vec<Option<i64>> = events
        .iter()
        .map(|e| e.event_timestamp.map(|ts| dates::day_number(ts.date())))
        .collect();
    let event_week: Vec<Option<i64>> = events
        .iter()
        .map(|e| e.event_timestamp.map(|ts| dates::week_index(ts.date(), week_start)))
        .collect();
    let revenue: Vec<f64> = events
        .iter()
        .map(|e| e.purchase_revenue.unwrap_or(0.0))
        .collect();

    DataFrame::new(vec![
        Series::new("user_id", user_id),
        Series::new("event_day", event_day),
        Series::new("event_week", event_week),
        Series::new("revenue", revenue),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TRANSACTIONS: &str = "\
InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country
536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,2010-12-01T08:26:00Z,2.55,17850.0,United Kingdom
536365,71053,WHITE METAL LANTERN,6,2010-12-01 08:26:00,3.39,17850,United Kingdom
536366,22633,,6,12/1/2010 8:28,1.85,17850,United Kingdom
536367,84406B,CREAM CUPID HEARTS COAT HANGER,8,2010-12-01T08:34:00,2.75,,France
";

    #[test]
    fn test_load_transactions() {
        let events = load_transactions(TRANSACTIONS.as_bytes()).unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].customer_id.as_deref(), Some("17850"));
        assert_eq!(events[1].customer_id.as_deref(), Some("17850"));
        assert_eq!(events[2].description, None);
        assert_eq!(events[3].customer_id, None);
        assert_eq!(events[3].country, "France");
        assert_eq!(events[0].quantity, Some(6));
        assert_eq!(events[0].unit_price, Some(2.55));
    }

    #[test]
    fn test_blank_cells_load_as_nulls() {
        let csv = "\
InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country
1,A,ITEM,1,2011-01-02 10:00:00,1.0,1,UK
2,B,ITEM,2,,3.0,2,UK
3,C,ITEM,,2011-01-03 10:00:00,,,UK
";
        let events = load_transactions(csv.as_bytes()).unwrap();
        assert_eq!(events.len(), 3);
        assert!(events[0].invoice_timestamp.is_some());
        assert_eq!(events[1].invoice_timestamp, None);
        assert_eq!(events[1].unit_price, Some(3.0));
        assert_eq!(events[2].customer_id, None);
        assert_eq!(events[2].unit_price, None);
        assert_eq!(events[2].quantity, None);

        let events = load_events("user_id,event_timestamp,purchase_revenue\nu1,,4.0\nu2,2021-01-03,\n".as_bytes()).unwrap();
        assert_eq!(events[0].event_timestamp, None);
        assert!(events[1].event_timestamp.is_some());
    }

    #[test]
    fn test_malformed_price_is_parse_error() {
        let csv = "\
InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country
1,A,ITEM,1,2011-01-02 10:00:00,1.0,1,UK
2,B,ITEM,1,2011-01-02 10:00:00,abc,2,UK
";
        match load_transactions(csv.as_bytes()) {
            Err(ClvError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_normalize_id_only_strips_numeric_suffix() {
        assert_eq!(normalize_id(Some("17850.0".to_string())).as_deref(), Some("17850"));
        assert_eq!(normalize_id(Some("A1.0".to_string())).as_deref(), Some("A1.0"));
        assert_eq!(normalize_id(Some(" u7 ".to_string())).as_deref(), Some("u7"));
        assert_eq!(normalize_id(Some("  ".to_string())), None);
    }

    #[test]
    fn test_load_transactions_bad_timestamp() {
        let csv = "\
InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country
1,A,ITEM,1,not-a-date,1.0,1,UK
";
        match load_transactions(csv.as_bytes()) {
            Err(ClvError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_events_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "user_id,event_timestamp,purchase_revenue").unwrap();
        writeln!(file, "u1,2021-01-03 10:00:00,").unwrap();
        writeln!(file, "u1,2021-01-10 10:00:00,25.5").unwrap();
        writeln!(file, ",2021-01-10 11:00:00,3.0").unwrap();

        let events = load_events_file(file.path()).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].purchase_revenue, None);
        assert_eq!(events[1].purchase_revenue, Some(25.5));
        assert_eq!(events[2].user_id, None);
    }

    #[test]
    fn test_frames_shape() {
        let tx = load_transactions(TRANSACTIONS.as_bytes()).unwrap();
        let df = transactions_frame(&tx).unwrap();
        assert_eq!(df.shape(), (4, 7));
        assert_eq!(df.column("customer_id").unwrap().null_count(), 1);

        let events = load_events("user_id,event_timestamp,purchase_revenue\nu1,2021-01-03,\n".as_bytes()).unwrap();
        let df = events_frame(&events, WeekStart::Sunday).unwrap();
        assert_eq!(df.shape(), (1, 4));
        let revenue: Vec<f64> = df.column("revenue").unwrap().f64().unwrap().into_no_null_iter().collect();
        assert_eq!(revenue, vec![0.0]);
    }
}

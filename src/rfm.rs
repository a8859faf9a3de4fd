//! RFM computation: per-customer aggregation, scoring and segmentation

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use polars::prelude::*;

use crate::data::{self, TransactionEvent};
use crate::dates;
use crate::error::ClvError;
use crate::quantile::{self, QuantileMethod, QuantileThresholds};
use crate::segment::{self, RfmScore, Segment};

/// Inclusive date range of invoices considered by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl AnalysisWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ClvError> {
        if start > end {
            return Err(ClvError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }
}

/// Raw recency/frequency/monetary values of one customer.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRfm {
    pub customer_id: String,
    pub country: String,
    /// Days between the run's reference date and the last invoice
    pub recency_days: i64,
    /// Distinct invoices
    pub frequency_count: i64,
    /// Sum of unit price times quantity over all line items
    pub monetary_total: f64,
    pub last_invoice_date: NaiveDate,
}

/// Customers of a window together with the date recency is measured from.
#[derive(Debug, Clone)]
pub struct CustomerAggregation {
    /// Latest invoice date in the window plus one day
    pub reference_date: NaiveDate,
    pub customers: Vec<CustomerRfm>,
}

#[derive(Debug, Clone)]
pub struct ScoredCustomer {
    pub record: CustomerRfm,
    pub score: RfmScore,
    pub segment: Segment,
}

/// Full output of one segmentation run.
#[derive(Debug, Clone)]
pub struct RfmReport {
    pub reference_date: NaiveDate,
    pub method: QuantileMethod,
    pub thresholds: QuantileThresholds,
    pub customers: Vec<ScoredCustomer>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentSummary {
    pub segment: Segment,
    pub customers: usize,
    /// Fraction of all scored customers
    pub share: f64,
    pub avg_recency: f64,
    pub avg_frequency: f64,
    pub avg_monetary: f64,
    pub total_monetary: f64,
}

/// Aggregate line items into one record per customer.
///
/// Line items missing a customer id, description, timestamp, price or
/// quantity, or dated outside the window, are dropped before aggregation.
/// Output is sorted by customer id.
pub fn aggregate_customers(
    events: &[TransactionEvent],
    window: &AnalysisWindow,
) -> Result<CustomerAggregation, ClvError> {
    let df = data::transactions_frame(events)?;
    let input_rows = df.height();

    let valid = df
        .lazy()
        .filter(
            col("customer_id")
                .is_not_null()
                .and(col("description").is_not_null())
                .and(col("invoice_day").is_not_null())
                .and(col("unit_price").is_not_null())
                .and(col("quantity").is_not_null())
                .and(col("invoice_day").gt_eq(lit(dates::day_number(window.start))))
                .and(col("invoice_day").lt_eq(lit(dates::day_number(window.end)))),
        )
        .with_column((col("unit_price") * col("quantity")).alias("line_total"))
        .collect()?;

    tracing::debug!(
        input_rows,
        kept_rows = valid.height(),
        "filtered incomplete line items and those outside the window"
    );

    if valid.height() == 0 {
        return Err(ClvError::NoData(format!(
            "no line items between {} and {}",
            window.start, window.end
        )));
    }

    let per_customer = valid
        .lazy()
        .group_by_stable([col("customer_id")])
        .agg([
            col("country").first().alias("country"),
            col("invoice_day").max().alias("last_day"),
            col("invoice_id").n_unique().cast(DataType::Int64).alias("frequency"),
            col("line_total").sum().alias("monetary"),
        ])
        .collect()?;

    let ids = per_customer.column("customer_id")?.str()?;
    let countries = per_customer.column("country")?.str()?;
    let last_days = per_customer.column("last_day")?.i64()?;
    let frequencies = per_customer.column("frequency")?.i64()?;
    let monetary = per_customer.column("monetary")?.f64()?;

    let max_day = last_days
        .max()
        .ok_or_else(|| ClvError::NoData("no invoice dates".to_string()))?;
    let reference_date = dates::from_day_number(max_day) + Duration::days(1);
    let reference_day = max_day + 1;

    let mut customers: Vec<CustomerRfm> = ids
        .into_iter()
        .zip(countries)
        .zip(last_days)
        .zip(frequencies)
        .zip(monetary)
        .filter_map(|((((id, country), last_day), frequency), monetary)| {
            let last_day = last_day?;
            Some(CustomerRfm {
                customer_id: id?.to_string(),
                country: country.unwrap_or_default().to_string(),
                recency_days: reference_day - last_day,
                frequency_count: frequency?,
                monetary_total: monetary.unwrap_or(0.0),
                last_invoice_date: dates::from_day_number(last_day),
            })
        })
        .collect();
    customers.sort_by(|a, b| a.customer_id.cmp(&b.customer_id));

    tracing::info!(
        customers = customers.len(),
        %reference_date,
        "aggregated customer RFM records"
    );

    Ok(CustomerAggregation {
        reference_date,
        customers,
    })
}

/// Score raw values against a run's thresholds.
///
/// Recency is inverted: the most recent quartile scores 4. Every measure
/// compares with `<=`, so a recency equal to the 25th percentile scores 4.
pub fn score_values(
    recency_days: f64,
    frequency: f64,
    monetary: f64,
    thresholds: &QuantileThresholds,
) -> RfmScore {
    RfmScore {
        r: 5 - thresholds.recency.bucket(recency_days),
        f: thresholds.frequency.bucket(frequency),
        m: thresholds.monetary.bucket(monetary),
    }
}

pub fn score(record: &CustomerRfm, thresholds: &QuantileThresholds) -> RfmScore {
    score_values(
        record.recency_days as f64,
        record.frequency_count as f64,
        record.monetary_total,
        thresholds,
    )
}

/// Run the whole segmentation pipeline over one window.
pub fn segment_customers(
    events: &[TransactionEvent],
    window: &AnalysisWindow,
    method: QuantileMethod,
) -> Result<RfmReport, ClvError> {
    let aggregation = aggregate_customers(events, window)?;
    let thresholds = quantile::compute_thresholds(&aggregation.customers, method)?;

    let customers = aggregation
        .customers
        .into_iter()
        .map(|record| {
            let score = score(&record, &thresholds);
            ScoredCustomer {
                segment: segment::segment_for(&score),
                score,
                record,
            }
        })
        .collect();

    Ok(RfmReport {
        reference_date: aggregation.reference_date,
        method,
        thresholds,
        customers,
    })
}

/// Per-segment totals in rule priority order. Empty segments are omitted.
pub fn segment_summary(customers: &[ScoredCustomer]) -> Vec<SegmentSummary> {
    let mut groups: BTreeMap<Segment, Vec<&CustomerRfm>> = BTreeMap::new();
    for customer in customers {
        groups.entry(customer.segment).or_default().push(&customer.record);
    }

    let total = customers.len() as f64;
    groups
        .into_iter()
        .map(|(segment, records)| {
            let n = records.len() as f64;
            let total_monetary: f64 = records.iter().map(|r| r.monetary_total).sum();
            SegmentSummary {
                segment,
                customers: records.len(),
                share: n / total,
                avg_recency: records.iter().map(|r| r.recency_days as f64).sum::<f64>() / n,
                avg_frequency: records.iter().map(|r| r.frequency_count as f64).sum::<f64>() / n,
                avg_monetary: total_monetary / n,
                total_monetary,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantile::Quartiles;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn item(customer: Option<&str>, invoice: &str, day: NaiveDate, price: f64, qty: i64) -> TransactionEvent {
        TransactionEvent {
            customer_id: customer.map(str::to_string),
            invoice_id: invoice.to_string(),
            invoice_timestamp: day.and_hms_opt(10, 0, 0),
            description: Some("ITEM".to_string()),
            unit_price: Some(price),
            quantity: Some(qty),
            country: "United Kingdom".to_string(),
        }
    }

    fn window() -> AnalysisWindow {
        AnalysisWindow::new(date(2011, 1, 1), date(2011, 12, 31)).unwrap()
    }

    #[test]
    fn test_window_validation() {
        assert!(AnalysisWindow::new(date(2011, 2, 1), date(2011, 1, 1)).is_err());
        assert!(AnalysisWindow::new(date(2011, 1, 1), date(2011, 1, 1)).is_ok());
    }

    #[test]
    fn test_aggregate_customers() {
        let events = vec![
            item(Some("A"), "1", date(2011, 12, 1), 2.0, 5),
            item(Some("A"), "1", date(2011, 12, 1), 1.0, 10),
            item(Some("A"), "2", date(2011, 12, 5), 3.0, 1),
            item(Some("B"), "3", date(2011, 11, 9), 4.0, 2),
            item(None, "4", date(2011, 12, 8), 100.0, 1),
            item(Some("C"), "5", date(2010, 6, 1), 100.0, 1),
        ];

        let agg = aggregate_customers(&events, &window()).unwrap();
        // the anonymous item on 12-08 is filtered before the reference date is taken
        assert_eq!(agg.reference_date, date(2011, 12, 6));
        assert_eq!(agg.customers.len(), 2);

        let a = &agg.customers[0];
        assert_eq!(a.customer_id, "A");
        assert_eq!(a.frequency_count, 2);
        assert!((a.monetary_total - 23.0).abs() < 1e-9);
        assert_eq!(a.recency_days, 1);
        assert_eq!(a.last_invoice_date, date(2011, 12, 5));

        let b = &agg.customers[1];
        assert_eq!(b.customer_id, "B");
        assert_eq!(b.frequency_count, 1);
        assert_eq!(b.recency_days, 27);
    }

    #[test]
    fn test_missing_description_is_excluded() {
        let mut no_desc = item(Some("Z"), "9", date(2011, 3, 1), 5.0, 1);
        no_desc.description = None;
        let events = vec![no_desc, item(Some("A"), "1", date(2011, 3, 1), 1.0, 1)];

        let agg = aggregate_customers(&events, &window()).unwrap();
        assert_eq!(agg.customers.len(), 1);
        assert_eq!(agg.customers[0].customer_id, "A");
    }

    #[test]
    fn test_incomplete_items_are_excluded() {
        let mut no_timestamp = item(Some("Z"), "9", date(2011, 12, 20), 5.0, 1);
        no_timestamp.invoice_timestamp = None;
        let mut no_price = item(None, "8", date(2011, 12, 20), 1.0, 1);
        no_price.unit_price = None;
        let mut no_quantity = item(Some("Y"), "7", date(2011, 12, 20), 1.0, 1);
        no_quantity.quantity = None;
        let events = vec![
            no_timestamp,
            no_price,
            no_quantity,
            item(Some("A"), "1", date(2011, 3, 1), 1.0, 1),
        ];

        let agg = aggregate_customers(&events, &window()).unwrap();
        assert_eq!(agg.reference_date, date(2011, 3, 2));
        assert_eq!(agg.customers.len(), 1);
        assert_eq!(agg.customers[0].customer_id, "A");
    }

    #[test]
    fn test_empty_window_is_no_data() {
        let events = vec![item(Some("A"), "1", date(2009, 1, 1), 1.0, 1)];
        let result = aggregate_customers(&events, &window());
        assert!(matches!(result, Err(ClvError::NoData(_))));

        let result = segment_customers(&[], &window(), QuantileMethod::NearestRank);
        assert!(matches!(result, Err(ClvError::NoData(_))));
    }

    #[test]
    fn test_score_example_recent_customer() {
        let thresholds = QuantileThresholds {
            monetary: Quartiles { q25: 100.0, q50: 250.0, q75: 500.0 },
            frequency: Quartiles { q25: 1.0, q50: 4.0, q75: 10.0 },
            recency: Quartiles { q25: 7.0, q50: 30.0, q75: 90.0 },
        };
        let s = score_values(5.0, 1.0, 1000.0, &thresholds);
        assert_eq!(s, RfmScore { r: 4, f: 1, m: 4 });
        assert_eq!(s.code(), 414);
        assert_eq!(segment::segment_for(&s), Segment::RecentCustomers);

        // recency is inverted: the oldest quartile scores 1
        assert_eq!(score_values(91.0, 1.0, 1.0, &thresholds).r, 1);
        assert_eq!(score_values(90.0, 1.0, 1.0, &thresholds).r, 2);
        assert_eq!(score_values(7.0, 1.0, 1.0, &thresholds).r, 4);
    }

    #[test]
    fn test_segment_customers_scores_in_range() {
        let mut events = Vec::new();
        for (i, customer) in ["A", "B", "C", "D", "E", "F", "G", "H"].iter().enumerate() {
            for invoice in 0..=i {
                events.push(item(
                    Some(customer),
                    &format!("{}-{}", customer, invoice),
                    date(2011, 12, 1 + i as u32),
                    10.0 * (i + 1) as f64,
                    1,
                ));
            }
        }

        let report = segment_customers(&events, &window(), QuantileMethod::NearestRank).unwrap();
        assert_eq!(report.customers.len(), 8);
        for c in &report.customers {
            for s in [c.score.r, c.score.f, c.score.m] {
                assert!((1..=4).contains(&s));
            }
            assert!((111..=444).contains(&c.score.code()));
        }
        // H is the most recent, most frequent and biggest spender
        let h = report.customers.iter().find(|c| c.record.customer_id == "H").unwrap();
        assert_eq!(h.segment, Segment::Champions);
        let a = report.customers.iter().find(|c| c.record.customer_id == "A").unwrap();
        assert_eq!(a.score, RfmScore { r: 1, f: 1, m: 1 });
        assert_eq!(a.segment, Segment::AtRisk);
    }

    #[test]
    fn test_segment_summary() {
        let events = vec![
            item(Some("A"), "1", date(2011, 12, 1), 10.0, 1),
            item(Some("B"), "2", date(2011, 12, 2), 20.0, 1),
        ];
        let report = segment_customers(&events, &window(), QuantileMethod::NearestRank).unwrap();
        let summary = segment_summary(&report.customers);

        assert_eq!(summary.iter().map(|s| s.customers).sum::<usize>(), 2);
        assert!((summary.iter().map(|s| s.share).sum::<f64>() - 1.0).abs() < 1e-9);
        let ordered: Vec<Segment> = summary.iter().map(|s| s.segment).collect();
        let mut sorted = ordered.clone();
        sorted.sort();
        assert_eq!(ordered, sorted);
    }
}

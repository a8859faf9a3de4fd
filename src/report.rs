//! Output tables (CSV) and console summaries
//!
//! Floating point cells use fixed six-decimal formatting so identical
//! inputs always produce byte-identical files.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use comfy_table::Table;
use ndarray::Array2;
use serde::Serialize;

use crate::cohort::{CohortTable, HORIZON_WEEKS};
use crate::error::ClvError;
use crate::projection::{CumulativeTable, Projection};
use crate::rfm::{RfmReport, SegmentSummary};

pub const RFM_SEGMENTS_FILE: &str = "rfm_segments.csv";
pub const RFM_SUMMARY_FILE: &str = "rfm_segment_summary.csv";
pub const COHORT_REVENUE_FILE: &str = "cohort_revenue.csv";
pub const COHORT_CUMULATIVE_FILE: &str = "cohort_cumulative.csv";
pub const COHORT_PROJECTION_FILE: &str = "cohort_projection.csv";

fn money(value: f64) -> String {
    format!("{:.6}", value)
}

#[derive(Serialize)]
struct CustomerRow<'a> {
    customer_id: &'a str,
    country: &'a str,
    recency: i64,
    frequency: i64,
    monetary: String,
    r_score: u8,
    f_score: u8,
    m_score: u8,
    rfm_score: u16,
    segment: &'static str,
}

#[derive(Serialize)]
struct SummaryRow {
    segment: &'static str,
    customers: usize,
    share: String,
    avg_recency: String,
    avg_frequency: String,
    avg_monetary: String,
    total_monetary: String,
}

/// One row per scored customer.
pub fn write_rfm_segments<W: Write>(writer: W, report: &RfmReport) -> Result<(), ClvError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for c in &report.customers {
        wtr.serialize(CustomerRow {
            customer_id: &c.record.customer_id,
            country: &c.record.country,
            recency: c.record.recency_days,
            frequency: c.record.frequency_count,
            monetary: money(c.record.monetary_total),
            r_score: c.score.r,
            f_score: c.score.f,
            m_score: c.score.m,
            rfm_score: c.score.code(),
            segment: c.segment.label(),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_segment_summary<W: Write>(
    writer: W,
    summary: &[SegmentSummary],
) -> Result<(), ClvError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for s in summary {
        wtr.serialize(SummaryRow {
            segment: s.segment.label(),
            customers: s.customers,
            share: money(s.share),
            avg_recency: money(s.avg_recency),
            avg_frequency: money(s.avg_frequency),
            avg_monetary: money(s.avg_monetary),
            total_monetary: money(s.total_monetary),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

fn week_headers() -> impl Iterator<Item = String> {
    (0..HORIZON_WEEKS).map(|k| format!("week_{}", k))
}

/// registration_week, cohort_size, week_0..week_12
pub fn write_cohort_matrix<W: Write>(
    writer: W,
    cohorts: &[NaiveDate],
    sizes: &[usize],
    values: &Array2<f64>,
) -> Result<(), ClvError> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = vec!["registration_week".to_string(), "cohort_size".to_string()];
    header.extend(week_headers());
    wtr.write_record(&header)?;

    for ((week, size), row) in cohorts.iter().zip(sizes).zip(values.rows()) {
        let mut record = vec![week.to_string(), size.to_string()];
        record.extend(row.iter().map(|v| money(*v)));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// registration_week, observed_weeks, growth_ratio, status, week_0..week_12
///
/// Cohorts that cannot be projected keep empty ratio and week cells.
pub fn write_projections<W: Write>(writer: W, projections: &[Projection]) -> Result<(), ClvError> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = vec![
        "registration_week".to_string(),
        "observed_weeks".to_string(),
        "growth_ratio".to_string(),
        "status".to_string(),
    ];
    header.extend(week_headers());
    wtr.write_record(&header)?;

    for projection in projections {
        let record: Vec<String> = match projection {
            Projection::Projected {
                registration_week,
                observed_weeks,
                growth_ratio,
                values,
            } => [
                registration_week.to_string(),
                observed_weeks.to_string(),
                money(*growth_ratio),
                "projected".to_string(),
            ]
            .into_iter()
            .chain(values.iter().map(|v| money(*v)))
            .collect(),
            Projection::InsufficientData {
                registration_week,
                observed_weeks,
            } => [
                registration_week.to_string(),
                observed_weeks.to_string(),
                String::new(),
                "insufficient_data".to_string(),
            ]
            .into_iter()
            .chain((0..HORIZON_WEEKS).map(|_| String::new()))
            .collect(),
        };
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

fn create_in(dir: &Path, name: &str) -> Result<(File, PathBuf), ClvError> {
    let path = dir.join(name);
    Ok((File::create(&path)?, path))
}

/// Write both RFM tables into `dir`, returning the written paths.
pub fn write_rfm_outputs(
    dir: &Path,
    report: &RfmReport,
    summary: &[SegmentSummary],
) -> Result<Vec<PathBuf>, ClvError> {
    fs::create_dir_all(dir)?;

    let (file, segments_path) = create_in(dir, RFM_SEGMENTS_FILE)?;
    write_rfm_segments(file, report)?;
    let (file, summary_path) = create_in(dir, RFM_SUMMARY_FILE)?;
    write_segment_summary(file, summary)?;

    Ok(vec![segments_path, summary_path])
}

/// Write the revenue, cumulative and projection tables into `dir`.
pub fn write_cohort_outputs(
    dir: &Path,
    table: &CohortTable,
    cumulative: &CumulativeTable,
    projections: &[Projection],
) -> Result<Vec<PathBuf>, ClvError> {
    fs::create_dir_all(dir)?;

    let (file, revenue_path) = create_in(dir, COHORT_REVENUE_FILE)?;
    write_cohort_matrix(file, &table.cohorts, &table.sizes, &table.average)?;
    let (file, cumulative_path) = create_in(dir, COHORT_CUMULATIVE_FILE)?;
    write_cohort_matrix(file, &cumulative.cohorts, &cumulative.sizes, &cumulative.values)?;
    let (file, projection_path) = create_in(dir, COHORT_PROJECTION_FILE)?;
    write_projections(file, projections)?;

    Ok(vec![revenue_path, cumulative_path, projection_path])
}

/// Print thresholds and segment sizes to the console
pub fn print_rfm_summary(report: &RfmReport, summary: &[SegmentSummary]) {
    println!("\n=== RFM Segmentation ===");
    println!("Reference date: {}", report.reference_date);
    println!("Customers scored: {}", report.customers.len());

    let t = &report.thresholds;
    let mut thresholds = Table::new();
    thresholds.set_header(vec!["Measure", "Q25", "Q50", "Q75"]);
    for (name, q) in [
        ("Recency (days)", &t.recency),
        ("Frequency", &t.frequency),
        ("Monetary", &t.monetary),
    ] {
        thresholds.add_row(vec![
            name.to_string(),
            format!("{:.2}", q.q25),
            format!("{:.2}", q.q50),
            format!("{:.2}", q.q75),
        ]);
    }
    println!("\nQuartile thresholds ({:?}):\n{}", report.method, thresholds);

    let mut segments = Table::new();
    segments.set_header(vec!["Segment", "Customers", "Share", "Avg Monetary", "Total Monetary"]);
    for s in summary {
        segments.add_row(vec![
            s.segment.label().to_string(),
            s.customers.to_string(),
            format!("{:.1}%", s.share * 100.0),
            format!("{:.2}", s.avg_monetary),
            format!("{:.2}", s.total_monetary),
        ]);
    }
    println!("\n{}", segments);
}

/// Print cohort sizes and week 12 values to the console
pub fn print_cohort_summary(table: &CohortTable, cumulative: &CumulativeTable, projections: &[Projection]) {
    println!("\n=== Weekly Cohort Revenue ===");
    println!("Observed through: {} ({:?} weeks)", table.as_of, table.week_start);

    let mut out = Table::new();
    out.set_header(vec![
        "Cohort",
        "Users",
        "Observed Weeks",
        "Cumulative (last observed)",
        "Projected Week 12",
    ]);
    for (i, projection) in projections.iter().enumerate() {
        let observed = table.observed_weeks[i];
        let last_observed = if observed == 0 {
            "-".to_string()
        } else {
            format!("{:.2}", cumulative.values[[i, observed - 1]])
        };
        let projected = match projection {
            Projection::Projected { values, .. } => values
                .last()
                .map(|v| format!("{:.2}", v))
                .unwrap_or_else(|| "-".to_string()),
            Projection::InsufficientData { .. } => "insufficient data".to_string(),
        };
        out.add_row(vec![
            table.cohorts[i].to_string(),
            table.sizes[i].to_string(),
            observed.to_string(),
            last_observed,
            projected,
        ]);
    }
    println!("{}", out);
}

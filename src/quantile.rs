//! Quartile thresholds for RFM scoring
//!
//! Percentiles differ between estimation methods, so the method is part of
//! every run's configuration and results are only comparable across runs
//! that use the same one.

use serde::Deserialize;

use crate::error::ClvError;
use crate::rfm::CustomerRfm;

/// Percentile estimation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum QuantileMethod {
    /// The ceil(p * n)-th smallest value. Always an observed value, like the
    /// approximate quantile functions of warehouse engines.
    #[default]
    NearestRank,
    /// Linear interpolation at position p * (n - 1).
    Linear,
}

/// 25th/50th/75th percentiles of one measure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quartiles {
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
}

impl Quartiles {
    /// Bucket 1..=4 where a value equal to a boundary stays in the lower bucket.
    pub fn bucket(&self, value: f64) -> u8 {
        if value <= self.q25 {
            1
        } else if value <= self.q50 {
            2
        } else if value <= self.q75 {
            3
        } else {
            4
        }
    }
}

/// Run-wide thresholds used to classify every customer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantileThresholds {
    pub monetary: Quartiles,
    pub frequency: Quartiles,
    pub recency: Quartiles,
}

pub fn percentile(sorted: &[f64], p: f64, method: QuantileMethod) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len();
    let value = match method {
        QuantileMethod::NearestRank => {
            let rank = (p * n as f64).ceil() as usize;
            sorted[rank.saturating_sub(1).min(n - 1)]
        }
        QuantileMethod::Linear => {
            let pos = p * (n - 1) as f64;
            let lower = pos.floor() as usize;
            let upper = pos.ceil() as usize;
            let frac = pos - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * frac
        }
    };
    Some(value)
}

fn quartiles(mut values: Vec<f64>, method: QuantileMethod) -> Option<Quartiles> {
    values.sort_by(f64::total_cmp);
    Some(Quartiles {
        q25: percentile(&values, 0.25, method)?,
        q50: percentile(&values, 0.50, method)?,
        q75: percentile(&values, 0.75, method)?,
    })
}

/// Compute quartiles of monetary, frequency and recency independently.
pub fn compute_thresholds(
    records: &[CustomerRfm],
    method: QuantileMethod,
) -> Result<QuantileThresholds, ClvError> {
    let no_data = || ClvError::NoData("quantiles need at least one customer".to_string());

    let monetary = quartiles(records.iter().map(|r| r.monetary_total).collect(), method)
        .ok_or_else(no_data)?;
    let frequency = quartiles(
        records.iter().map(|r| r.frequency_count as f64).collect(),
        method,
    )
    .ok_or_else(no_data)?;
    let recency = quartiles(
        records.iter().map(|r| r.recency_days as f64).collect(),
        method,
    )
    .ok_or_else(no_data)?;

    tracing::debug!(?method, ?monetary, ?frequency, ?recency, "computed thresholds");
    Ok(QuantileThresholds {
        monetary,
        frequency,
        recency,
    })
}

//! Cumulative cohort revenue and forward projection to week 12
//!
//! The growth policy decides which week-over-week ratio is carried
//! forward; aggregation never depends on it.

use chrono::NaiveDate;
use ndarray::{Array2, Axis};
use serde::Deserialize;

use crate::cohort::{CohortTable, HORIZON_WEEKS};

/// Picks the ratio used to extend a cohort's cumulative curve.
pub trait GrowthPolicy {
    fn name(&self) -> &'static str;

    /// `None` when no ratio can be derived from `ratios`.
    fn representative_ratio(&self, ratios: &[f64]) -> Option<f64>;
}

/// Arithmetic mean of all observed ratios.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanGrowth;

impl GrowthPolicy for MeanGrowth {
    fn name(&self) -> &'static str {
        "mean"
    }

    fn representative_ratio(&self, ratios: &[f64]) -> Option<f64> {
        if ratios.is_empty() {
            return None;
        }
        Some(ratios.iter().sum::<f64>() / ratios.len() as f64)
    }
}

/// The most recent observed ratio.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastObservedGrowth;

impl GrowthPolicy for LastObservedGrowth {
    fn name(&self) -> &'static str {
        "last"
    }

    fn representative_ratio(&self, ratios: &[f64]) -> Option<f64> {
        ratios.last().copied()
    }
}

/// Built-in policies selectable from config and CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionStrategy {
    #[default]
    Mean,
    Last,
}

impl ProjectionStrategy {
    pub fn policy(&self) -> Box<dyn GrowthPolicy> {
        match self {
            ProjectionStrategy::Mean => Box::new(MeanGrowth),
            ProjectionStrategy::Last => Box::new(LastObservedGrowth),
        }
    }
}

/// Running sum of average revenue per user along week offsets.
#[derive(Debug, Clone)]
pub struct CumulativeTable {
    pub cohorts: Vec<NaiveDate>,
    pub sizes: Vec<usize>,
    pub observed_weeks: Vec<usize>,
    /// Shape (cohorts, HORIZON_WEEKS)
    pub values: Array2<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Projected {
        registration_week: NaiveDate,
        observed_weeks: usize,
        growth_ratio: f64,
        /// Observed cumulative values followed by projected ones, weeks 0..=12
        values: Vec<f64>,
    },
    InsufficientData {
        registration_week: NaiveDate,
        observed_weeks: usize,
    },
}

impl Projection {
    pub fn registration_week(&self) -> NaiveDate {
        match self {
            Projection::Projected {
                registration_week, ..
            }
            | Projection::InsufficientData {
                registration_week, ..
            } => *registration_week,
        }
    }
}

pub fn cumulative(table: &CohortTable) -> CumulativeTable {
    let mut values = table.average.clone();
    values.accumulate_axis_inplace(Axis(1), |&prev, curr| *curr += prev);

    CumulativeTable {
        cohorts: table.cohorts.clone(),
        sizes: table.sizes.clone(),
        observed_weeks: table.observed_weeks.clone(),
        values,
    }
}

/// Week-over-week ratios cum[k] / cum[k-1], skipping zero denominators.
pub fn growth_ratios(observed: &[f64]) -> Vec<f64> {
    observed
        .windows(2)
        .filter(|pair| pair[0] > 0.0)
        .map(|pair| pair[1] / pair[0])
        .collect()
}

/// Extend every cohort's observed cumulative curve to week 12.
///
/// Cohorts with fewer than two observed weeks, or without any defined
/// ratio, are reported as insufficient data.
pub fn project(table: &CumulativeTable, policy: &dyn GrowthPolicy) -> Vec<Projection> {
    table
        .cohorts
        .iter()
        .zip(&table.observed_weeks)
        .zip(table.values.rows())
        .map(|((&registration_week, &observed_weeks), row)| {
            let insufficient = Projection::InsufficientData {
                registration_week,
                observed_weeks,
            };
            if observed_weeks < 2 {
                return insufficient;
            }

            let observed: Vec<f64> = row.iter().take(observed_weeks).copied().collect();
            let Some(ratio) = policy.representative_ratio(&growth_ratios(&observed)) else {
                return insufficient;
            };

            let mut values = observed;
            while values.len() < HORIZON_WEEKS {
                let prev = values[values.len() - 1];
                values.push(prev * ratio);
            }

            Projection::Projected {
                registration_week,
                observed_weeks,
                growth_ratio: ratio,
                values,
            }
        })
        .inspect(|p| {
            if let Projection::InsufficientData {
                registration_week,
                observed_weeks,
            } = p
            {
                tracing::debug!(
                    %registration_week,
                    observed_weeks,
                    policy = policy.name(),
                    "cohort has too little history to project"
                );
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::WeekStart;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn table(rows: &[[f64; HORIZON_WEEKS]], observed: &[usize]) -> CohortTable {
        let n = rows.len();
        let flat: Vec<f64> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        let average = Array2::from_shape_vec((n, HORIZON_WEEKS), flat).unwrap();
        CohortTable {
            week_start: WeekStart::Sunday,
            as_of: date(2021, 4, 1),
            cohorts: (0..n)
                .map(|i| date(2021, 1, 3) + chrono::Duration::weeks(i as i64))
                .collect(),
            sizes: vec![1; n],
            observed_weeks: observed.to_vec(),
            revenue: average.clone(),
            average,
        }
    }

    #[test]
    fn test_cumulative_is_monotonic() {
        let mut row = [0.0; HORIZON_WEEKS];
        row[0] = 5.0;
        row[2] = 1.5;
        row[7] = 3.0;
        let cum = cumulative(&table(&[row], &[HORIZON_WEEKS]));

        let values: Vec<f64> = cum.values.row(0).to_vec();
        assert_eq!(values[0], 5.0);
        assert_eq!(values[1], 5.0);
        assert_eq!(values[2], 6.5);
        assert_eq!(values[12], 9.5);
        for k in 1..HORIZON_WEEKS {
            assert!(values[k] >= values[k - 1]);
        }
    }

    #[test]
    fn test_growth_ratios_skip_zero() {
        assert_eq!(growth_ratios(&[0.0, 2.0, 4.0, 5.0]), vec![2.0, 1.25]);
        assert!(growth_ratios(&[3.0]).is_empty());
    }

    #[test]
    fn test_policies() {
        let ratios = [2.0, 1.5, 1.0];
        assert_eq!(MeanGrowth.representative_ratio(&ratios), Some(1.5));
        assert_eq!(LastObservedGrowth.representative_ratio(&ratios), Some(1.0));
        assert_eq!(MeanGrowth.representative_ratio(&[]), None);
        assert_eq!(ProjectionStrategy::Last.policy().name(), "last");
    }

    #[test]
    fn test_project_extends_to_week_12() {
        let mut row = [0.0; HORIZON_WEEKS];
        row[0] = 10.0;
        row[1] = 5.0; // cum 15
        row[2] = 15.0; // cum 30
        let cum = cumulative(&table(&[row], &[3]));

        let projections = project(&cum, &LastObservedGrowth);
        match &projections[0] {
            Projection::Projected {
                observed_weeks,
                growth_ratio,
                values,
                ..
            } => {
                assert_eq!(*observed_weeks, 3);
                assert_eq!(*growth_ratio, 2.0);
                assert_eq!(values.len(), HORIZON_WEEKS);
                assert_eq!(&values[..3], &[10.0, 15.0, 30.0]);
                assert_eq!(values[3], 60.0);
                assert_eq!(values[4], 120.0);
            }
            other => panic!("expected projection, got {:?}", other),
        }

        let projections = project(&cum, &MeanGrowth);
        if let Projection::Projected { growth_ratio, .. } = &projections[0] {
            assert!((growth_ratio - 1.75).abs() < 1e-9);
        } else {
            panic!("expected projection");
        }
    }

    #[test]
    fn test_project_insufficient_data() {
        let mut row = [0.0; HORIZON_WEEKS];
        row[0] = 10.0;
        let zero = [0.0; HORIZON_WEEKS];
        let cum = cumulative(&table(&[row, zero], &[1, 5]));

        let projections = project(&cum, &MeanGrowth);
        assert_eq!(
            projections[0],
            Projection::InsufficientData {
                registration_week: date(2021, 1, 3),
                observed_weeks: 1,
            }
        );
        // five observed weeks without any revenue give no ratio
        assert!(matches!(
            projections[1],
            Projection::InsufficientData { observed_weeks: 5, .. }
        ));
        assert_eq!(projections[1].registration_week(), date(2021, 1, 10));
    }
}

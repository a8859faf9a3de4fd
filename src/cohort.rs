//! Weekly cohort revenue
//!
//! Every user belongs to the cohort of the week of their first event. For
//! each cohort and week offset 0..=12 the revenue of its members in that
//! week is divided by the cohort's total size, so inactive members dilute
//! the average.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use ndarray::{Array2, ArrayView1};
use polars::prelude::*;

use crate::data::{self, VisitEvent};
use crate::dates::{self, WeekStart};
use crate::error::ClvError;

/// Largest week offset reported for a cohort.
pub const MAX_WEEK_OFFSET: i64 = 12;
/// Offsets 0..=MAX_WEEK_OFFSET.
pub const HORIZON_WEEKS: usize = MAX_WEEK_OFFSET as usize + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CohortOptions {
    /// Users whose first week starts after this date are left out
    pub cutoff: NaiveDate,
    pub week_start: WeekStart,
    /// Last date with complete data; defaults to the latest event date
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CohortAssignment {
    pub registration_week: NaiveDate,
    pub user_id: String,
}

/// Revenue per cohort and week offset.
#[derive(Debug, Clone)]
pub struct CohortTable {
    pub week_start: WeekStart,
    pub as_of: NaiveDate,
    /// Registration week of each row, ascending
    pub cohorts: Vec<NaiveDate>,
    pub sizes: Vec<usize>,
    /// Offsets whose last day is on or before `as_of`, per row
    pub observed_weeks: Vec<usize>,
    /// Total member revenue, shape (cohorts, HORIZON_WEEKS)
    pub revenue: Array2<f64>,
    /// Revenue per registered user, shape (cohorts, HORIZON_WEEKS)
    pub average: Array2<f64>,
}

impl CohortTable {
    pub fn len(&self) -> usize {
        self.cohorts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cohorts.is_empty()
    }

    pub fn position(&self, registration_week: NaiveDate) -> Option<usize> {
        self.cohorts.binary_search(&registration_week).ok()
    }

    pub fn average_row(&self, idx: usize) -> ArrayView1<'_, f64> {
        self.average.row(idx)
    }
}

fn valid_events(events: &[VisitEvent], week_start: WeekStart) -> PolarsResult<LazyFrame> {
    let df = data::events_frame(events, week_start)?;
    Ok(df
        .lazy()
        .filter(col("user_id").is_not_null().and(col("event_day").is_not_null())))
}

fn registrations(events: LazyFrame, cutoff_week: i64) -> LazyFrame {
    events
        .group_by([col("user_id")])
        .agg([col("event_week").min().alias("registration_week")])
        .filter(col("registration_week").lt_eq(lit(cutoff_week)))
}

/// Offsets of a cohort whose seven days all fall on or before `as_of_day`.
fn complete_weeks(first_week: NaiveDate, as_of_day: i64) -> usize {
    let last_day_of_week_0 = dates::day_number(first_week) + 6;
    ((as_of_day - last_day_of_week_0).div_euclid(7) + 1).clamp(0, HORIZON_WEEKS as i64) as usize
}

/// Assign every identified user to the week of their earliest event.
///
/// Sorted by registration week, then user id.
pub fn assign_cohorts(
    events: &[VisitEvent],
    week_start: WeekStart,
    cutoff: NaiveDate,
) -> Result<Vec<CohortAssignment>, ClvError> {
    let cutoff_week = dates::week_index(cutoff, week_start);
    let df = registrations(valid_events(events, week_start)?, cutoff_week).collect()?;

    let users = df.column("user_id")?.str()?;
    let weeks = df.column("registration_week")?.i64()?;

    let mut assignments: Vec<CohortAssignment> = users
        .into_iter()
        .zip(weeks)
        .filter_map(|(user, week)| {
            Some(CohortAssignment {
                registration_week: dates::week_from_index(week?, week_start),
                user_id: user?.to_string(),
            })
        })
        .collect();
    assignments.sort();
    Ok(assignments)
}

/// Build the cohort revenue table for weeks 0..=12.
pub fn cohort_revenue(events: &[VisitEvent], opts: &CohortOptions) -> Result<CohortTable, ClvError> {
    let week_start = opts.week_start;
    let cutoff_week = dates::week_index(opts.cutoff, week_start);
    let events_lf = valid_events(events, week_start)?;
    let regs = registrations(events_lf.clone(), cutoff_week);

    let sizes_df = regs
        .clone()
        .group_by([col("registration_week")])
        .agg([col("user_id").n_unique().cast(DataType::Int64).alias("cohort_size")])
        .collect()?;

    let buckets_df = events_lf
        .clone()
        .join(
            regs,
            [col("user_id")],
            [col("user_id")],
            JoinArgs::new(JoinType::Inner),
        )
        .with_column((col("event_week") - col("registration_week")).alias("week_offset"))
        .filter(col("week_offset").lt_eq(lit(MAX_WEEK_OFFSET)))
        .group_by([col("registration_week"), col("week_offset")])
        .agg([col("revenue").sum().alias("revenue")])
        .collect()?;

    let last_day_df = events_lf
        .select([col("event_day").max().alias("last_day")])
        .collect()?;

    // registration week index -> cohort size
    let mut cohort_sizes: BTreeMap<i64, usize> = BTreeMap::new();
    let weeks = sizes_df.column("registration_week")?.i64()?;
    let counts = sizes_df.column("cohort_size")?.i64()?;
    for (week, count) in weeks.into_iter().zip(counts) {
        if let (Some(week), Some(count)) = (week, count) {
            cohort_sizes.insert(week, count as usize);
        }
    }

    if cohort_sizes.is_empty() {
        return Err(ClvError::NoData(format!(
            "no users registered on or before {}",
            opts.cutoff
        )));
    }

    let as_of = match opts.as_of {
        Some(date) => date,
        None => last_day_df
            .column("last_day")?
            .i64()?
            .get(0)
            .map(dates::from_day_number)
            .ok_or_else(|| ClvError::NoData("no event dates".to_string()))?,
    };
    let as_of_day = dates::day_number(as_of);

    let row_of: BTreeMap<i64, usize> = cohort_sizes
        .keys()
        .enumerate()
        .map(|(row, &week)| (week, row))
        .collect();

    let n = cohort_sizes.len();
    let mut revenue = Array2::<f64>::zeros((n, HORIZON_WEEKS));
    let reg_weeks = buckets_df.column("registration_week")?.i64()?;
    let offsets = buckets_df.column("week_offset")?.i64()?;
    let sums = buckets_df.column("revenue")?.f64()?;
    for ((week, offset), sum) in reg_weeks.into_iter().zip(offsets).zip(sums) {
        let (Some(week), Some(offset)) = (week, offset) else {
            continue;
        };
        if let Some(&row) = row_of.get(&week) {
            revenue[[row, offset as usize]] += sum.unwrap_or(0.0);
        }
    }

    let mut average = revenue.clone();
    for (mut row, size) in average.rows_mut().into_iter().zip(cohort_sizes.values()) {
        row /= *size as f64;
    }

    let cohorts: Vec<NaiveDate> = cohort_sizes
        .keys()
        .map(|&week| dates::week_from_index(week, week_start))
        .collect();
    let observed_weeks: Vec<usize> = cohorts
        .iter()
        .map(|&first| complete_weeks(first, as_of_day))
        .collect();
    let sizes: Vec<usize> = cohort_sizes.into_values().collect();

    tracing::info!(
        cohorts = n,
        users = sizes.iter().sum::<usize>(),
        %as_of,
        "built cohort revenue table"
    );

    Ok(CohortTable {
        week_start,
        as_of,
        cohorts,
        sizes,
        observed_weeks,
        revenue,
        average,
    })
}

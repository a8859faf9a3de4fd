//! Command-line interface definitions and argument parsing

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::cohort::CohortOptions;
use crate::dates::WeekStart;
use crate::error::ClvError;
use crate::projection::ProjectionStrategy;
use crate::quantile::QuantileMethod;
use crate::rfm::AnalysisWindow;
use crate::settings::Settings;

/// Customer lifetime value analysis: RFM segmentation and weekly cohort revenue
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional TOML settings file; command-line values take precedence
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Score and segment customers from transaction line items
    Rfm(RfmArgs),
    /// Build weekly cohort revenue tables from visit/purchase events
    Cohort(CohortArgs),
}

#[derive(Args, Debug)]
pub struct RfmArgs {
    /// Transactions CSV (Online Retail layout)
    #[arg(short, long)]
    pub input: PathBuf,

    /// First invoice date included (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last invoice date included (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Percentile estimation method for the quartile thresholds
    #[arg(long, value_enum)]
    pub quantiles: Option<QuantileMethod>,

    /// Directory for the output tables
    #[arg(short, long)]
    pub out_dir: Option<PathBuf>,

    /// Score one hypothetical customer against this run's thresholds
    /// Example: --score "5,1,1000.0" for Recency=5 days, Frequency=1, Monetary=1000.0
    #[arg(short, long)]
    pub score: Option<String>,
}

#[derive(Args, Debug)]
pub struct CohortArgs {
    /// Events CSV with user_id, event_timestamp, purchase_revenue
    #[arg(short, long)]
    pub input: PathBuf,

    /// Latest registration date admitted into a cohort (YYYY-MM-DD)
    #[arg(long)]
    pub cutoff: Option<NaiveDate>,

    /// First day of the reporting week
    #[arg(long, value_enum)]
    pub week_start: Option<WeekStart>,

    /// Growth ratio carried forward when projecting to week 12
    #[arg(long, value_enum)]
    pub projection: Option<ProjectionStrategy>,

    /// Last date with complete data; defaults to the latest event
    #[arg(long)]
    pub as_of: Option<NaiveDate>,

    /// Directory for the output tables
    #[arg(short, long)]
    pub out_dir: Option<PathBuf>,
}

impl RfmArgs {
    pub fn window(&self, settings: &Settings) -> Result<AnalysisWindow, ClvError> {
        let start = self
            .start
            .or(settings.rfm.start_date)
            .unwrap_or(NaiveDate::MIN);
        let end = self.end.or(settings.rfm.end_date).unwrap_or(NaiveDate::MAX);
        AnalysisWindow::new(start, end)
    }

    pub fn quantile_method(&self, settings: &Settings) -> QuantileMethod {
        self.quantiles.unwrap_or(settings.rfm.quantile_method)
    }

    pub fn out_dir(&self, settings: &Settings) -> PathBuf {
        self.out_dir.clone().unwrap_or_else(|| settings.output.dir.clone())
    }

    /// Parse RFM values from the score string
    /// Expected format: "recency,frequency,monetary"
    pub fn parse_score_values(&self) -> Result<Option<(f64, f64, f64)>, ClvError> {
        let Some(ref raw) = self.score else {
            return Ok(None);
        };

        let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(ClvError::InvalidScore(
                "score values must be in format 'recency,frequency,monetary'".to_string(),
            ));
        }

        let parse = |name: &str, value: &str| -> Result<f64, ClvError> {
            let parsed: f64 = value
                .parse()
                .map_err(|_| ClvError::InvalidScore(format!("invalid {} value: {}", name, value)))?;
            if !parsed.is_finite() {
                return Err(ClvError::InvalidScore(format!("{} must be finite", name)));
            }
            Ok(parsed)
        };

        let recency = parse("recency", parts[0])?;
        let frequency = parse("frequency", parts[1])?;
        let monetary = parse("monetary", parts[2])?;
        if recency < 0.0 || frequency < 0.0 {
            return Err(ClvError::InvalidScore(
                "recency and frequency cannot be negative".to_string(),
            ));
        }

        Ok(Some((recency, frequency, monetary)))
    }
}

impl CohortArgs {
    pub fn options(&self, settings: &Settings) -> CohortOptions {
        CohortOptions {
            cutoff: self
                .cutoff
                .or(settings.cohort.cutoff_date)
                .unwrap_or(NaiveDate::MAX),
            week_start: self.week_start.unwrap_or(settings.cohort.week_start),
            as_of: self.as_of.or(settings.cohort.as_of),
        }
    }

    pub fn projection(&self, settings: &Settings) -> ProjectionStrategy {
        self.projection.unwrap_or(settings.cohort.projection)
    }

    pub fn out_dir(&self, settings: &Settings) -> PathBuf {
        self.out_dir.clone().unwrap_or_else(|| settings.output.dir.clone())
    }
}

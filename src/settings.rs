//! Run settings loaded from an optional TOML file
//!
//! Dates are quoted strings (`start_date = "2010-12-01"`). Any value can
//! also come from the environment, e.g. `CLVFORGE_COHORT__WEEK_START=monday`.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;

use crate::dates::WeekStart;
use crate::error::ClvError;
use crate::projection::ProjectionStrategy;
use crate::quantile::QuantileMethod;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rfm: RfmSettings,
    pub cohort: CohortSettings,
    pub output: OutputSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RfmSettings {
    /// First invoice date included; unbounded when absent
    pub start_date: Option<NaiveDate>,
    /// Last invoice date included; unbounded when absent
    pub end_date: Option<NaiveDate>,
    pub quantile_method: QuantileMethod,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CohortSettings {
    /// Latest registration date admitted into a cohort
    pub cutoff_date: Option<NaiveDate>,
    pub week_start: WeekStart,
    pub projection: ProjectionStrategy,
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub dir: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
        }
    }
}

/// Load settings from `path` (if any) layered under `CLVFORGE_*` variables.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ClvError> {
    let mut builder = ::config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(::config::File::from(path));
    }
    let settings = builder
        .add_source(
            ::config::Environment::with_prefix("CLVFORGE")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?
        .try_deserialize::<Settings>()?;

    tracing::debug!(?settings, "loaded settings");
    Ok(settings)
}

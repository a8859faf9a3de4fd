//! ClvForge: customer lifetime value analysis over e-commerce logs
//!
//! Two independent batch pipelines:
//! - RFM segmentation of transaction line items: per-customer recency,
//!   frequency and monetary values, quartile scores and segment labels.
//! - Weekly cohort revenue of visit/purchase events: average revenue per
//!   registered user for weeks 0..=12, cumulative curves and projections.

pub mod cli;
pub mod cohort;
pub mod data;
pub mod dates;
pub mod error;
pub mod logging;
pub mod projection;
pub mod quantile;
pub mod report;
pub mod rfm;
pub mod segment;
pub mod settings;

// Re-export public items for easier access
pub use cli::Cli;
pub use cohort::{assign_cohorts, cohort_revenue, CohortOptions, CohortTable};
pub use data::{load_events_file, load_transactions_file, TransactionEvent, VisitEvent};
pub use error::ClvError;
pub use projection::{cumulative, project, GrowthPolicy, Projection, ProjectionStrategy};
pub use quantile::{compute_thresholds, QuantileMethod, QuantileThresholds};
pub use rfm::{aggregate_customers, segment_customers, segment_summary, AnalysisWindow, RfmReport};
pub use segment::{segment_for, RfmScore, Segment};

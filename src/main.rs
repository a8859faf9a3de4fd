//! ClvForge: RFM segmentation and weekly cohort revenue from CSV exports
//!
//! This is the main entrypoint that orchestrates loading, aggregation,
//! scoring/projection and writing the output tables.

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use clvforge::cli::{CohortArgs, Command, RfmArgs};
use clvforge::settings::{self, Settings};
use clvforge::{cohort, data, logging, projection, report, rfm, segment, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    let settings = settings::load_settings(cli.config.as_deref())
        .context("failed to load settings")?;

    match &cli.command {
        Command::Rfm(args) => run_rfm(args, &settings),
        Command::Cohort(args) => run_cohort(args, &settings),
    }
}

/// Segment all customers and write the RFM tables
fn run_rfm(args: &RfmArgs, settings: &Settings) -> Result<()> {
    let start_time = Instant::now();
    let window = args.window(settings)?;
    let method = args.quantile_method(settings);
    // fail on a malformed --score before doing any work
    let score_values = args.parse_score_values()?;

    tracing::info!(input = %args.input.display(), ?method, "loading transactions");
    let events = data::load_transactions_file(&args.input)
        .with_context(|| format!("failed to load {}", args.input.display()))?;

    let rfm_report = rfm::segment_customers(&events, &window, method)?;
    let summary = rfm::segment_summary(&rfm_report.customers);

    let out_dir = args.out_dir(settings);
    let written = report::write_rfm_outputs(&out_dir, &rfm_report, &summary)
        .with_context(|| format!("failed to write tables to {}", out_dir.display()))?;

    report::print_rfm_summary(&rfm_report, &summary);

    if let Some((recency, frequency, monetary)) = score_values {
        let score = rfm::score_values(recency, frequency, monetary, &rfm_report.thresholds);
        println!("\n=== Score ===");
        println!(
            "Input RFM values: R={}, F={}, M={}",
            recency, frequency, monetary
        );
        println!(
            "✓ Scores: R={} F={} M={} ({}) -> {}",
            score.r,
            score.f,
            score.m,
            score.code(),
            segment::segment_for(&score)
        );
    }

    for path in &written {
        println!("Table saved to: {}", path.display());
    }
    tracing::info!(
        elapsed_secs = start_time.elapsed().as_secs_f64(),
        "rfm pipeline complete"
    );
    Ok(())
}

/// Build cohort revenue, cumulative and projection tables
fn run_cohort(args: &CohortArgs, settings: &Settings) -> Result<()> {
    let start_time = Instant::now();
    let opts = args.options(settings);
    let strategy = args.projection(settings);

    tracing::info!(
        input = %args.input.display(),
        cutoff = %opts.cutoff,
        week_start = ?opts.week_start,
        ?strategy,
        "loading events"
    );
    let events = data::load_events_file(&args.input)
        .with_context(|| format!("failed to load {}", args.input.display()))?;

    let table = cohort::cohort_revenue(&events, &opts)?;
    let cumulative = projection::cumulative(&table);
    let policy = strategy.policy();
    let projections = projection::project(&cumulative, policy.as_ref());

    let out_dir = args.out_dir(settings);
    let written = report::write_cohort_outputs(&out_dir, &table, &cumulative, &projections)
        .with_context(|| format!("failed to write tables to {}", out_dir.display()))?;

    report::print_cohort_summary(&table, &cumulative, &projections);

    for path in &written {
        println!("Table saved to: {}", path.display());
    }
    tracing::info!(
        elapsed_secs = start_time.elapsed().as_secs_f64(),
        "cohort pipeline complete"
    );
    Ok(())
}

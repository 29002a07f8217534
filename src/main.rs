//! StoreLens: e-commerce dashboard CLI
//!
//! This is the main entrypoint that orchestrates data loading, date
//! filtering, aggregation and report output.

use anyhow::Result;
use clap::Parser;
use std::time::Instant;
use storelens::{filter_by_date_range, init_dataset, Args, Dashboard};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    init_tracing(args.verbose);

    let start_time = Instant::now();

    // Step 1: load once; every later step works on the cached table
    let orders = init_dataset(&args.input)?;
    let bounds = orders
        .date_bounds()?
        .ok_or_else(|| anyhow::anyhow!("No orders found in {}", args.input))?;

    // Step 2: clamp the requested range and filter
    let range = args.parse_date_range(bounds)?;
    let view = filter_by_date_range(orders, range.start, range.end)?;
    tracing::info!(
        start = %range.start,
        end = %range.end,
        rows = view.len(),
        "applied date range"
    );

    // Step 3: aggregate and print
    let dashboard = Dashboard::build(range, &view)?;
    if args.json {
        println!("{}", dashboard.to_json()?);
    } else {
        print!("{}", dashboard);
    }

    tracing::debug!(
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "dashboard complete"
    );

    Ok(())
}

/// Initialise tracing from STORELENS_LOG, falling back to `warn` (or `debug` with --verbose)
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("STORELENS_LOG")
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

//! Command-line interface definitions and argument parsing

use chrono::NaiveDate;
use clap::Parser;

use crate::filter::DateRange;

/// E-commerce order dashboard: trends, category rankings, reviews and RFM segments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the order CSV file
    #[arg(short, long, default_value = "main_data.csv", env = "STORELENS_INPUT")]
    pub input: String,

    /// First purchase date to include (YYYY-MM-DD); defaults to the earliest order
    #[arg(short, long)]
    pub start: Option<String>,

    /// Last purchase date to include (YYYY-MM-DD); defaults to the latest order
    #[arg(short, long)]
    pub end: Option<String>,

    /// Print the dashboard as JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Resolve the requested range against the dataset's observed purchase dates.
    ///
    /// Missing bounds default to the observed ones and both ends are clamped
    /// into them.
    pub fn parse_date_range(&self, bounds: (NaiveDate, NaiveDate)) -> crate::Result<DateRange> {
        let start = match self.start.as_deref() {
            Some(raw) => parse_date(raw, "start")?,
            None => bounds.0,
        };
        let end = match self.end.as_deref() {
            Some(raw) => parse_date(raw, "end")?,
            None => bounds.1,
        };

        let range = DateRange::new(start, end).clamp_to(bounds);
        if range.start > range.end {
            anyhow::bail!(
                "Start date {} is after end date {}",
                range.start,
                range.end
            );
        }
        Ok(range)
    }
}

fn parse_date(raw: &str, which: &str) -> crate::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| anyhow::anyhow!("Invalid {} date: {} (expected YYYY-MM-DD)", which, raw))
}

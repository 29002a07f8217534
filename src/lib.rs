//! StoreLens: e-commerce order analytics
//!
//! Loads a pre-aggregated order table, filters it by purchase date and
//! derives the series behind a sales dashboard: monthly trends, category
//! and state rankings, review statistics and RFM (Recency, Frequency,
//! Monetary) customer segments.

pub mod aggregate;
pub mod cli;
pub mod data;
pub mod filter;
pub mod report;
pub mod rfm;

// Re-export public items for easier access
pub use cli::Args;
pub use data::{dataset, init_dataset, load_orders, DataError, OrderRecord, OrderTable};
pub use filter::{filter_by_date_range, DateRange};
pub use report::Dashboard;
pub use rfm::{assign_segment, compute_rfm, RfmError, RfmRecord, Segment};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;

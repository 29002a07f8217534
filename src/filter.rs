//! Inclusive date-range filtering on purchase date

use chrono::NaiveDate;
use polars::lazy::dsl::*;
use polars::prelude::*;
use serde::Serialize;

use crate::data::{OrderTable, PURCHASED_AT};

/// Inclusive `[start, end]` range of calendar dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Clamp both ends into the observed `(min, max)` purchase dates
    pub fn clamp_to(self, bounds: (NaiveDate, NaiveDate)) -> Self {
        let (min, max) = bounds;
        Self {
            start: self.start.clamp(min, max),
            end: self.end.clamp(min, max),
        }
    }
}

/// Rows whose purchase date falls inside `[start, end]`.
///
/// Time of day is ignored. The source table is left untouched, and a range
/// matching nothing (including `start > end`) yields an empty table.
pub fn filter_by_date_range(
    table: &OrderTable,
    start: NaiveDate,
    end: NaiveDate,
) -> crate::Result<OrderTable> {
    let purchase_date = col(PURCHASED_AT).dt().date();
    let frame = table
        .lazy()
        .filter(
            purchase_date
                .clone()
                .gt_eq(lit(start))
                .and(purchase_date.lt_eq(lit(end))),
        )
        .collect()?;

    tracing::debug!(
        %start,
        %end,
        kept = frame.height(),
        total = table.len(),
        "filtered orders by purchase date"
    );

    Ok(OrderTable::from_frame(frame))
}

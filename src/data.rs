//! Order table loading using Polars, plus the process-wide dataset cache

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::OnceCell;
use polars::prelude::*;
use thiserror::Error;

pub const ORDER_ID: &str = "order_id";
pub const CUSTOMER_ID: &str = "customer_unique_id";
pub const PURCHASED_AT: &str = "order_purchase_timestamp";
pub const DELIVERED_AT: &str = "order_delivered_customer_date";
pub const REVENUE: &str = "revenue";
pub const REVIEW_SCORE: &str = "review_score";
pub const DELIVERY_TIME: &str = "delivery_time";
pub const CATEGORY: &str = "product_category";
pub const STATE: &str = "customer_state";

/// Columns the source CSV must provide, in table order
pub const REQUIRED_COLUMNS: [&str; 9] = [
    ORDER_ID,
    CUSTOMER_ID,
    PURCHASED_AT,
    DELIVERED_AT,
    REVENUE,
    REVIEW_SCORE,
    DELIVERY_TIME,
    CATEGORY,
    STATE,
];

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

static DATASET: OnceCell<OrderTable> = OnceCell::new();

/// Failures while reading the source table. Row numbers are 1-based data rows.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("required column `{0}` is missing from the source table")]
    MissingColumn(String),

    #[error("row {row}: column `{column}` is empty")]
    MissingValue { column: &'static str, row: usize },

    #[error("row {row}: column `{column}` has unparseable timestamp {value:?}")]
    InvalidTimestamp {
        column: &'static str,
        row: usize,
        value: String,
    },

    #[error("row {row}: column `{column}` {reason}")]
    InvalidValue {
        column: &'static str,
        row: usize,
        reason: String,
    },

    #[error("row {row}: order {order_id} delivered before it was purchased")]
    DeliveredBeforePurchase { order_id: String, row: usize },

    #[error("dataset has not been initialised; call init_dataset first")]
    NotInitialised,
}

/// One order line, used to build tables in code and to read rows back out
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub order_id: String,
    pub customer_unique_id: String,
    pub purchased_at: NaiveDateTime,
    pub delivered_at: Option<NaiveDateTime>,
    /// Pre-derived delivery duration in days
    pub delivery_days: Option<f64>,
    /// 1-5 when the customer left a review
    pub review_score: Option<u8>,
    pub product_category: Option<String>,
    pub revenue: f64,
    pub customer_state: String,
}

/// Immutable order table backed by a typed `DataFrame`.
///
/// Every transform returns a new table; the wrapped frame is never mutated.
#[derive(Debug, Clone)]
pub struct OrderTable {
    frame: DataFrame,
}

impl Default for OrderTable {
    fn default() -> Self {
        Self {
            frame: DataFrame::empty_with_schema(&order_schema()),
        }
    }
}

impl OrderTable {
    /// Wrap a frame that already has the order schema
    pub(crate) fn from_frame(frame: DataFrame) -> Self {
        Self { frame }
    }

    pub fn from_records(records: &[OrderRecord]) -> crate::Result<Self> {
        let frame = DataFrame::new(vec![
            Series::new(
                ORDER_ID,
                records.iter().map(|r| r.order_id.as_str()).collect::<Vec<_>>(),
            ),
            Series::new(
                CUSTOMER_ID,
                records
                    .iter()
                    .map(|r| r.customer_unique_id.as_str())
                    .collect::<Vec<_>>(),
            ),
            datetime_series(PURCHASED_AT, records.iter().map(|r| Some(r.purchased_at)))?,
            datetime_series(DELIVERED_AT, records.iter().map(|r| r.delivered_at))?,
            Series::new(REVENUE, records.iter().map(|r| r.revenue).collect::<Vec<_>>()),
            Series::new(
                REVIEW_SCORE,
                records
                    .iter()
                    .map(|r| r.review_score.map(i64::from))
                    .collect::<Vec<_>>(),
            ),
            Series::new(
                DELIVERY_TIME,
                records.iter().map(|r| r.delivery_days).collect::<Vec<_>>(),
            ),
            Series::new(
                CATEGORY,
                records
                    .iter()
                    .map(|r| r.product_category.as_deref())
                    .collect::<Vec<_>>(),
            ),
            Series::new(
                STATE,
                records
                    .iter()
                    .map(|r| r.customer_state.as_str())
                    .collect::<Vec<_>>(),
            ),
        ])?;
        Ok(Self { frame })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn lazy(&self) -> LazyFrame {
        self.frame.clone().lazy()
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Earliest and latest purchase date, `None` for an empty table
    pub fn date_bounds(&self) -> crate::Result<Option<(NaiveDate, NaiveDate)>> {
        let millis = self.frame.column(PURCHASED_AT)?.cast(&DataType::Int64)?;
        let millis = millis.i64()?;
        let bounds = match (millis.min(), millis.max()) {
            (Some(min), Some(max)) => from_millis(min).zip(from_millis(max)),
            _ => None,
        };
        Ok(bounds.map(|(min, max)| (min.date(), max.date())))
    }

    /// Latest purchase timestamp, `None` for an empty table
    pub fn latest_purchase(&self) -> crate::Result<Option<NaiveDateTime>> {
        let millis = self.frame.column(PURCHASED_AT)?.cast(&DataType::Int64)?;
        Ok(millis.i64()?.max().and_then(from_millis))
    }

    /// Read every row back out as an `OrderRecord`
    pub fn records(&self) -> crate::Result<Vec<OrderRecord>> {
        let df = &self.frame;
        let order_ids = text_values(df, ORDER_ID)?;
        let customers = text_values(df, CUSTOMER_ID)?;
        let purchased = datetime_values(df, PURCHASED_AT)?;
        let delivered = datetime_values(df, DELIVERED_AT)?;
        let revenue = float_values(df, REVENUE)?;
        let reviews = df.column(REVIEW_SCORE)?.cast(&DataType::Int64)?;
        let reviews: Vec<Option<i64>> = reviews.i64()?.into_iter().collect();
        let delivery = float_values(df, DELIVERY_TIME)?;
        let categories = df.column(CATEGORY)?.str()?.clone();
        let states = text_values(df, STATE)?;

        let records = (0..df.height())
            .map(|i| OrderRecord {
                order_id: order_ids[i].clone(),
                customer_unique_id: customers[i].clone(),
                purchased_at: purchased[i].unwrap_or_default(),
                delivered_at: delivered[i],
                delivery_days: delivery[i],
                review_score: reviews[i].and_then(|score| u8::try_from(score).ok()),
                product_category: categories.get(i).map(str::to_string),
                revenue: revenue[i].unwrap_or_default(),
                customer_state: states[i].clone(),
            })
            .collect();
        Ok(records)
    }
}

/// Load the order CSV into a typed order table
///
/// Every column is read as text first so no value can trip polars' type
/// inference; each required column is then parsed and checked explicitly.
///
/// # Arguments
/// * `file_path` - Path to the CSV file
///
/// # Returns
/// * `OrderTable` with one row per CSV row, or a `DataError` naming the
///   offending column/row
pub fn load_orders(file_path: impl AsRef<Path>) -> crate::Result<OrderTable> {
    let path = file_path.as_ref();

    let raw = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    for name in REQUIRED_COLUMNS {
        if raw.column(name).is_err() {
            return Err(DataError::MissingColumn(name.to_string()).into());
        }
    }
    let mut frame = raw.select(REQUIRED_COLUMNS)?;

    for name in [ORDER_ID, CUSTOMER_ID, STATE] {
        ensure_present(&frame, name)?;
    }

    let purchased = parse_timestamps(&frame, PURCHASED_AT)?;
    let delivered = parse_timestamps(&frame, DELIVERED_AT)?;
    let order_ids = frame.column(ORDER_ID)?.str()?;
    for (i, (bought, received)) in purchased.iter().zip(&delivered).enumerate() {
        let row = i + 1;
        let Some(bought) = bought else {
            return Err(DataError::MissingValue {
                column: PURCHASED_AT,
                row,
            }
            .into());
        };
        if matches!(received, Some(at) if at < bought) {
            let order_id = order_ids.get(i).unwrap_or_default().to_string();
            return Err(DataError::DeliveredBeforePurchase { order_id, row }.into());
        }
    }

    let revenue = parse_floats(&frame, REVENUE)?;
    for (i, value) in revenue.iter().enumerate() {
        let row = i + 1;
        match value {
            None => {
                return Err(DataError::MissingValue {
                    column: REVENUE,
                    row,
                }
                .into())
            }
            Some(v) if !v.is_finite() || *v < 0.0 => {
                return Err(DataError::InvalidValue {
                    column: REVENUE,
                    row,
                    reason: format!("must be a non-negative number, got {v}"),
                }
                .into())
            }
            Some(_) => {}
        }
    }

    let review_scores = parse_floats(&frame, REVIEW_SCORE)?
        .into_iter()
        .enumerate()
        .map(|(i, score)| score.map(|s| review_score(s, i + 1)).transpose())
        .collect::<Result<Vec<_>, _>>()?;

    let delivery_time: Vec<Option<f64>> = parse_floats(&frame, DELIVERY_TIME)?
        .into_iter()
        .map(|d| d.filter(|d| d.is_finite()))
        .collect();

    frame.with_column(datetime_series(PURCHASED_AT, purchased.into_iter())?)?;
    frame.with_column(datetime_series(DELIVERED_AT, delivered.into_iter())?)?;
    frame.with_column(Series::new(REVENUE, revenue))?;
    frame.with_column(Series::new(REVIEW_SCORE, review_scores))?;
    frame.with_column(Series::new(DELIVERY_TIME, delivery_time))?;

    tracing::info!(rows = frame.height(), path = %path.display(), "loaded order table");

    Ok(OrderTable::from_frame(frame))
}

/// Load the dataset into the process-wide cache on first call.
///
/// Later calls return the cached table without touching the file again,
/// whatever path they are given.
pub fn init_dataset(file_path: impl AsRef<Path>) -> crate::Result<&'static OrderTable> {
    DATASET.get_or_try_init(|| load_orders(file_path))
}

/// The cached dataset, once `init_dataset` has succeeded
pub fn dataset() -> crate::Result<&'static OrderTable> {
    DATASET
        .get()
        .ok_or_else(|| DataError::NotInitialised.into())
}

/// Parse a purchase/delivery timestamp. Bare dates are taken as midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn order_schema() -> Schema {
    Schema::from_iter([
        Field::new(ORDER_ID, DataType::String),
        Field::new(CUSTOMER_ID, DataType::String),
        Field::new(PURCHASED_AT, DataType::Datetime(TimeUnit::Milliseconds, None)),
        Field::new(DELIVERED_AT, DataType::Datetime(TimeUnit::Milliseconds, None)),
        Field::new(REVENUE, DataType::Float64),
        Field::new(REVIEW_SCORE, DataType::Int64),
        Field::new(DELIVERY_TIME, DataType::Float64),
        Field::new(CATEGORY, DataType::String),
        Field::new(STATE, DataType::String),
    ])
}

fn review_score(score: f64, row: usize) -> Result<i64, DataError> {
    if score.fract() != 0.0 || !(1.0..=5.0).contains(&score) {
        return Err(DataError::InvalidValue {
            column: REVIEW_SCORE,
            row,
            reason: format!("must be a whole number from 1 to 5, got {score}"),
        });
    }
    Ok(score as i64)
}

fn is_blank(cell: Option<&str>) -> bool {
    cell.map_or(true, |c| c.trim().is_empty())
}

fn ensure_present(frame: &DataFrame, name: &'static str) -> crate::Result<()> {
    let cells = frame.column(name)?.str()?;
    if let Some(i) = cells.into_iter().position(is_blank) {
        return Err(DataError::MissingValue {
            column: name,
            row: i + 1,
        }
        .into());
    }
    Ok(())
}

fn parse_timestamps(
    frame: &DataFrame,
    name: &'static str,
) -> crate::Result<Vec<Option<NaiveDateTime>>> {
    let cells = frame.column(name)?.str()?;
    let mut parsed = Vec::with_capacity(cells.len());
    for (i, cell) in cells.into_iter().enumerate() {
        let value = match cell {
            c if is_blank(c) => None,
            Some(raw) => Some(parse_timestamp(raw).ok_or_else(|| DataError::InvalidTimestamp {
                column: name,
                row: i + 1,
                value: raw.to_string(),
            })?),
            None => None,
        };
        parsed.push(value);
    }
    Ok(parsed)
}

/// Cast a text column to `Float64`, rejecting any non-blank cell that does not parse
fn parse_floats(frame: &DataFrame, name: &'static str) -> crate::Result<Vec<Option<f64>>> {
    let text = frame.column(name)?;
    let numbers = text.cast(&DataType::Float64)?;
    let cells = text.str()?;

    let values: Vec<Option<f64>> = numbers.f64()?.into_iter().collect();
    for (i, (cell, value)) in cells.into_iter().zip(&values).enumerate() {
        if let (Some(raw), None) = (cell, value) {
            if !raw.trim().is_empty() {
                return Err(DataError::InvalidValue {
                    column: name,
                    row: i + 1,
                    reason: format!("is not a number: {raw:?}"),
                }
                .into());
            }
        }
    }
    Ok(values)
}

fn datetime_series(
    name: &str,
    values: impl Iterator<Item = Option<NaiveDateTime>>,
) -> PolarsResult<Series> {
    let millis: Vec<Option<i64>> = values
        .map(|v| v.map(|ts| ts.and_utc().timestamp_millis()))
        .collect();
    Series::new(name, millis).cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
}

fn from_millis(millis: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}

/// Text column values; nulls become empty strings
pub(crate) fn text_values(df: &DataFrame, name: &str) -> crate::Result<Vec<String>> {
    Ok(df
        .column(name)?
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect())
}

/// Integer column values (counts, scores, day spans); nulls become zero
pub(crate) fn int_values(df: &DataFrame, name: &str) -> crate::Result<Vec<i64>> {
    let series = df.column(name)?.cast(&DataType::Int64)?;
    Ok(series
        .i64()?
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect())
}

pub(crate) fn float_values(df: &DataFrame, name: &str) -> crate::Result<Vec<Option<f64>>> {
    let series = df.column(name)?.cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}

fn datetime_values(df: &DataFrame, name: &str) -> crate::Result<Vec<Option<NaiveDateTime>>> {
    let series = df.column(name)?.cast(&DataType::Int64)?;
    Ok(series
        .i64()?
        .into_iter()
        .map(|v| v.and_then(from_millis))
        .collect())
}

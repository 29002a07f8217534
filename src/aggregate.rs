//! Chart rollups over a filtered order view
//!
//! Every function here is a pure group-and-summarise pass. An empty view
//! produces empty results so the presentation layer can show a zero state.

use polars::lazy::dsl::*;
use polars::prelude::*;
use serde::Serialize;

use crate::data::{
    float_values, int_values, text_values, OrderTable, CATEGORY, CUSTOMER_ID, DELIVERY_TIME,
    ORDER_ID, PURCHASED_AT, REVENUE, REVIEW_SCORE, STATE,
};

/// Number of rows kept by the ranked rollups
pub const TOP_N: usize = 10;

/// Headline numbers for the dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyMetrics {
    pub total_orders: usize,
    pub total_customers: usize,
    pub total_revenue: f64,
    pub avg_review_score: Option<f64>,
    pub avg_delivery_days: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTrend {
    /// `YYYY-MM`
    pub month: String,
    pub total_orders: usize,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryOrders {
    pub category: String,
    pub total_orders: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryRevenue {
    pub category: String,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewCount {
    pub score: u8,
    pub total_orders: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryByReview {
    pub score: u8,
    pub avg_delivery_days: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSummary {
    pub state: String,
    pub total_customers: usize,
    pub total_revenue: f64,
}

pub fn key_metrics(view: &OrderTable) -> crate::Result<KeyMetrics> {
    let df = view
        .lazy()
        .select([
            col(ORDER_ID).n_unique().alias("total_orders"),
            col(CUSTOMER_ID).n_unique().alias("total_customers"),
            col(REVENUE).sum().alias("total_revenue"),
            col(REVIEW_SCORE)
                .cast(DataType::Float64)
                .mean()
                .alias("avg_review_score"),
            col(DELIVERY_TIME).mean().alias("avg_delivery_days"),
        ])
        .collect()?;

    Ok(KeyMetrics {
        total_orders: first(int_values(&df, "total_orders")?) as usize,
        total_customers: first(int_values(&df, "total_customers")?) as usize,
        total_revenue: first(float_values(&df, "total_revenue")?).unwrap_or_default(),
        avg_review_score: first(float_values(&df, "avg_review_score")?),
        avg_delivery_days: first(float_values(&df, "avg_delivery_days")?),
    })
}

/// Distinct orders and revenue per calendar month, oldest first
pub fn monthly_trend(view: &OrderTable) -> crate::Result<Vec<MonthlyTrend>> {
    let df = view
        .lazy()
        .with_column(col(PURCHASED_AT).dt().strftime("%Y-%m").alias("month"))
        .group_by([col("month")])
        .agg([
            col(ORDER_ID).n_unique().alias("total_orders"),
            col(REVENUE).sum().alias("total_revenue"),
        ])
        .sort(["month"], Default::default())
        .collect()?;

    let months = text_values(&df, "month")?;
    let orders = int_values(&df, "total_orders")?;
    let revenue = float_values(&df, "total_revenue")?;

    Ok(months
        .into_iter()
        .zip(orders)
        .zip(revenue)
        .map(|((month, total_orders), total_revenue)| MonthlyTrend {
            month,
            total_orders: total_orders as usize,
            total_revenue: total_revenue.unwrap_or_default(),
        })
        .collect())
}

/// Categories with the most distinct orders. Ties keep category-name order.
pub fn top_categories_by_orders(view: &OrderTable) -> crate::Result<Vec<CategoryOrders>> {
    let df = top_n(
        view.lazy()
            .filter(col(CATEGORY).is_not_null())
            .group_by([col(CATEGORY)])
            .agg([col(ORDER_ID).n_unique().alias("total_orders")]),
        "total_orders",
        CATEGORY,
    )
    .collect()?;

    let categories = text_values(&df, CATEGORY)?;
    let orders = int_values(&df, "total_orders")?;

    Ok(categories
        .into_iter()
        .zip(orders)
        .map(|(category, total_orders)| CategoryOrders {
            category,
            total_orders: total_orders as usize,
        })
        .collect())
}

/// Categories with the highest revenue. Ties keep category-name order.
pub fn top_categories_by_revenue(view: &OrderTable) -> crate::Result<Vec<CategoryRevenue>> {
    let df = top_n(
        view.lazy()
            .filter(col(CATEGORY).is_not_null())
            .group_by([col(CATEGORY)])
            .agg([col(REVENUE).sum().alias("total_revenue")]),
        "total_revenue",
        CATEGORY,
    )
    .collect()?;

    let categories = text_values(&df, CATEGORY)?;
    let revenue = float_values(&df, "total_revenue")?;

    Ok(categories
        .into_iter()
        .zip(revenue)
        .map(|(category, total_revenue)| CategoryRevenue {
            category,
            total_revenue: total_revenue.unwrap_or_default(),
        })
        .collect())
}

/// Distinct orders per review score.
///
/// Always reports all five scores (zero when unseen) unless the view is empty.
pub fn review_distribution(view: &OrderTable) -> crate::Result<Vec<ReviewCount>> {
    if view.is_empty() {
        return Ok(Vec::new());
    }

    let df = view
        .lazy()
        .filter(col(REVIEW_SCORE).is_not_null())
        .group_by([col(REVIEW_SCORE)])
        .agg([col(ORDER_ID).n_unique().alias("total_orders")])
        .collect()?;

    let mut counts = [0usize; 5];
    for (score, orders) in int_values(&df, REVIEW_SCORE)?
        .into_iter()
        .zip(int_values(&df, "total_orders")?)
    {
        let Some(slot) = usize::try_from(score)
            .ok()
            .and_then(|s| s.checked_sub(1))
            .and_then(|idx| counts.get_mut(idx))
        else {
            continue;
        };
        *slot = orders as usize;
    }

    Ok((1u8..=5)
        .zip(counts)
        .map(|(score, total_orders)| ReviewCount {
            score,
            total_orders,
        })
        .collect())
}

/// Mean delivery days per review score, over rows that have both values
pub fn delivery_by_review(view: &OrderTable) -> crate::Result<Vec<DeliveryByReview>> {
    let df = view
        .lazy()
        .filter(
            col(REVIEW_SCORE)
                .is_not_null()
                .and(col(DELIVERY_TIME).is_not_null()),
        )
        .group_by([col(REVIEW_SCORE)])
        .agg([col(DELIVERY_TIME).mean().alias("avg_delivery_days")])
        .sort([REVIEW_SCORE], Default::default())
        .collect()?;

    let scores = int_values(&df, REVIEW_SCORE)?;
    let days = float_values(&df, "avg_delivery_days")?;

    Ok(scores
        .into_iter()
        .zip(days)
        .filter_map(|(score, avg)| {
            Some(DeliveryByReview {
                score: u8::try_from(score).ok()?,
                avg_delivery_days: avg?,
            })
        })
        .collect())
}

/// States with the most distinct customers. Ties keep state-code order.
pub fn top_states(view: &OrderTable) -> crate::Result<Vec<StateSummary>> {
    let df = top_n(
        view.lazy().group_by([col(STATE)]).agg([
            col(CUSTOMER_ID).n_unique().alias("total_customers"),
            col(REVENUE).sum().alias("total_revenue"),
        ]),
        "total_customers",
        STATE,
    )
    .collect()?;

    let states = text_values(&df, STATE)?;
    let customers = int_values(&df, "total_customers")?;
    let revenue = float_values(&df, "total_revenue")?;

    Ok(states
        .into_iter()
        .zip(customers)
        .zip(revenue)
        .map(|((state, total_customers), total_revenue)| StateSummary {
            state,
            total_customers: total_customers as usize,
            total_revenue: total_revenue.unwrap_or_default(),
        })
        .collect())
}

/// Largest `metric` first, ties broken by `key` ascending, cut to `TOP_N`
fn top_n(grouped: LazyFrame, metric: &str, key: &str) -> LazyFrame {
    grouped
        .sort(
            [metric, key],
            SortMultipleOptions::new().with_order_descending_multi([true, false]),
        )
        .limit(TOP_N as IdxSize)
}

fn first<T: Default>(values: Vec<T>) -> T {
    values.into_iter().next().unwrap_or_default()
}

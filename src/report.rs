//! Dashboard snapshot: every metric and chart series for one date range

use std::fmt;

use serde::Serialize;

use crate::aggregate::{
    delivery_by_review, key_metrics, monthly_trend, review_distribution,
    top_categories_by_orders, top_categories_by_revenue, top_states, CategoryOrders,
    CategoryRevenue, DeliveryByReview, KeyMetrics, MonthlyTrend, ReviewCount, StateSummary,
};
use crate::data::OrderTable;
use crate::filter::DateRange;
use crate::rfm::{compute_rfm, segment_distribution, RfmSummary, SegmentShare};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RfmOverview {
    pub summary: RfmSummary,
    pub segments: Vec<SegmentShare>,
}

/// Everything the presentation layer renders for one filtered view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub range: DateRange,
    pub metrics: KeyMetrics,
    pub monthly: Vec<MonthlyTrend>,
    pub top_categories_by_orders: Vec<CategoryOrders>,
    pub top_categories_by_revenue: Vec<CategoryRevenue>,
    pub review_distribution: Vec<ReviewCount>,
    pub delivery_by_review: Vec<DeliveryByReview>,
    pub top_states: Vec<StateSummary>,
    /// `None` when the view is empty
    pub rfm: Option<RfmOverview>,
}

impl Dashboard {
    /// Recompute every series from `view`, which should already be filtered to `range`
    pub fn build(range: DateRange, view: &OrderTable) -> crate::Result<Self> {
        let rfm = if view.is_empty() {
            tracing::warn!(start = %range.start, end = %range.end, "no orders in range, skipping RFM");
            None
        } else {
            let records = compute_rfm(view)?;
            RfmSummary::from_records(&records).map(|summary| RfmOverview {
                summary,
                segments: segment_distribution(&records),
            })
        };

        Ok(Self {
            range,
            metrics: key_metrics(view)?,
            monthly: monthly_trend(view)?,
            top_categories_by_orders: top_categories_by_orders(view)?,
            top_categories_by_revenue: top_categories_by_revenue(view)?,
            review_distribution: review_distribution(view)?,
            delivery_by_review: delivery_by_review(view)?,
            top_states: top_states(view)?,
            rfm,
        })
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for Dashboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.metrics;
        writeln!(f, "=== E-Commerce Dashboard: {} to {} ===", self.range.start, self.range.end)?;
        writeln!(f, "Total orders:      {}", m.total_orders)?;
        writeln!(f, "Total customers:   {}", m.total_customers)?;
        writeln!(f, "Total revenue:     R$ {:.2}", m.total_revenue)?;
        match m.avg_review_score {
            Some(score) => writeln!(f, "Avg review score:  {:.2}", score)?,
            None => writeln!(f, "Avg review score:  -")?,
        }
        match m.avg_delivery_days {
            Some(days) => writeln!(f, "Avg delivery time: {:.1} days", days)?,
            None => writeln!(f, "Avg delivery time: -")?,
        }

        writeln!(f, "\n=== Monthly Orders & Revenue ===")?;
        for row in &self.monthly {
            writeln!(f, "  {} | {:>6} orders | R$ {:>12.2}", row.month, row.total_orders, row.total_revenue)?;
        }

        writeln!(f, "\n=== Top Categories by Orders ===")?;
        for row in &self.top_categories_by_orders {
            writeln!(f, "  {:<32} {:>6}", row.category, row.total_orders)?;
        }

        writeln!(f, "\n=== Top Categories by Revenue ===")?;
        for row in &self.top_categories_by_revenue {
            writeln!(f, "  {:<32} R$ {:>12.2}", row.category, row.total_revenue)?;
        }

        writeln!(f, "\n=== Review Score Distribution ===")?;
        for row in &self.review_distribution {
            writeln!(f, "  {} stars: {:>6} orders", row.score, row.total_orders)?;
        }

        writeln!(f, "\n=== Avg Delivery Time by Review Score ===")?;
        for row in &self.delivery_by_review {
            writeln!(f, "  {} stars: {:>5.1} days", row.score, row.avg_delivery_days)?;
        }

        writeln!(f, "\n=== RFM Segments ===")?;
        match &self.rfm {
            Some(rfm) => {
                writeln!(
                    f,
                    "  Avg recency {:.0} days | avg frequency {:.2} | avg monetary R$ {:.2}",
                    rfm.summary.avg_recency, rfm.summary.avg_frequency, rfm.summary.avg_monetary
                )?;
                for share in &rfm.segments {
                    writeln!(
                        f,
                        "  {:<20} {:>6} customers ({:.1}%)",
                        share.segment.label(),
                        share.customers,
                        share.share_pct
                    )?;
                }
            }
            None => writeln!(f, "  no customers in range")?,
        }

        writeln!(f, "\n=== Top States by Customers ===")?;
        for row in &self.top_states {
            writeln!(
                f,
                "  {:<4} {:>6} customers | R$ {:>12.2}",
                row.state, row.total_customers, row.total_revenue
            )?;
        }

        Ok(())
    }
}

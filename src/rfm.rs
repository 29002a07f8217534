//! RFM (Recency, Frequency, Monetary) scoring and rule-based segmentation

use std::fmt;

use chrono::Duration;
use polars::lazy::dsl::*;
use polars::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::data::{
    float_values, int_values, text_values, OrderTable, CUSTOMER_ID, ORDER_ID, PURCHASED_AT,
    REVENUE,
};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RfmError {
    #[error("cannot compute RFM on an empty order view")]
    EmptyInput,
}

/// Which end of the value range earns the top score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreDirection {
    /// Lowest values score 1, highest score 4 (monetary)
    Ascending,
    /// Lowest values score 4, highest score 1 (recency: smaller is better)
    Descending,
}

/// Customer segment derived from recency and frequency scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Segment {
    #[serde(rename = "Champions")]
    Champions,
    #[serde(rename = "Loyal Customers")]
    LoyalCustomers,
    #[serde(rename = "Potential Loyalists")]
    PotentialLoyalists,
    #[serde(rename = "At Risk")]
    AtRisk,
    #[serde(rename = "Need Attention")]
    NeedAttention,
    #[serde(rename = "Lost Customers")]
    LostCustomers,
}

impl Segment {
    /// Order in which segments are listed on the dashboard
    pub const DISPLAY_ORDER: [Segment; 6] = [
        Segment::Champions,
        Segment::LoyalCustomers,
        Segment::PotentialLoyalists,
        Segment::NeedAttention,
        Segment::AtRisk,
        Segment::LostCustomers,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Segment::Champions => "Champions",
            Segment::LoyalCustomers => "Loyal Customers",
            Segment::PotentialLoyalists => "Potential Loyalists",
            Segment::AtRisk => "At Risk",
            Segment::NeedAttention => "Need Attention",
            Segment::LostCustomers => "Lost Customers",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One segmentation rule: matches on `(r_score, f_score)`
#[derive(Debug, Clone, Copy)]
pub struct SegmentRule {
    pub segment: Segment,
    pub applies: fn(u8, u8) -> bool,
}

/// Checked top to bottom; the first matching rule wins.
pub const SEGMENT_RULES: [SegmentRule; 6] = [
    SegmentRule {
        segment: Segment::Champions,
        applies: |r, f| r >= 3 && f >= 3,
    },
    SegmentRule {
        segment: Segment::LoyalCustomers,
        applies: |r, f| r >= 3 && f >= 2,
    },
    SegmentRule {
        segment: Segment::PotentialLoyalists,
        applies: |r, _| r >= 3,
    },
    SegmentRule {
        segment: Segment::AtRisk,
        applies: |r, f| r >= 2 && f >= 2,
    },
    SegmentRule {
        segment: Segment::NeedAttention,
        applies: |r, _| r >= 2,
    },
    SegmentRule {
        segment: Segment::LostCustomers,
        applies: |_, _| true,
    },
];

/// Per-customer RFM metrics and scores
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RfmRecord {
    pub customer_unique_id: String,
    /// Whole days between the reference date and the latest purchase
    pub recency: i64,
    /// Distinct orders
    pub frequency: usize,
    /// Total revenue
    pub monetary: f64,
    pub r_score: u8,
    pub f_score: u8,
    /// Computed for reporting only; segmentation ignores it
    pub m_score: u8,
    pub segment: Segment,
}

/// Average RFM metrics across all scored customers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RfmSummary {
    pub customers: usize,
    pub avg_recency: f64,
    pub avg_frequency: f64,
    pub avg_monetary: f64,
}

impl RfmSummary {
    pub fn from_records(records: &[RfmRecord]) -> Option<Self> {
        if records.is_empty() {
            return None;
        }
        let n = records.len() as f64;
        Some(Self {
            customers: records.len(),
            avg_recency: records.iter().map(|r| r.recency as f64).sum::<f64>() / n,
            avg_frequency: records.iter().map(|r| r.frequency as f64).sum::<f64>() / n,
            avg_monetary: records.iter().map(|r| r.monetary).sum::<f64>() / n,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentShare {
    pub segment: Segment,
    pub customers: usize,
    /// Percentage of all scored customers
    pub share_pct: f64,
}

/// Compute RFM metrics, scores and segment for every customer in `view`.
///
/// The reference date is the latest purchase in `view` plus one day.
/// Records come back ordered by customer id.
///
/// # Errors
/// * `RfmError::EmptyInput` if `view` has no rows; callers should skip RFM
///   entirely in that case
pub fn compute_rfm(view: &OrderTable) -> crate::Result<Vec<RfmRecord>> {
    let latest = view.latest_purchase()?.ok_or(RfmError::EmptyInput)?;
    let reference = latest + Duration::days(1);
    let reference_ms = reference.and_utc().timestamp_millis();

    // Timestamps are stored as epoch milliseconds
    let elapsed_ms = lit(reference_ms) - col("last_purchase").cast(DataType::Int64);
    let customers = view
        .lazy()
        .group_by([col(CUSTOMER_ID)])
        .agg([
            col(PURCHASED_AT).max().alias("last_purchase"),
            col(ORDER_ID).n_unique().alias("frequency"),
            col(REVENUE).sum().alias("monetary"),
        ])
        .with_column(
            (elapsed_ms.cast(DataType::Float64) / lit(MILLIS_PER_DAY))
                .cast(DataType::Int64)
                .alias("recency"),
        )
        .sort([CUSTOMER_ID], Default::default())
        .collect()?;

    let r_scores = quartile_scores(customers.column("recency")?, ScoreDirection::Descending)?;
    let m_scores = quartile_scores(customers.column("monetary")?, ScoreDirection::Ascending)?;

    let ids = text_values(&customers, CUSTOMER_ID)?;
    let recency = int_values(&customers, "recency")?;
    let frequency = int_values(&customers, "frequency")?;
    let monetary = float_values(&customers, "monetary")?;

    let records: Vec<RfmRecord> = ids
        .into_iter()
        .enumerate()
        .map(|(i, customer_unique_id)| {
            let frequency = frequency[i] as usize;
            let r_score = r_scores[i];
            let f_score = frequency_score(frequency);
            RfmRecord {
                customer_unique_id,
                recency: recency[i],
                frequency,
                monetary: monetary[i].unwrap_or_default(),
                r_score,
                f_score,
                m_score: m_scores[i],
                segment: assign_segment(r_score, f_score),
            }
        })
        .collect();

    tracing::debug!(
        customers = records.len(),
        reference = %reference,
        "computed RFM scores"
    );

    Ok(records)
}

/// Quartile cut points (25th, 50th, 75th percentile) of `values`,
/// linearly interpolated between neighbouring ranks
pub fn quartile_cut_points(values: &Series) -> crate::Result<Option<[f64; 3]>> {
    let values = values.cast(&DataType::Float64)?;
    let values = values.f64()?;

    let mut cuts = [0.0; 3];
    for (cut, q) in cuts.iter_mut().zip([0.25, 0.5, 0.75]) {
        match values.quantile(q, QuantileInterpolOptions::Linear)? {
            Some(value) => *cut = value,
            None => return Ok(None),
        }
    }
    Ok(Some(cuts))
}

/// Score each value 1-4 by the quartile it falls in.
///
/// Buckets are closed on the right, so a value equal to a cut point lands in
/// the lower bucket. When cut points coincide (few distinct values) the empty
/// buckets simply disappear and the remaining ones keep their scores. A single
/// value therefore scores 1 ascending, 4 descending.
pub fn quartile_scores(values: &Series, direction: ScoreDirection) -> crate::Result<Vec<u8>> {
    let Some(cuts) = quartile_cut_points(values)? else {
        return Ok(Vec::new());
    };

    let value = col("value");
    let bucket = cuts.iter().fold(lit(1i32), |score, &cut| {
        score + value.clone().gt(lit(cut)).cast(DataType::Int32)
    });
    let score = match direction {
        ScoreDirection::Ascending => bucket,
        ScoreDirection::Descending => lit(5i32) - bucket,
    };

    let scored = DataFrame::new(vec![values.cast(&DataType::Float64)?.with_name("value")])?
        .lazy()
        .select([score.alias("score")])
        .collect()?;

    Ok(int_values(&scored, "score")?
        .into_iter()
        .map(|s| s as u8)
        .collect())
}

/// Fixed thresholds: more than 3 orders scores 4, down to 1 for a single order
pub fn frequency_score(frequency: usize) -> u8 {
    match frequency {
        f if f > 3 => 4,
        3 => 3,
        2 => 2,
        _ => 1,
    }
}

/// First rule in `SEGMENT_RULES` matching `(r_score, f_score)`
pub fn assign_segment(r_score: u8, f_score: u8) -> Segment {
    SEGMENT_RULES
        .iter()
        .find(|rule| (rule.applies)(r_score, f_score))
        .map_or(Segment::LostCustomers, |rule| rule.segment)
}

/// Customers per segment in display order, omitting empty segments
pub fn segment_distribution(records: &[RfmRecord]) -> Vec<SegmentShare> {
    let total = records.len();
    Segment::DISPLAY_ORDER
        .iter()
        .filter_map(|&segment| {
            let customers = records.iter().filter(|r| r.segment == segment).count();
            (customers > 0).then(|| SegmentShare {
                segment,
                customers,
                share_pct: customers as f64 / total as f64 * 100.0,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::OrderRecord;
    use chrono::NaiveDate;

    fn order(order_id: &str, customer: &str, (y, m, d): (i32, u32, u32), revenue: f64) -> OrderRecord {
        OrderRecord {
            order_id: order_id.to_string(),
            customer_unique_id: customer.to_string(),
            purchased_at: NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(10, 30, 0)
                .unwrap(),
            delivered_at: None,
            delivery_days: None,
            review_score: None,
            product_category: None,
            revenue,
            customer_state: "SP".to_string(),
        }
    }

    fn find<'a>(records: &'a [RfmRecord], customer: &str) -> &'a RfmRecord {
        records
            .iter()
            .find(|r| r.customer_unique_id == customer)
            .unwrap()
    }

    #[test]
    fn test_segment_rules_precedence() {
        assert_eq!(assign_segment(4, 4), Segment::Champions);
        assert_eq!(assign_segment(3, 3), Segment::Champions);
        assert_eq!(assign_segment(3, 2), Segment::LoyalCustomers);
        assert_eq!(assign_segment(3, 1), Segment::PotentialLoyalists);
        assert_eq!(assign_segment(2, 4), Segment::AtRisk);
        assert_eq!(assign_segment(2, 1), Segment::NeedAttention);
        assert_eq!(assign_segment(1, 4), Segment::LostCustomers);
        assert_eq!(assign_segment(1, 1), Segment::LostCustomers);
    }

    #[test]
    fn test_frequency_score_thresholds() {
        let scores: Vec<_> = (0..=6).map(frequency_score).collect();
        assert_eq!(scores, vec![1, 1, 2, 3, 4, 4, 4]);
    }

    #[test]
    fn test_quartile_scores_distinct_values() {
        let values = [10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0];
        assert_eq!(
            quartile_scores(&Series::new("value", values), ScoreDirection::Ascending).unwrap(),
            vec![1, 1, 2, 2, 3, 3, 4, 4]
        );
        assert_eq!(
            quartile_scores(&Series::new("value", values), ScoreDirection::Descending).unwrap(),
            vec![4, 4, 3, 3, 2, 2, 1, 1]
        );
    }

    #[test]
    fn test_quartile_scores_value_on_cut_point_goes_low() {
        // Cut points are exactly 2, 3, 4
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(
            quartile_scores(&Series::new("value", values), ScoreDirection::Ascending).unwrap(),
            vec![1, 1, 2, 3, 4]
        );
    }

    #[test]
    fn test_quartile_scores_collapse_duplicate_cut_points() {
        let values = [5.0, 5.0, 5.0, 5.0, 5.0, 90.0];
        assert_eq!(
            quartile_scores(&Series::new("value", values), ScoreDirection::Ascending).unwrap(),
            vec![1, 1, 1, 1, 1, 4]
        );

        let constant = [7.0; 4];
        assert_eq!(
            quartile_scores(&Series::new("value", constant), ScoreDirection::Descending).unwrap(),
            vec![4, 4, 4, 4]
        );
        assert!(quartile_scores(&Series::new("value", Vec::<f64>::new()), ScoreDirection::Ascending)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_cut_points_interpolate_linearly() {
        let values = Series::new("value", [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(
            quartile_cut_points(&values).unwrap(),
            Some([2.25, 3.5, 4.75])
        );
        let empty = Series::new("value", Vec::<f64>::new());
        assert_eq!(quartile_cut_points(&empty).unwrap(), None);
    }

    #[test]
    fn test_quartile_scores_keep_input_order() {
        let values = [80.0, 10.0, 50.0, 30.0];
        assert_eq!(
            quartile_scores(&Series::new("value", values), ScoreDirection::Ascending).unwrap(),
            vec![4, 1, 3, 2]
        );
    }

    #[test]
    fn test_single_customer() {
        let view = OrderTable::from_records(&[
            order("o1", "c1", (2018, 5, 1), 20.0),
            order("o1", "c1", (2018, 5, 1), 5.0),
            order("o2", "c1", (2018, 5, 3), 30.0),
        ])
        .unwrap();

        let records = compute_rfm(&view).unwrap();
        assert_eq!(records.len(), 1);

        let only = &records[0];
        // Reference date is one day after the latest purchase
        assert_eq!(only.recency, 1);
        assert_eq!(only.frequency, 2);
        assert!((only.monetary - 55.0).abs() < 1e-9);
        assert_eq!(only.r_score, 4);
        assert_eq!(only.f_score, 2);
        assert_eq!(only.m_score, 1);
        assert_eq!(only.segment, Segment::LoyalCustomers);
    }

    #[test]
    fn test_recent_repeat_customer_outranks_old_one_off() {
        let view = OrderTable::from_records(&[
            order("a1", "A", (2018, 8, 1), 100.0),
            order("a2", "A", (2018, 8, 20), 150.0),
            order("b1", "B", (2017, 2, 14), 50.0),
        ])
        .unwrap();

        let records = compute_rfm(&view).unwrap();
        let a = find(&records, "A");
        let b = find(&records, "B");

        assert!(a.recency <= b.recency);
        assert!(a.frequency >= b.frequency);
        assert!(a.monetary >= b.monetary);
        assert!(a.r_score >= b.r_score);
        assert!(a.m_score >= b.m_score);
        assert_ne!(a.segment, Segment::LostCustomers);
        assert_eq!(b.segment, Segment::LostCustomers);
    }

    #[test]
    fn test_recency_counts_whole_days() {
        let mut late = order("o2", "c2", (2018, 1, 10), 1.0);
        late.purchased_at = NaiveDate::from_ymd_opt(2018, 1, 10)
            .unwrap()
            .and_hms_opt(23, 0, 0)
            .unwrap();
        let view = OrderTable::from_records(&[order("o1", "c1", (2018, 1, 8), 1.0), late]).unwrap();

        let records = compute_rfm(&view).unwrap();
        // Reference is 2018-01-11 23:00; c1 bought 2018-01-08 10:30
        assert_eq!(find(&records, "c1").recency, 3);
        assert_eq!(find(&records, "c2").recency, 1);
    }

    #[test]
    fn test_empty_view_is_rejected() {
        let err = compute_rfm(&OrderTable::default()).unwrap_err();
        assert_eq!(err.downcast_ref::<RfmError>(), Some(&RfmError::EmptyInput));
    }

    #[test]
    fn test_segment_distribution_order_and_share() {
        let view = OrderTable::from_records(&[
            order("a1", "A", (2018, 8, 1), 100.0),
            order("a2", "A", (2018, 8, 20), 150.0),
            order("b1", "B", (2017, 2, 14), 50.0),
        ])
        .unwrap();
        let records = compute_rfm(&view).unwrap();
        let shares = segment_distribution(&records);

        let segments: Vec<_> = shares.iter().map(|s| s.segment).collect();
        assert_eq!(segments, vec![Segment::LoyalCustomers, Segment::LostCustomers]);
        assert!((shares[0].share_pct - 50.0).abs() < 1e-9);
        assert_eq!(shares.iter().map(|s| s.customers).sum::<usize>(), 2);
    }

    #[test]
    fn test_rfm_summary() {
        let view = OrderTable::from_records(&[
            order("a1", "A", (2018, 8, 1), 100.0),
            order("a2", "A", (2018, 8, 20), 150.0),
            order("b1", "B", (2018, 8, 11), 50.0),
        ])
        .unwrap();
        let records = compute_rfm(&view).unwrap();
        let summary = RfmSummary::from_records(&records).unwrap();

        assert_eq!(summary.customers, 2);
        // A: 1 day, B: 10 days
        assert!((summary.avg_recency - 5.5).abs() < 1e-9);
        assert!((summary.avg_frequency - 1.5).abs() < 1e-9);
        assert!((summary.avg_monetary - 150.0).abs() < 1e-9);
        assert_eq!(RfmSummary::from_records(&[]), None);
    }

    #[test]
    fn test_segment_serializes_as_label() {
        let json = serde_json::to_string(&Segment::NeedAttention).unwrap();
        assert_eq!(json, "\"Need Attention\"");
        assert_eq!(Segment::AtRisk.to_string(), "At Risk");
    }
}

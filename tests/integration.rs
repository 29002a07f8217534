//! Integration tests for StoreLens

use chrono::NaiveDate;
use std::io::Write;
use storelens::aggregate::{
    key_metrics, monthly_trend, review_distribution, top_categories_by_orders, top_states,
};
use storelens::{
    compute_rfm, filter_by_date_range, load_orders, DataError, Dashboard, DateRange, Segment,
};
use tempfile::NamedTempFile;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Create a test CSV file with sample data
fn create_test_csv() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "order_id,customer_unique_id,order_purchase_timestamp,order_delivered_customer_date,revenue,review_score,delivery_time,product_category,customer_state"
    )
    .unwrap();

    // Customer alice - repeat buyer, recent
    writeln!(file, "o1,alice,2018-06-01 10:00:00,2018-06-08 12:00:00,100.0,5.0,7.0,bed_bath_table,SP").unwrap();
    writeln!(file, "o1,alice,2018-06-01 10:00:00,2018-06-08 12:00:00,20.0,5.0,7.0,housewares,SP").unwrap();
    writeln!(file, "o2,alice,2018-08-25 18:30:00,2018-08-30 09:00:00,150.0,4.0,5.0,bed_bath_table,SP").unwrap();
    writeln!(file, "o3,alice,2018-08-28 08:00:00,,60.0,,,housewares,SP").unwrap();

    // Customer bob - single old order, slow delivery
    writeln!(file, "o4,bob,2017-01-15 09:00:00,2017-02-14 09:00:00,50.0,1.0,30.0,toys,RJ").unwrap();

    // Customer carol - two mid-range orders
    writeln!(file, "o5,carol,2018-03-03 14:00:00,2018-03-13 14:00:00,80.0,3.0,10.0,toys,MG").unwrap();
    writeln!(file, "o6,carol,2018-03-20 11:00:00,2018-03-27 11:00:00,45.5,4.0,7.0,,MG").unwrap();

    // Customer dave - recent single order
    writeln!(file, "o7,dave,2018-08-20 16:45:00,2018-08-27 16:45:00,300.0,5.0,7.0,watches_gifts,SP").unwrap();

    file
}

#[test]
fn test_end_to_end_dashboard() {
    let test_file = create_test_csv();
    let orders = load_orders(test_file.path()).unwrap();
    assert_eq!(orders.len(), 8);

    let bounds = orders.date_bounds().unwrap().unwrap();
    assert_eq!(bounds, (date(2017, 1, 15), date(2018, 8, 28)));

    let range = DateRange::new(bounds.0, bounds.1);
    let view = filter_by_date_range(&orders, range.start, range.end).unwrap();
    let dashboard = Dashboard::build(range, &view).unwrap();

    assert_eq!(dashboard.metrics.total_orders, 7);
    assert_eq!(dashboard.metrics.total_customers, 4);
    assert!((dashboard.metrics.total_revenue - 805.5).abs() < 1e-9);

    let rfm = dashboard.rfm.unwrap();
    assert_eq!(rfm.summary.customers, 4);
    let counted: usize = rfm.segments.iter().map(|s| s.customers).sum();
    assert_eq!(counted, 4);
}

#[test]
fn test_filter_then_aggregate() {
    let test_file = create_test_csv();
    let orders = load_orders(test_file.path()).unwrap();

    let view = filter_by_date_range(&orders, date(2018, 3, 1), date(2018, 6, 30)).unwrap();
    for row in view.records().unwrap() {
        let day = row.purchased_at.date();
        assert!(day >= date(2018, 3, 1) && day <= date(2018, 6, 30));
    }

    let months: Vec<_> = monthly_trend(&view).unwrap().into_iter().map(|m| m.month).collect();
    assert_eq!(months, vec!["2018-03", "2018-06"]);

    let summed: usize = monthly_trend(&view).unwrap().iter().map(|m| m.total_orders).sum();
    assert_eq!(summed, key_metrics(&view).unwrap().total_orders);

    // carol's second order has no category and is left out of the ranking
    let categories = top_categories_by_orders(&view).unwrap();
    let names: Vec<_> = categories.iter().map(|c| c.category.as_str()).collect();
    assert_eq!(names, vec!["bed_bath_table", "housewares", "toys"]);
}

#[test]
fn test_review_and_geography() {
    let test_file = create_test_csv();
    let orders = load_orders(test_file.path()).unwrap();

    let reviews: Vec<_> = review_distribution(&orders).unwrap()
        .into_iter()
        .map(|r| r.total_orders)
        .collect();
    assert_eq!(reviews, vec![1, 0, 1, 2, 2]);

    let states = top_states(&orders).unwrap();
    assert_eq!(states[0].state, "SP");
    assert_eq!(states[0].total_customers, 2);
}

#[test]
fn test_rfm_segments() {
    let test_file = create_test_csv();
    let orders = load_orders(test_file.path()).unwrap();
    let records = compute_rfm(&orders).unwrap();

    let alice = records.iter().find(|r| r.customer_unique_id == "alice").unwrap();
    let bob = records.iter().find(|r| r.customer_unique_id == "bob").unwrap();

    // Reference date is 2018-08-29 08:00
    assert_eq!(alice.recency, 1);
    assert_eq!(alice.frequency, 3);
    assert!((alice.monetary - 330.0).abs() < 1e-9);
    assert_eq!(alice.r_score, 4);
    assert_eq!(alice.f_score, 3);
    assert_eq!(alice.segment, Segment::Champions);

    assert_eq!(bob.r_score, 1);
    assert_eq!(bob.m_score, 1);
    assert_eq!(bob.segment, Segment::LostCustomers);
}

#[test]
fn test_empty_range() {
    let test_file = create_test_csv();
    let orders = load_orders(test_file.path()).unwrap();

    let range = DateRange::new(date(2017, 6, 1), date(2017, 12, 31));
    let view = filter_by_date_range(&orders, range.start, range.end).unwrap();
    assert!(view.is_empty());
    assert!(compute_rfm(&view).is_err());

    let dashboard = Dashboard::build(range, &view).unwrap();
    assert!(dashboard.rfm.is_none());
    assert_eq!(dashboard.metrics.total_orders, 0);
    assert!(dashboard.top_categories_by_revenue.is_empty());
}

#[test]
fn test_error_handling_missing_column() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "order_id,customer_unique_id,order_purchase_timestamp,order_delivered_customer_date,revenue,review_score,delivery_time,product_category"
    )
    .unwrap();
    writeln!(file, "o1,c1,2018-01-01 00:00:00,,10.0,5,,toys").unwrap();

    let err = load_orders(file.path()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DataError>(),
        Some(DataError::MissingColumn(name)) if name == "customer_state"
    ));
}

#[test]
fn test_error_handling_missing_file() {
    assert!(load_orders("/nonexistent/main_data.csv").is_err());
}

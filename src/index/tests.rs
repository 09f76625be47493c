use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::*;

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn pct(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn first_half_2025() -> IndexTable {
    IndexTable::from_rates([
        (ymd(2025, 1, 1), pct("0.71")),
        (ymd(2025, 2, 1), pct("0.15")),
        (ymd(2025, 3, 1), pct("0.39")),
        (ymd(2025, 4, 1), pct("0.52")),
        (ymd(2025, 5, 1), pct("0.68")),
    ])
}

/// Counts loads and optionally fails the first N of them.
struct CountingSource {
    table: IndexTable,
    loads: AtomicUsize,
    failures: usize,
}

#[async_trait]
impl IndexSource for CountingSource {
    async fn load(&self) -> Result<IndexTable, IndexError> {
        let n = self.loads.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(IndexError::Source("bucket unreachable".into()));
        }
        Ok(self.table.clone())
    }

    fn describe(&self) -> String {
        "counting".into()
    }
}

#[tokio::test]
async fn test_compounds_january_through_may() {
    let index = MonetaryIndex::with_table(first_half_2025());
    let value = index
        .adjusted_value(Decimal::new(1000, 0), ymd(2025, 1, 1), ymd(2025, 6, 1))
        .await
        .unwrap();
    assert_eq!(value, pct("1024.73"));
}

#[tokio::test]
async fn test_start_and_end_days_are_ignored() {
    let index = MonetaryIndex::with_table(first_half_2025());
    let value = index
        .adjusted_value(Decimal::new(1000, 0), ymd(2025, 1, 25), ymd(2025, 6, 30))
        .await
        .unwrap();
    assert_eq!(value, pct("1024.73"));
}

#[tokio::test]
async fn test_end_month_is_excluded() {
    let index = MonetaryIndex::with_table(first_half_2025());
    let value = index
        .adjusted_value(Decimal::new(1000, 0), ymd(2025, 1, 1), ymd(2025, 3, 15))
        .await
        .unwrap();
    assert_eq!(value, pct("1008.61"));
}

#[tokio::test]
async fn test_same_month_returns_base() {
    let index = MonetaryIndex::with_table(first_half_2025());
    let value = index
        .adjusted_value(pct("1000.005"), ymd(2025, 3, 1), ymd(2025, 3, 31))
        .await
        .unwrap();
    assert_eq!(value, pct("1000.00"));
}

#[tokio::test]
async fn test_stops_at_first_unpublished_month() {
    let index = MonetaryIndex::with_table(first_half_2025());
    let through_may = index
        .adjusted_value(Decimal::new(1000, 0), ymd(2025, 1, 1), ymd(2025, 6, 1))
        .await
        .unwrap();
    let through_december = index
        .adjusted_value(Decimal::new(1000, 0), ymd(2025, 1, 1), ymd(2026, 1, 1))
        .await
        .unwrap();
    assert_eq!(through_may, through_december);
}

#[tokio::test]
async fn test_computation_limit() {
    let start = ymd(1990, 1, 1);
    let table = IndexTable::from_rates(
        (0..500).map(|m| (add_months(start, m).unwrap(), Decimal::ZERO)),
    );
    let index = MonetaryIndex::with_table(table);

    let err = index
        .adjusted_value(Decimal::ONE_HUNDRED, start, ymd(2040, 1, 1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IndexError::ComputationLimitExceeded { iterations: 420 }
    ));

    let ok = index
        .adjusted_value(Decimal::ONE_HUNDRED, start, ymd(2010, 1, 1))
        .await
        .unwrap();
    assert_eq!(ok, Decimal::ONE_HUNDRED);
}

#[test]
fn test_reference_date_is_previous_month() {
    assert_eq!(adjustment_reference_date(ymd(2025, 6, 1)), ymd(2025, 5, 1));
    assert_eq!(adjustment_reference_date(ymd(2025, 6, 30)), ymd(2025, 5, 1));
    assert_eq!(adjustment_reference_date(ymd(2025, 1, 15)), ymd(2024, 12, 1));
}

#[tokio::test]
async fn test_rate_for() {
    let index = MonetaryIndex::with_table(first_half_2025());
    assert_eq!(index.rate_for(ymd(2025, 4, 9)).await.unwrap(), pct("0.52"));

    let err = index.rate_for(ymd(2025, 7, 9)).await.unwrap_err();
    assert!(matches!(err, IndexError::MissingRate { month } if month == ymd(2025, 7, 1)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_history_loaded_once() {
    let source = Arc::new(CountingSource {
        table: first_half_2025(),
        loads: AtomicUsize::new(0),
        failures: 0,
    });
    let index = MonetaryIndex::new(source.clone());

    for _ in 0..3 {
        index.rate_for(ymd(2025, 1, 1)).await.unwrap();
    }
    index
        .adjusted_value(Decimal::ONE, ymd(2025, 1, 1), ymd(2025, 2, 1))
        .await
        .unwrap();
    assert_eq!(source.loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_load_is_retried() {
    let source = Arc::new(CountingSource {
        table: first_half_2025(),
        loads: AtomicUsize::new(0),
        failures: 1,
    });
    let index = MonetaryIndex::new(source.clone());

    let err = index.rate_for(ymd(2025, 1, 1)).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(index.rate_for(ymd(2025, 1, 1)).await.unwrap(), pct("0.71"));
    assert_eq!(source.loads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_adjustment_history_rounds_each_step() {
    let index = MonetaryIndex::with_table(first_half_2025());
    let steps = index
        .adjustment_history(Decimal::new(1000, 0), ymd(2025, 1, 10))
        .await
        .unwrap();

    let values: Vec<Decimal> = steps.iter().map(|s| s.value).collect();
    assert_eq!(
        values,
        vec![
            pct("1000"),
            pct("1007.10"),
            pct("1008.61"),
            pct("1012.54"),
            pct("1017.81"),
            pct("1024.73"),
        ]
    );
    assert_eq!(steps[0].index_month, None);
    assert_eq!(steps[1].index_month, Some(ymd(2025, 1, 1)));
    assert_eq!(steps[1].installment_date, ymd(2025, 2, 10));
    assert_eq!(steps[5].installment_date, ymd(2025, 6, 10));
}

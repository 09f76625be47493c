//! Monetary index service.
//!
//! Compounds a base value by the monthly index rates published between two
//! dates. The history is loaded from an [`IndexSource`] on first use and
//! cached for the lifetime of the [`MonetaryIndex`] instance.

mod source;
mod table;

use std::sync::Arc;

use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use tokio::sync::OnceCell;
use tracing::{debug, info};

pub use source::{
    init_index_source, FilesystemIndexConfig, FilesystemIndexSource, IndexConfig, IndexSource,
    IndexSourceType, StaticIndexSource,
};
#[cfg(feature = "s3")]
pub use source::{S3IndexConfig, S3IndexSource};
pub use table::{first_of_month, IndexTable, INDEX_DATE_FORMAT};

use crate::model::add_months;

/// Hard cap on compounding steps (one per month).
pub const MAX_COMPOUNDING_STEPS: usize = 420;

/// Decimal places of monetary results.
const MONEY_SCALE: u32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Index computation limit reached after {iterations} iterations")]
    ComputationLimitExceeded { iterations: usize },

    #[error("No index rate published for {month}")]
    MissingRate { month: NaiveDate },

    #[error("Adjusted value overflowed")]
    Overflow,

    #[error("Index source unavailable: {0}")]
    Source(String),

    #[error("Invalid index history: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, IndexError::Source(_) | IndexError::Io(_))
    }
}

/// One row of an adjustment projection.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustmentStep {
    /// Date the adjusted value applies from.
    pub installment_date: NaiveDate,
    /// Index month applied, `None` for the unadjusted base row.
    pub index_month: Option<NaiveDate>,
    pub rate: Option<Decimal>,
    pub value: Decimal,
}

/// Index-adjustment service with a lazily loaded history.
pub struct MonetaryIndex {
    source: Arc<dyn IndexSource>,
    table: OnceCell<IndexTable>,
}

impl MonetaryIndex {
    pub fn new(source: Arc<dyn IndexSource>) -> Self {
        Self {
            source,
            table: OnceCell::new(),
        }
    }

    /// Service over a fixed table.
    pub fn with_table(table: IndexTable) -> Self {
        Self::new(Arc::new(StaticIndexSource::new(table)))
    }

    /// The cached history, loading it on first call.
    ///
    /// A failed load leaves the cache empty so a later call retries.
    pub async fn table(&self) -> Result<&IndexTable, IndexError> {
        self.table
            .get_or_try_init(|| async {
                let table = self.source.load().await?;
                let latest = table.latest().map(|(month, _)| month);
                info!(
                    source = %self.source.describe(),
                    months = table.len(),
                    latest = ?latest,
                    "Index history cached"
                );
                Ok(table)
            })
            .await
    }

    /// Compound `base` from the month of `start` up to, not including, the
    /// month of `end`. Stops at the first unpublished month.
    pub async fn adjusted_value(
        &self,
        base: Decimal,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Decimal, IndexError> {
        let table = self.table().await?;
        compound(table, base, start, end)
    }

    /// Published rate for the month containing `month`.
    pub async fn rate_for(&self, month: NaiveDate) -> Result<Decimal, IndexError> {
        let month = first_of_month(month);
        self.table()
            .await?
            .rate(month)
            .ok_or(IndexError::MissingRate { month })
    }

    /// Month-by-month projection of `base` from `start`, rounding each step.
    ///
    /// The first row is the unadjusted base. Ends at the first unpublished month.
    pub async fn adjustment_history(
        &self,
        base: Decimal,
        start: NaiveDate,
    ) -> Result<Vec<AdjustmentStep>, IndexError> {
        let table = self.table().await?;
        let mut steps = vec![AdjustmentStep {
            installment_date: start,
            index_month: None,
            rate: None,
            value: base,
        }];

        let mut month = first_of_month(start);
        let mut value = base;
        for step in 0..MAX_COMPOUNDING_STEPS {
            let Some(rate) = table.rate(month) else {
                return Ok(steps);
            };
            value = apply_rate(value, rate)?.round_dp(MONEY_SCALE);
            let offset = u32::try_from(step + 1).map_err(|_| IndexError::Overflow)?;
            steps.push(AdjustmentStep {
                installment_date: add_months(start, offset).ok_or(IndexError::Overflow)?,
                index_month: Some(month),
                rate: Some(rate),
                value,
            });
            month = add_months(month, 1).ok_or(IndexError::Overflow)?;
        }
        Err(IndexError::ComputationLimitExceeded {
            iterations: MAX_COMPOUNDING_STEPS,
        })
    }
}

/// Reference month for the rate recorded on a document issued `today`:
/// the first day of the previous month.
pub fn adjustment_reference_date(today: NaiveDate) -> NaiveDate {
    let first = first_of_month(today);
    first.checked_sub_months(Months::new(1)).unwrap_or(first)
}

fn apply_rate(value: Decimal, rate: Decimal) -> Result<Decimal, IndexError> {
    let factor = Decimal::ONE + rate / Decimal::ONE_HUNDRED;
    value.checked_mul(factor).ok_or(IndexError::Overflow)
}

fn compound(
    table: &IndexTable,
    base: Decimal,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Decimal, IndexError> {
    let end_month = first_of_month(end);
    let mut month = first_of_month(start);
    let mut value = base;

    for _ in 0..MAX_COMPOUNDING_STEPS {
        if month >= end_month {
            return Ok(value.round_dp(MONEY_SCALE));
        }
        let Some(rate) = table.rate(month) else {
            debug!(%month, "Index not published, stopping adjustment");
            return Ok(value.round_dp(MONEY_SCALE));
        };
        value = apply_rate(value, rate)?;
        month = add_months(month, 1).ok_or(IndexError::Overflow)?;
    }

    Err(IndexError::ComputationLimitExceeded {
        iterations: MAX_COMPOUNDING_STEPS,
    })
}

#[cfg(test)]
mod tests;

//! Month to rate lookup table.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::IndexError;

/// Date format used by the published index history.
pub const INDEX_DATE_FORMAT: &str = "%d/%m/%Y";

/// One published entry: `{"date": "01/05/2025", "value": "0.68"}`.
///
/// The Portuguese field names of the upstream feed are accepted too.
#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(alias = "data")]
    date: String,
    #[serde(alias = "valor")]
    value: Decimal,
}

/// First day of the month containing `date`.
pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Monthly percentage rates keyed by the first day of each month.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexTable {
    rates: BTreeMap<NaiveDate, Decimal>,
}

impl IndexTable {
    /// Build from `(month, percent)` pairs. Days are normalized to the 1st.
    pub fn from_rates(rates: impl IntoIterator<Item = (NaiveDate, Decimal)>) -> Self {
        Self {
            rates: rates
                .into_iter()
                .map(|(month, rate)| (first_of_month(month), rate))
                .collect(),
        }
    }

    /// Parse the JSON history blob.
    pub fn from_json(bytes: &[u8]) -> Result<Self, IndexError> {
        let entries: Vec<RawEntry> =
            serde_json::from_slice(bytes).map_err(|e| IndexError::Parse(e.to_string()))?;

        let mut rates = BTreeMap::new();
        for entry in entries {
            let month = NaiveDate::parse_from_str(&entry.date, INDEX_DATE_FORMAT)
                .map_err(|e| IndexError::Parse(format!("date '{}': {}", entry.date, e)))?;
            rates.insert(first_of_month(month), entry.value);
        }
        Ok(Self { rates })
    }

    /// Rate published for the month containing `month`.
    pub fn rate(&self, month: NaiveDate) -> Option<Decimal> {
        self.rates.get(&first_of_month(month)).copied()
    }

    /// Most recent published month.
    pub fn latest(&self) -> Option<(NaiveDate, Decimal)> {
        self.rates.iter().next_back().map(|(m, r)| (*m, *r))
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

//! Domain records stored in the tenant-partitioned table.

mod boleto;
mod organization;
mod schedule;

pub use boleto::{Boleto, BoletoStatus};
pub use organization::{BillingDefaults, Beneficiary, Charge, ChargeKind, DocumentKind, Organization};
pub use schedule::{Schedule, ScheduleStatus, MAX_INSTALLMENTS};

use serde::{Deserialize, Serialize};

/// Identifier of an isolated customer account.
///
/// Usually a ULID/UUID string; the reserved value `system` identifies the
/// operator tenant that owns scheduler principals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Add calendar months, clamping to the last day of the target month.
pub fn add_months(date: chrono::NaiveDate, months: u32) -> Option<chrono::NaiveDate> {
    date.checked_add_months(chrono::Months::new(months))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_add_months_clamps_to_month_end() {
        let jan31 = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        assert_eq!(
            add_months(jan31, 1),
            NaiveDate::from_ymd_opt(2025, 2, 28)
        );
        assert_eq!(
            add_months(jan31, 13),
            NaiveDate::from_ymd_opt(2026, 2, 28)
        );
        assert_eq!(add_months(jan31, 0), Some(jan31));
    }

    #[test]
    fn test_tenant_id_serializes_as_string() {
        let id = TenantId::new("01J0000000000000000000TEN1");
        assert_eq!(
            serde_json::to_value(&id).unwrap(),
            serde_json::json!("01J0000000000000000000TEN1")
        );
    }
}

//! Recurring billing plan.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::TenantId;

/// Upper bound on installments per schedule (35 years of monthly slips).
pub const MAX_INSTALLMENTS: u32 = 420;

/// Schedule lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleStatus {
    Active,
    Canceled,
    Completed,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Active => "ACTIVE",
            ScheduleStatus::Canceled => "CANCELED",
            ScheduleStatus::Completed => "COMPLETED",
        }
    }
}

/// A recurring billing plan producing one slip per installment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: Uuid,
    pub org_id: TenantId,
    /// Value of each installment before index adjustment.
    pub base_value: Decimal,
    /// Customer being billed.
    pub payer: Uuid,
    /// Due date of the first installment; later ones are offset by month.
    pub first_due_date: NaiveDate,
    /// Base date for index adjustment and first execution.
    pub start_date: NaiveDate,
    pub total_installments: u32,
    #[serde(default)]
    pub installments_issued: u32,
    #[serde(default = "default_interval")]
    pub interval_months: u32,
    /// Absent once the schedule leaves the active state. Drives the sparse
    /// execution-date index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_execution: Option<NaiveDate>,
    pub status: ScheduleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_execution: Option<DateTime<Utc>>,
}

fn default_interval() -> u32 {
    1
}

impl Schedule {
    /// Structural invariants every stored schedule must satisfy.
    ///
    /// Returns every violation found.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.start_date > self.first_due_date {
            issues.push(format!(
                "start date {} is after first due date {}",
                self.start_date, self.first_due_date
            ));
        }
        if self.total_installments == 0 || self.total_installments > MAX_INSTALLMENTS {
            issues.push(format!(
                "total installments {} outside 1..={}",
                self.total_installments, MAX_INSTALLMENTS
            ));
        }
        if self.installments_issued > self.total_installments {
            issues.push(format!(
                "issued {} exceeds total {}",
                self.installments_issued, self.total_installments
            ));
        }
        if self.interval_months == 0 {
            issues.push("interval must be at least one month".to_string());
        }
        if self.base_value <= Decimal::ZERO {
            issues.push(format!("base value {} must be positive", self.base_value));
        }
        issues
    }

    /// Installment the next run will issue (1-based).
    pub fn next_installment(&self) -> u32 {
        self.installments_issued + 1
    }

    /// Back-reference and idempotency key for an installment.
    pub fn installment_ref(&self, installment: u32) -> String {
        format!("{}#{}", self.id, installment)
    }
}

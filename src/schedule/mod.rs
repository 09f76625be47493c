//! Schedule due-validation and advancement.

mod advancer;

pub use advancer::{AdvanceOutcome, Advancer};

use chrono::NaiveDate;

use crate::error::{BillingError, Result};
use crate::model::{Schedule, ScheduleStatus};

/// Check that `schedule` should run on `today`.
///
/// Every violated condition is reported in a single `InvalidScheduleState`.
pub fn validate_due(schedule: &Schedule, today: NaiveDate) -> Result<()> {
    let mut issues = Vec::new();

    match schedule.next_execution {
        Some(next) if next == today => {}
        Some(next) => issues.push(format!(
            "schedule should not run today, expected {} but today is {}",
            next, today
        )),
        None => issues.push("schedule has no next execution date".to_string()),
    }

    if schedule.status != ScheduleStatus::Active {
        issues.push(format!(
            "non-active schedule triggered: {}",
            schedule.status.as_str()
        ));
    }

    if schedule.installments_issued >= schedule.total_installments {
        issues.push(format!(
            "schedule is already complete, total {} issued {}",
            schedule.total_installments, schedule.installments_issued
        ));
    }

    if let Some(next) = schedule.next_execution {
        if schedule.start_date > next {
            issues.push(format!(
                "schedule triggered before its start date {}",
                schedule.start_date
            ));
        }
    }

    issues.extend(schedule.invariant_violations());

    if issues.is_empty() {
        Ok(())
    } else {
        Err(BillingError::InvalidScheduleState {
            schedule_id: schedule.id,
            issues,
        })
    }
}

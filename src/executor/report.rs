//! Batch outcome and failure summary.

use chrono::NaiveDate;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::BillingError;
use crate::model::TenantId;
use crate::schedule::AdvanceOutcome;

/// Why one schedule (or a tenant-level step) failed.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleFailure {
    /// `None` for tenant-level steps and undecodable items.
    pub schedule_id: Option<Uuid>,
    pub reason: String,
    pub retryable: bool,
}

impl ScheduleFailure {
    pub fn from_error(schedule_id: Option<Uuid>, err: &BillingError) -> Self {
        Self {
            schedule_id,
            reason: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TenantFailures {
    pub tenant: TenantId,
    pub failures: Vec<ScheduleFailure>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub date: NaiveDate,
    /// Index items returned by the due scan.
    pub scanned: usize,
    pub issued: usize,
    pub already_issued: usize,
    pub reissued: usize,
    /// Failures grouped by tenant, in the order tenants were processed.
    pub failures: Vec<TenantFailures>,
    /// The due scan stopped at its page cap.
    pub truncated: bool,
}

impl BatchReport {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            scanned: 0,
            issued: 0,
            already_issued: 0,
            reissued: 0,
            failures: Vec::new(),
            truncated: false,
        }
    }

    pub fn record(&mut self, outcome: &AdvanceOutcome) {
        match outcome {
            AdvanceOutcome::Issued { .. } => self.issued += 1,
            AdvanceOutcome::AlreadyIssued { .. } => self.already_issued += 1,
            AdvanceOutcome::Reissued { .. } => self.reissued += 1,
        }
    }

    pub fn fail(&mut self, tenant: &TenantId, failure: ScheduleFailure) {
        match self.failures.iter_mut().find(|f| &f.tenant == tenant) {
            Some(entry) => entry.failures.push(failure),
            None => self.failures.push(TenantFailures {
                tenant: tenant.clone(),
                failures: vec![failure],
            }),
        }
    }

    /// Schedules advanced, including idempotent skips.
    pub fn advanced(&self) -> usize {
        self.issued + self.already_issued + self.reissued
    }

    pub fn failed(&self) -> usize {
        self.failures.iter().map(|f| f.failures.len()).sum()
    }

    pub fn failures_for(&self, tenant: &TenantId) -> &[ScheduleFailure] {
        self.failures
            .iter()
            .find(|f| &f.tenant == tenant)
            .map(|f| f.failures.as_slice())
            .unwrap_or_default()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.truncated
    }

    /// Log the per-tenant failure summary and totals.
    pub fn log_summary(&self) {
        for tenant in &self.failures {
            warn!(
                tenant = %tenant.tenant,
                failed = tenant.failures.len(),
                "Tenant finished with failed schedules"
            );
        }

        if self.is_success() {
            info!(
                date = %self.date,
                scanned = self.scanned,
                issued = self.issued,
                already_issued = self.already_issued,
                reissued = self.reissued,
                "Scheduled billing batch finished"
            );
        } else {
            error!(
                date = %self.date,
                scanned = self.scanned,
                advanced = self.advanced(),
                failed = self.failed(),
                truncated = self.truncated,
                "Scheduled billing batch finished with failures"
            );
        }
    }
}

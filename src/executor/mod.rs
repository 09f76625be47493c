//! Scheduled-billing executor.
//!
//! Once a day: scan the execution-date index for schedules due today, group
//! them by tenant and advance each one while acting as that tenant. A
//! failing schedule or tenant never stops the others; failures are
//! collected and surfaced as one aggregate error at the end.
//!
//! The tenant's sequence counter is read once when the tenant is entered and
//! handed to each schedule as the lowest free number. The advancer persists
//! the counter with every claim it makes, so a failure later in the batch
//! never leaves an issued number behind the stored counter. A schedule
//! interrupted between claiming its installment and finishing is reconciled
//! on the next run through the idempotency lock.

mod config;
mod report;

pub use config::{ExecutorConfig, PrincipalConfig};
pub use report::{BatchReport, ScheduleFailure, TenantFailures};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, error, info, warn};

use crate::auth::{impersonate, Principal, TenantContext};
use crate::clock::Clock;
use crate::error::{BillingError, Result};
use crate::index::MonetaryIndex;
use crate::lock::IdempotencyLock;
use crate::model::{Organization, Schedule, TenantId};
use crate::repository::{
    BoletoRepository, OrganizationRepository, ScheduleRepository, UndecodableSchedule,
};
use crate::schedule::{AdvanceOutcome, Advancer};
use crate::storage::{DocumentStore, StorageConfig};

/// Due items of one tenant, in scan order.
#[derive(Debug)]
struct TenantBatch {
    tenant: TenantId,
    schedules: Vec<Schedule>,
    undecodable: Vec<UndecodableSchedule>,
}

/// Group scan entries by tenant, keeping first-seen tenant order.
fn group_by_tenant(
    entries: Vec<std::result::Result<Schedule, UndecodableSchedule>>,
) -> Vec<TenantBatch> {
    let mut batches: Vec<TenantBatch> = Vec::new();
    let mut positions: HashMap<TenantId, usize> = HashMap::new();

    for entry in entries {
        let tenant = match &entry {
            Ok(schedule) => schedule.org_id.clone(),
            Err(undecodable) => undecodable.tenant.clone(),
        };
        let position = *positions.entry(tenant.clone()).or_insert_with(|| {
            batches.push(TenantBatch {
                tenant,
                schedules: Vec::new(),
                undecodable: Vec::new(),
            });
            batches.len() - 1
        });
        match entry {
            Ok(schedule) => batches[position].schedules.push(schedule),
            Err(undecodable) => batches[position].undecodable.push(undecodable),
        }
    }
    batches
}

pub struct Executor {
    principal: Option<Principal>,
    schedules: Arc<ScheduleRepository>,
    organizations: OrganizationRepository,
    advancer: Advancer,
    clock: Arc<dyn Clock>,
    schedule_timeout: Duration,
}

impl Executor {
    pub fn new(
        principal: Option<Principal>,
        schedules: Arc<ScheduleRepository>,
        organizations: OrganizationRepository,
        advancer: Advancer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            principal,
            schedules,
            organizations,
            advancer,
            clock,
            schedule_timeout: ExecutorConfig::default().schedule_timeout(),
        }
    }

    pub fn with_schedule_timeout(mut self, timeout: Duration) -> Self {
        self.schedule_timeout = timeout;
        self
    }

    /// Wire an executor over one store and index service.
    pub fn from_config(
        config: &ExecutorConfig,
        storage: &StorageConfig,
        store: Arc<dyn DocumentStore>,
        index: Arc<MonetaryIndex>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let principal = config
            .principal
            .to_principal()
            .map_err(|e| BillingError::InvalidState(e.to_string()))?;

        let schedules = Arc::new(ScheduleRepository::new(
            store.clone(),
            clock.clone(),
            storage.schedule_index.name.clone(),
            storage.schedule_index.max_pages,
        ));
        let advancer = Advancer::new(
            index,
            IdempotencyLock::new(store.clone(), clock.clone()).with_ttl(config.lock_ttl()),
            BoletoRepository::new(store.clone(), clock.clone()),
            OrganizationRepository::new(store.clone(), clock.clone()),
            schedules.clone(),
            clock.clone(),
        );
        let organizations = OrganizationRepository::new(store, clock.clone());

        Ok(Self::new(principal, schedules, organizations, advancer, clock)
            .with_schedule_timeout(config.schedule_timeout()))
    }

    /// Run today's batch. Fails with `BatchPartiallyFailed` if anything failed.
    pub async fn run_daily_batch(&self) -> Result<BatchReport> {
        let report = self.run_batch(self.clock.today()).await?;
        report.log_summary();
        if report.is_success() {
            Ok(report)
        } else {
            Err(BillingError::BatchPartiallyFailed {
                failed: report.failed(),
            })
        }
    }

    /// Advance every active schedule due on `today`.
    ///
    /// Only a failing due scan is returned as an error; everything after it
    /// is recorded in the report.
    pub async fn run_batch(&self, today: NaiveDate) -> Result<BatchReport> {
        let scan = self.schedules.due_on(today).await?;
        let mut report = BatchReport::new(today);
        report.scanned = scan.entries.len();
        report.truncated = scan.truncated;

        let batches = group_by_tenant(scan.entries);
        info!(
            %today,
            schedules = report.scanned,
            tenants = batches.len(),
            "Starting scheduled billing batch"
        );

        for batch in batches {
            self.run_tenant(batch, &mut report).await;
        }
        Ok(report)
    }

    async fn run_tenant(&self, batch: TenantBatch, report: &mut BatchReport) {
        let tenant = batch.tenant;
        for item in batch.undecodable {
            error!(tenant = %tenant, entity = %item.entity, reason = %item.reason, "Undecodable schedule");
            report.fail(
                &tenant,
                ScheduleFailure {
                    schedule_id: None,
                    reason: format!("{}: {}", item.entity, item.reason),
                    retryable: false,
                },
            );
        }
        if batch.schedules.is_empty() {
            return;
        }

        let (ctx, org) = match self.enter_tenant(&tenant).await {
            Ok(entered) => entered,
            Err(e) => {
                error!(tenant = %tenant, error = %e, "Cannot act as tenant, skipping its schedules");
                for schedule in &batch.schedules {
                    report.fail(&tenant, ScheduleFailure::from_error(Some(schedule.id), &e));
                }
                return;
            }
        };

        let initial = org.next_sequence;
        let mut sequence = initial;
        for schedule in &batch.schedules {
            match self.advance_one(&ctx, &org, schedule, sequence).await {
                Ok(outcome) => {
                    report.record(&outcome);
                    if let AdvanceOutcome::Issued { sequence: issued, .. } = outcome {
                        sequence = sequence.max(issued + 1);
                    }
                }
                Err(e) => {
                    error!(
                        tenant = %tenant,
                        schedule = %schedule.id,
                        error = %e,
                        "Failed to run schedule"
                    );
                    report.fail(&tenant, ScheduleFailure::from_error(Some(schedule.id), &e));
                }
            }
        }

        debug!(tenant = %tenant, from = initial, to = sequence, "Tenant batch done");
    }

    /// Impersonate `tenant` and load its organization.
    async fn enter_tenant(&self, tenant: &TenantId) -> Result<(TenantContext, Organization)> {
        let ctx = impersonate(self.principal.as_ref(), tenant)?;
        let org = self.organizations.get(&ctx).await?.ok_or_else(|| {
            BillingError::InvalidState(format!("organization {} not found", tenant))
        })?;
        if &org.org_id != tenant {
            return Err(BillingError::InvalidState(format!(
                "impersonation of {} resolved to organization {}",
                tenant, org.org_id
            )));
        }
        Ok((ctx, org))
    }

    async fn advance_one(
        &self,
        ctx: &TenantContext,
        org: &Organization,
        schedule: &Schedule,
        sequence: u64,
    ) -> Result<AdvanceOutcome> {
        let advance =
            self.advancer
                .advance_with_defaults(ctx, schedule, sequence, org.defaults.as_ref());
        match tokio::time::timeout(self.schedule_timeout, advance).await {
            Ok(result) => result,
            Err(_) => {
                warn!(schedule = %schedule.id, after = ?self.schedule_timeout, "Schedule timed out");
                Err(BillingError::Timeout {
                    schedule_id: schedule.id,
                    after: self.schedule_timeout,
                })
            }
        }
    }
}

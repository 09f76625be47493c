//! Issues the next installment of a schedule exactly once.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::validate_due;
use crate::auth::TenantContext;
use crate::clock::Clock;
use crate::error::{BillingError, Result};
use crate::index::{adjustment_reference_date, MonetaryIndex};
use crate::lock::{IdempotencyLock, LockOutcome, LockRecord};
use crate::model::{add_months, BillingDefaults, Boleto, BoletoStatus, Schedule, ScheduleStatus};
use crate::repository::{
    BoletoRepository, OrganizationRepository, ScheduleProgress, ScheduleRepository,
};
use crate::storage::helpers::{entity_key, EntityType};
use crate::storage::StorageError;

/// What an advance did about the billing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// A new document was created.
    Issued { sequence: u64, installment: u32 },
    /// A previous attempt already issued the document.
    AlreadyIssued { sequence: u64, installment: u32 },
    /// A previous attempt left an unsettled document, which was rewritten.
    Reissued { sequence: u64, installment: u32 },
}

impl AdvanceOutcome {
    pub fn sequence(&self) -> u64 {
        match self {
            AdvanceOutcome::Issued { sequence, .. }
            | AdvanceOutcome::AlreadyIssued { sequence, .. }
            | AdvanceOutcome::Reissued { sequence, .. } => *sequence,
        }
    }
}

pub struct Advancer {
    index: Arc<MonetaryIndex>,
    lock: IdempotencyLock,
    boletos: BoletoRepository,
    organizations: OrganizationRepository,
    schedules: Arc<ScheduleRepository>,
    clock: Arc<dyn Clock>,
}

impl Advancer {
    pub fn new(
        index: Arc<MonetaryIndex>,
        lock: IdempotencyLock,
        boletos: BoletoRepository,
        organizations: OrganizationRepository,
        schedules: Arc<ScheduleRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            index,
            lock,
            boletos,
            organizations,
            schedules,
            clock,
        }
    }

    /// Issue the next installment of `schedule`.
    ///
    /// `sequence` is the lowest number the caller expects to be free. The
    /// document takes the larger of it and the organization's persisted
    /// counter, and the counter is moved past it before the document is
    /// written. A retry of an installment that was already claimed keeps the
    /// number recorded in its lock.
    pub async fn advance(
        &self,
        ctx: &TenantContext,
        schedule: &Schedule,
        sequence: u64,
    ) -> Result<AdvanceOutcome> {
        self.advance_with_defaults(ctx, schedule, sequence, None)
            .await
    }

    /// Like [`Advancer::advance`], copying the organization's late-payment
    /// charges onto the document.
    pub async fn advance_with_defaults(
        &self,
        ctx: &TenantContext,
        schedule: &Schedule,
        sequence: u64,
        defaults: Option<&BillingDefaults>,
    ) -> Result<AdvanceOutcome> {
        if schedule.org_id != ctx.tenant {
            return Err(BillingError::InvalidState(format!(
                "schedule {} belongs to {} but context is {}",
                schedule.id, schedule.org_id, ctx.tenant
            )));
        }

        let today = self.clock.today();
        validate_due(schedule, today)?;

        let installment = schedule.next_installment();
        let sequence = self.allocate(ctx, sequence).await?;
        let mut boleto = self
            .build_document(schedule, sequence, installment, defaults)
            .await?;

        let lock_key = schedule.installment_ref(installment);
        let target = entity_key(EntityType::Boleto, sequence);
        let metadata = json!({
            "sequence": sequence,
            "schedule": serde_json::to_value(schedule).map_err(StorageError::from)?,
        });

        let outcome = match self
            .lock
            .acquire(ctx, EntityType::Boleto, &lock_key, &target, metadata)
            .await?
        {
            LockOutcome::Acquired(_) => {
                self.issue(ctx, &lock_key, &boleto).await?;
                info!(
                    schedule = %schedule.id,
                    tenant = %ctx.tenant,
                    sequence,
                    installment,
                    value = %boleto.value,
                    "Boleto issued"
                );
                AdvanceOutcome::Issued {
                    sequence,
                    installment,
                }
            }
            LockOutcome::AlreadyExists(existing) => {
                warn!(
                    schedule = %schedule.id,
                    lock_key = %lock_key,
                    "Installment already claimed, checking whether it was issued"
                );
                self.reconcile(ctx, &existing, &mut boleto, installment)
                    .await?
            }
        };

        self.record_progress(ctx, schedule, installment).await?;
        Ok(outcome)
    }

    /// First free number: the caller's hint or the persisted counter,
    /// whichever is higher.
    async fn allocate(&self, ctx: &TenantContext, hint: u64) -> Result<u64> {
        let org = self.organizations.get(ctx).await?.ok_or_else(|| {
            BillingError::InvalidState(format!("organization {} does not exist", ctx.tenant))
        })?;
        Ok(hint.max(org.next_sequence))
    }

    /// Move the counter past the claimed number, then write the document.
    ///
    /// The claim is released when the number was not consumed: the counter
    /// write failed, or a document already sits under that number. Any other
    /// failure of the document write keeps the claim so the next run
    /// reconciles against it.
    async fn issue(&self, ctx: &TenantContext, lock_key: &str, boleto: &Boleto) -> Result<()> {
        if let Err(e) = self
            .organizations
            .set_next_sequence(ctx, boleto.sequence + 1)
            .await
        {
            self.release(ctx, lock_key).await;
            return Err(e.into());
        }

        match self.boletos.create(ctx, boleto).await {
            Ok(()) => Ok(()),
            Err(e @ StorageError::Conflict { .. }) => {
                warn!(
                    lock_key,
                    sequence = boleto.sequence,
                    "Sequence already taken by another boleto"
                );
                self.release(ctx, lock_key).await;
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn release(&self, ctx: &TenantContext, lock_key: &str) {
        if let Err(e) = self.lock.release(ctx, EntityType::Boleto, lock_key).await {
            warn!(lock_key, error = %e, "Failed to release installment lock");
        }
    }

    async fn build_document(
        &self,
        schedule: &Schedule,
        sequence: u64,
        installment: u32,
        defaults: Option<&BillingDefaults>,
    ) -> Result<Boleto> {
        let today = self.clock.today();
        let value = self
            .index
            .adjusted_value(schedule.base_value, schedule.start_date, today)
            .await?;
        let due_date = add_months(schedule.first_due_date, schedule.installments_issued)
            .ok_or_else(|| {
                BillingError::InvalidState(format!(
                    "due date of installment {} of schedule {} is out of range",
                    installment, schedule.id
                ))
            })?;
        let reference = adjustment_reference_date(today);
        let rate = self.index.rate_for(reference).await?;

        debug!(
            schedule = %schedule.id,
            base = %schedule.base_value,
            adjusted = %value,
            %reference,
            %rate,
            "Installment value computed"
        );

        Ok(Boleto {
            sequence,
            org_id: schedule.org_id.clone(),
            value,
            due_date,
            issue_date: today,
            payer: schedule.payer,
            adjustment_base_date: Some(schedule.start_date),
            adjustment_index_date: Some(reference),
            adjustment_rate: Some(rate),
            status: vec![BoletoStatus::Issued],
            schedule_ref: Some(schedule.installment_ref(installment)),
            bank_response: None,
            interest: defaults.map(|d| d.interest.clone()),
            fine: defaults.map(|d| d.fine.clone()),
        })
    }

    /// Decide what to do when a previous attempt holds the installment lock.
    async fn reconcile(
        &self,
        ctx: &TenantContext,
        existing: &LockRecord,
        boleto: &mut Boleto,
        installment: u32,
    ) -> Result<AdvanceOutcome> {
        let recorded = existing
            .metadata
            .get("sequence")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                BillingError::InvalidState(format!(
                    "lock {} carries no sequence, cannot check for an existing boleto",
                    existing.lock_key
                ))
            })?;

        let expected_target = entity_key(EntityType::Boleto, recorded);
        if existing.target_entity != expected_target {
            return Err(BillingError::InvalidState(format!(
                "lock {} targets {} but records sequence {}",
                existing.lock_key, existing.target_entity, recorded
            )));
        }
        boleto.sequence = recorded;

        match self.boletos.get(ctx, recorded).await? {
            None => Err(BillingError::InvalidState(format!(
                "lock {} references {} which does not exist",
                existing.lock_key, existing.target_entity
            ))),
            Some(stored) if stored.schedule_ref.as_deref() != Some(existing.lock_key.as_str()) => {
                Err(BillingError::InvalidState(format!(
                    "{} belongs to {:?}, not to {}",
                    existing.target_entity, stored.schedule_ref, existing.lock_key
                )))
            }
            Some(stored) if stored.is_settled() => {
                info!(
                    lock_key = %existing.lock_key,
                    sequence = recorded,
                    "Boleto already issued"
                );
                Ok(AdvanceOutcome::AlreadyIssued {
                    sequence: recorded,
                    installment,
                })
            }
            Some(stored) => {
                warn!(
                    lock_key = %existing.lock_key,
                    sequence = recorded,
                    status = ?stored.status,
                    "Boleto likely failed to issue, issuing again"
                );
                self.boletos.rewrite(ctx, boleto).await?;
                Ok(AdvanceOutcome::Reissued {
                    sequence: recorded,
                    installment,
                })
            }
        }
    }

    async fn record_progress(
        &self,
        ctx: &TenantContext,
        schedule: &Schedule,
        installment: u32,
    ) -> Result<()> {
        let today = self.clock.today();
        let (status, next_execution) = if installment >= schedule.total_installments {
            (ScheduleStatus::Completed, None)
        } else {
            let next = add_months(today, schedule.interval_months).ok_or_else(|| {
                BillingError::InvalidState(format!(
                    "next execution of schedule {} is out of range",
                    schedule.id
                ))
            })?;
            (schedule.status, Some(next))
        };

        let progress = ScheduleProgress {
            installments_issued: installment,
            status,
            next_execution,
            last_execution: self.clock.now(),
        };
        self.schedules
            .record_progress(ctx, schedule.id, &progress)
            .await?;

        if status == ScheduleStatus::Completed {
            info!(schedule = %schedule.id, installments = installment, "Schedule completed");
        }
        Ok(())
    }
}

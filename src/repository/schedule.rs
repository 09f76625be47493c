//! Schedule repository and the due-schedule index scan.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{stamp_created, stamp_updated};
use crate::auth::TenantContext;
use crate::clock::Clock;
use crate::model::{Schedule, ScheduleStatus, TenantId};
use crate::storage::helpers::{from_item, item_key, key_id, to_item, EntityType};
use crate::storage::{
    CreateCondition, DocumentStore, IndexQuery, Item, ItemKey, Result, UpdateRequest, ENTITY_ATTR,
    TENANT_ATTR,
};
use crate::utils::retry::with_storage_retry;

/// Attribute the due-schedule index is keyed on.
pub const NEXT_EXECUTION_ATTR: &str = "nextExecution";

/// Progress written back after an installment is issued.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleProgress {
    pub installments_issued: u32,
    pub status: ScheduleStatus,
    /// `None` removes the attribute, dropping the item from the index.
    pub next_execution: Option<NaiveDate>,
    pub last_execution: DateTime<Utc>,
}

/// An index item that could not be read as a schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct UndecodableSchedule {
    pub tenant: TenantId,
    pub entity: String,
    pub reason: String,
}

/// Result of scanning the due-schedule index for one date.
#[derive(Debug, Default)]
pub struct DueScan {
    /// Index items in the order returned.
    pub entries: Vec<std::result::Result<Schedule, UndecodableSchedule>>,
    /// More pages remained when the page cap was hit.
    pub truncated: bool,
}

pub struct ScheduleRepository {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    index_name: String,
    max_pages: usize,
}

impl ScheduleRepository {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        index_name: impl Into<String>,
        max_pages: usize,
    ) -> Self {
        Self {
            store,
            clock,
            index_name: index_name.into(),
            max_pages: max_pages.max(1),
        }
    }

    fn key(ctx: &TenantContext, id: Uuid) -> ItemKey {
        item_key(ctx.tenant.as_str(), EntityType::Schedule, id)
    }

    pub async fn get(&self, ctx: &TenantContext, id: Uuid) -> Result<Option<Schedule>> {
        let key = Self::key(ctx, id);
        let item = with_storage_retry("schedule.get", || self.store.get(&key)).await?;
        item.map(|item| from_item(&item)).transpose()
    }

    pub async fn create(&self, ctx: &TenantContext, schedule: &Schedule) -> Result<()> {
        let mut item = to_item(schedule, &Self::key(ctx, schedule.id))?;
        stamp_created(&mut item, ctx, self.clock.now());
        self.store.create(item, CreateCondition::NotExists).await
    }

    /// Write installment progress. Fails with `NotFound` if the schedule is gone.
    pub async fn record_progress(
        &self,
        ctx: &TenantContext,
        id: Uuid,
        progress: &ScheduleProgress,
    ) -> Result<Schedule> {
        let mut update = UpdateRequest::new()
            .set("installmentsIssued", progress.installments_issued)
            .set("status", progress.status.as_str())
            .set("lastExecution", serde_json::to_value(progress.last_execution)?);
        update = match progress.next_execution {
            Some(date) => update.set(NEXT_EXECUTION_ATTR, date.to_string()),
            None => update.remove(NEXT_EXECUTION_ATTR),
        };

        let key = Self::key(ctx, id);
        let stored = self
            .store
            .update(&key, stamp_updated(update, ctx, self.clock.now()))
            .await?;
        debug!(
            key = %key,
            issued = progress.installments_issued,
            status = progress.status.as_str(),
            "Schedule progress recorded"
        );
        from_item(&stored)
    }

    /// Active schedules whose next execution is `date`, across all tenants.
    ///
    /// Follows continuation tokens up to the configured page cap.
    pub async fn due_on(&self, date: NaiveDate) -> Result<DueScan> {
        let mut scan = DueScan::default();
        let mut continuation = None;

        for page_number in 1..=self.max_pages {
            let query = IndexQuery::on_index(
                self.index_name.as_str(),
                NEXT_EXECUTION_ATTR,
                date.to_string(),
            )
            .filter("status", ScheduleStatus::Active.as_str())
            .after(continuation.take());

            let page = with_storage_retry("schedule.due_on", || self.store.query(&query)).await?;
            debug!(%date, page = page_number, items = page.items.len(), "Due schedules page");
            scan.entries.extend(page.items.iter().map(decode_due_item));

            match page.continuation {
                Some(token) => continuation = Some(token),
                None => return Ok(scan),
            }
        }

        warn!(
            %date,
            max_pages = self.max_pages,
            "Due schedule scan hit the page cap, remaining schedules are left for a rerun"
        );
        scan.truncated = true;
        Ok(scan)
    }
}

/// Decode an index item, attributing failures to the partition it lives in.
fn decode_due_item(item: &Item) -> std::result::Result<Schedule, UndecodableSchedule> {
    let partition = item
        .get(TENANT_ATTR)
        .and_then(Value::as_str)
        .map(|t| key_id(t, EntityType::Organization).unwrap_or(t))
        .unwrap_or("unknown");
    let undecodable = |reason: String| UndecodableSchedule {
        tenant: TenantId::new(partition),
        entity: item
            .get(ENTITY_ATTR)
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        reason,
    };

    let schedule = from_item::<Schedule>(item).map_err(|e| undecodable(e.to_string()))?;
    if schedule.org_id.as_str() != partition {
        return Err(undecodable(format!(
            "owner {} does not match partition {}",
            schedule.org_id, partition
        )));
    }
    Ok(schedule)
}

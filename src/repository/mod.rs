//! Typed repositories over the document store.
//!
//! Every tenant-owned operation takes a [`TenantContext`] and addresses
//! only that tenant's partition. Reads retry transient store failures.
//! Writes stamp `createdAt`/`createdBy` or `updatedAt`/`updatedBy` from the
//! context actor.

mod boleto;
mod organization;
mod schedule;

pub use boleto::BoletoRepository;
pub use organization::OrganizationRepository;
pub use schedule::{DueScan, ScheduleProgress, ScheduleRepository, UndecodableSchedule};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::auth::TenantContext;
use crate::storage::{Item, UpdateRequest};

fn timestamp(now: DateTime<Utc>) -> Value {
    Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn stamp_created(item: &mut Item, ctx: &TenantContext, now: DateTime<Utc>) {
    item.insert("createdAt".to_string(), timestamp(now));
    item.insert("createdBy".to_string(), Value::String(ctx.actor.clone()));
}

fn stamp_updated(update: UpdateRequest, ctx: &TenantContext, now: DateTime<Utc>) -> UpdateRequest {
    update
        .set("updatedAt", timestamp(now))
        .set("updatedBy", ctx.actor.clone())
}

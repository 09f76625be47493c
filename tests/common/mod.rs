//! Shared fixture for daily batch tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use billing_scheduler::auth::TenantContext;
use billing_scheduler::clock::{Clock, FixedClock};
use billing_scheduler::executor::{Executor, ExecutorConfig};
use billing_scheduler::index::{IndexTable, MonetaryIndex};
use billing_scheduler::lock::IdempotencyLock;
use billing_scheduler::model::{Boleto, Organization, Schedule, ScheduleStatus, TenantId};
use billing_scheduler::repository::{BoletoRepository, OrganizationRepository, ScheduleRepository};
use billing_scheduler::storage::{InMemoryDocumentStore, StorageConfig};

pub fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn today() -> NaiveDate {
    ymd(2025, 6, 1)
}

/// Monthly rates published for January to May 2025.
pub fn rates() -> IndexTable {
    IndexTable::from_rates([
        (ymd(2025, 1, 1), Decimal::new(71, 2)),
        (ymd(2025, 2, 1), Decimal::new(15, 2)),
        (ymd(2025, 3, 1), Decimal::new(39, 2)),
        (ymd(2025, 4, 1), Decimal::new(52, 2)),
        (ymd(2025, 5, 1), Decimal::new(68, 2)),
    ])
}

pub fn home(tenant: &str) -> TenantContext {
    TenantContext {
        tenant: TenantId::new(tenant),
        actor: "seed".to_string(),
        impersonated: false,
    }
}

/// Monthly 36-installment plan of 1000.00 due today.
pub fn monthly_schedule(tenant: &str, issued: u32) -> Schedule {
    Schedule {
        id: Uuid::new_v4(),
        org_id: TenantId::new(tenant),
        base_value: Decimal::new(100000, 2),
        payer: Uuid::new_v4(),
        first_due_date: ymd(2025, 1, 10),
        start_date: ymd(2025, 1, 1),
        total_installments: 36,
        installments_issued: issued,
        interval_months: 1,
        next_execution: Some(today()),
        status: ScheduleStatus::Active,
        last_execution: None,
    }
}

pub struct World {
    pub store: Arc<InMemoryDocumentStore>,
    pub clock: Arc<dyn Clock>,
}

impl World {
    pub fn new() -> Self {
        Self::on(today())
    }

    pub fn on(date: NaiveDate) -> Self {
        Self {
            store: Arc::new(InMemoryDocumentStore::new()),
            clock: Arc::new(FixedClock::new(date)),
        }
    }

    /// Same store, seen on another day.
    pub fn later(&self, date: NaiveDate) -> Self {
        Self {
            store: self.store.clone(),
            clock: Arc::new(FixedClock::new(date)),
        }
    }

    pub fn executor(&self) -> Executor {
        Executor::from_config(
            &ExecutorConfig::default(),
            &StorageConfig::default(),
            self.store.clone(),
            Arc::new(MonetaryIndex::with_table(rates())),
            self.clock.clone(),
        )
        .unwrap()
    }

    pub fn organizations(&self) -> OrganizationRepository {
        OrganizationRepository::new(self.store.clone(), self.clock.clone())
    }

    pub fn schedules(&self) -> ScheduleRepository {
        ScheduleRepository::new(self.store.clone(), self.clock.clone(), "schedule_index", 10)
    }

    pub fn boletos(&self) -> BoletoRepository {
        BoletoRepository::new(self.store.clone(), self.clock.clone())
    }

    pub fn lock(&self) -> IdempotencyLock {
        IdempotencyLock::new(self.store.clone(), self.clock.clone())
    }

    pub async fn org(&self, tenant: &str, next_sequence: u64) {
        let mut org = Organization::new(TenantId::new(tenant));
        org.next_sequence = next_sequence;
        self.organizations().create(&home(tenant), &org).await.unwrap();
    }

    pub async fn seed(&self, schedule: &Schedule) {
        self.schedules()
            .create(&home(schedule.org_id.as_str()), schedule)
            .await
            .unwrap();
    }

    pub async fn schedule(&self, schedule: &Schedule) -> Schedule {
        self.schedules()
            .get(&home(schedule.org_id.as_str()), schedule.id)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn documents(&self, tenant: &str) -> Vec<Boleto> {
        self.boletos().list(&home(tenant)).await.unwrap()
    }

    pub async fn next_sequence(&self, tenant: &str) -> u64 {
        self.organizations()
            .get(&home(tenant))
            .await
            .unwrap()
            .unwrap()
            .next_sequence
    }
}

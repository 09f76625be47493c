//! End-to-end daily batch behaviour over the in-memory store.

mod common;

use rust_decimal::Decimal;
use serde_json::json;

use billing_scheduler::model::{Boleto, BoletoStatus, ScheduleStatus, TenantId};
use billing_scheduler::storage::helpers::EntityType;
use billing_scheduler::BillingError;

use common::*;

#[tokio::test]
async fn first_installment_of_monthly_plan() {
    let world = World::new();
    world.org("acme", 100).await;
    let mut s = monthly_schedule("acme", 0);
    s.first_due_date = ymd(2025, 6, 10);
    world.seed(&s).await;

    let report = world.executor().run_daily_batch().await.unwrap();
    assert_eq!(report.issued, 1);

    let docs = world.documents("acme").await;
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].sequence, 100);
    assert_eq!(docs[0].value, "1024.73".parse::<Decimal>().unwrap());
    assert_eq!(docs[0].due_date, ymd(2025, 6, 10));
    assert_eq!(docs[0].schedule_ref, Some(s.installment_ref(1)));

    let stored = world.schedule(&s).await;
    assert_eq!(stored.installments_issued, 1);
    assert_eq!(stored.status, ScheduleStatus::Active);
    assert_eq!(stored.next_execution, Some(ymd(2025, 7, 1)));
    assert_eq!(world.next_sequence("acme").await, 101);
}

#[tokio::test]
async fn last_installment_completes_plan() {
    let world = World::new();
    world.org("acme", 0).await;
    let s = monthly_schedule("acme", 35);
    world.seed(&s).await;

    world.executor().run_daily_batch().await.unwrap();

    let docs = world.documents("acme").await;
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].due_date, ymd(2027, 12, 10));
    assert_eq!(docs[0].schedule_ref, Some(s.installment_ref(36)));

    let stored = world.schedule(&s).await;
    assert_eq!(stored.installments_issued, 36);
    assert_eq!(stored.status, ScheduleStatus::Completed);
    assert_eq!(stored.next_execution, None);

    // Completed plans leave the due index.
    let scan = world.schedules().due_on(today()).await.unwrap();
    assert!(scan.entries.is_empty());
}

#[tokio::test]
async fn rerunning_the_same_day_issues_nothing_new() {
    let world = World::new();
    world.org("acme", 0).await;
    world.seed(&monthly_schedule("acme", 4)).await;

    world.executor().run_daily_batch().await.unwrap();
    let report = world.executor().run_daily_batch().await.unwrap();

    assert_eq!(report.scanned, 0);
    assert_eq!(world.documents("acme").await.len(), 1);
    assert_eq!(world.next_sequence("acme").await, 1);
}

#[tokio::test]
async fn crash_before_schedule_update_is_recovered() {
    let world = World::new();
    world.org("acme", 0).await;
    let s = monthly_schedule("acme", 4);
    world.seed(&s).await;

    world.store.set_fail_on_update(Some("SCHEDULE#")).await;
    let err = world.executor().run_daily_batch().await.unwrap_err();
    assert!(matches!(err, BillingError::BatchPartiallyFailed { failed: 1 }));
    assert_eq!(world.documents("acme").await.len(), 1);
    assert_eq!(world.schedule(&s).await.installments_issued, 4);
    assert_eq!(world.next_sequence("acme").await, 1);

    world.store.set_fail_on_update(None).await;
    let report = world.executor().run_daily_batch().await.unwrap();
    assert_eq!(report.already_issued, 1);
    assert_eq!(report.issued, 0);

    assert_eq!(world.documents("acme").await.len(), 1);
    let stored = world.schedule(&s).await;
    assert_eq!(stored.installments_issued, 5);
    assert_eq!(stored.next_execution, Some(ymd(2025, 7, 1)));
    assert_eq!(world.next_sequence("acme").await, 1);
}

#[tokio::test]
async fn counter_write_failure_leaves_no_number_behind() {
    let world = World::new();
    world.org("acme", 0).await;
    let a = monthly_schedule("acme", 4);
    let b = monthly_schedule("acme", 4);
    world.seed(&a).await;
    world.seed(&b).await;

    world.store.set_fail_on_update(Some("ORG#")).await;
    let report = world.executor().run_batch(today()).await.unwrap();
    assert_eq!(report.issued, 0);
    assert_eq!(report.failures_for(&TenantId::new("acme")).len(), 2);
    assert!(world.documents("acme").await.is_empty());
    world.store.set_fail_on_update(None).await;

    let c = monthly_schedule("acme", 4);
    world.seed(&c).await;
    let report = world.executor().run_daily_batch().await.unwrap();
    assert_eq!(report.issued, 3);

    let mut sequences: Vec<u64> = world
        .documents("acme")
        .await
        .iter()
        .map(|d| d.sequence)
        .collect();
    sequences.sort_unstable();
    assert_eq!(sequences, vec![0, 1, 2]);
    assert_eq!(world.next_sequence("acme").await, 3);
    for s in [&a, &b, &c] {
        assert_eq!(world.schedule(s).await.installments_issued, 5);
    }
}

#[tokio::test]
async fn sibling_is_issued_after_schedule_failing_past_its_document() {
    let world = World::new();
    world.org("acme", 0).await;
    let a = monthly_schedule("acme", 4);
    let b = monthly_schedule("acme", 4);
    world.seed(&a).await;
    world.seed(&b).await;

    world
        .store
        .set_fail_on_update(Some(&format!("SCHEDULE#{}", a.id)))
        .await;
    let report = world.executor().run_batch(today()).await.unwrap();
    assert_eq!(report.issued, 1);
    let failures = report.failures_for(&TenantId::new("acme"));
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].schedule_id, Some(a.id));
    assert_eq!(world.schedule(&b).await.installments_issued, 5);
    assert_eq!(world.documents("acme").await.len(), 2);
    world.store.set_fail_on_update(None).await;

    let report = world.executor().run_daily_batch().await.unwrap();
    assert_eq!(report.already_issued, 1);
    assert_eq!(report.issued, 0);
    assert_eq!(world.schedule(&a).await.installments_issued, 5);

    let docs = world.documents("acme").await;
    assert_eq!(docs.len(), 2);
    let mut refs: Vec<String> = docs.iter().filter_map(|d| d.schedule_ref.clone()).collect();
    refs.sort();
    let mut expected = vec![a.installment_ref(5), b.installment_ref(5)];
    expected.sort();
    assert_eq!(refs, expected);
    assert_eq!(world.next_sequence("acme").await, 2);
}

#[tokio::test]
async fn zero_interval_schedule_is_never_issued() {
    let world = World::new();
    world.org("acme", 0).await;
    let mut s = monthly_schedule("acme", 4);
    s.interval_months = 0;
    world.seed(&s).await;

    for _ in 0..2 {
        let err = world.executor().run_daily_batch().await.unwrap_err();
        assert!(matches!(err, BillingError::BatchPartiallyFailed { failed: 1 }));
    }
    assert!(world.documents("acme").await.is_empty());
    assert_eq!(world.schedule(&s).await, s);
    assert_eq!(world.next_sequence("acme").await, 0);
}

#[tokio::test]
async fn schedules_not_due_are_untouched() {
    let world = World::new();
    world.org("acme", 0).await;

    let mut tomorrow = monthly_schedule("acme", 4);
    tomorrow.next_execution = Some(ymd(2025, 6, 2));
    world.seed(&tomorrow).await;

    let mut canceled = monthly_schedule("acme", 4);
    canceled.status = ScheduleStatus::Canceled;
    world.seed(&canceled).await;

    let report = world.executor().run_daily_batch().await.unwrap();
    assert_eq!(report.scanned, 0);
    assert!(world.documents("acme").await.is_empty());
    assert_eq!(world.schedule(&tomorrow).await, tomorrow);
    assert_eq!(world.schedule(&canceled).await, canceled);
}

#[tokio::test]
async fn value_is_compounded_up_to_last_month() {
    let world = World::new();
    world.org("acme", 0).await;
    let mut s = monthly_schedule("acme", 4);
    s.base_value = Decimal::new(250000, 2);
    world.seed(&s).await;

    world.executor().run_daily_batch().await.unwrap();

    let doc = &world.documents("acme").await[0];
    // 2500.00 compounded by Jan..May rates.
    assert_eq!(doc.value, "2561.83".parse::<Decimal>().unwrap());
    assert_eq!(doc.adjustment_base_date, Some(ymd(2025, 1, 1)));
    assert_eq!(doc.adjustment_index_date, Some(ymd(2025, 5, 1)));
    assert_eq!(doc.adjustment_rate, Some(Decimal::new(68, 2)));
}

#[tokio::test]
async fn failing_tenant_does_not_stop_others() {
    let world = World::new();
    world.org("x", 0).await;
    world.org("y", 0).await;

    // Already fully issued yet still active.
    let mut broken = monthly_schedule("x", 36);
    broken.status = ScheduleStatus::Active;
    world.seed(&broken).await;
    world.seed(&monthly_schedule("x", 0)).await;
    world.seed(&monthly_schedule("y", 2)).await;
    world.seed(&monthly_schedule("y", 7)).await;

    let report = world.executor().run_batch(today()).await.unwrap();
    assert_eq!(report.failures_for(&TenantId::new("x")).len(), 1);
    assert_eq!(
        report.failures_for(&TenantId::new("x"))[0].schedule_id,
        Some(broken.id)
    );
    assert!(report.failures_for(&TenantId::new("y")).is_empty());
    assert_eq!(report.issued, 3);
    assert!(!report.is_success());

    assert_eq!(world.documents("x").await.len(), 1);
    assert_eq!(world.documents("y").await.len(), 2);
    assert_eq!(world.schedule(&broken).await, broken);
}

#[tokio::test]
async fn daily_batch_reports_partial_failure() {
    let world = World::new();
    world.org("y", 0).await;
    world.seed(&monthly_schedule("y", 2)).await;
    // No organization record for x.
    world.seed(&monthly_schedule("x", 0)).await;

    let err = world.executor().run_daily_batch().await.unwrap_err();
    assert!(matches!(err, BillingError::BatchPartiallyFailed { failed: 1 }));
    assert_eq!(world.documents("y").await.len(), 1);
}

#[tokio::test]
async fn settled_document_behind_lock_is_not_reissued() {
    let world = World::new();
    world.org("acme", 0).await;
    let s = monthly_schedule("acme", 4);
    world.seed(&s).await;

    let lock_key = s.installment_ref(5);
    world
        .lock()
        .acquire(&home("acme"), EntityType::Boleto, &lock_key, "BOLETO#0", json!({"sequence": 0}))
        .await
        .unwrap();
    let paid = Boleto {
        sequence: 0,
        org_id: TenantId::new("acme"),
        value: Decimal::new(99900, 2),
        due_date: ymd(2025, 5, 10),
        issue_date: ymd(2025, 5, 31),
        payer: s.payer,
        adjustment_base_date: None,
        adjustment_index_date: None,
        adjustment_rate: None,
        status: vec![BoletoStatus::Issued, BoletoStatus::Paid],
        schedule_ref: Some(lock_key),
        bank_response: None,
        interest: None,
        fine: None,
    };
    world.boletos().create(&home("acme"), &paid).await.unwrap();

    let report = world.executor().run_daily_batch().await.unwrap();
    assert_eq!(report.already_issued, 1);

    let docs = world.documents("acme").await;
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].value, paid.value);
    assert_eq!(world.schedule(&s).await.installments_issued, 5);
}

#[tokio::test]
async fn lock_without_document_fails_schedule() {
    let world = World::new();
    world.org("acme", 0).await;
    let s = monthly_schedule("acme", 4);
    world.seed(&s).await;

    world
        .lock()
        .acquire(
            &home("acme"),
            EntityType::Boleto,
            &s.installment_ref(5),
            "BOLETO#0",
            json!({"sequence": 0}),
        )
        .await
        .unwrap();

    let report = world.executor().run_batch(today()).await.unwrap();
    let failures = report.failures_for(&TenantId::new("acme"));
    assert_eq!(failures.len(), 1);
    assert!(!failures[0].retryable);
    assert!(failures[0].reason.contains("does not exist"));

    assert!(world.documents("acme").await.is_empty());
    assert_eq!(world.schedule(&s).await, s);
}

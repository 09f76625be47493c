//! Billing scheduler - multi-tenant scheduled boleto issuance.
//!
//! A daily batch scans the execution-date index for recurring billing
//! schedules due today and, acting as each owning tenant, issues the next
//! installment's boleto at its index-adjusted value. Issuance is made
//! idempotent by a time-limited lock per installment, so a rerun of the
//! same day never bills twice.

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod executor;
pub mod index;
pub mod lock;
pub mod model;
pub mod repository;
pub mod schedule;
pub mod storage;
pub mod utils;

pub use error::{BillingError, Result};

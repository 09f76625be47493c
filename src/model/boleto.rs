//! Issued payment slip.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Charge, TenantId};

/// Slip status flags. A slip carries a set of them over its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoletoStatus {
    Updated,
    Canceled,
    Unknown,
    Failed,
    Issued,
    Sent,
    Paid,
}

impl BoletoStatus {
    /// Whether this status means issuance already happened and must not be redone.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            BoletoStatus::Issued
                | BoletoStatus::Sent
                | BoletoStatus::Paid
                | BoletoStatus::Updated
                | BoletoStatus::Canceled
        )
    }
}

/// A billing document ("boleto").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Boleto {
    /// Per-tenant sequence number ("nosso número").
    pub sequence: u64,
    pub org_id: TenantId,
    pub value: Decimal,
    pub due_date: NaiveDate,
    pub issue_date: NaiveDate,
    pub payer: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjustment_base_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjustment_index_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjustment_rate: Option<Decimal>,
    #[serde(default)]
    pub status: Vec<BoletoStatus>,
    /// `{schedule_id}#{installment}` when issued by a schedule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest: Option<Charge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fine: Option<Charge>,
}

impl Boleto {
    pub fn is_settled(&self) -> bool {
        self.status.iter().any(BoletoStatus::is_settled)
    }
}

//! Organization (tenant root) record.
//!
//! Only the parts the billing executor reads or advances are modelled in
//! detail; the rest is carried along unchanged.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::TenantId;

/// How a late-payment charge is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeKind {
    /// Percentage of the slip value.
    Rate,
    /// Fixed amount.
    Fixed,
    Exempt,
}

/// Interest or fine applied after the due date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Charge {
    pub kind: ChargeKind,
    pub value: Decimal,
    /// Days after the due date before the charge applies.
    pub grace_days: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentKind {
    Cpf,
    Cnpj,
}

/// Bank account receiving payments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Beneficiary {
    pub document_kind: DocumentKind,
    pub document: String,
    pub branch: String,
    pub branch_digit: String,
    pub agreement: String,
    pub name: String,
}

/// Defaults copied onto every slip the organization issues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingDefaults {
    pub fine: Charge,
    pub interest: Charge,
    #[serde(default)]
    pub with_qrcode: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub org_id: TenantId,
    /// Next slip sequence number to allocate.
    #[serde(default)]
    pub next_sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beneficiary: Option<Beneficiary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<BillingDefaults>,
}

impl Organization {
    pub fn new(org_id: TenantId) -> Self {
        Self {
            org_id,
            next_sequence: 0,
            beneficiary: None,
            defaults: None,
        }
    }
}

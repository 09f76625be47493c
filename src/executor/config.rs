//! Executor configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::auth::{FeatureParseError, Principal};
use crate::model::TenantId;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Lifetime of idempotency locks, in seconds.
    pub lock_ttl_secs: u64,
    /// Upper bound for advancing one schedule, in seconds.
    pub schedule_timeout_secs: u64,
    /// Identity the batch runs as.
    pub principal: PrincipalConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            lock_ttl_secs: 3600,
            schedule_timeout_secs: 30,
            principal: PrincipalConfig::default(),
        }
    }
}

impl ExecutorConfig {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn schedule_timeout(&self) -> Duration {
        Duration::from_secs(self.schedule_timeout_secs)
    }
}

/// Scheduler identity. An empty entity means no principal is configured.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrincipalConfig {
    pub entity: String,
    pub tenant: String,
    /// `action:resource[:scope]` strings.
    pub features: Vec<String>,
}

impl Default for PrincipalConfig {
    fn default() -> Self {
        Self {
            entity: "billing-scheduler".to_string(),
            tenant: "system".to_string(),
            features: vec!["write:org:all".to_string()],
        }
    }
}

impl PrincipalConfig {
    pub fn to_principal(&self) -> Result<Option<Principal>, FeatureParseError> {
        if self.entity.is_empty() {
            return Ok(None);
        }
        Principal::with_feature_strings(
            self.entity.clone(),
            TenantId::new(self.tenant.clone()),
            &self.features,
        )
        .map(Some)
    }
}

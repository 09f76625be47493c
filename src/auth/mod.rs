//! Acting principal and tenant-scoped context.
//!
//! Tenant scope is passed explicitly: every tenant-scoped operation takes a
//! [`TenantContext`]. A privileged principal obtains one for a foreign
//! tenant through [`impersonate`].

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{BillingError, Result};
use crate::model::TenantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    User,
    Org,
    Customer,
    Boleto,
    Schedule,
}

/// Reach of a permission. `All` includes `Org`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Org,
    All,
}

impl Scope {
    pub fn includes(self, required: Scope) -> bool {
        self >= required
    }
}

/// A permission in `action:resource[:scope]` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Feature {
    pub action: Action,
    pub resource: Resource,
    pub scope: Option<Scope>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid feature '{0}', expected action:resource[:scope]")]
pub struct FeatureParseError(String);

impl Feature {
    pub fn write(resource: Resource, scope: Option<Scope>) -> Self {
        Self {
            action: Action::Write,
            resource,
            scope,
        }
    }

    pub fn read(resource: Resource, scope: Option<Scope>) -> Self {
        Self {
            action: Action::Read,
            resource,
            scope,
        }
    }
}

fn parse_part<T: for<'de> Deserialize<'de>>(
    part: &str,
    raw: &str,
) -> std::result::Result<T, FeatureParseError> {
    serde_json::from_value(serde_json::Value::String(part.to_string()))
        .map_err(|_| FeatureParseError(raw.to_string()))
}

impl std::str::FromStr for Feature {
    type Err = FeatureParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(FeatureParseError(s.to_string()));
        }
        Ok(Self {
            action: parse_part(parts[0], s)?,
            resource: parse_part(parts[1], s)?,
            scope: parts.get(2).map(|p| parse_part(p, s)).transpose()?,
        })
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = |v: serde_json::Result<serde_json::Value>| {
            v.ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default()
        };
        write!(
            f,
            "{}:{}",
            name(serde_json::to_value(self.action)),
            name(serde_json::to_value(self.resource))
        )?;
        if let Some(scope) = self.scope {
            write!(f, ":{}", name(serde_json::to_value(scope)))?;
        }
        Ok(())
    }
}

/// Who is acting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Stable actor identifier, recorded as `createdBy`/`updatedBy`.
    pub entity: String,
    /// Home tenant.
    pub tenant: TenantId,
    pub features: Vec<Feature>,
}

impl Principal {
    pub fn new(entity: impl Into<String>, tenant: TenantId, features: Vec<Feature>) -> Self {
        Self {
            entity: entity.into(),
            tenant,
            features,
        }
    }

    /// Build from `action:resource[:scope]` strings.
    pub fn with_feature_strings(
        entity: impl Into<String>,
        tenant: TenantId,
        features: &[String],
    ) -> std::result::Result<Self, FeatureParseError> {
        let features = features
            .iter()
            .map(|f| f.parse())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self::new(entity, tenant, features))
    }

    /// A missing scope on either side means `Org`.
    pub fn has_permission(&self, required: Feature) -> bool {
        let required_scope = required.scope.unwrap_or(Scope::Org);
        self.features.iter().any(|f| {
            f.action == required.action
                && f.resource == required.resource
                && f.scope.unwrap_or(Scope::Org).includes(required_scope)
        })
    }

    /// Context acting within the principal's own tenant.
    pub fn home_context(&self) -> TenantContext {
        TenantContext {
            tenant: self.tenant.clone(),
            actor: self.entity.clone(),
            impersonated: false,
        }
    }
}

/// Tenant scope threaded through every tenant-owned operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant: TenantId,
    /// Actor recorded on writes. Impersonated actors read `{entity}#{home_tenant}`.
    pub actor: String,
    pub impersonated: bool,
}

/// Act as `tenant` on behalf of `actor`.
///
/// Fails with `InvalidState` when there is no acting principal and with
/// `PermissionDenied` unless it holds `write:org:all`.
pub fn impersonate(actor: Option<&Principal>, tenant: &TenantId) -> Result<TenantContext> {
    let Some(principal) = actor else {
        warn!(tenant = %tenant, "Attempt to impersonate without an acting principal");
        return Err(BillingError::InvalidState(
            "principal expected but is not set".to_string(),
        ));
    };

    if !principal.has_permission(Feature::write(Resource::Org, Some(Scope::All))) {
        warn!(
            principal = %principal.entity,
            tenant = %tenant,
            "Principal tried to impersonate without permission"
        );
        return Err(BillingError::PermissionDenied(format!(
            "{} is not allowed to impersonate organizations",
            principal.entity
        )));
    }

    let context = TenantContext {
        tenant: tenant.clone(),
        actor: format!("{}#{}", principal.entity, principal.tenant),
        impersonated: true,
    };
    info!(actor = %context.actor, tenant = %tenant, "Impersonation authorized");
    Ok(context)
}

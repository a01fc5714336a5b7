//! Reuse policies for the get-or-create components.
//!
//! Every registrar looks a resource up before creating it. `LookupPolicy`
//! decides what a failed lookup means; `DriftPolicy` decides what happens when
//! an existing resource differs from the requested one.

use crate::error::{FieldDrift, InfraError, InfraResult};
use amlinfra_abstraction::ApiResult;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tracing::warn;

/// How a lookup failure is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupPolicy {
    /// Create only when the service confirms the resource is absent; other
    /// lookup failures are returned.
    Strict,
    /// Treat any lookup failure as absence and create.
    #[default]
    Lenient,
}

/// What to do when a reused resource differs from the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftPolicy {
    Ignore,
    #[default]
    Warn,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReusePolicy {
    #[serde(default)]
    pub lookup: LookupPolicy,
    #[serde(default)]
    pub drift: DriftPolicy,
}

impl ReusePolicy {
    /// Lenient lookups, silent drift: the historical get-or-create behavior.
    #[must_use]
    pub const fn permissive() -> Self {
        Self { lookup: LookupPolicy::Lenient, drift: DriftPolicy::Ignore }
    }
}

/// Applies `policy` to a typed lookup result.
pub(crate) fn resolve_lookup<T>(
    policy: LookupPolicy,
    resource: &str,
    result: ApiResult<Option<T>>,
) -> InfraResult<Option<T>> {
    match (result, policy) {
        (Ok(found), _) => Ok(found),
        (Err(source), LookupPolicy::Strict) => {
            Err(InfraError::Lookup { resource: resource.to_string(), source })
        }
        (Err(source), LookupPolicy::Lenient) => {
            warn!(resource = %resource, error = %source, "Lookup failed, treating as absent");
            Ok(None)
        }
    }
}

/// Collects attribute differences between a requested and an existing resource.
#[derive(Debug)]
pub(crate) struct DriftCheck {
    resource: String,
    fields: Vec<FieldDrift>,
}

impl DriftCheck {
    pub fn new(resource: impl Into<String>) -> Self {
        Self { resource: resource.into(), fields: Vec::new() }
    }

    #[must_use]
    pub fn compare<T: PartialEq + Display + ?Sized>(
        mut self,
        field: &'static str,
        requested: &T,
        existing: &T,
    ) -> Self {
        if requested != existing {
            self.fields.push(FieldDrift {
                field,
                requested: requested.to_string(),
                existing: existing.to_string(),
            });
        }
        self
    }

    #[must_use]
    pub fn compare_debug<T: PartialEq + std::fmt::Debug>(
        mut self,
        field: &'static str,
        requested: &T,
        existing: &T,
    ) -> Self {
        if requested != existing {
            self.fields.push(FieldDrift {
                field,
                requested: format!("{requested:?}"),
                existing: format!("{existing:?}"),
            });
        }
        self
    }

    pub fn apply(self, policy: DriftPolicy) -> InfraResult<()> {
        if self.fields.is_empty() {
            return Ok(());
        }

        match policy {
            DriftPolicy::Ignore => Ok(()),
            DriftPolicy::Warn => {
                for drift in &self.fields {
                    warn!(
                        resource = %self.resource,
                        field = drift.field,
                        requested = %drift.requested,
                        existing = %drift.existing,
                        "Reusing existing resource; requested value ignored"
                    );
                }
                Ok(())
            }
            DriftPolicy::Fail => Err(InfraError::Drift { resource: self.resource, fields: self.fields }),
        }
    }
}

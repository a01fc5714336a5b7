use amlinfra_abstraction::ApiError;
use std::fmt;
use thiserror::Error;

pub type InfraResult<T> = std::result::Result<T, InfraError>;

/// One attribute where a reused resource differs from what was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDrift {
    pub field: &'static str,
    pub requested: String,
    pub existing: String,
}

impl fmt::Display for FieldDrift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (requested {:?}, existing {:?})", self.field, self.requested, self.existing)
    }
}

fn describe_drift(fields: &[FieldDrift]) -> String {
    fields.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("authentication error: {message}")]
    Authentication {
        message: String,
        #[source]
        source: Option<ApiError>,
    },

    #[error("{resource} lookup failed: {source}")]
    Lookup {
        resource: String,
        #[source]
        source: ApiError,
    },

    #[error("{resource} already exists with different settings: {}", describe_drift(.fields))]
    Drift { resource: String, fields: Vec<FieldDrift> },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Fails with `"{field} is required"` when `value` is blank.
pub(crate) fn require(field: &str, value: &str) -> InfraResult<()> {
    if value.trim().is_empty() {
        return Err(InfraError::Validation(format!("{field} is required")));
    }
    Ok(())
}

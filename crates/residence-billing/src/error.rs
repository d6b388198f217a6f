use crate::domain::types::UtilityKind;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Invalid {kind} rate table: {reason}")]
    InvalidRateTable { kind: UtilityKind, reason: String },

    #[error("Invalid usage {value}: {reason}")]
    InvalidUsage { value: Decimal, reason: String },

    #[error("No {kind} rate table in effect for {period}")]
    RateTableNotFound { kind: UtilityKind, period: String },

    #[error("Rate table version {version} for {kind} already exists")]
    DuplicateRateTableVersion { kind: UtilityKind, version: u32 },

    #[error("Household {household} is already billed for {kind} in {period}")]
    DuplicateBill {
        household: String,
        kind: UtilityKind,
        period: String,
    },

    #[error("Validation error for {field}: {message}")]
    ValidationError { field: String, message: String },

    #[error("Database error during {operation}: {source}")]
    DatabaseError {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BillingError {
    pub fn database(operation: &str, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        BillingError::DatabaseError {
            operation: operation.to_string(),
            source: Box::new(source),
        }
    }

    /// Errors caused by operator input rather than infrastructure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            BillingError::InvalidRateTable { .. }
                | BillingError::InvalidUsage { .. }
                | BillingError::RateTableNotFound { .. }
                | BillingError::DuplicateRateTableVersion { .. }
                | BillingError::DuplicateBill { .. }
                | BillingError::ValidationError { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BillingError>;

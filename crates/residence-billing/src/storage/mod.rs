use crate::error::{BillingError, Result};

pub mod bills;
pub mod connection;
pub mod rate_tables;
pub mod readings;

pub use bills::{BillRepository, InMemoryBillRepository, SqlBillRepository};

pub use connection::DatabaseConnection;

pub use rate_tables::{InMemoryRateTableRepository, RateTableRepository, SqlRateTableRepository};

pub use readings::{
    InMemoryMeterReadingRepository, MeterReadingRepository, SqlMeterReadingRepository,
};

/// Rate table versions are `INTEGER` columns.
pub(crate) fn version_to_db(version: u32) -> Result<i32> {
    i32::try_from(version).map_err(|_| BillingError::ValidationError {
        field: "version".to_string(),
        message: format!("rate table version {} does not fit the database column", version),
    })
}

pub(crate) fn version_from_db(version: i32) -> Result<u32> {
    u32::try_from(version).map_err(|_| BillingError::ValidationError {
        field: "version".to_string(),
        message: format!("stored rate table version {} is negative", version),
    })
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_column_conversions() {
        assert_eq!(version_to_db(7).unwrap(), 7);
        assert_eq!(version_from_db(7).unwrap(), 7);
        assert_eq!(version_to_db(i32::MAX as u32).unwrap(), i32::MAX);

        let err = version_to_db(u32::MAX).unwrap_err();
        assert!(matches!(err, BillingError::ValidationError { .. }));
        assert!(version_from_db(-1).is_err());
    }
}

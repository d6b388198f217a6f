use crate::domain::billing_run::MeterReading;
use crate::domain::types::{BillingPeriod, HouseholdId, UtilityKind};
use crate::error::{BillingError, Result};
use crate::storage::connection::DatabaseConnection;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[async_trait]
pub trait MeterReadingRepository: Send + Sync {
    /// Insert or replace the reading for its household, utility and period.
    async fn record_reading(&self, reading: &MeterReading) -> Result<()>;
    async fn get_reading(
        &self,
        household: &HouseholdId,
        kind: UtilityKind,
        period: BillingPeriod,
    ) -> Result<Option<MeterReading>>;
    /// Ordered by household, then utility.
    async fn readings_for_period(&self, period: BillingPeriod) -> Result<Vec<MeterReading>>;
}

pub struct SqlMeterReadingRepository {
    connection: Arc<DatabaseConnection>,
}

impl SqlMeterReadingRepository {
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }

    fn from_row(row: &PgRow) -> Result<MeterReading> {
        let kind: String = row.get("utility_kind");
        let period: NaiveDate = row.get("period");

        Ok(MeterReading {
            household: HouseholdId::new(row.get::<String, _>("household_id"))?,
            kind: kind.parse()?,
            period: BillingPeriod::from_date(period)?,
            previous: row.get("previous_value"),
            current: row.get("current_value"),
        })
    }
}

#[async_trait]
impl MeterReadingRepository for SqlMeterReadingRepository {
    async fn record_reading(&self, reading: &MeterReading) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO billing.meter_readings
                (household_id, utility_kind, period, previous_value, current_value)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (household_id, utility_kind, period)
            DO UPDATE SET previous_value = EXCLUDED.previous_value,
                          current_value = EXCLUDED.current_value,
                          recorded_at = NOW()
            "#,
        )
        .bind(reading.household.as_str())
        .bind(reading.kind.as_str())
        .bind(reading.period.first_day())
        .bind(reading.previous)
        .bind(reading.current)
        .execute(self.connection.pool())
        .await
        .map_err(|e| BillingError::database("record_reading", e))?;

        Ok(())
    }

    async fn get_reading(
        &self,
        household: &HouseholdId,
        kind: UtilityKind,
        period: BillingPeriod,
    ) -> Result<Option<MeterReading>> {
        let row = sqlx::query(
            r#"
            SELECT household_id, utility_kind, period, previous_value, current_value
            FROM billing.meter_readings
            WHERE household_id = $1 AND utility_kind = $2 AND period = $3
            "#,
        )
        .bind(household.as_str())
        .bind(kind.as_str())
        .bind(period.first_day())
        .fetch_optional(self.connection.pool())
        .await
        .map_err(|e| BillingError::database("get_reading", e))?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn readings_for_period(&self, period: BillingPeriod) -> Result<Vec<MeterReading>> {
        let rows = sqlx::query(
            r#"
            SELECT household_id, utility_kind, period, previous_value, current_value
            FROM billing.meter_readings
            WHERE period = $1
            ORDER BY household_id, utility_kind
            "#,
        )
        .bind(period.first_day())
        .fetch_all(self.connection.pool())
        .await
        .map_err(|e| BillingError::database("readings_for_period", e))?;

        rows.iter().map(Self::from_row).collect()
    }
}

type ReadingKey = (HouseholdId, UtilityKind, BillingPeriod);

#[derive(Default)]
pub struct InMemoryMeterReadingRepository {
    readings: Arc<RwLock<HashMap<ReadingKey, MeterReading>>>,
}

impl InMemoryMeterReadingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MeterReadingRepository for InMemoryMeterReadingRepository {
    async fn record_reading(&self, reading: &MeterReading) -> Result<()> {
        let mut readings = self.readings.write().await;
        readings.insert(
            (reading.household.clone(), reading.kind, reading.period),
            reading.clone(),
        );
        Ok(())
    }

    async fn get_reading(
        &self,
        household: &HouseholdId,
        kind: UtilityKind,
        period: BillingPeriod,
    ) -> Result<Option<MeterReading>> {
        let readings = self.readings.read().await;
        Ok(readings.get(&(household.clone(), kind, period)).cloned())
    }

    async fn readings_for_period(&self, period: BillingPeriod) -> Result<Vec<MeterReading>> {
        let readings = self.readings.read().await;
        let mut matching: Vec<_> = readings
            .values()
            .filter(|r| r.period == period)
            .cloned()
            .collect();
        matching.sort_by(|a, b| (&a.household, a.kind).cmp(&(&b.household, b.kind)));
        Ok(matching)
    }
}

use crate::domain::billing_run::UtilityBill;
use crate::domain::types::{BillId, BillingPeriod, HouseholdId, Money, RateTableId, Usage};
use crate::error::{BillingError, Result};
use crate::storage::connection::DatabaseConnection;
use crate::storage::{is_unique_violation, version_from_db, version_to_db};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

#[async_trait]
pub trait BillRepository: Send + Sync {
    /// Stores all bills or none. Returns the number inserted.
    async fn insert_bills(&self, bills: &[UtilityBill]) -> Result<u64>;
    async fn get_bill(&self, id: &BillId) -> Result<Option<UtilityBill>>;
    async fn bills_for_period(&self, period: BillingPeriod) -> Result<Vec<UtilityBill>>;
    /// Newest period first.
    async fn bills_for_household(&self, household: &HouseholdId) -> Result<Vec<UtilityBill>>;
}

pub struct SqlBillRepository {
    connection: Arc<DatabaseConnection>,
}

impl SqlBillRepository {
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }

    fn from_row(row: &PgRow) -> Result<UtilityBill> {
        let kind: String = row.get("utility_kind");
        let period: NaiveDate = row.get("period");
        let usage: Decimal = row.get("usage");
        let amount: Decimal = row.get("amount");
        let lines: serde_json::Value = row.get("lines");

        Ok(UtilityBill {
            id: BillId::from_uuid(row.get("bill_id")),
            household: HouseholdId::new(row.get::<String, _>("household_id"))?,
            kind: kind.parse()?,
            period: BillingPeriod::from_date(period)?,
            usage: Usage::new(usage)?,
            amount: Money::from_stored(amount),
            rate_table_id: RateTableId::from_uuid(row.get("rate_table_id")),
            rate_table_version: version_from_db(row.get("rate_table_version"))?,
            lines: serde_json::from_value(lines)?,
            created_at: row.get("created_at"),
        })
    }
}

fn duplicate_bill(bill: &UtilityBill) -> BillingError {
    BillingError::DuplicateBill {
        household: bill.household.to_string(),
        kind: bill.kind,
        period: bill.period.to_string(),
    }
}

const SELECT_BILLS: &str = r#"
    SELECT bill_id, household_id, utility_kind, period, usage, amount,
           rate_table_id, rate_table_version, lines, created_at
    FROM billing.utility_bills
"#;

#[async_trait]
impl BillRepository for SqlBillRepository {
    async fn insert_bills(&self, bills: &[UtilityBill]) -> Result<u64> {
        if bills.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .connection
            .pool()
            .begin()
            .await
            .map_err(|e| BillingError::database("begin_insert_bills", e))?;

        let mut inserted = 0;
        for bill in bills {
            let lines = serde_json::to_value(&bill.lines)?;
            let version = version_to_db(bill.rate_table_version)?;
            let result = sqlx::query(
                r#"
                INSERT INTO billing.utility_bills
                    (bill_id, household_id, utility_kind, period, usage, amount,
                     rate_table_id, rate_table_version, lines, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(bill.id.as_uuid())
            .bind(bill.household.as_str())
            .bind(bill.kind.as_str())
            .bind(bill.period.first_day())
            .bind(bill.usage.as_decimal())
            .bind(bill.amount.as_decimal())
            .bind(bill.rate_table_id.as_uuid())
            .bind(version)
            .bind(lines)
            .bind(bill.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    warn!(
                        "Household {} already has a {} bill for {}",
                        bill.household, bill.kind, bill.period
                    );
                    duplicate_bill(bill)
                } else {
                    BillingError::database("insert_bills", e)
                }
            })?;
            inserted += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| BillingError::database("commit_insert_bills", e))?;

        Ok(inserted)
    }

    async fn get_bill(&self, id: &BillId) -> Result<Option<UtilityBill>> {
        let query = format!("{} WHERE bill_id = $1", SELECT_BILLS);
        let row = sqlx::query(&query)
            .bind(id.as_uuid())
            .fetch_optional(self.connection.pool())
            .await
            .map_err(|e| BillingError::database("get_bill", e))?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn bills_for_period(&self, period: BillingPeriod) -> Result<Vec<UtilityBill>> {
        let query = format!(
            "{} WHERE period = $1 ORDER BY household_id, utility_kind",
            SELECT_BILLS
        );
        let rows = sqlx::query(&query)
            .bind(period.first_day())
            .fetch_all(self.connection.pool())
            .await
            .map_err(|e| BillingError::database("bills_for_period", e))?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn bills_for_household(&self, household: &HouseholdId) -> Result<Vec<UtilityBill>> {
        let query = format!(
            "{} WHERE household_id = $1 ORDER BY period DESC, utility_kind",
            SELECT_BILLS
        );
        let rows = sqlx::query(&query)
            .bind(household.as_str())
            .fetch_all(self.connection.pool())
            .await
            .map_err(|e| BillingError::database("bills_for_household", e))?;

        rows.iter().map(Self::from_row).collect()
    }
}

#[derive(Default)]
pub struct InMemoryBillRepository {
    bills: Arc<RwLock<Vec<UtilityBill>>>,
}

impl InMemoryBillRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BillRepository for InMemoryBillRepository {
    async fn insert_bills(&self, bills: &[UtilityBill]) -> Result<u64> {
        let mut stored = self.bills.write().await;

        for (i, bill) in bills.iter().enumerate() {
            let duplicate = stored.iter().chain(&bills[..i]).any(|b| {
                b.household == bill.household && b.kind == bill.kind && b.period == bill.period
            });
            if duplicate {
                return Err(duplicate_bill(bill));
            }
        }

        stored.extend_from_slice(bills);
        Ok(bills.len() as u64)
    }

    async fn get_bill(&self, id: &BillId) -> Result<Option<UtilityBill>> {
        let bills = self.bills.read().await;
        Ok(bills.iter().find(|b| &b.id == id).cloned())
    }

    async fn bills_for_period(&self, period: BillingPeriod) -> Result<Vec<UtilityBill>> {
        let bills = self.bills.read().await;
        let mut matching: Vec<_> = bills.iter().filter(|b| b.period == period).cloned().collect();
        matching.sort_by(|a, b| (&a.household, a.kind).cmp(&(&b.household, b.kind)));
        Ok(matching)
    }

    async fn bills_for_household(&self, household: &HouseholdId) -> Result<Vec<UtilityBill>> {
        let bills = self.bills.read().await;
        let mut matching: Vec<_> = bills
            .iter()
            .filter(|b| &b.household == household)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.period.cmp(&a.period).then(a.kind.cmp(&b.kind)));
        Ok(matching)
    }
}

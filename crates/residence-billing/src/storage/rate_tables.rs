use crate::domain::rate_table::RateTable;
use crate::domain::tariffs::RateTableVersion;
use crate::domain::types::{BillingPeriod, RateTableId, UtilityKind};
use crate::error::{BillingError, Result};
use crate::storage::connection::DatabaseConnection;
use crate::storage::{is_unique_violation, version_from_db, version_to_db};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::sync::Arc;
use tokio::sync::RwLock;

#[async_trait]
pub trait RateTableRepository: Send + Sync {
    async fn insert_version(&self, version: &RateTableVersion) -> Result<()>;
    async fn latest_version(&self, kind: UtilityKind) -> Result<Option<RateTableVersion>>;
    /// Highest version number among those with `effective_from <= period`.
    async fn effective_version(
        &self,
        kind: UtilityKind,
        period: BillingPeriod,
    ) -> Result<Option<RateTableVersion>>;
    /// Newest version first.
    async fn list_versions(&self, kind: UtilityKind) -> Result<Vec<RateTableVersion>>;
    async fn get_version(&self, id: &RateTableId) -> Result<Option<RateTableVersion>>;
}

pub struct SqlRateTableRepository {
    connection: Arc<DatabaseConnection>,
}

impl SqlRateTableRepository {
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }

    fn from_row(row: &PgRow) -> Result<RateTableVersion> {
        let kind: String = row.get("utility_kind");
        let brackets: serde_json::Value = row.get("brackets");
        let effective_from: NaiveDate = row.get("effective_from");

        Ok(RateTableVersion {
            id: RateTableId::from_uuid(row.get("rate_table_id")),
            kind: kind.parse()?,
            version: version_from_db(row.get("version"))?,
            effective_from: BillingPeriod::from_date(effective_from)?,
            table: RateTable::new(serde_json::from_value(brackets)?),
            note: row.get("note"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl RateTableRepository for SqlRateTableRepository {
    async fn insert_version(&self, version: &RateTableVersion) -> Result<()> {
        let brackets = serde_json::to_value(&version.table.brackets)?;
        let number = version_to_db(version.version)?;

        sqlx::query(
            r#"
            INSERT INTO billing.rate_tables
                (rate_table_id, utility_kind, version, effective_from, brackets, note, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(version.id.as_uuid())
        .bind(version.kind.as_str())
        .bind(number)
        .bind(version.effective_from.first_day())
        .bind(brackets)
        .bind(&version.note)
        .bind(version.created_at)
        .execute(self.connection.pool())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                BillingError::DuplicateRateTableVersion {
                    kind: version.kind,
                    version: version.version,
                }
            } else {
                BillingError::database("insert_rate_table_version", e)
            }
        })?;

        Ok(())
    }

    async fn latest_version(&self, kind: UtilityKind) -> Result<Option<RateTableVersion>> {
        let row = sqlx::query(
            r#"
            SELECT rate_table_id, utility_kind, version, effective_from, brackets, note, created_at
            FROM billing.rate_tables
            WHERE utility_kind = $1
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(kind.as_str())
        .fetch_optional(self.connection.pool())
        .await
        .map_err(|e| BillingError::database("latest_rate_table_version", e))?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn effective_version(
        &self,
        kind: UtilityKind,
        period: BillingPeriod,
    ) -> Result<Option<RateTableVersion>> {
        let row = sqlx::query(
            r#"
            SELECT rate_table_id, utility_kind, version, effective_from, brackets, note, created_at
            FROM billing.rate_tables
            WHERE utility_kind = $1 AND effective_from <= $2
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(kind.as_str())
        .bind(period.first_day())
        .fetch_optional(self.connection.pool())
        .await
        .map_err(|e| BillingError::database("effective_rate_table_version", e))?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list_versions(&self, kind: UtilityKind) -> Result<Vec<RateTableVersion>> {
        let rows = sqlx::query(
            r#"
            SELECT rate_table_id, utility_kind, version, effective_from, brackets, note, created_at
            FROM billing.rate_tables
            WHERE utility_kind = $1
            ORDER BY version DESC
            "#,
        )
        .bind(kind.as_str())
        .fetch_all(self.connection.pool())
        .await
        .map_err(|e| BillingError::database("list_rate_table_versions", e))?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn get_version(&self, id: &RateTableId) -> Result<Option<RateTableVersion>> {
        let row = sqlx::query(
            r#"
            SELECT rate_table_id, utility_kind, version, effective_from, brackets, note, created_at
            FROM billing.rate_tables
            WHERE rate_table_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(self.connection.pool())
        .await
        .map_err(|e| BillingError::database("get_rate_table_version", e))?;

        row.as_ref().map(Self::from_row).transpose()
    }
}

/// In-memory rate table store for tests and database-less runs
#[derive(Default)]
pub struct InMemoryRateTableRepository {
    versions: Arc<RwLock<Vec<RateTableVersion>>>,
}

impl InMemoryRateTableRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateTableRepository for InMemoryRateTableRepository {
    async fn insert_version(&self, version: &RateTableVersion) -> Result<()> {
        let mut versions = self.versions.write().await;
        if versions
            .iter()
            .any(|v| v.kind == version.kind && v.version == version.version)
        {
            return Err(BillingError::DuplicateRateTableVersion {
                kind: version.kind,
                version: version.version,
            });
        }
        versions.push(version.clone());
        Ok(())
    }

    async fn latest_version(&self, kind: UtilityKind) -> Result<Option<RateTableVersion>> {
        let versions = self.versions.read().await;
        Ok(versions
            .iter()
            .filter(|v| v.kind == kind)
            .max_by_key(|v| v.version)
            .cloned())
    }

    async fn effective_version(
        &self,
        kind: UtilityKind,
        period: BillingPeriod,
    ) -> Result<Option<RateTableVersion>> {
        let versions = self.versions.read().await;
        Ok(versions
            .iter()
            .filter(|v| v.kind == kind && v.is_effective_for(period))
            .max_by_key(|v| v.version)
            .cloned())
    }

    async fn list_versions(&self, kind: UtilityKind) -> Result<Vec<RateTableVersion>> {
        let versions = self.versions.read().await;
        let mut matching: Vec<_> = versions.iter().filter(|v| v.kind == kind).cloned().collect();
        matching.sort_by_key(|v| std::cmp::Reverse(v.version));
        Ok(matching)
    }

    async fn get_version(&self, id: &RateTableId) -> Result<Option<RateTableVersion>> {
        let versions = self.versions.read().await;
        Ok(versions.iter().find(|v| &v.id == id).cloned())
    }
}

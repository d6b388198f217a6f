use crate::domain::rate_table::{RateTable, ValidatedRateTable};
use crate::domain::types::{BillingPeriod, RateTableId, UtilityKind};
use crate::error::{BillingError, Result};
use crate::storage::RateTableRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// A published rate table
///
/// Versions are immutable. Changing prices means publishing a new version,
/// so every bill can be traced back to the exact table it was charged with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTableVersion {
    pub id: RateTableId,
    pub kind: UtilityKind,
    pub version: u32,
    pub effective_from: BillingPeriod,
    pub table: RateTable,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RateTableVersion {
    pub fn new(
        kind: UtilityKind,
        version: u32,
        effective_from: BillingPeriod,
        table: ValidatedRateTable,
        note: Option<String>,
    ) -> Self {
        Self {
            id: RateTableId::new(),
            kind,
            version,
            effective_from,
            table: table.into_rate_table(),
            note,
            created_at: Utc::now(),
        }
    }

    /// Stored tables were validated on publish; this re-checks rows loaded
    /// from storage before they are charged against.
    pub fn validated(&self) -> Result<ValidatedRateTable> {
        self.table.validate(self.kind)
    }

    pub fn is_effective_for(&self, period: BillingPeriod) -> bool {
        self.effective_from <= period
    }
}

#[async_trait]
pub trait TariffOperations: Send + Sync {
    async fn publish(
        &self,
        kind: UtilityKind,
        table: RateTable,
        effective_from: BillingPeriod,
        note: Option<String>,
    ) -> Result<RateTableVersion>;

    /// Newest version (highest version number) whose `effective_from` is not
    /// after `period`. A later version backdated to an earlier period
    /// therefore supersedes every version published before it.
    async fn effective_for(
        &self,
        kind: UtilityKind,
        period: BillingPeriod,
    ) -> Result<RateTableVersion>;

    async fn history(&self, kind: UtilityKind) -> Result<Vec<RateTableVersion>>;

    async fn get(&self, id: &RateTableId) -> Result<Option<RateTableVersion>>;
}

pub struct TariffService {
    repository: Arc<dyn RateTableRepository + Send + Sync>,
}

impl TariffService {
    pub fn new(repository: Arc<dyn RateTableRepository + Send + Sync>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl TariffOperations for TariffService {
    async fn publish(
        &self,
        kind: UtilityKind,
        table: RateTable,
        effective_from: BillingPeriod,
        note: Option<String>,
    ) -> Result<RateTableVersion> {
        let validated = table.validate(kind)?;

        let next_version = self
            .repository
            .latest_version(kind)
            .await?
            .map(|v| v.version + 1)
            .unwrap_or(1);

        let version = RateTableVersion::new(kind, next_version, effective_from, validated, note);
        self.repository.insert_version(&version).await?;

        info!(
            "Published {} rate table v{} ({} tiers) effective from {}",
            kind,
            version.version,
            version.table.brackets.len(),
            effective_from
        );
        Ok(version)
    }

    async fn effective_for(
        &self,
        kind: UtilityKind,
        period: BillingPeriod,
    ) -> Result<RateTableVersion> {
        let version = self
            .repository
            .effective_version(kind, period)
            .await?
            .ok_or_else(|| BillingError::RateTableNotFound {
                kind,
                period: period.to_string(),
            })?;

        debug!(
            "Using {} rate table v{} for {}",
            kind, version.version, period
        );
        Ok(version)
    }

    async fn history(&self, kind: UtilityKind) -> Result<Vec<RateTableVersion>> {
        self.repository.list_versions(kind).await
    }

    async fn get(&self, id: &RateTableId) -> Result<Option<RateTableVersion>> {
        self.repository.get_version(id).await
    }
}

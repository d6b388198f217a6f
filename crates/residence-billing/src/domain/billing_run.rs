use crate::domain::rate_table::{TierCharge, ValidatedRateTable};
use crate::domain::tariffs::{RateTableVersion, TariffOperations};
use crate::domain::types::{
    BillId, BillingPeriod, HouseholdId, Money, RateTableId, Usage, UtilityKind,
};
use crate::error::Result;
use crate::storage::{BillRepository, MeterReadingRepository};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Cumulative meter values at the start and end of a billing period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterReading {
    pub household: HouseholdId,
    pub kind: UtilityKind,
    pub period: BillingPeriod,
    pub previous: Decimal,
    pub current: Decimal,
}

impl MeterReading {
    pub fn new(
        household: HouseholdId,
        kind: UtilityKind,
        period: BillingPeriod,
        previous: Decimal,
        current: Decimal,
    ) -> Self {
        Self {
            household,
            kind,
            period,
            previous,
            current,
        }
    }

    pub fn usage(&self) -> Result<Usage> {
        Usage::between_readings(self.previous, self.current)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilityBill {
    pub id: BillId,
    pub household: HouseholdId,
    pub kind: UtilityKind,
    pub period: BillingPeriod,
    pub usage: Usage,
    pub amount: Money,
    pub rate_table_id: RateTableId,
    pub rate_table_version: u32,
    pub lines: Vec<TierCharge>,
    pub created_at: DateTime<Utc>,
}

impl UtilityBill {
    pub fn compute(
        household: HouseholdId,
        period: BillingPeriod,
        usage: Usage,
        version: &RateTableVersion,
        table: &ValidatedRateTable,
        amount_scale: u32,
    ) -> Self {
        let breakdown = table.breakdown(usage);
        Self {
            id: BillId::new(),
            household,
            kind: version.kind,
            period,
            usage,
            amount: Money::from_decimal(breakdown.total, amount_scale),
            rate_table_id: version.id,
            rate_table_version: version.version,
            lines: breakdown.lines,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingRunSummary {
    pub period: BillingPeriod,
    pub bills_created: usize,
    pub bills_skipped: usize,
    pub revenue: BTreeMap<UtilityKind, Money>,
}

impl BillingRunSummary {
    fn empty(period: BillingPeriod) -> Self {
        Self {
            period,
            bills_created: 0,
            bills_skipped: 0,
            revenue: BTreeMap::new(),
        }
    }

    pub fn total_revenue(&self) -> Money {
        self.revenue.values().copied().sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindRevenue {
    pub bills: usize,
    pub usage: Decimal,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueReport {
    pub period: BillingPeriod,
    pub by_kind: BTreeMap<UtilityKind, KindRevenue>,
}

impl RevenueReport {
    pub fn from_bills(period: BillingPeriod, bills: &[UtilityBill]) -> Self {
        let mut by_kind: BTreeMap<UtilityKind, KindRevenue> = BTreeMap::new();
        for bill in bills.iter().filter(|b| b.period == period) {
            let entry = by_kind.entry(bill.kind).or_insert(KindRevenue {
                bills: 0,
                usage: Decimal::ZERO,
                total: Money::zero(),
            });
            entry.bills += 1;
            entry.usage += bill.usage.as_decimal();
            entry.total = entry.total.add(bill.amount);
        }
        Self { period, by_kind }
    }

    pub fn total(&self) -> Money {
        self.by_kind.values().map(|r| r.total).sum()
    }
}

/// Turns a period's meter readings into persisted utility bills
pub struct BillingRunner {
    tariffs: Arc<dyn TariffOperations>,
    readings: Arc<dyn MeterReadingRepository + Send + Sync>,
    bills: Arc<dyn BillRepository + Send + Sync>,
    amount_scale: u32,
}

impl BillingRunner {
    pub fn new(
        tariffs: Arc<dyn TariffOperations>,
        readings: Arc<dyn MeterReadingRepository + Send + Sync>,
        bills: Arc<dyn BillRepository + Send + Sync>,
    ) -> Self {
        Self {
            tariffs,
            readings,
            bills,
            amount_scale: Money::DEFAULT_SCALE,
        }
    }

    pub fn with_amount_scale(mut self, amount_scale: u32) -> Self {
        self.amount_scale = amount_scale;
        self
    }

    /// Bill every household with a reading in `period`.
    ///
    /// Tables and readings are all checked before anything is written: an
    /// invalid or missing table for any utility, or a meter reading that went
    /// backwards, aborts the run with no bills stored. Households already
    /// billed for the period are skipped, so a run can be repeated safely.
    pub async fn run(&self, period: BillingPeriod) -> Result<BillingRunSummary> {
        info!("Starting billing run for {}", period);

        let readings = self.readings.readings_for_period(period).await?;
        if readings.is_empty() {
            warn!("No meter readings recorded for {}", period);
            return Ok(BillingRunSummary::empty(period));
        }

        let tables = self.resolve_tables(&readings, period).await?;

        let mut usages = Vec::with_capacity(readings.len());
        for reading in &readings {
            let usage = reading.usage().map_err(|e| {
                error!(
                    "Rejecting {} reading for household {}: {}",
                    reading.kind, reading.household, e
                );
                e
            })?;
            usages.push((reading, usage));
        }

        let already_billed: HashSet<(HouseholdId, UtilityKind)> = self
            .bills
            .bills_for_period(period)
            .await?
            .into_iter()
            .map(|b| (b.household, b.kind))
            .collect();

        let mut summary = BillingRunSummary::empty(period);
        let mut new_bills = Vec::new();

        for (reading, usage) in usages {
            if already_billed.contains(&(reading.household.clone(), reading.kind)) {
                debug!(
                    "Household {} already billed for {} in {}",
                    reading.household, reading.kind, period
                );
                summary.bills_skipped += 1;
                continue;
            }

            let (version, table) = &tables[&reading.kind];
            let bill = UtilityBill::compute(
                reading.household.clone(),
                period,
                usage,
                version,
                table,
                self.amount_scale,
            );
            debug!(
                "Household {} used {} {} of {}: {}",
                bill.household,
                usage,
                bill.kind.unit(),
                bill.kind,
                bill.amount
            );

            let revenue = summary.revenue.entry(bill.kind).or_insert(Money::zero());
            *revenue = revenue.add(bill.amount);
            new_bills.push(bill);
        }

        summary.bills_created = self.bills.insert_bills(&new_bills).await? as usize;

        if summary.bills_skipped > 0 {
            warn!(
                "Skipped {} households already billed for {}",
                summary.bills_skipped, period
            );
        }
        info!(
            "Billing run for {} created {} bills totalling {}",
            period,
            summary.bills_created,
            summary.total_revenue()
        );
        Ok(summary)
    }

    /// Price `usage` with the table in effect for `period` without storing anything.
    pub async fn quote(
        &self,
        household: HouseholdId,
        kind: UtilityKind,
        period: BillingPeriod,
        usage: Usage,
    ) -> Result<UtilityBill> {
        let version = self.tariffs.effective_for(kind, period).await?;
        let table = version.validated()?;
        Ok(UtilityBill::compute(
            household,
            period,
            usage,
            &version,
            &table,
            self.amount_scale,
        ))
    }

    pub async fn revenue_for_period(&self, period: BillingPeriod) -> Result<RevenueReport> {
        let bills = self.bills.bills_for_period(period).await?;
        Ok(RevenueReport::from_bills(period, &bills))
    }

    async fn resolve_tables(
        &self,
        readings: &[MeterReading],
        period: BillingPeriod,
    ) -> Result<BTreeMap<UtilityKind, (RateTableVersion, ValidatedRateTable)>> {
        let mut tables = BTreeMap::new();
        for reading in readings {
            if tables.contains_key(&reading.kind) {
                continue;
            }
            let version = self.tariffs.effective_for(reading.kind, period).await?;
            let table = version.validated().map_err(|e| {
                error!(
                    "Aborting billing run for {}: {} rate table v{} is invalid",
                    period, reading.kind, version.version
                );
                e
            })?;
            tables.insert(reading.kind, (version, table));
        }
        Ok(tables)
    }
}

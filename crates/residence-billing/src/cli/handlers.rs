use crate::cli::output;
use crate::config::BillingConfig;
use crate::domain::billing_run::{BillingRunner, MeterReading};
use crate::domain::rate_table::RateTable;
use crate::domain::tariffs::{TariffOperations, TariffService};
use crate::domain::types::{BillingPeriod, HouseholdId, Money, Usage, UtilityKind};
use crate::storage::{
    BillRepository, DatabaseConnection, MeterReadingRepository, SqlBillRepository,
    SqlMeterReadingRepository, SqlRateTableRepository,
};
use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Read a rate table from a `.json` file, or TOML for any other extension.
pub fn load_rate_table(path: &Path) -> Result<RateTable> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read rate table {}", path.display()))?;

    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let table = if is_json {
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse rate table {}", path.display()))?
    } else {
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse rate table {}", path.display()))?
    };
    Ok(table)
}

fn current_period() -> Result<BillingPeriod> {
    let today = Utc::now().date_naive();
    Ok(BillingPeriod::new(today.year(), today.month())?)
}

struct Services {
    connection: Arc<DatabaseConnection>,
    tariffs: Arc<TariffService>,
    readings: Arc<SqlMeterReadingRepository>,
    bills: Arc<SqlBillRepository>,
    amount_scale: u32,
}

impl Services {
    async fn connect(config: &BillingConfig) -> Result<Self> {
        let connection = Arc::new(DatabaseConnection::connect(&config.database).await?);
        let amount_scale = config.billing.amount_scale;

        Ok(Self {
            tariffs: Arc::new(TariffService::new(Arc::new(SqlRateTableRepository::new(
                connection.clone(),
            )))),
            readings: Arc::new(SqlMeterReadingRepository::new(connection.clone())),
            bills: Arc::new(SqlBillRepository::new(connection.clone())),
            connection,
            amount_scale,
        })
    }

    fn runner(&self) -> BillingRunner {
        BillingRunner::new(
            self.tariffs.clone(),
            self.readings.clone(),
            self.bills.clone(),
        )
        .with_amount_scale(self.amount_scale)
    }

    async fn close(self) {
        self.connection.close().await;
    }
}

pub fn handle_check_table(kind: UtilityKind, file: &Path) -> Result<()> {
    let table = load_rate_table(file)?;
    match table.validate(kind) {
        Ok(validated) => {
            println!(
                "{} rate table {} is valid ({} tiers)",
                kind,
                file.display(),
                validated.brackets().len()
            );
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            Err(e.into())
        }
    }
}

pub async fn handle_quote(
    config: &BillingConfig,
    kind: UtilityKind,
    usage: Decimal,
    file: Option<std::path::PathBuf>,
    period: Option<BillingPeriod>,
    json: bool,
) -> Result<()> {
    let usage = Usage::new(usage)?;

    let breakdown = match file {
        Some(path) => load_rate_table(&path)?.validate(kind)?.breakdown(usage),
        None => {
            let period = match period {
                Some(period) => period,
                None => current_period()?,
            };
            let services = Services::connect(config).await?;
            let version = services.tariffs.effective_for(kind, period).await;
            services.close().await;

            let version = version?;
            info!(
                "Quoting with {} rate table v{} effective from {}",
                kind, version.version, version.effective_from
            );
            version.validated()?.breakdown(usage)
        }
    };

    let amount = Money::from_decimal(breakdown.total, config.billing.amount_scale);
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "kind": kind,
                "breakdown": breakdown,
                "amount": amount,
                "currency": config.billing.currency,
            }))?
        );
    } else {
        output::print_breakdown(kind, &breakdown, amount, &config.billing.currency);
    }
    Ok(())
}

pub async fn handle_publish(
    config: &BillingConfig,
    kind: UtilityKind,
    file: &Path,
    effective: BillingPeriod,
    note: Option<String>,
) -> Result<()> {
    let table = load_rate_table(file)?;
    // Fail before touching the database.
    table.validate(kind)?;

    let services = Services::connect(config).await?;
    let result = services.tariffs.publish(kind, table, effective, note).await;
    services.close().await;

    let version = result?;
    println!(
        "Published {} rate table v{} ({}) effective from {}",
        kind, version.version, version.id, version.effective_from
    );
    Ok(())
}

pub async fn handle_tariffs(config: &BillingConfig, kind: UtilityKind, json: bool) -> Result<()> {
    let services = Services::connect(config).await?;
    let result = services.tariffs.history(kind).await;
    services.close().await;

    let versions = result?;
    if json {
        println!("{}", serde_json::to_string_pretty(&versions)?);
    } else {
        output::print_tariffs(&versions);
    }
    Ok(())
}

pub async fn handle_reading(
    config: &BillingConfig,
    household: String,
    kind: UtilityKind,
    period: BillingPeriod,
    previous: Decimal,
    current: Decimal,
) -> Result<()> {
    let reading = MeterReading::new(HouseholdId::new(household)?, kind, period, previous, current);
    let usage = reading.usage()?;

    let services = Services::connect(config).await?;
    let result = services.readings.record_reading(&reading).await;
    services.close().await;
    result?;

    println!(
        "Recorded {} {} of {} for household {} in {}",
        usage,
        kind.unit(),
        kind,
        reading.household,
        period
    );
    Ok(())
}

pub async fn handle_run(config: &BillingConfig, period: BillingPeriod, json: bool) -> Result<()> {
    let services = Services::connect(config).await?;
    let result = services.runner().run(period).await;
    services.close().await;

    let summary = result.map_err(|e| {
        error!("Billing run for {} failed: {}", period, e);
        anyhow!(e)
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        output::print_run_summary(&summary, &config.billing.currency);
    }
    Ok(())
}

pub async fn handle_revenue(config: &BillingConfig, period: BillingPeriod, json: bool) -> Result<()> {
    let services = Services::connect(config).await?;
    let result = services.runner().revenue_for_period(period).await;
    services.close().await;

    let report = result?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output::print_revenue(&report, &config.billing.currency);
    }
    Ok(())
}

pub async fn handle_bills(config: &BillingConfig, household: String, json: bool) -> Result<()> {
    let household = HouseholdId::new(household)?;

    let services = Services::connect(config).await?;
    let result = services.bills.bills_for_household(&household).await;
    services.close().await;

    let bills = result?;
    if json {
        println!("{}", serde_json::to_string_pretty(&bills)?);
    } else {
        output::print_bills(&bills, &config.billing.currency);
    }
    Ok(())
}

pub async fn handle_migrate(config: &BillingConfig) -> Result<()> {
    let services = Services::connect(config).await?;
    let result = services.connection.run_migrations().await;
    services.close().await;
    result?;

    println!("Database schema is up to date");
    Ok(())
}

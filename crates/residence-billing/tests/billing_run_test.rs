use pretty_assertions::assert_eq;
use residence_billing::domain::{
    BillingPeriod, BillingRunner, HouseholdId, MeterReading, RateBracket, RateTable,
    RateTableVersion, TariffOperations, TariffService, Usage, UtilityKind,
};
use residence_billing::storage::{
    BillRepository, InMemoryBillRepository, InMemoryMeterReadingRepository,
    InMemoryRateTableRepository, MeterReadingRepository, RateTableRepository,
};
use residence_billing::BillingError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

struct TestContext {
    rate_tables: Arc<InMemoryRateTableRepository>,
    tariffs: Arc<TariffService>,
    readings: Arc<InMemoryMeterReadingRepository>,
    bills: Arc<InMemoryBillRepository>,
    runner: BillingRunner,
}

impl TestContext {
    fn new() -> Self {
        let rate_tables = Arc::new(InMemoryRateTableRepository::new());
        let tariffs = Arc::new(TariffService::new(rate_tables.clone()));
        let readings = Arc::new(InMemoryMeterReadingRepository::new());
        let bills = Arc::new(InMemoryBillRepository::new());
        let runner = BillingRunner::new(tariffs.clone(), readings.clone(), bills.clone());

        Self {
            rate_tables,
            tariffs,
            readings,
            bills,
            runner,
        }
    }

    async fn publish_defaults(&self, effective: BillingPeriod) {
        self.tariffs
            .publish(
                UtilityKind::Electricity,
                RateTable::new(vec![
                    RateBracket::bounded(dec!(50), dec!(2)),
                    RateBracket::bounded(dec!(100), dec!(3)),
                ]),
                effective,
                None,
            )
            .await
            .expect("Failed to publish electricity table");

        self.tariffs
            .publish(
                UtilityKind::Water,
                RateTable::new(vec![
                    RateBracket::bounded(dec!(10), dec!(5.973)),
                    RateBracket::bounded(dec!(20), dec!(7.052)),
                    RateBracket::unbounded(dec!(8.669)),
                ]),
                effective,
                None,
            )
            .await
            .expect("Failed to publish water table");
    }

    async fn record(
        &self,
        household: &str,
        kind: UtilityKind,
        period: BillingPeriod,
        previous: Decimal,
        current: Decimal,
    ) {
        self.readings
            .record_reading(&MeterReading::new(
                HouseholdId::new(household).unwrap(),
                kind,
                period,
                previous,
                current,
            ))
            .await
            .expect("Failed to record reading");
    }
}

fn period(s: &str) -> BillingPeriod {
    s.parse().unwrap()
}

#[tokio::test]
async fn test_billing_run_creates_tiered_bills() {
    let ctx = TestContext::new();
    let october = period("2026-10");
    ctx.publish_defaults(period("2026-01")).await;

    ctx.record("A-101", UtilityKind::Electricity, october, dec!(1000), dec!(1030))
        .await;
    ctx.record("A-102", UtilityKind::Electricity, october, dec!(500), dec!(570))
        .await;
    ctx.record("A-103", UtilityKind::Electricity, october, dec!(0), dec!(150))
        .await;
    ctx.record("A-101", UtilityKind::Water, october, dec!(80), dec!(105.5))
        .await;

    let summary = ctx.runner.run(october).await.unwrap();
    assert_eq!(summary.bills_created, 4);
    assert_eq!(summary.bills_skipped, 0);

    let bills = ctx.bills.bills_for_period(october).await.unwrap();
    let amount = |household: &str, kind: UtilityKind| {
        bills
            .iter()
            .find(|b| b.household.as_str() == household && b.kind == kind)
            .map(|b| b.amount.as_decimal())
            .unwrap()
    };

    assert_eq!(amount("A-101", UtilityKind::Electricity), dec!(60));
    assert_eq!(amount("A-102", UtilityKind::Electricity), dec!(160));
    assert_eq!(amount("A-103", UtilityKind::Electricity), dec!(400));
    // 10 * 5.973 + 10 * 7.052 + 5.5 * 8.669 = 177.9295, rounded half away from zero
    assert_eq!(amount("A-101", UtilityKind::Water), dec!(177.93));

    assert_eq!(summary.revenue[&UtilityKind::Electricity].as_decimal(), dec!(620));
    assert_eq!(summary.total_revenue().as_decimal(), dec!(797.93));

    let water = bills
        .iter()
        .find(|b| b.kind == UtilityKind::Water)
        .unwrap();
    assert_eq!(water.lines.len(), 3);
    assert_eq!(water.rate_table_version, 1);
}

#[tokio::test]
async fn test_billing_run_is_idempotent() {
    let ctx = TestContext::new();
    let october = period("2026-10");
    ctx.publish_defaults(october).await;
    ctx.record("B-201", UtilityKind::Electricity, october, dec!(0), dec!(40))
        .await;

    let first = ctx.runner.run(october).await.unwrap();
    assert_eq!(first.bills_created, 1);

    ctx.record("B-202", UtilityKind::Electricity, october, dec!(0), dec!(10))
        .await;

    let second = ctx.runner.run(october).await.unwrap();
    assert_eq!(second.bills_created, 1);
    assert_eq!(second.bills_skipped, 1);
    assert_eq!(ctx.bills.bills_for_period(october).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_invalid_stored_table_aborts_before_writing() {
    let ctx = TestContext::new();
    let october = period("2026-10");
    ctx.publish_defaults(period("2026-01")).await;

    // Bypass publish validation to simulate a corrupted row.
    let corrupt = RateTableVersion {
        table: RateTable::new(vec![
            RateBracket::bounded(dec!(50), dec!(2)),
            RateBracket::bounded(dec!(100), dec!(3)),
            RateBracket::bounded(dec!(50), dec!(4)),
        ]),
        ..ctx
            .tariffs
            .effective_for(UtilityKind::Water, october)
            .await
            .unwrap()
    };
    let corrupt = RateTableVersion {
        id: Default::default(),
        version: 2,
        effective_from: period("2026-09"),
        ..corrupt
    };
    ctx.rate_tables.insert_version(&corrupt).await.unwrap();

    ctx.record("C-301", UtilityKind::Electricity, october, dec!(0), dec!(10))
        .await;
    ctx.record("C-301", UtilityKind::Water, october, dec!(0), dec!(10))
        .await;

    let err = ctx.runner.run(october).await.unwrap_err();
    match err {
        BillingError::InvalidRateTable { kind, .. } => assert_eq!(kind, UtilityKind::Water),
        other => panic!("unexpected error: {}", other),
    }
    assert!(ctx.bills.bills_for_period(october).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_table_names_the_utility() {
    let ctx = TestContext::new();
    let october = period("2026-10");
    ctx.tariffs
        .publish(
            UtilityKind::Electricity,
            RateTable::new(vec![RateBracket::unbounded(dec!(2.5))]),
            october,
            None,
        )
        .await
        .unwrap();

    ctx.record("D-401", UtilityKind::Electricity, october, dec!(0), dec!(10))
        .await;
    ctx.record("D-401", UtilityKind::Water, october, dec!(0), dec!(3))
        .await;

    let err = ctx.runner.run(october).await.unwrap_err();
    assert_eq!(err.to_string(), "No water rate table in effect for 2026-10");
    assert!(ctx.bills.bills_for_period(october).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_meter_rollback_aborts_run() {
    let ctx = TestContext::new();
    let october = period("2026-10");
    ctx.publish_defaults(october).await;

    ctx.record("E-501", UtilityKind::Electricity, october, dec!(0), dec!(10))
        .await;
    ctx.record("E-502", UtilityKind::Electricity, october, dec!(900), dec!(850))
        .await;

    let err = ctx.runner.run(october).await.unwrap_err();
    assert!(matches!(err, BillingError::InvalidUsage { .. }));
    assert!(ctx.bills.bills_for_period(october).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_bills_keep_the_table_version_they_were_charged_with() {
    let ctx = TestContext::new();
    let september = period("2026-09");
    let october = period("2026-10");
    ctx.publish_defaults(period("2026-01")).await;

    ctx.record("F-601", UtilityKind::Electricity, september, dec!(0), dec!(70))
        .await;
    ctx.runner.run(september).await.unwrap();

    ctx.tariffs
        .publish(
            UtilityKind::Electricity,
            RateTable::new(vec![
                RateBracket::bounded(dec!(50), dec!(4)),
                RateBracket::unbounded(dec!(6)),
            ]),
            october,
            Some("winter prices".to_string()),
        )
        .await
        .unwrap();

    ctx.record("F-601", UtilityKind::Electricity, october, dec!(70), dec!(140))
        .await;
    ctx.runner.run(october).await.unwrap();

    let household = HouseholdId::new("F-601").unwrap();
    let history = ctx.bills.bills_for_household(&household).await.unwrap();
    assert_eq!(history.len(), 2);

    assert_eq!(history[0].period, october);
    assert_eq!(history[0].rate_table_version, 2);
    assert_eq!(history[0].amount.as_decimal(), dec!(320));

    assert_eq!(history[1].period, september);
    assert_eq!(history[1].rate_table_version, 1);
    assert_eq!(history[1].amount.as_decimal(), dec!(160));

    let original = ctx
        .tariffs
        .get(&history[1].rate_table_id)
        .await
        .unwrap()
        .expect("billed table version must still exist");
    let recomputed = original.validated().unwrap().breakdown(history[1].usage);
    assert_eq!(recomputed.total, dec!(160));
}

#[tokio::test]
async fn test_quote_and_revenue() {
    let ctx = TestContext::new();
    let october = period("2026-10");
    ctx.publish_defaults(october).await;

    let quote = ctx
        .runner
        .quote(
            HouseholdId::new("G-701").unwrap(),
            UtilityKind::Electricity,
            october,
            Usage::new(dec!(70)).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(quote.amount.as_decimal(), dec!(160));
    assert!(ctx.bills.bills_for_period(october).await.unwrap().is_empty());

    ctx.record("G-701", UtilityKind::Electricity, october, dec!(0), dec!(70))
        .await;
    ctx.record("G-702", UtilityKind::Electricity, october, dec!(0), dec!(30))
        .await;
    ctx.runner.run(october).await.unwrap();

    let report = ctx.runner.revenue_for_period(october).await.unwrap();
    let electricity = report.by_kind[&UtilityKind::Electricity];
    assert_eq!(electricity.bills, 2);
    assert_eq!(electricity.usage, dec!(100));
    assert_eq!(report.total().as_decimal(), dec!(220));
}

#[tokio::test]
async fn test_empty_period_produces_empty_summary() {
    let ctx = TestContext::new();
    let summary = ctx.runner.run(period("2026-10")).await.unwrap();
    assert_eq!(summary.bills_created, 0);
    assert!(summary.revenue.is_empty());
}

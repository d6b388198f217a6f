//! Table formatting for CLI output

use crate::domain::billing_run::{BillingRunSummary, RevenueReport, UtilityBill};
use crate::domain::rate_table::FeeBreakdown;
use crate::domain::tariffs::RateTableVersion;
use crate::domain::types::{Money, UtilityKind};
use rust_decimal::Decimal;
use tabled::{settings::Style, Table, Tabled};

fn format_range(lower: Decimal, upper: Option<Decimal>) -> String {
    match upper {
        Some(upper) => format!("{} - {}", lower.normalize(), upper.normalize()),
        None => format!("> {}", lower.normalize()),
    }
}

pub fn print_breakdown(kind: UtilityKind, breakdown: &FeeBreakdown, amount: Money, currency: &str) {
    #[derive(Tabled)]
    struct TierRow {
        #[tabled(rename = "Tier")]
        tier: usize,
        #[tabled(rename = "Range")]
        range: String,
        #[tabled(rename = "Quantity")]
        quantity: String,
        #[tabled(rename = "Unit Price")]
        unit_price: String,
        #[tabled(rename = "Amount")]
        amount: String,
    }

    let rows: Vec<TierRow> = breakdown
        .lines
        .iter()
        .map(|line| TierRow {
            tier: line.tier,
            range: format_range(line.lower, line.upper),
            quantity: format!("{} {}", line.quantity.normalize(), kind.unit()),
            unit_price: line.unit_price.normalize().to_string(),
            amount: line.amount.normalize().to_string(),
        })
        .collect();

    println!("{}", Table::new(rows).with(Style::rounded()));
    println!(
        "Total for {} {} of {}: {} {}",
        breakdown.usage,
        kind.unit(),
        kind,
        amount,
        currency
    );
}

pub fn print_tariffs(versions: &[RateTableVersion]) {
    #[derive(Tabled)]
    struct TariffRow {
        #[tabled(rename = "Version")]
        version: u32,
        #[tabled(rename = "Effective From")]
        effective_from: String,
        #[tabled(rename = "Tiers")]
        tiers: usize,
        #[tabled(rename = "Published")]
        published: String,
        #[tabled(rename = "Note")]
        note: String,
    }

    if versions.is_empty() {
        println!("No rate tables published");
        return;
    }

    let rows: Vec<TariffRow> = versions
        .iter()
        .map(|v| TariffRow {
            version: v.version,
            effective_from: v.effective_from.to_string(),
            tiers: v.table.brackets.len(),
            published: v.created_at.format("%Y-%m-%d %H:%M").to_string(),
            note: v.note.clone().unwrap_or_default(),
        })
        .collect();

    println!("{}", Table::new(rows).with(Style::rounded()));
}

pub fn print_run_summary(summary: &BillingRunSummary, currency: &str) {
    println!(
        "Billing run {}: {} bills created, {} already billed",
        summary.period, summary.bills_created, summary.bills_skipped
    );
    for (kind, revenue) in &summary.revenue {
        println!("  {:<12} {} {}", kind.to_string(), revenue, currency);
    }
    println!("  {:<12} {} {}", "total", summary.total_revenue(), currency);
}

pub fn print_revenue(report: &RevenueReport, currency: &str) {
    #[derive(Tabled)]
    struct RevenueRow {
        #[tabled(rename = "Utility")]
        kind: String,
        #[tabled(rename = "Bills")]
        bills: usize,
        #[tabled(rename = "Usage")]
        usage: String,
        #[tabled(rename = "Revenue")]
        total: String,
    }

    let rows: Vec<RevenueRow> = report
        .by_kind
        .iter()
        .map(|(kind, revenue)| RevenueRow {
            kind: kind.to_string(),
            bills: revenue.bills,
            usage: format!("{} {}", revenue.usage.normalize(), kind.unit()),
            total: format!("{} {}", revenue.total, currency),
        })
        .collect();

    println!("Revenue for {}", report.period);
    println!("{}", Table::new(rows).with(Style::rounded()));
    println!("Total: {} {}", report.total(), currency);
}

pub fn print_bills(bills: &[UtilityBill], currency: &str) {
    #[derive(Tabled)]
    struct BillRow {
        #[tabled(rename = "Period")]
        period: String,
        #[tabled(rename = "Utility")]
        kind: String,
        #[tabled(rename = "Usage")]
        usage: String,
        #[tabled(rename = "Amount")]
        amount: String,
        #[tabled(rename = "Tariff")]
        tariff: String,
    }

    if bills.is_empty() {
        println!("No bills found");
        return;
    }

    let rows: Vec<BillRow> = bills
        .iter()
        .map(|b| BillRow {
            period: b.period.to_string(),
            kind: b.kind.to_string(),
            usage: format!("{} {}", b.usage.as_decimal().normalize(), b.kind.unit()),
            amount: format!("{} {}", b.amount, currency),
            tariff: format!("v{}", b.rate_table_version),
        })
        .collect();

    println!("{}", Table::new(rows).with(Style::rounded()));
}

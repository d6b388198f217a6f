use crate::domain::types::{BillingPeriod, UtilityKind};
use clap::Subcommand;
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a rate table file without storing it
    CheckTable {
        #[arg(short, long)]
        kind: UtilityKind,

        /// TOML or JSON file with `[[brackets]]` entries
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Price a usage quantity
    Quote {
        #[arg(short, long)]
        kind: UtilityKind,

        /// Metered usage (kWh or m³)
        #[arg(short, long)]
        usage: Decimal,

        /// Rate table file; defaults to the published table in effect for --period
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Billing period (YYYY-MM); defaults to the current month
        #[arg(short, long)]
        period: Option<BillingPeriod>,
    },

    /// Publish a new rate table version
    Publish {
        #[arg(short, long)]
        kind: UtilityKind,

        #[arg(short, long)]
        file: PathBuf,

        /// First billing period (YYYY-MM) the table applies to
        #[arg(short, long)]
        effective: BillingPeriod,

        #[arg(short, long)]
        note: Option<String>,
    },

    /// List published rate table versions
    Tariffs {
        #[arg(short, long)]
        kind: UtilityKind,
    },

    /// Record a household's meter reading for a period
    Reading {
        #[arg(long)]
        household: String,

        #[arg(short, long)]
        kind: UtilityKind,

        #[arg(short, long)]
        period: BillingPeriod,

        /// Meter value at the start of the period
        #[arg(long)]
        previous: Decimal,

        /// Meter value at the end of the period
        #[arg(long)]
        current: Decimal,
    },

    /// Bill every household with readings for a period
    Run {
        #[arg(short, long)]
        period: BillingPeriod,
    },

    /// Show utility revenue for a period
    Revenue {
        #[arg(short, long)]
        period: BillingPeriod,
    },

    /// Show a household's bills
    Bills {
        #[arg(long)]
        household: String,
    },

    /// Apply database migrations
    Migrate,
}

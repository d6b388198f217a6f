use crate::cli::{commands::Commands, handlers};
use crate::config::BillingConfig;
use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::PathBuf;

/// Residence billing - tiered utility rates and monthly billing runs
#[derive(Parser, Debug)]
#[command(
    name = "residence-billing",
    version,
    about = "Residence billing - tiered utility rates and monthly billing runs",
    long_about = "Tiered electricity and water billing for the residence management dashboard.

RATE TABLES:
  residence-billing check-table -k water -f water.toml
  residence-billing quote -k electricity -u 120 -f electricity.toml
  residence-billing publish -k electricity -f electricity.toml -e 2026-11

BILLING:
  residence-billing reading --household A-101 -k water -p 2026-10 --previous 120 --current 134
  residence-billing run -p 2026-10
  residence-billing revenue -p 2026-10"
)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    pub gen_config: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Args {
    pub async fn run(self) -> Result<()> {
        if self.gen_config {
            println!("{}", toml::to_string_pretty(&BillingConfig::default())?);
            return Ok(());
        }

        let Some(command) = self.command else {
            Args::command().print_help()?;
            return Ok(());
        };

        let config = BillingConfig::load(self.config)?;
        let json = self.json;

        match command {
            Commands::CheckTable { kind, file } => handlers::handle_check_table(kind, &file),
            Commands::Quote {
                kind,
                usage,
                file,
                period,
            } => handlers::handle_quote(&config, kind, usage, file, period, json).await,
            Commands::Publish {
                kind,
                file,
                effective,
                note,
            } => handlers::handle_publish(&config, kind, &file, effective, note).await,
            Commands::Tariffs { kind } => handlers::handle_tariffs(&config, kind, json).await,
            Commands::Reading {
                household,
                kind,
                period,
                previous,
                current,
            } => {
                handlers::handle_reading(&config, household, kind, period, previous, current).await
            }
            Commands::Run { period } => handlers::handle_run(&config, period, json).await,
            Commands::Revenue { period } => handlers::handle_revenue(&config, period, json).await,
            Commands::Bills { household } => handlers::handle_bills(&config, household, json).await,
            Commands::Migrate => handlers::handle_migrate(&config).await,
        }
    }
}

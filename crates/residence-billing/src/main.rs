use anyhow::Result;
use clap::Parser;
use residence_billing::cli::Args;
use residence_common::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = logging::default_filter_for(env!("CARGO_CRATE_NAME"), "info");
    logging::init_logging(&args.verbosity, &default_filter)?;

    args.run().await
}

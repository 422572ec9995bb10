//! One-shot login and scrape against the live portal.
//!
//! Uses the same configuration as the service, prints the readings as
//! JSON and exits non-zero on failure.

use anyhow::{Context, Result};
use clap::Parser;
use waterscope_bridge::config::Config;
use waterscope_bridge::telemetry::init_tracing;
use waterscope_bridge::waterscope::WaterscopeClient;

#[derive(Parser)]
#[command(
    name = "waterscope-probe",
    about = "Log in to the Waterscope portal once and print the meter readings",
    version
)]
struct Cli {
    /// Also print the session cookie string for use with `auth_mode = "cookies"`
    #[arg(long)]
    cookies: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = Config::load()?;
    init_tracing(&cfg.telemetry);

    let client = WaterscopeClient::new(cfg.waterscope.clone())?;
    let readings = client
        .fetch_meter_data()
        .await
        .context("fetching meter data")?;

    println!("{}", serde_json::to_string_pretty(&readings)?);
    if cli.cookies {
        println!("{}", client.cookie_header().await?);
    }
    Ok(())
}

//! Flight Surety simulation binary
//!
//! Runs one insured flight end to end against simulated oracles and prints
//! the resulting report as JSON.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use flight_surety_server::config::ServerConfig;
use flight_surety_server::demo;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::from_env()?;
    info!(
        oracles = config.oracle_count,
        responder = ?config.responder,
        flight = config.insured_designator(),
        "starting flight surety simulation"
    );

    let report = demo::run(config).await?;
    info!(
        status = %report.final_status,
        credited = report.credited,
        withdrawn = report.withdrawn,
        "simulation finished"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

//! End-to-end simulation of one insured flight.
//!
//! The admin authorizes the app, airlines join and fund, flights are
//! registered, a passenger insures the scheduled late flight, the oracle
//! network settles its status and the passenger withdraws the payout.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use flight_surety::{FlightKey, FlightStatus, FlightSuretyClient, SuretyEvent};
use serde::Serialize;
use soroban_sdk::Address;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::LocalSet;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::services::oracle_network::OracleNetwork;
use crate::services::sandbox::{outcome, Sandbox, SandboxError};

pub const DEMO_FLIGHTS: [&str; 10] = [
    "QF01", "QF02", "QF03", "QF04", "QF05", "QF06", "QF07", "QF08", "QF09", "QF10",
];

#[derive(Clone, Debug, Serialize)]
pub struct DemoReport {
    pub airlines: u32,
    pub flights: u32,
    pub oracles: u32,
    pub insured_designator: String,
    pub departure: u64,
    /// Hex SHA-256 flight id.
    pub flight_id: String,
    pub final_status: String,
    pub final_status_code: u32,
    pub fetch_attempts: u32,
    pub premium: i128,
    pub credited: i128,
    pub withdrawn: i128,
    /// Token balance still held by the contract after the withdrawal.
    pub balance: i128,
    pub finished_at: String,
}

/// Run the simulation on a local task set; the host environment never leaves this thread.
pub async fn run(config: ServerConfig) -> Result<DemoReport> {
    LocalSet::new().run_until(simulate(config)).await
}

async fn simulate(config: ServerConfig) -> Result<DemoReport> {
    let sandbox = Sandbox::deploy(&config.surety).context("deploying flight surety")?;
    let client = sandbox.client();
    let app = sandbox.app();

    let departure = u64::try_from(Utc::now().timestamp()).context("system clock before epoch")?;
    let designator = sandbox.symbol(config.insured_designator())?;
    let insured = FlightKey::new(sandbox.first_airline().clone(), designator, departure);

    let airlines = onboard(&sandbox, &config, departure)?;
    info!(
        airlines,
        flight = config.insured_designator(),
        departure,
        "airlines and flights registered"
    );

    let passenger = sandbox.account();
    let premium = config.surety.max_premium;
    sandbox.mint(&passenger, premium);
    outcome(client.try_buy(
        app,
        &passenger,
        &insured.airline,
        &insured.designator,
        &departure,
        &premium,
    ))
    .context("buying insurance")?;
    info!(passenger = ?passenger, premium, "policy purchased");

    let late_flights = config
        .late_flights
        .iter()
        .map(|designator| sandbox.symbol(designator))
        .collect::<Result<Vec<_>, SandboxError>>()?;
    let responder = config.responder.build(late_flights);
    let network = OracleNetwork::register(sandbox.clone(), config.oracle_count, responder)?;
    let mut facts = network.subscribe_facts();
    let handles = network.spawn();

    let (final_status, fetch_attempts) =
        settle(&sandbox, &network, &mut facts, &config, &passenger, &insured).await?;
    info!(
        flight = config.insured_designator(),
        status = %final_status,
        attempts = fetch_attempts,
        "flight status settled"
    );

    drop(network);
    for handle in handles {
        handle.await.context("oracle task failed")?;
    }

    let credited = client.credit(&passenger);
    let withdrawn = if credited > 0 {
        let before = sandbox.token_balance(&passenger);
        outcome(client.try_withdraw(app, &passenger)).context("withdrawing credit")?;
        let withdrawn = sandbox.token_balance(&passenger) - before;
        info!(passenger = ?passenger, amount = withdrawn, "payout withdrawn");
        withdrawn
    } else {
        warn!(passenger = ?passenger, "no credit to withdraw");
        0
    };

    Ok(DemoReport {
        airlines,
        flights: client.number_of_flights(),
        oracles: client.number_of_oracles(),
        insured_designator: config.insured_designator().to_string(),
        departure,
        flight_id: hex::encode(insured.digest(sandbox.env()).to_array()),
        final_status: final_status.to_string(),
        final_status_code: final_status.code(),
        fetch_attempts,
        premium,
        credited,
        withdrawn,
        balance: outcome(client.try_balance())?,
        finished_at: Utc::now().to_rfc3339(),
    })
}

fn fund(sandbox: &Sandbox, airline: &Address, amount: i128) -> Result<(), SandboxError> {
    sandbox.mint(airline, amount);
    outcome(sandbox.client().try_fund_airline(sandbox.app(), airline, &amount))?;
    Ok(())
}

/// Bring the registry one airline past the bootstrap size and register the flights.
fn onboard(sandbox: &Sandbox, config: &ServerConfig, departure: u64) -> Result<u32> {
    let client = sandbox.client();
    let app = sandbox.app();
    let funding = config.surety.airline_funding_threshold.max(1);
    let first = sandbox.first_airline();

    fund(sandbox, first, funding).context("funding first airline")?;

    let mut members = vec![first.clone()];
    for n in 2..=config.surety.bootstrap_airlines + 1 {
        let candidate = sandbox.account();
        for voter in &members {
            let events = outcome(client.try_register_airline(app, voter, &candidate))
                .with_context(|| format!("voting for airline {n}"))?;
            if events
                .iter()
                .any(|event| matches!(event, SuretyEvent::AirlineRegistered(_)))
            {
                break;
            }
        }
        fund(sandbox, &candidate, funding).with_context(|| format!("funding airline {n}"))?;
        members.push(candidate);
    }

    let mut designators: Vec<&str> = DEMO_FLIGHTS.to_vec();
    if !designators.contains(&config.insured_designator()) {
        designators.push(config.insured_designator());
    }
    for designator in designators {
        let symbol = sandbox.symbol(designator)?;
        outcome(client.try_register_flight(app, first, &symbol, &departure))
            .with_context(|| format!("registering flight {designator}"))?;
    }

    Ok(client.number_of_airlines())
}

fn finalized(client: &FlightSuretyClient<'_>, flight: &FlightKey) -> Option<FlightStatus> {
    client
        .get_flight(&flight.airline, &flight.designator, &flight.timestamp)
        .filter(|record| record.finalized)
        .map(|record| record.status)
}

/// Fetch the status until the oracles finalize it, re-fetching after each timeout.
async fn settle(
    sandbox: &Sandbox,
    network: &OracleNetwork,
    facts: &mut broadcast::Receiver<SuretyEvent>,
    config: &ServerConfig,
    requester: &Address,
    flight: &FlightKey,
) -> Result<(FlightStatus, u32)> {
    let client = sandbox.client();
    let wait = Duration::from_millis(config.settle_timeout_ms);

    for attempt in 1..=config.fetch_attempts {
        if let Some(status) = finalized(&client, flight) {
            return Ok((status, attempt - 1));
        }
        let fetched = outcome(client.try_fetch_flight_status(
            sandbox.app(),
            requester,
            &flight.airline,
            &flight.designator,
            &flight.timestamp,
        ));
        let events = match fetched {
            Ok(events) => events,
            Err(err) if err.is_permanent() => {
                return Err(err).context("fetching flight status");
            }
            Err(err) => {
                warn!(attempt, error = %err, "status request failed, retrying");
                continue;
            }
        };
        network.relay(&events);

        match timeout(wait, finalized_status(facts, flight)).await {
            Ok(Some(status)) => return Ok((status, attempt)),
            Ok(None) => bail!("fact stream closed before the flight settled"),
            Err(_) => warn!(attempt, "no quorum yet, fetching again"),
        }
    }

    match finalized(&client, flight) {
        Some(status) => Ok((status, config.fetch_attempts)),
        None => bail!(
            "flight not finalized after {} status requests",
            config.fetch_attempts
        ),
    }
}

async fn finalized_status(
    facts: &mut broadcast::Receiver<SuretyEvent>,
    flight: &FlightKey,
) -> Option<FlightStatus> {
    loop {
        match facts.recv().await {
            Ok(SuretyEvent::FlightStatusInfo(report)) if report.request.flight == *flight => {
                return Some(report.status)
            }
            Ok(_) | Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return None,
        }
    }
}

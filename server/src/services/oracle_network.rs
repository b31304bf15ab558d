//! In-process oracle network.
//!
//! Each simulated oracle registers with the contract, learns its indexes and
//! runs as its own local task. `OracleRequest` facts are relayed over a
//! broadcast channel; every oracle holding the requested index answers with
//! whatever its [`OracleResponder`] reports. Facts produced by the responses
//! are re-published on a second channel so callers can watch a request settle.
//!
//! The host environment is single threaded, so the tasks must run on a
//! [`tokio::task::LocalSet`].

use std::rc::Rc;

use anyhow::{Context, Result};
use flight_surety::{FlightKey, SuretyEvent};
use soroban_sdk::Address;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::responder::OracleResponder;
use super::sandbox::{outcome, Sandbox};

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OracleRequestNotice {
    pub index: u32,
    pub flight: FlightKey,
}

#[derive(Clone, Debug)]
pub struct SimulatedOracle {
    pub address: Address,
    pub indexes: Vec<u32>,
}

pub struct OracleNetwork {
    sandbox: Sandbox,
    oracles: Vec<SimulatedOracle>,
    responder: Rc<dyn OracleResponder>,
    requests: broadcast::Sender<OracleRequestNotice>,
    facts: broadcast::Sender<SuretyEvent>,
}

impl OracleNetwork {
    /// Register `count` funded oracles through the sandbox app, each paying the configured fee.
    pub fn register(
        sandbox: Sandbox,
        count: usize,
        responder: Rc<dyn OracleResponder>,
    ) -> Result<Self> {
        let mut oracles = Vec::with_capacity(count);
        {
            let client = sandbox.client();
            let fee = outcome(client.try_get_config())?.oracle_registration_fee;

            for n in 1..=count {
                let address = sandbox.account();
                if fee > 0 {
                    sandbox.mint(&address, fee);
                }
                outcome(client.try_register_oracle(sandbox.app(), &address, &fee))
                    .with_context(|| format!("registering oracle {n}"))?;
                let indexes: Vec<u32> = outcome(client.try_get_my_indexes(&address))?
                    .iter()
                    .collect();
                debug!(oracle = ?address, ?indexes, "simulated oracle ready");
                oracles.push(SimulatedOracle { address, indexes });
            }
        }
        info!(count, "oracle network registered");

        let (requests, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (facts, _) = broadcast::channel(CHANNEL_CAPACITY);

        Ok(Self {
            sandbox,
            oracles,
            responder,
            requests,
            facts,
        })
    }

    pub fn oracles(&self) -> &[SimulatedOracle] {
        &self.oracles
    }

    /// Oracles that will answer a request at `index`.
    pub fn holders(&self, index: u32) -> usize {
        self.oracles
            .iter()
            .filter(|oracle| oracle.indexes.contains(&index))
            .count()
    }

    pub fn subscribe_facts(&self) -> broadcast::Receiver<SuretyEvent> {
        self.facts.subscribe()
    }

    /// Forward every `OracleRequest` in `events` to the oracles; returns how many were sent.
    pub fn relay(&self, events: &soroban_sdk::Vec<SuretyEvent>) -> usize {
        let mut relayed = 0;
        for event in events.iter() {
            let SuretyEvent::OracleRequest(request) = event else {
                continue;
            };
            let index = request.index;
            let designator = request.flight.designator.clone();
            let notice = OracleRequestNotice {
                index,
                flight: request.flight,
            };
            match self.requests.send(notice) {
                Ok(_) => {
                    let holders = self.holders(index);
                    info!(index, ?designator, holders, "oracle request relayed");
                    relayed += 1;
                }
                Err(_) => warn!(index, ?designator, "no oracle is listening for requests"),
            }
        }
        relayed
    }

    /// Start one local task per oracle. Tasks exit once the network is dropped.
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        self.oracles
            .iter()
            .cloned()
            .map(|oracle| {
                let mut requests = self.requests.subscribe();
                let sandbox = self.sandbox.clone();
                let responder = Rc::clone(&self.responder);
                let facts = self.facts.clone();

                tokio::task::spawn_local(async move {
                    loop {
                        match requests.recv().await {
                            Ok(notice) => {
                                answer(&sandbox, &oracle, responder.as_ref(), &facts, notice)
                            }
                            Err(RecvError::Lagged(skipped)) => {
                                warn!(oracle = ?oracle.address, skipped, "oracle fell behind")
                            }
                            Err(RecvError::Closed) => break,
                        }
                    }
                    debug!(oracle = ?oracle.address, "oracle stopped");
                })
            })
            .collect()
    }
}

fn answer(
    sandbox: &Sandbox,
    oracle: &SimulatedOracle,
    responder: &dyn OracleResponder,
    facts: &broadcast::Sender<SuretyEvent>,
    notice: OracleRequestNotice,
) {
    if !oracle.indexes.contains(&notice.index) {
        return;
    }

    let status = responder.respond(&notice.flight);
    let flight = &notice.flight;
    let client = sandbox.client();
    let submitted = outcome(client.try_submit_oracle_response(
        sandbox.app(),
        &oracle.address,
        &notice.index,
        &flight.airline,
        &flight.designator,
        &flight.timestamp,
        &status.code(),
    ));

    match submitted {
        Ok(events) => {
            for event in events.iter() {
                // Nobody watching is fine.
                let _ = facts.send(event);
            }
        }
        Err(err) => debug!(oracle = ?oracle.address, error = %err, "oracle response rejected"),
    }
}

//! Oracle consensus engine.
//!
//! A status request is opened for `(index, flight)` and collects, per status
//! value, the set of oracles that reported it. The first value to gather
//! `min_responses` distinct oracles closes the request, finalizes the flight
//! status in the catalog and settles the flight's policies in the ledger.
//! Responses that arrive after closing are recorded and have no further effect.

use soroban_sdk::{Address, Env};

use crate::catalog;
use crate::error::ContractError;
use crate::events::{Facts, OracleReport, StatusReport, SuretyEvent};
use crate::ledger;
use crate::oracles;
use crate::storage::DataKey;
use crate::types::{FlightStatus, RequestKey, RequestState, StatusRequest};

pub(crate) fn request(env: &Env, key: &RequestKey) -> Option<StatusRequest> {
    env.storage().persistent().get(&DataKey::Request(key.clone()))
}

fn save(env: &Env, key: &RequestKey, request: &StatusRequest) {
    env.storage()
        .persistent()
        .set(&DataKey::Request(key.clone()), request);
}

/// Open a request for `(index, flight)` and announce it to the oracle population.
///
/// Re-opening a request that is still open keeps the responses collected
/// so far and re-announces it.
pub(crate) fn open_request(
    env: &Env,
    requester: &Address,
    key: RequestKey,
    facts: &mut Facts,
) -> Result<(), ContractError> {
    match request(env, &key) {
        Some(existing) if !existing.is_open() => return Err(ContractError::AlreadyFinalized),
        Some(_) => {}
        None => save(env, &key, &StatusRequest::open(env, requester.clone())),
    }

    facts.emit(SuretyEvent::OracleRequest(key));
    Ok(())
}

/// Record an oracle response and, on reaching quorum, finalize the flight.
///
/// # Errors
/// * `InvalidIndex` - `index` is not assigned to the responding oracle
/// * `RequestNotOpen` - no request was opened for `(index, flight)`
/// * `ArithmeticOverflow` - a payout could not be computed
pub(crate) fn submit_response(
    env: &Env,
    min_responses: u32,
    oracle: &Address,
    key: RequestKey,
    status: FlightStatus,
    facts: &mut Facts,
) -> Result<(), ContractError> {
    if !oracles::holds_index(env, oracle, key.index) {
        return Err(ContractError::InvalidIndex);
    }
    let mut pending = request(env, &key).ok_or(ContractError::RequestNotOpen)?;

    facts.emit(SuretyEvent::OracleReport(OracleReport {
        oracle: oracle.clone(),
        request: key.clone(),
        status,
    }));

    let was_open = pending.is_open();
    pending.record(env, oracle.clone(), status);
    if !was_open || pending.responses_for(status) < min_responses {
        save(env, &key, &pending);
        return Ok(());
    }

    pending.state = RequestState::Closed(status);
    save(env, &key, &pending);

    let flight = key.flight.clone();
    let report = StatusReport {
        request: key,
        status,
    };
    if catalog::is_finalized(env, &flight) {
        facts.emit(SuretyEvent::RequestSuperseded(report));
        return Ok(());
    }

    catalog::set_status(env, &flight, status)?;
    facts.emit(SuretyEvent::FlightStatusInfo(report));
    ledger::settle(env, &flight, status, facts)
}

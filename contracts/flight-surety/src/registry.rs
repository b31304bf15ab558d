//! Airline registry.
//!
//! Airlines join in two phases. While fewer than `bootstrap_airlines` are
//! registered, any registered and funded airline admits a new one directly.
//! After that a candidate needs votes from at least half of the currently
//! registered airlines (rounded up).

use soroban_sdk::{Address, Env};

use crate::error::ContractError;
use crate::events::{AirlineFunding, AirlineVote, Facts, SuretyEvent};
use crate::ledger;
use crate::storage::{self, DataKey};
use crate::types::{Airline, SuretyConfig};

pub(crate) fn airline(env: &Env, id: &Address) -> Option<Airline> {
    env.storage()
        .persistent()
        .get(&DataKey::Airline(id.clone()))
}

fn save(env: &Env, id: &Address, airline: &Airline) {
    env.storage()
        .persistent()
        .set(&DataKey::Airline(id.clone()), airline);
}

pub(crate) fn count(env: &Env) -> u32 {
    storage::counter(env, &DataKey::AirlineCount)
}

pub(crate) fn is_registered(env: &Env, id: &Address) -> bool {
    airline(env, id).is_some_and(|airline| airline.registered)
}

pub(crate) fn is_funded(env: &Env, id: &Address) -> bool {
    airline(env, id).is_some_and(|airline| airline.registered && airline.funded)
}

/// Seed the registry with its genesis airline, registered but not yet funded.
pub(crate) fn register_first(env: &Env, id: &Address) -> Result<(), ContractError> {
    let mut genesis = Airline::candidate(env);
    genesis.registered = true;
    save(env, id, &genesis);
    storage::increment(env, &DataKey::AirlineCount)?;
    Ok(())
}

/// Admit `candidate` directly (bootstrap) or record `caller`'s vote for it (consensus).
///
/// Returns whether `candidate` is now registered. A repeated vote is a no-op.
///
/// # Errors
/// * `Unauthorized` - `caller` is not a registered and funded airline
/// * `AlreadyRegistered` - `candidate` is already a member
pub(crate) fn register_airline(
    env: &Env,
    config: &SuretyConfig,
    caller: &Address,
    candidate: &Address,
    facts: &mut Facts,
) -> Result<bool, ContractError> {
    if !is_funded(env, caller) {
        return Err(ContractError::Unauthorized);
    }
    if is_registered(env, candidate) {
        return Err(ContractError::AlreadyRegistered);
    }

    let current = count(env);
    let mut record = airline(env, candidate).unwrap_or_else(|| Airline::candidate(env));

    if current < config.bootstrap_airlines {
        record.registered = true;
        save(env, candidate, &record);
        storage::increment(env, &DataKey::AirlineCount)?;
        facts.emit(SuretyEvent::AirlineRegistered(candidate.clone()));
        return Ok(true);
    }

    if record.votes.contains(caller) {
        return Ok(false);
    }
    record.votes.push_back(caller.clone());

    let votes = record.votes.len();
    let required = current.div_ceil(2);
    facts.emit(SuretyEvent::AirlineVoted(AirlineVote {
        airline: candidate.clone(),
        voter: caller.clone(),
        votes,
        required,
    }));

    let admitted = votes >= required;
    if admitted {
        record.registered = true;
        record.votes = soroban_sdk::Vec::new(env);
        storage::increment(env, &DataKey::AirlineCount)?;
        facts.emit(SuretyEvent::AirlineRegistered(candidate.clone()));
    }
    save(env, candidate, &record);

    Ok(admitted)
}

/// Take `amount` from a registered airline; the first sufficient payment marks it funded.
///
/// Later payments are added to the airline's funds without a second fact.
///
/// # Errors
/// * `NotRegistered` - `id` is not a registered airline
/// * `InsufficientFunds` - `amount` below the funding threshold
pub(crate) fn fund_airline(
    env: &Env,
    config: &SuretyConfig,
    id: &Address,
    amount: i128,
    facts: &mut Facts,
) -> Result<(), ContractError> {
    let mut record = airline(env, id)
        .filter(|airline| airline.registered)
        .ok_or(ContractError::NotRegistered)?;

    if amount <= 0 {
        return Err(ContractError::InvalidAmount);
    }
    if amount < config.airline_funding_threshold {
        return Err(ContractError::InsufficientFunds);
    }

    record.funds = record
        .funds
        .checked_add(amount)
        .ok_or(ContractError::ArithmeticOverflow)?;
    ledger::collect(env, id, amount)?;

    if !record.funded {
        record.funded = true;
        facts.emit(SuretyEvent::AirlineFunded(AirlineFunding {
            airline: id.clone(),
            amount,
        }));
    }
    save(env, id, &record);

    Ok(())
}

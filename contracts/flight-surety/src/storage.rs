//! Storage keys and small accessors.
//!
//! Singletons and counters live in instance storage; per-entity records in
//! persistent storage.

use soroban_sdk::{contracttype, Address, Env};

use crate::error::ContractError;
use crate::types::{FlightKey, PolicyKey, RequestKey, SuretyConfig};

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Admin,
    Token,
    Config,
    Operational,
    Caller(Address),
    Airline(Address),
    AirlineCount,
    Flight(FlightKey),
    FlightCount,
    Oracle(Address),
    OracleCount,
    Request(RequestKey),
    Policy(PolicyKey),
    /// Passengers holding a policy on a flight, in purchase order.
    Passengers(FlightKey),
    Credit(Address),
    Escrowed,
    Forfeited,
}

pub(crate) fn is_initialized(env: &Env) -> bool {
    env.storage().instance().has(&DataKey::Admin)
}

pub(crate) fn admin(env: &Env) -> Result<Address, ContractError> {
    env.storage()
        .instance()
        .get(&DataKey::Admin)
        .ok_or(ContractError::NotInitialized)
}

pub(crate) fn token(env: &Env) -> Result<Address, ContractError> {
    env.storage()
        .instance()
        .get(&DataKey::Token)
        .ok_or(ContractError::NotInitialized)
}

pub(crate) fn config(env: &Env) -> Result<SuretyConfig, ContractError> {
    env.storage()
        .instance()
        .get(&DataKey::Config)
        .ok_or(ContractError::NotInitialized)
}

pub(crate) fn is_operational(env: &Env) -> bool {
    env.storage()
        .instance()
        .get(&DataKey::Operational)
        .unwrap_or(false)
}

pub(crate) fn is_caller_authorized(env: &Env, app: &Address) -> bool {
    env.storage()
        .persistent()
        .get(&DataKey::Caller(app.clone()))
        .unwrap_or(false)
}

pub(crate) fn counter(env: &Env, key: &DataKey) -> u32 {
    env.storage().instance().get(key).unwrap_or(0)
}

pub(crate) fn increment(env: &Env, key: &DataKey) -> Result<u32, ContractError> {
    let next = counter(env, key)
        .checked_add(1)
        .ok_or(ContractError::ArithmeticOverflow)?;
    env.storage().instance().set(key, &next);
    Ok(next)
}

pub(crate) fn amount(env: &Env, key: &DataKey) -> i128 {
    env.storage().instance().get(key).unwrap_or(0)
}

pub(crate) fn set_amount(env: &Env, key: &DataKey, value: i128) {
    env.storage().instance().set(key, &value);
}

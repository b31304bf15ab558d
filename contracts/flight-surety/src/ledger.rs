//! Insurance ledger: policies, escrowed premiums and withdrawable credit.
//!
//! Value invariants:
//! * at most one policy per (passenger, flight), premium in `1..=max_premium`
//! * a policy is credited or forfeited at most once
//! * a credit balance is zeroed before the transfer that pays it out

use soroban_sdk::{token, Address, Env, Vec};

use crate::catalog;
use crate::error::ContractError;
use crate::events::{Facts, Forfeiture, Payout, Purchase, SuretyEvent, Withdrawal};
use crate::storage::{self, DataKey};
use crate::types::{FlightKey, FlightStatus, Policy, PolicyKey, SuretyConfig};

/// Move `amount` of the configured token from `from` into the contract.
pub(crate) fn collect(env: &Env, from: &Address, amount: i128) -> Result<(), ContractError> {
    let token = storage::token(env)?;
    token::Client::new(env, &token).transfer(from, &env.current_contract_address(), &amount);
    Ok(())
}

/// Token balance held by the contract.
pub(crate) fn balance(env: &Env) -> Result<i128, ContractError> {
    let token = storage::token(env)?;
    Ok(token::Client::new(env, &token).balance(&env.current_contract_address()))
}

pub(crate) fn policy(env: &Env, passenger: &Address, flight: &FlightKey) -> Option<Policy> {
    env.storage().persistent().get(&policy_key(passenger, flight))
}

pub(crate) fn credit(env: &Env, passenger: &Address) -> i128 {
    env.storage()
        .persistent()
        .get(&DataKey::Credit(passenger.clone()))
        .unwrap_or(0)
}

pub(crate) fn escrowed(env: &Env) -> i128 {
    storage::amount(env, &DataKey::Escrowed)
}

pub(crate) fn forfeited(env: &Env) -> i128 {
    storage::amount(env, &DataKey::Forfeited)
}

fn policy_key(passenger: &Address, flight: &FlightKey) -> DataKey {
    DataKey::Policy(PolicyKey {
        passenger: passenger.clone(),
        flight: flight.clone(),
    })
}

fn passengers(env: &Env, flight: &FlightKey) -> Vec<Address> {
    env.storage()
        .persistent()
        .get(&DataKey::Passengers(flight.clone()))
        .unwrap_or_else(|| Vec::new(env))
}

fn set_credit(env: &Env, passenger: &Address, amount: i128) {
    env.storage()
        .persistent()
        .set(&DataKey::Credit(passenger.clone()), &amount);
}

/// Escrow `premium` from `passenger` and open a policy on `flight`.
///
/// # Errors
/// * `FlightNotFound` - flight not in the catalog
/// * `AlreadyFinalized` - the flight's outcome is already known
/// * `InvalidAmount` / `ExceedsCap` - premium outside `1..=max_premium`
/// * `DuplicatePolicy` - passenger already insured on this flight
pub(crate) fn buy(
    env: &Env,
    config: &SuretyConfig,
    passenger: &Address,
    flight: &FlightKey,
    premium: i128,
    facts: &mut Facts,
) -> Result<(), ContractError> {
    let record = catalog::flight(env, flight).ok_or(ContractError::FlightNotFound)?;
    if record.finalized {
        return Err(ContractError::AlreadyFinalized);
    }
    if premium <= 0 {
        return Err(ContractError::InvalidAmount);
    }
    if premium > config.max_premium {
        return Err(ContractError::ExceedsCap);
    }
    let key = policy_key(passenger, flight);
    if env.storage().persistent().has(&key) {
        return Err(ContractError::DuplicatePolicy);
    }

    let escrow = escrowed(env)
        .checked_add(premium)
        .ok_or(ContractError::ArithmeticOverflow)?;
    collect(env, passenger, premium)?;

    env.storage().persistent().set(
        &key,
        &Policy {
            passenger: passenger.clone(),
            flight: flight.clone(),
            premium,
            multiplier: config.payout_multiplier,
            credited: false,
            forfeited: false,
        },
    );
    let mut insured = passengers(env, flight);
    insured.push_back(passenger.clone());
    env.storage()
        .persistent()
        .set(&DataKey::Passengers(flight.clone()), &insured);
    storage::set_amount(env, &DataKey::Escrowed, escrow);

    facts.emit(SuretyEvent::InsurancePurchased(Purchase {
        passenger: passenger.clone(),
        flight: flight.clone(),
        premium,
    }));
    Ok(())
}

/// Settle every open policy on `flight` once its status is final.
///
/// An airline-caused delay credits each passenger `premium * multiplier`;
/// any other status forfeits the premiums to the pool. Settled policies are
/// skipped, so a repeated call never pays twice.
///
/// # Errors
/// * `ArithmeticOverflow` - a payout or running total does not fit; the
///   enclosing call fails and the host discards every write made so far
pub(crate) fn settle(
    env: &Env,
    flight: &FlightKey,
    status: FlightStatus,
    facts: &mut Facts,
) -> Result<(), ContractError> {
    let mut escrow = escrowed(env);
    let mut forfeit: i128 = 0;

    for passenger in passengers(env, flight).iter() {
        let key = policy_key(&passenger, flight);
        let Some(mut policy) = env.storage().persistent().get::<DataKey, Policy>(&key) else {
            continue;
        };
        if policy.is_settled() {
            continue;
        }

        escrow = escrow
            .checked_sub(policy.premium)
            .ok_or(ContractError::ArithmeticOverflow)?;

        if status.is_airline_fault() {
            let amount = policy
                .multiplier
                .apply(policy.premium)
                .ok_or(ContractError::ArithmeticOverflow)?;
            let balance = credit(env, &passenger)
                .checked_add(amount)
                .ok_or(ContractError::ArithmeticOverflow)?;
            policy.credited = true;
            set_credit(env, &passenger, balance);
            facts.emit(SuretyEvent::PassengerCredited(Payout {
                passenger: passenger.clone(),
                flight: flight.clone(),
                amount,
            }));
        } else {
            policy.forfeited = true;
            forfeit = forfeit
                .checked_add(policy.premium)
                .ok_or(ContractError::ArithmeticOverflow)?;
        }
        env.storage().persistent().set(&key, &policy);
    }

    storage::set_amount(env, &DataKey::Escrowed, escrow);
    if forfeit > 0 {
        let total = forfeited(env)
            .checked_add(forfeit)
            .ok_or(ContractError::ArithmeticOverflow)?;
        storage::set_amount(env, &DataKey::Forfeited, total);
        facts.emit(SuretyEvent::PremiumsForfeited(Forfeiture {
            flight: flight.clone(),
            amount: forfeit,
        }));
    }

    Ok(())
}

/// Pay out `passenger`'s whole credit balance.
///
/// The balance is zeroed before the token transfer. Returns the amount paid.
///
/// # Errors
/// * `NoCredit` - nothing to withdraw
/// * `InsufficientFunds` - the contract holds less than the credit
pub(crate) fn withdraw(
    env: &Env,
    passenger: &Address,
    facts: &mut Facts,
) -> Result<i128, ContractError> {
    let amount = credit(env, passenger);
    if amount <= 0 {
        return Err(ContractError::NoCredit);
    }
    if balance(env)? < amount {
        return Err(ContractError::InsufficientFunds);
    }

    set_credit(env, passenger, 0);
    let token = storage::token(env)?;
    token::Client::new(env, &token).transfer(&env.current_contract_address(), passenger, &amount);

    facts.emit(SuretyEvent::CreditWithdrawn(Withdrawal {
        passenger: passenger.clone(),
        amount,
    }));
    Ok(amount)
}

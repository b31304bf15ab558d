//! Flight catalog.

use soroban_sdk::{BytesN, Env};

use crate::error::ContractError;
use crate::events::{Facts, FlightRegistration, SuretyEvent};
use crate::registry;
use crate::storage::{self, DataKey};
use crate::types::{Flight, FlightKey, FlightStatus};

pub(crate) fn flight(env: &Env, key: &FlightKey) -> Option<Flight> {
    env.storage().persistent().get(&DataKey::Flight(key.clone()))
}

pub(crate) fn count(env: &Env) -> u32 {
    storage::counter(env, &DataKey::FlightCount)
}

pub(crate) fn is_finalized(env: &Env, key: &FlightKey) -> bool {
    flight(env, key).is_some_and(|flight| flight.finalized)
}

/// Register a flight for its operating airline with status `Unknown`.
///
/// # Errors
/// * `NotRegistered` / `NotFunded` - the airline may not operate flights yet
/// * `AlreadyExists` - the key is already in the catalog
pub(crate) fn register_flight(
    env: &Env,
    key: FlightKey,
    facts: &mut Facts,
) -> Result<BytesN<32>, ContractError> {
    let airline = registry::airline(env, &key.airline)
        .filter(|airline| airline.registered)
        .ok_or(ContractError::NotRegistered)?;
    if !airline.funded {
        return Err(ContractError::NotFunded);
    }

    let storage_key = DataKey::Flight(key.clone());
    if env.storage().persistent().has(&storage_key) {
        return Err(ContractError::AlreadyExists);
    }

    let id = key.digest(env);
    env.storage().persistent().set(
        &storage_key,
        &Flight {
            key: key.clone(),
            status: FlightStatus::Unknown,
            finalized: false,
        },
    );
    storage::increment(env, &DataKey::FlightCount)?;

    facts.emit(SuretyEvent::FlightRegistered(FlightRegistration {
        flight: key,
        id: id.clone(),
    }));
    Ok(id)
}

/// Write the consensus status. Repeating the same status is a no-op; a
/// different one is rejected.
pub(crate) fn set_status(
    env: &Env,
    key: &FlightKey,
    status: FlightStatus,
) -> Result<(), ContractError> {
    let mut record = flight(env, key).ok_or(ContractError::FlightNotFound)?;
    if record.finalized {
        return if record.status == status {
            Ok(())
        } else {
            Err(ContractError::AlreadyFinalized)
        };
    }

    record.status = status;
    record.finalized = true;
    env.storage()
        .persistent()
        .set(&DataKey::Flight(key.clone()), &record);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::FlightSurety;
    use soroban_sdk::{symbol_short, testutils::Address as _, Address};

    fn setup() -> (Env, Address, FlightKey) {
        let env = Env::default();
        let contract = env.register(FlightSurety, ());
        let airline = Address::generate(&env);
        env.as_contract(&contract, || registry::register_first(&env, &airline).unwrap());
        let key = FlightKey::new(airline, symbol_short!("QF10"), 1_700_000_000);
        (env, contract, key)
    }

    #[test]
    fn test_unfunded_airline_cannot_register_flight() {
        let (env, contract, key) = setup();
        env.as_contract(&contract, || {
            let mut facts = Facts::new(&env);
            assert_eq!(
                register_flight(&env, key.clone(), &mut facts),
                Err(ContractError::NotFunded)
            );

            let stranger = FlightKey::new(Address::generate(&env), symbol_short!("XX1"), 0);
            assert_eq!(
                register_flight(&env, stranger, &mut facts),
                Err(ContractError::NotRegistered)
            );
            assert_eq!(count(&env), 0);
        });
    }

    #[test]
    fn test_status_is_written_once() {
        let (env, contract, key) = setup();
        env.as_contract(&contract, || {
            env.storage().persistent().set(
                &DataKey::Flight(key.clone()),
                &Flight {
                    key: key.clone(),
                    status: FlightStatus::Unknown,
                    finalized: false,
                },
            );

            assert_eq!(set_status(&env, &key, FlightStatus::LateWeather), Ok(()));
            assert_eq!(set_status(&env, &key, FlightStatus::LateWeather), Ok(()));
            assert_eq!(
                set_status(&env, &key, FlightStatus::OnTime),
                Err(ContractError::AlreadyFinalized)
            );

            let stored = flight(&env, &key).unwrap();
            assert_eq!(stored.status, FlightStatus::LateWeather);
            assert!(is_finalized(&env, &key));
        });
    }

    #[test]
    fn test_set_status_unknown_flight() {
        let (env, contract, key) = setup();
        env.as_contract(&contract, || {
            assert_eq!(
                set_status(&env, &key, FlightStatus::OnTime),
                Err(ContractError::FlightNotFound)
            );
        });
    }
}

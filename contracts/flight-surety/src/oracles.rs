//! Oracle directory: registrations and their index triples.

use soroban_sdk::{Address, Env, Vec};

use crate::error::ContractError;
use crate::events::{Facts, OracleRegistration, SuretyEvent};
use crate::ledger;
use crate::storage::{self, DataKey};
use crate::types::{SuretyConfig, INDEXES_PER_ORACLE};

pub(crate) fn indexes(env: &Env, oracle: &Address) -> Result<Vec<u32>, ContractError> {
    env.storage()
        .persistent()
        .get(&DataKey::Oracle(oracle.clone()))
        .ok_or(ContractError::NotRegistered)
}

pub(crate) fn holds_index(env: &Env, oracle: &Address, index: u32) -> bool {
    indexes(env, oracle).is_ok_and(|held| held.contains(index))
}

pub(crate) fn count(env: &Env) -> u32 {
    storage::counter(env, &DataKey::OracleCount)
}

/// Draw one index from `0..space` with the host PRNG.
pub(crate) fn draw_index(env: &Env, space: u32) -> u32 {
    let drawn: u64 = env.prng().gen_range(0..u64::from(space));
    drawn as u32
}

/// Draw `INDEXES_PER_ORACLE` distinct indexes from `0..space`.
fn draw_indexes(env: &Env, space: u32) -> Vec<u32> {
    let mut drawn = Vec::new(env);
    while drawn.len() < INDEXES_PER_ORACLE {
        let index = draw_index(env, space);
        if !drawn.contains(index) {
            drawn.push_back(index);
        }
    }
    drawn
}

/// Take the registration fee from `oracle` and assign its indexes.
///
/// # Errors
/// * `InsufficientFee` - `fee` below the registration fee
/// * `AlreadyRegistered` - `oracle` already holds indexes
pub(crate) fn register_oracle(
    env: &Env,
    config: &SuretyConfig,
    oracle: &Address,
    fee: i128,
    facts: &mut Facts,
) -> Result<Vec<u32>, ContractError> {
    if fee < config.oracle_registration_fee {
        return Err(ContractError::InsufficientFee);
    }
    let key = DataKey::Oracle(oracle.clone());
    if env.storage().persistent().has(&key) {
        return Err(ContractError::AlreadyRegistered);
    }

    if fee > 0 {
        ledger::collect(env, oracle, fee)?;
    }
    let assigned = draw_indexes(env, config.oracle_index_space);
    env.storage().persistent().set(&key, &assigned);
    storage::increment(env, &DataKey::OracleCount)?;

    facts.emit(SuretyEvent::OracleRegistered(OracleRegistration {
        oracle: oracle.clone(),
        indexes: assigned.clone(),
    }));
    Ok(assigned)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::FlightSurety;
    use soroban_sdk::testutils::Address as _;

    #[test]
    fn test_indexes_are_distinct_and_in_range() {
        let env = Env::default();
        let contract = env.register(FlightSurety, ());
        env.as_contract(&contract, || {
            for space in [3u32, 4, 10, 256] {
                let drawn = draw_indexes(&env, space);
                assert_eq!(drawn.len(), INDEXES_PER_ORACLE);
                for (i, index) in drawn.iter().enumerate() {
                    assert!(index < space);
                    assert_eq!(drawn.first_index_of(index), Some(i as u32));
                }
            }
        });
    }

    #[test]
    fn test_fee_checked_before_registration() {
        let env = Env::default();
        let contract = env.register(FlightSurety, ());
        let oracle = Address::generate(&env);
        env.as_contract(&contract, || {
            let mut facts = Facts::new(&env);
            assert_eq!(
                register_oracle(&env, &SuretyConfig::default(), &oracle, 1, &mut facts),
                Err(ContractError::InsufficientFee)
            );
            assert_eq!(indexes(&env, &oracle), Err(ContractError::NotRegistered));
            assert!(!holds_index(&env, &oracle, 0));
            assert_eq!(count(&env), 0);
        });
    }
}

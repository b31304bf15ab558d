use std::env;
use std::fmt::Display;
use std::str::FromStr;

use flight_surety::{PayoutMultiplier, SuretyConfig};
use thiserror::Error;

use crate::services::responder::ResponderKind;

pub const DEFAULT_ORACLE_COUNT: usize = 20;
pub const DEFAULT_LATE_FLIGHT: &str = "QF10";

/// Longest designator the contract accepts as a symbol.
const MAX_DESIGNATOR_LEN: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid(key: &str, value: impl Display, reason: &str) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Everything the simulation binary needs: contract parameters plus the shape
/// of the oracle network it drives them with.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub surety: SuretyConfig,
    pub oracle_count: usize,
    /// Designators the scheduled responder reports as `LateAirline`.
    pub late_flights: Vec<String>,
    pub responder: ResponderKind,
    /// How long one status request may wait for quorum before it is re-fetched.
    pub settle_timeout_ms: u64,
    pub fetch_attempts: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            surety: SuretyConfig::default(),
            oracle_count: DEFAULT_ORACLE_COUNT,
            late_flights: vec![DEFAULT_LATE_FLIGHT.to_string()],
            responder: ResponderKind::Scheduled,
            settle_timeout_ms: 5_000,
            fetch_attempts: 5,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let core = defaults.surety;

        let surety = SuretyConfig {
            bootstrap_airlines: parse_or(
                &lookup,
                "SURETY_BOOTSTRAP_AIRLINES",
                core.bootstrap_airlines,
            )?,
            airline_funding_threshold: parse_or(
                &lookup,
                "SURETY_AIRLINE_FUNDING_THRESHOLD",
                core.airline_funding_threshold,
            )?,
            max_premium: parse_or(&lookup, "SURETY_MAX_PREMIUM", core.max_premium)?,
            payout_multiplier: match lookup("SURETY_PAYOUT_MULTIPLIER") {
                Some(raw) => parse_multiplier(&raw)?,
                None => core.payout_multiplier,
            },
            oracle_registration_fee: parse_or(
                &lookup,
                "SURETY_ORACLE_REGISTRATION_FEE",
                core.oracle_registration_fee,
            )?,
            oracle_index_space: parse_or(
                &lookup,
                "SURETY_ORACLE_INDEX_SPACE",
                core.oracle_index_space,
            )?,
            min_responses: parse_or(&lookup, "SURETY_MIN_RESPONSES", core.min_responses)?,
        };
        if let Some(field) = surety.invalid_field() {
            return Err(ConfigError::invalid(
                &format!("SURETY_{}", field.to_ascii_uppercase()),
                field_value(&surety, field),
                "out of range",
            ));
        }

        let late_flights: Vec<String> = match lookup("SURETY_LATE_FLIGHTS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|designator| !designator.is_empty())
                .map(str::to_string)
                .collect(),
            None => defaults.late_flights,
        };
        for designator in &late_flights {
            check_designator("SURETY_LATE_FLIGHTS", designator)?;
        }

        let responder = match lookup("SURETY_RESPONDER") {
            Some(raw) => raw
                .parse()
                .map_err(|err| ConfigError::invalid("SURETY_RESPONDER", &raw, &format!("{err}")))?,
            None => defaults.responder,
        };

        let config = Self {
            surety,
            oracle_count: parse_or(&lookup, "SURETY_ORACLE_COUNT", defaults.oracle_count)?,
            late_flights,
            responder,
            settle_timeout_ms: parse_or(
                &lookup,
                "SURETY_SETTLE_TIMEOUT_MS",
                defaults.settle_timeout_ms,
            )?,
            fetch_attempts: parse_or(&lookup, "SURETY_FETCH_ATTEMPTS", defaults.fetch_attempts)?,
        };

        if config.oracle_count == 0 {
            return Err(ConfigError::invalid(
                "SURETY_ORACLE_COUNT",
                config.oracle_count,
                "at least one oracle is required",
            ));
        }
        if config.fetch_attempts == 0 {
            return Err(ConfigError::invalid(
                "SURETY_FETCH_ATTEMPTS",
                config.fetch_attempts,
                "must be at least 1",
            ));
        }

        Ok(config)
    }

    /// The flight the demo passenger insures.
    pub fn insured_designator(&self) -> &str {
        self.late_flights
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_LATE_FLIGHT)
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|err: T::Err| ConfigError::invalid(key, raw, &err.to_string()))
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

/// Accepts `numerator/denominator`, e.g. `3/2`.
fn parse_multiplier(raw: &str) -> Result<PayoutMultiplier, ConfigError> {
    const KEY: &str = "SURETY_PAYOUT_MULTIPLIER";

    let (numerator, denominator) = raw
        .split_once('/')
        .ok_or_else(|| ConfigError::invalid(KEY, raw, "expected numerator/denominator"))?;

    Ok(PayoutMultiplier::new(
        parse_value(KEY, numerator)?,
        parse_value(KEY, denominator)?,
    ))
}

fn field_value(config: &SuretyConfig, field: &str) -> String {
    match field {
        "bootstrap_airlines" => config.bootstrap_airlines.to_string(),
        "airline_funding_threshold" => config.airline_funding_threshold.to_string(),
        "max_premium" => config.max_premium.to_string(),
        "payout_multiplier" => format!(
            "{}/{}",
            config.payout_multiplier.numerator, config.payout_multiplier.denominator
        ),
        "oracle_registration_fee" => config.oracle_registration_fee.to_string(),
        "oracle_index_space" => config.oracle_index_space.to_string(),
        "min_responses" => config.min_responses.to_string(),
        _ => String::new(),
    }
}

/// Designators become contract symbols: `[A-Za-z0-9_]`, at most 32 characters.
fn check_designator(key: &str, designator: &str) -> Result<(), ConfigError> {
    if designator.len() > MAX_DESIGNATOR_LEN {
        return Err(ConfigError::invalid(key, designator, "longer than 32 characters"));
    }
    if !designator
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ConfigError::invalid(key, designator, "only A-Z, a-z, 0-9 and _ allowed"));
    }
    Ok(())
}

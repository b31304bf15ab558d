//! What a simulated oracle reports when asked about a flight.

use std::rc::Rc;
use std::str::FromStr;

use flight_surety::{FlightKey, FlightStatus};
use rand::seq::SliceRandom;
use soroban_sdk::Symbol;
use thiserror::Error;

pub trait OracleResponder {
    fn respond(&self, flight: &FlightKey) -> FlightStatus;
}

/// Reports `LateAirline` for scheduled designators and `OnTime` for everything else.
#[derive(Clone, Debug, Default)]
pub struct ScheduledResponder {
    late_flights: Vec<Symbol>,
}

impl ScheduledResponder {
    pub fn new(late_flights: Vec<Symbol>) -> Self {
        Self { late_flights }
    }
}

impl OracleResponder for ScheduledResponder {
    fn respond(&self, flight: &FlightKey) -> FlightStatus {
        if self.late_flights.contains(&flight.designator) {
            FlightStatus::LateAirline
        } else {
            FlightStatus::OnTime
        }
    }
}

/// Every oracle draws independently, so quorum is not guaranteed.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomResponder;

impl OracleResponder for RandomResponder {
    fn respond(&self, _flight: &FlightKey) -> FlightStatus {
        FlightStatus::ALL
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(FlightStatus::Unknown)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResponderError {
    #[error("unknown responder kind '{0}', expected 'scheduled' or 'random'")]
    UnknownKind(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponderKind {
    Scheduled,
    Random,
}

impl ResponderKind {
    pub fn build(self, late_flights: Vec<Symbol>) -> Rc<dyn OracleResponder> {
        match self {
            ResponderKind::Scheduled => Rc::new(ScheduledResponder::new(late_flights)),
            ResponderKind::Random => Rc::new(RandomResponder),
        }
    }
}

impl FromStr for ResponderKind {
    type Err = ResponderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Ok(ResponderKind::Scheduled),
            "random" => Ok(ResponderKind::Random),
            other => Err(ResponderError::UnknownKind(other.to_string())),
        }
    }
}

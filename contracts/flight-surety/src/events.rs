//! Domain facts.
//!
//! Every mutating entry point returns the facts it produced, in order, and
//! publishes each one as a contract event under a short topic.

use soroban_sdk::{contracttype, symbol_short, Address, BytesN, Env, Symbol, Vec};

use crate::types::{FlightKey, FlightStatus, RequestKey};

const OPERATIONAL: Symbol = symbol_short!("op_status");
const CALLER_AUTHORIZED: Symbol = symbol_short!("auth_call");
const CALLER_DEAUTHORIZED: Symbol = symbol_short!("deauth");
const AIRLINE_REGISTERED: Symbol = symbol_short!("air_reg");
const AIRLINE_VOTED: Symbol = symbol_short!("air_vote");
const AIRLINE_FUNDED: Symbol = symbol_short!("air_fund");
const FLIGHT_REGISTERED: Symbol = symbol_short!("flt_reg");
const ORACLE_REGISTERED: Symbol = symbol_short!("orc_reg");
const ORACLE_REQUEST: Symbol = symbol_short!("orc_req");
const ORACLE_REPORT: Symbol = symbol_short!("orc_rpt");
const FLIGHT_STATUS: Symbol = symbol_short!("flt_stat");
const REQUEST_SUPERSEDED: Symbol = symbol_short!("req_sup");
const INSURANCE_PURCHASED: Symbol = symbol_short!("ins_buy");
const PASSENGER_CREDITED: Symbol = symbol_short!("ins_cred");
const PREMIUMS_FORFEITED: Symbol = symbol_short!("ins_forf");
const CREDIT_WITHDRAWN: Symbol = symbol_short!("withdraw");

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AirlineVote {
    pub airline: Address,
    pub voter: Address,
    pub votes: u32,
    pub required: u32,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AirlineFunding {
    pub airline: Address,
    pub amount: i128,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FlightRegistration {
    pub flight: FlightKey,
    pub id: BytesN<32>,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OracleRegistration {
    pub oracle: Address,
    pub indexes: Vec<u32>,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OracleReport {
    pub oracle: Address,
    pub request: RequestKey,
    pub status: FlightStatus,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StatusReport {
    pub request: RequestKey,
    pub status: FlightStatus,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Purchase {
    pub passenger: Address,
    pub flight: FlightKey,
    pub premium: i128,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Payout {
    pub passenger: Address,
    pub flight: FlightKey,
    pub amount: i128,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Forfeiture {
    pub flight: FlightKey,
    pub amount: i128,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Withdrawal {
    pub passenger: Address,
    pub amount: i128,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SuretyEvent {
    OperationalStatusChanged(bool),
    CallerAuthorized(Address),
    CallerDeauthorized(Address),
    AirlineRegistered(Address),
    AirlineVoted(AirlineVote),
    AirlineFunded(AirlineFunding),
    FlightRegistered(FlightRegistration),
    OracleRegistered(OracleRegistration),
    /// Announces an open request to every oracle holding `index`.
    OracleRequest(RequestKey),
    OracleReport(OracleReport),
    FlightStatusInfo(StatusReport),
    /// Quorum reached on a flight another request had already finalized.
    RequestSuperseded(StatusReport),
    InsurancePurchased(Purchase),
    PassengerCredited(Payout),
    PremiumsForfeited(Forfeiture),
    CreditWithdrawn(Withdrawal),
}

impl SuretyEvent {
    pub fn topic(&self) -> Symbol {
        match self {
            SuretyEvent::OperationalStatusChanged(_) => OPERATIONAL,
            SuretyEvent::CallerAuthorized(_) => CALLER_AUTHORIZED,
            SuretyEvent::CallerDeauthorized(_) => CALLER_DEAUTHORIZED,
            SuretyEvent::AirlineRegistered(_) => AIRLINE_REGISTERED,
            SuretyEvent::AirlineVoted(_) => AIRLINE_VOTED,
            SuretyEvent::AirlineFunded(_) => AIRLINE_FUNDED,
            SuretyEvent::FlightRegistered(_) => FLIGHT_REGISTERED,
            SuretyEvent::OracleRegistered(_) => ORACLE_REGISTERED,
            SuretyEvent::OracleRequest(_) => ORACLE_REQUEST,
            SuretyEvent::OracleReport(_) => ORACLE_REPORT,
            SuretyEvent::FlightStatusInfo(_) => FLIGHT_STATUS,
            SuretyEvent::RequestSuperseded(_) => REQUEST_SUPERSEDED,
            SuretyEvent::InsurancePurchased(_) => INSURANCE_PURCHASED,
            SuretyEvent::PassengerCredited(_) => PASSENGER_CREDITED,
            SuretyEvent::PremiumsForfeited(_) => PREMIUMS_FORFEITED,
            SuretyEvent::CreditWithdrawn(_) => CREDIT_WITHDRAWN,
        }
    }
}

/// Ordered facts produced by one call.
pub(crate) struct Facts {
    env: Env,
    events: Vec<SuretyEvent>,
}

impl Facts {
    pub(crate) fn new(env: &Env) -> Self {
        Self {
            env: env.clone(),
            events: Vec::new(env),
        }
    }

    /// Publish `event` and keep it for the caller.
    pub(crate) fn emit(&mut self, event: SuretyEvent) {
        self.env.events().publish((event.topic(),), event.clone());
        self.events.push_back(event);
    }

    pub(crate) fn into_vec(self) -> Vec<SuretyEvent> {
        self.events
    }
}

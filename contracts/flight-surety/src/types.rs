//! Records and keys shared by every store.

use core::fmt;

use soroban_sdk::{contracttype, xdr::ToXdr, Address, BytesN, Env, Map, Symbol, Vec};

use crate::error::ContractError;

/// One whole currency unit in base units (7 decimals, as Stellar assets).
pub const UNIT: i128 = 10_000_000;

/// Indexes assigned to each oracle on registration.
pub const INDEXES_PER_ORACLE: u32 = 3;

/// Largest accepted oracle index space.
pub const MAX_INDEX_SPACE: u32 = 256;

/// Flight status as reported by the oracle network. Discriminants are the wire codes.
#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum FlightStatus {
    Unknown = 0,
    OnTime = 10,
    LateAirline = 20,
    LateWeather = 30,
    LateTechnical = 40,
    LateOther = 50,
}

impl FlightStatus {
    pub const ALL: [FlightStatus; 6] = [
        FlightStatus::Unknown,
        FlightStatus::OnTime,
        FlightStatus::LateAirline,
        FlightStatus::LateWeather,
        FlightStatus::LateTechnical,
        FlightStatus::LateOther,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.code() == code)
    }

    /// Decode a status code received from an oracle.
    pub fn decode(code: u32) -> Result<Self, ContractError> {
        Self::from_code(code).ok_or(ContractError::InvalidStatusCode)
    }

    /// Only delays caused by the airline pay out.
    pub fn is_airline_fault(self) -> bool {
        self == FlightStatus::LateAirline
    }

    pub fn name(self) -> &'static str {
        match self {
            FlightStatus::Unknown => "unknown",
            FlightStatus::OnTime => "on_time",
            FlightStatus::LateAirline => "late_airline",
            FlightStatus::LateWeather => "late_weather",
            FlightStatus::LateTechnical => "late_technical",
            FlightStatus::LateOther => "late_other",
        }
    }
}

impl fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifies a single flight: operating airline, designator and scheduled departure.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FlightKey {
    pub airline: Address,
    pub designator: Symbol,
    /// Departure timestamp (Unix seconds).
    pub timestamp: u64,
}

impl FlightKey {
    pub fn new(airline: Address, designator: Symbol, timestamp: u64) -> Self {
        Self {
            airline,
            designator,
            timestamp,
        }
    }

    /// SHA-256 over the XDR encoding of the key; the stable flight id.
    pub fn digest(&self, env: &Env) -> BytesN<32> {
        env.crypto().sha256(&self.clone().to_xdr(env)).to_bytes()
    }
}

/// Payout ratio as an exact fraction.
#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PayoutMultiplier {
    pub numerator: u32,
    pub denominator: u32,
}

impl PayoutMultiplier {
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// `premium * numerator / denominator`, rounded down. `None` on overflow
    /// or a zero denominator.
    pub fn apply(&self, premium: i128) -> Option<i128> {
        premium
            .checked_mul(i128::from(self.numerator))?
            .checked_div(i128::from(self.denominator))
    }
}

impl Default for PayoutMultiplier {
    fn default() -> Self {
        Self::new(3, 2)
    }
}

/// Protocol parameters, fixed at initialization.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SuretyConfig {
    /// Below this many registered airlines, a registered airline admits others without a vote.
    pub bootstrap_airlines: u32,
    pub airline_funding_threshold: i128,
    pub max_premium: i128,
    pub payout_multiplier: PayoutMultiplier,
    pub oracle_registration_fee: i128,
    /// Oracle indexes are drawn from `0..oracle_index_space`.
    pub oracle_index_space: u32,
    /// Agreeing responses needed to finalize a flight status.
    pub min_responses: u32,
}

impl Default for SuretyConfig {
    fn default() -> Self {
        Self {
            bootstrap_airlines: 4,
            airline_funding_threshold: 10 * UNIT,
            max_premium: UNIT,
            payout_multiplier: PayoutMultiplier::default(),
            oracle_registration_fee: UNIT,
            oracle_index_space: 10,
            min_responses: 3,
        }
    }
}

impl SuretyConfig {
    /// Name of the first field holding an unusable value.
    pub fn invalid_field(&self) -> Option<&'static str> {
        if self.bootstrap_airlines == 0 {
            Some("bootstrap_airlines")
        } else if self.airline_funding_threshold < 0 {
            Some("airline_funding_threshold")
        } else if self.max_premium <= 0 {
            Some("max_premium")
        } else if self.payout_multiplier.denominator == 0 {
            Some("payout_multiplier")
        } else if self.oracle_registration_fee < 0 {
            Some("oracle_registration_fee")
        } else if !(INDEXES_PER_ORACLE..=MAX_INDEX_SPACE).contains(&self.oracle_index_space) {
            Some("oracle_index_space")
        } else if self.min_responses == 0 {
            Some("min_responses")
        } else {
            None
        }
    }

    pub fn validate(&self) -> Result<(), ContractError> {
        match self.invalid_field() {
            Some(_) => Err(ContractError::InvalidConfig),
            None => Ok(()),
        }
    }
}

/// Airline record. Never deleted once created.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Airline {
    pub registered: bool,
    pub funded: bool,
    /// Total value contributed through funding calls.
    pub funds: i128,
    /// Registered airlines that voted to admit this candidate.
    pub votes: Vec<Address>,
}

impl Airline {
    pub fn candidate(env: &Env) -> Self {
        Self {
            registered: false,
            funded: false,
            funds: 0,
            votes: Vec::new(env),
        }
    }
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Flight {
    pub key: FlightKey,
    pub status: FlightStatus,
    /// Set once by oracle consensus; the status never changes afterwards.
    pub finalized: bool,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PolicyKey {
    pub passenger: Address,
    pub flight: FlightKey,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Policy {
    pub passenger: Address,
    pub flight: FlightKey,
    pub premium: i128,
    /// Multiplier in force when the policy was bought.
    pub multiplier: PayoutMultiplier,
    pub credited: bool,
    pub forfeited: bool,
}

impl Policy {
    pub fn is_settled(&self) -> bool {
        self.credited || self.forfeited
    }
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestKey {
    pub index: u32,
    pub flight: FlightKey,
}

#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RequestState {
    Open,
    Closed(FlightStatus),
}

/// Oracle responses collected for one `(index, flight)` request.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StatusRequest {
    pub requester: Address,
    pub state: RequestState,
    /// Status code to the oracles that reported it.
    pub responses: Map<u32, Vec<Address>>,
}

impl StatusRequest {
    pub fn open(env: &Env, requester: Address) -> Self {
        Self {
            requester,
            state: RequestState::Open,
            responses: Map::new(env),
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == RequestState::Open
    }

    pub fn responses_for(&self, status: FlightStatus) -> u32 {
        self.responses
            .get(status.code())
            .map_or(0, |oracles| oracles.len())
    }

    pub fn has_responded(&self, oracle: &Address, status: FlightStatus) -> bool {
        self.responses
            .get(status.code())
            .is_some_and(|oracles| oracles.contains(oracle))
    }

    /// Add `oracle` under `status`; a repeated response is not counted twice.
    pub fn record(&mut self, env: &Env, oracle: Address, status: FlightStatus) {
        let mut oracles = self
            .responses
            .get(status.code())
            .unwrap_or_else(|| Vec::new(env));
        if !oracles.contains(&oracle) {
            oracles.push_back(oracle);
        }
        self.responses.set(status.code(), oracles);
    }
}

//! FlightSurety Contract
//!
//! Flight-delay insurance among airlines, passengers and an oracle network.
//! Airlines join through a bootstrap phase and then by majority vote, flight
//! statuses are finalized by a quorum of independent oracles, and passenger
//! premiums are escrowed, credited on airline-caused delays and withdrawn.
//!
//! Every mutating entry point is gated by the operational switch and by the
//! set of app addresses the admin has authorized to route calls in.

#![cfg_attr(not(test), no_std)]

mod catalog;
mod consensus;
pub mod error;
pub mod events;
mod ledger;
mod oracles;
mod registry;
mod storage;
pub mod types;

use soroban_sdk::{contract, contractimpl, Address, Env, Symbol, Vec};

pub use error::ContractError;
pub use events::{
    AirlineFunding, AirlineVote, Forfeiture, FlightRegistration, OracleRegistration, OracleReport,
    Payout, Purchase, StatusReport, SuretyEvent, Withdrawal,
};
pub use storage::DataKey;
pub use types::{
    Airline, Flight, FlightKey, FlightStatus, PayoutMultiplier, Policy, RequestKey, RequestState,
    StatusRequest, SuretyConfig, INDEXES_PER_ORACLE, UNIT,
};

use events::Facts;

#[contract]
pub struct FlightSurety;

#[contractimpl]
impl FlightSurety {
    /// Initialize the contract.
    ///
    /// # Arguments
    /// * `admin` - Address allowed to toggle operation and authorize apps
    /// * `first_airline` - Genesis airline, registered but not yet funded
    /// * `token` - Asset used for funding, fees, premiums and payouts
    /// * `config` - Protocol parameters
    pub fn initialize(
        env: Env,
        admin: Address,
        first_airline: Address,
        token: Address,
        config: SuretyConfig,
    ) -> Result<(), ContractError> {
        if storage::is_initialized(&env) {
            return Err(ContractError::AlreadyInitialized);
        }
        config.validate()?;
        admin.require_auth();

        let instance = env.storage().instance();
        instance.set(&DataKey::Admin, &admin);
        instance.set(&DataKey::Token, &token);
        instance.set(&DataKey::Config, &config);
        instance.set(&DataKey::Operational, &true);
        registry::register_first(&env, &first_airline)?;

        Ok(())
    }

    /// Turn every non-admin mutation on or off.
    ///
    /// # Events
    /// Emits `op_status` with the new flag.
    pub fn set_operating_status(
        env: Env,
        caller: Address,
        operational: bool,
    ) -> Result<Vec<SuretyEvent>, ContractError> {
        require_admin(&env, &caller)?;
        env.storage()
            .instance()
            .set(&DataKey::Operational, &operational);

        let mut facts = Facts::new(&env);
        facts.emit(SuretyEvent::OperationalStatusChanged(operational));
        Ok(facts.into_vec())
    }

    /// Allow `app` to route calls into the contract.
    pub fn authorize_caller(
        env: Env,
        caller: Address,
        app: Address,
    ) -> Result<Vec<SuretyEvent>, ContractError> {
        require_admin(&env, &caller)?;
        env.storage()
            .persistent()
            .set(&DataKey::Caller(app.clone()), &true);

        let mut facts = Facts::new(&env);
        facts.emit(SuretyEvent::CallerAuthorized(app));
        Ok(facts.into_vec())
    }

    pub fn deauthorize_caller(
        env: Env,
        caller: Address,
        app: Address,
    ) -> Result<Vec<SuretyEvent>, ContractError> {
        require_admin(&env, &caller)?;
        env.storage()
            .persistent()
            .remove(&DataKey::Caller(app.clone()));

        let mut facts = Facts::new(&env);
        facts.emit(SuretyEvent::CallerDeauthorized(app));
        Ok(facts.into_vec())
    }

    pub fn is_operational(env: Env) -> bool {
        storage::is_operational(&env)
    }

    pub fn is_caller_authorized(env: Env, app: Address) -> bool {
        storage::is_caller_authorized(&env, &app)
    }

    /// Admit `candidate` directly while the registry is small, otherwise
    /// record `caller`'s vote for it.
    ///
    /// # Events
    /// Emits `air_vote` for a counted vote and `air_reg` on admission.
    pub fn register_airline(
        env: Env,
        origin: Address,
        caller: Address,
        candidate: Address,
    ) -> Result<Vec<SuretyEvent>, ContractError> {
        let config = guard(&env, &origin)?;
        caller.require_auth();

        let mut facts = Facts::new(&env);
        registry::register_airline(&env, &config, &caller, &candidate, &mut facts)?;
        Ok(facts.into_vec())
    }

    /// Transfer `amount` from `airline` into the contract.
    ///
    /// # Events
    /// Emits `air_fund` the first time the airline becomes funded.
    pub fn fund_airline(
        env: Env,
        origin: Address,
        airline: Address,
        amount: i128,
    ) -> Result<Vec<SuretyEvent>, ContractError> {
        let config = guard(&env, &origin)?;
        airline.require_auth();

        let mut facts = Facts::new(&env);
        registry::fund_airline(&env, &config, &airline, amount, &mut facts)?;
        Ok(facts.into_vec())
    }

    pub fn number_of_airlines(env: Env) -> u32 {
        registry::count(&env)
    }

    pub fn get_airline(env: Env, airline: Address) -> Option<Airline> {
        registry::airline(&env, &airline)
    }

    /// Register a flight operated by `airline`, which must sign the call.
    ///
    /// # Events
    /// Emits `flt_reg` with the key and its digest.
    pub fn register_flight(
        env: Env,
        origin: Address,
        airline: Address,
        designator: Symbol,
        timestamp: u64,
    ) -> Result<Vec<SuretyEvent>, ContractError> {
        guard(&env, &origin)?;
        airline.require_auth();

        let mut facts = Facts::new(&env);
        catalog::register_flight(&env, FlightKey::new(airline, designator, timestamp), &mut facts)?;
        Ok(facts.into_vec())
    }

    pub fn number_of_flights(env: Env) -> u32 {
        catalog::count(&env)
    }

    pub fn get_flight(
        env: Env,
        airline: Address,
        designator: Symbol,
        timestamp: u64,
    ) -> Option<Flight> {
        catalog::flight(&env, &FlightKey::new(airline, designator, timestamp))
    }

    pub fn flight_status(
        env: Env,
        airline: Address,
        designator: Symbol,
        timestamp: u64,
    ) -> Result<FlightStatus, ContractError> {
        catalog::flight(&env, &FlightKey::new(airline, designator, timestamp))
            .map(|flight| flight.status)
            .ok_or(ContractError::FlightNotFound)
    }

    /// Ask the oracle network for a flight's status.
    ///
    /// Draws a request index and announces `(index, flight)`; only oracles
    /// holding that index may answer. Triggering a request that is already
    /// open announces it again without dropping collected responses.
    ///
    /// # Events
    /// Emits `orc_req` with the request key.
    pub fn fetch_flight_status(
        env: Env,
        origin: Address,
        requester: Address,
        airline: Address,
        designator: Symbol,
        timestamp: u64,
    ) -> Result<Vec<SuretyEvent>, ContractError> {
        let config = guard(&env, &origin)?;
        requester.require_auth();

        let flight = FlightKey::new(airline, designator, timestamp);
        let record = catalog::flight(&env, &flight).ok_or(ContractError::FlightNotFound)?;
        if record.finalized {
            return Err(ContractError::AlreadyFinalized);
        }

        let index = oracles::draw_index(&env, config.oracle_index_space);
        let mut facts = Facts::new(&env);
        consensus::open_request(&env, &requester, RequestKey { index, flight }, &mut facts)?;
        Ok(facts.into_vec())
    }

    /// Pay the registration fee and receive three distinct indexes.
    ///
    /// # Events
    /// Emits `orc_reg` with the assigned indexes.
    pub fn register_oracle(
        env: Env,
        origin: Address,
        oracle: Address,
        fee: i128,
    ) -> Result<Vec<SuretyEvent>, ContractError> {
        let config = guard(&env, &origin)?;
        oracle.require_auth();

        let mut facts = Facts::new(&env);
        oracles::register_oracle(&env, &config, &oracle, fee, &mut facts)?;
        Ok(facts.into_vec())
    }

    pub fn get_my_indexes(env: Env, oracle: Address) -> Result<Vec<u32>, ContractError> {
        oracles::indexes(&env, &oracle)
    }

    pub fn number_of_oracles(env: Env) -> u32 {
        oracles::count(&env)
    }

    /// Report `status` for the open request `(index, flight)`.
    ///
    /// The first status reported by `min_responses` distinct oracles
    /// finalizes the flight and settles its policies. Later responses are
    /// recorded only.
    ///
    /// # Arguments
    /// * `status` - Wire status code (0, 10, 20, 30, 40 or 50)
    ///
    /// # Events
    /// Emits `orc_rpt` for every accepted response, then on quorum either
    /// `flt_stat` followed by `ins_cred` / `ins_forf`, or `req_sup` when the
    /// flight was already finalized through another request.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_oracle_response(
        env: Env,
        origin: Address,
        oracle: Address,
        index: u32,
        airline: Address,
        designator: Symbol,
        timestamp: u64,
        status: u32,
    ) -> Result<Vec<SuretyEvent>, ContractError> {
        let config = guard(&env, &origin)?;
        oracle.require_auth();
        let status = FlightStatus::decode(status)?;

        let key = RequestKey {
            index,
            flight: FlightKey::new(airline, designator, timestamp),
        };
        let mut facts = Facts::new(&env);
        consensus::submit_response(&env, config.min_responses, &oracle, key, status, &mut facts)?;
        Ok(facts.into_vec())
    }

    pub fn get_request(
        env: Env,
        index: u32,
        airline: Address,
        designator: Symbol,
        timestamp: u64,
    ) -> Option<StatusRequest> {
        let flight = FlightKey::new(airline, designator, timestamp);
        consensus::request(&env, &RequestKey { index, flight })
    }

    /// Insure `passenger` on a flight by escrowing `premium`.
    ///
    /// # Events
    /// Emits `ins_buy`.
    #[allow(clippy::too_many_arguments)]
    pub fn buy(
        env: Env,
        origin: Address,
        passenger: Address,
        airline: Address,
        designator: Symbol,
        timestamp: u64,
        premium: i128,
    ) -> Result<Vec<SuretyEvent>, ContractError> {
        let config = guard(&env, &origin)?;
        passenger.require_auth();

        let flight = FlightKey::new(airline, designator, timestamp);
        let mut facts = Facts::new(&env);
        ledger::buy(&env, &config, &passenger, &flight, premium, &mut facts)?;
        Ok(facts.into_vec())
    }

    /// Transfer the passenger's whole credit balance out of the contract.
    ///
    /// # Events
    /// Emits `withdraw` with the amount paid.
    pub fn withdraw(
        env: Env,
        origin: Address,
        passenger: Address,
    ) -> Result<Vec<SuretyEvent>, ContractError> {
        guard(&env, &origin)?;
        passenger.require_auth();

        let mut facts = Facts::new(&env);
        ledger::withdraw(&env, &passenger, &mut facts)?;
        Ok(facts.into_vec())
    }

    pub fn get_policy(
        env: Env,
        passenger: Address,
        airline: Address,
        designator: Symbol,
        timestamp: u64,
    ) -> Option<Policy> {
        ledger::policy(&env, &passenger, &FlightKey::new(airline, designator, timestamp))
    }

    pub fn credit(env: Env, passenger: Address) -> i128 {
        ledger::credit(&env, &passenger)
    }

    /// Premiums held for policies whose flight is not yet settled.
    pub fn escrowed(env: Env) -> i128 {
        ledger::escrowed(&env)
    }

    /// Premiums kept by the pool after non-paying outcomes.
    pub fn forfeited(env: Env) -> i128 {
        ledger::forfeited(&env)
    }

    /// Token balance held by the contract.
    pub fn balance(env: Env) -> Result<i128, ContractError> {
        ledger::balance(&env)
    }

    pub fn get_config(env: Env) -> Result<SuretyConfig, ContractError> {
        storage::config(&env)
    }

    pub fn get_admin(env: Env) -> Result<Address, ContractError> {
        storage::admin(&env)
    }

    pub fn get_token(env: Env) -> Result<Address, ContractError> {
        storage::token(&env)
    }
}

/// Checks shared by every non-admin mutation: the contract is operational,
/// `origin` is an authorized app, and `origin` signed the call.
fn guard(env: &Env, origin: &Address) -> Result<SuretyConfig, ContractError> {
    let config = storage::config(env)?;
    if !storage::is_operational(env) {
        return Err(ContractError::NotOperational);
    }
    if !storage::is_caller_authorized(env, origin) {
        return Err(ContractError::Unauthorized);
    }
    origin.require_auth();
    Ok(config)
}

/// Admin operations ignore the operational switch so it can always be turned back on.
fn require_admin(env: &Env, caller: &Address) -> Result<(), ContractError> {
    if storage::admin(env)? != *caller {
        return Err(ContractError::Unauthorized);
    }
    caller.require_auth();
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;
    use soroban_sdk::{symbol_short, testutils::Address as _, token};

    const DEPARTURE: u64 = 1_700_000_000;
    const QF10: Symbol = symbol_short!("QF10");

    // -- Helpers -----------------------------------------------------------

    struct TestEnv<'a> {
        env: Env,
        client: FlightSuretyClient<'a>,
        contract: Address,
        token: Address,
        admin: Address,
        app: Address,
        first: Address,
    }

    impl TestEnv<'_> {
        fn mint(&self, to: &Address, amount: i128) {
            token::StellarAssetClient::new(&self.env, &self.token).mint(to, &amount);
        }

        fn balance_of(&self, who: &Address) -> i128 {
            token::Client::new(&self.env, &self.token).balance(who)
        }

        fn fund(&self, airline: &Address) {
            self.mint(airline, 10 * UNIT);
            self.client.fund_airline(&self.app, airline, &(10 * UNIT));
        }

        /// A new airline admitted by the genesis airline, then funded.
        fn funded_airline(&self) -> Address {
            let airline = Address::generate(&self.env);
            self.client
                .register_airline(&self.app, &self.first, &airline);
            self.fund(&airline);
            airline
        }

        fn qf10(&self) -> FlightKey {
            FlightKey::new(self.first.clone(), QF10, DEPARTURE)
        }

        fn register_qf10(&self) {
            self.client
                .register_flight(&self.app, &self.first, &QF10, &DEPARTURE);
        }

        /// A passenger holding a `premium` policy on QF10.
        fn passenger(&self, premium: i128) -> Address {
            let passenger = Address::generate(&self.env);
            self.mint(&passenger, premium);
            self.client
                .buy(&self.app, &passenger, &self.first, &QF10, &DEPARTURE, &premium);
            passenger
        }

        fn oracles(&self, count: usize) -> std::vec::Vec<Address> {
            (0..count)
                .map(|_| {
                    let oracle = Address::generate(&self.env);
                    self.mint(&oracle, UNIT);
                    self.client.register_oracle(&self.app, &oracle, &UNIT);
                    oracle
                })
                .collect()
        }

        /// Open a status request for QF10 and return its index.
        fn fetch(&self) -> u32 {
            let requester = Address::generate(&self.env);
            let facts = self.client.fetch_flight_status(
                &self.app,
                &requester,
                &self.first,
                &QF10,
                &DEPARTURE,
            );
            match facts.get(0) {
                Some(SuretyEvent::OracleRequest(key)) => key.index,
                other => panic!("unexpected facts {other:?}"),
            }
        }

        fn respond(&self, oracle: &Address, index: u32, status: FlightStatus) -> Vec<SuretyEvent> {
            self.client.submit_oracle_response(
                &self.app,
                oracle,
                &index,
                &self.first,
                &QF10,
                &DEPARTURE,
                &status.code(),
            )
        }

        fn status(&self) -> FlightStatus {
            self.client.flight_status(&self.first, &QF10, &DEPARTURE)
        }

        fn policy(&self, passenger: &Address) -> Policy {
            self.client
                .get_policy(passenger, &self.first, &QF10, &DEPARTURE)
                .unwrap()
        }

        fn request(&self, index: u32) -> StatusRequest {
            self.client
                .get_request(&index, &self.first, &QF10, &DEPARTURE)
                .unwrap()
        }
    }

    fn setup_with(config: SuretyConfig) -> TestEnv<'static> {
        let env = Env::default();
        env.mock_all_auths();

        let admin = Address::generate(&env);
        let app = Address::generate(&env);
        let first = Address::generate(&env);

        let contract = env.register(FlightSurety, ());
        let client = FlightSuretyClient::new(&env, &contract);

        let token_admin = Address::generate(&env);
        let token = env
            .register_stellar_asset_contract_v2(token_admin)
            .address();

        client.initialize(&admin, &first, &token, &config);
        client.authorize_caller(&admin, &app);

        // Leak lifetimes for test convenience
        let client = unsafe {
            core::mem::transmute::<FlightSuretyClient<'_>, FlightSuretyClient<'static>>(client)
        };

        let t = TestEnv {
            env,
            client,
            contract,
            token,
            admin,
            app,
            first,
        };
        t.fund(&t.first);
        t
    }

    /// With a three-wide index space every oracle holds every index.
    fn setup() -> TestEnv<'static> {
        setup_with(SuretyConfig {
            oracle_index_space: 3,
            ..SuretyConfig::default()
        })
    }

    // -- Tests -------------------------------------------------------------

    #[test]
    fn test_initialize() {
        let t = setup();

        assert_eq!(t.client.get_admin(), t.admin);
        assert_eq!(t.client.get_token(), t.token);
        assert!(t.client.is_operational());
        assert!(t.client.is_caller_authorized(&t.app));
        assert_eq!(t.client.number_of_airlines(), 1);
        assert_eq!(t.client.balance(), 10 * UNIT);

        t.env.as_contract(&t.contract, || {
            let config: SuretyConfig = t
                .env
                .storage()
                .instance()
                .get(&DataKey::Config)
                .unwrap();
            assert_eq!(config.oracle_index_space, 3);
            assert_eq!(config.min_responses, 3);
        });
    }

    #[test]
    #[should_panic(expected = "HostError: Error(Contract, #2)")]
    fn test_initialize_already_initialized() {
        let t = setup();
        t.client
            .initialize(&t.admin, &t.first, &t.token, &SuretyConfig::default());
    }

    #[test]
    fn test_genesis_airline_starts_unfunded() {
        let env = Env::default();
        env.mock_all_auths();
        let client = FlightSuretyClient::new(&env, &env.register(FlightSurety, ()));
        let first = Address::generate(&env);

        client.initialize(
            &Address::generate(&env),
            &first,
            &Address::generate(&env),
            &SuretyConfig::default(),
        );

        let genesis = client.get_airline(&first).unwrap();
        assert!(genesis.registered);
        assert!(!genesis.funded);
        assert_eq!(client.number_of_airlines(), 1);
    }

    #[test]
    fn test_initialize_rejects_invalid_config() {
        let env = Env::default();
        env.mock_all_auths();
        let client = FlightSuretyClient::new(&env, &env.register(FlightSurety, ()));
        let config = SuretyConfig {
            min_responses: 0,
            ..SuretyConfig::default()
        };

        assert_eq!(
            client.try_initialize(
                &Address::generate(&env),
                &Address::generate(&env),
                &Address::generate(&env),
                &config,
            ),
            Err(Ok(ContractError::InvalidConfig))
        );
        assert_eq!(client.try_get_admin(), Err(Ok(ContractError::NotInitialized)));
    }

    #[test]
    fn test_bootstrap_then_consensus_scenario() {
        let t = setup();
        let a2 = t.funded_airline();
        let a3 = t.funded_airline();
        t.funded_airline();
        assert_eq!(t.client.number_of_airlines(), 4);

        let a5 = Address::generate(&t.env);
        let facts = t.client.register_airline(&t.app, &a2, &a5);
        assert_eq!(facts.len(), 1);
        assert_eq!(t.client.number_of_airlines(), 4);

        let facts = t.client.register_airline(&t.app, &a2, &a5);
        assert!(facts.is_empty());
        assert_eq!(t.client.number_of_airlines(), 4);

        let facts = t.client.register_airline(&t.app, &a3, &a5);
        assert_eq!(facts.get(1), Some(SuretyEvent::AirlineRegistered(a5.clone())));
        assert_eq!(t.client.number_of_airlines(), 5);
        assert!(t.client.get_airline(&a5).unwrap().registered);
    }

    #[test]
    fn test_funding_gate() {
        let t = setup();
        let a2 = Address::generate(&t.env);
        t.client.register_airline(&t.app, &t.first, &a2);
        t.mint(&a2, 25 * UNIT);

        assert_eq!(
            t.client.try_fund_airline(&t.app, &a2, &(10 * UNIT - 1)),
            Err(Ok(ContractError::InsufficientFunds))
        );
        assert!(!t.client.get_airline(&a2).unwrap().funded);

        let facts = t.client.fund_airline(&t.app, &a2, &(10 * UNIT));
        assert_eq!(
            facts,
            Vec::from_array(
                &t.env,
                [SuretyEvent::AirlineFunded(AirlineFunding {
                    airline: a2.clone(),
                    amount: 10 * UNIT,
                })]
            )
        );

        let facts = t.client.fund_airline(&t.app, &a2, &(10 * UNIT));
        assert!(facts.is_empty());

        let record = t.client.get_airline(&a2).unwrap();
        assert!(record.funded);
        assert_eq!(record.funds, 20 * UNIT);
        assert_eq!(t.balance_of(&a2), 5 * UNIT);
        assert_eq!(t.client.balance(), 30 * UNIT);
    }

    #[test]
    fn test_fund_unregistered_airline() {
        let t = setup();
        let stranger = Address::generate(&t.env);
        t.mint(&stranger, 10 * UNIT);

        assert_eq!(
            t.client.try_fund_airline(&t.app, &stranger, &(10 * UNIT)),
            Err(Ok(ContractError::NotRegistered))
        );
        assert_eq!(t.balance_of(&stranger), 10 * UNIT);
        assert_eq!(t.client.balance(), 10 * UNIT);
    }

    #[test]
    fn test_register_flight_requires_funded_airline() {
        let t = setup();
        let a2 = Address::generate(&t.env);
        t.client.register_airline(&t.app, &t.first, &a2);

        assert_eq!(
            t.client.try_register_flight(&t.app, &a2, &QF10, &DEPARTURE),
            Err(Ok(ContractError::NotFunded))
        );
        assert_eq!(
            t.client
                .try_register_flight(&t.app, &Address::generate(&t.env), &QF10, &DEPARTURE),
            Err(Ok(ContractError::NotRegistered))
        );
        assert_eq!(t.client.number_of_flights(), 0);

        let facts = t
            .client
            .register_flight(&t.app, &t.first, &QF10, &DEPARTURE);
        assert_eq!(
            facts.get(0),
            Some(SuretyEvent::FlightRegistered(FlightRegistration {
                flight: t.qf10(),
                id: t.qf10().digest(&t.env),
            }))
        );
        assert_eq!(t.client.number_of_flights(), 1);
        assert_eq!(t.status(), FlightStatus::Unknown);
        assert_eq!(
            t.client.try_register_flight(&t.app, &t.first, &QF10, &DEPARTURE),
            Err(Ok(ContractError::AlreadyExists))
        );
    }

    #[test]
    fn test_late_airline_payout_scenario() {
        let t = setup_with(SuretyConfig::default());
        t.register_qf10();
        let passenger = t.passenger(UNIT);

        let index = t.fetch();
        let holders: std::vec::Vec<Address> = t
            .oracles(60)
            .into_iter()
            .filter(|oracle| t.client.get_my_indexes(oracle).contains(index))
            .collect();
        assert!(holders.len() >= 3);

        for oracle in &holders[..3] {
            t.respond(oracle, index, FlightStatus::LateAirline);
        }

        assert_eq!(t.status(), FlightStatus::LateAirline);
        assert_eq!(t.client.credit(&passenger), UNIT * 3 / 2);
        assert!(t.policy(&passenger).credited);
        assert_eq!(t.client.escrowed(), 0);

        let facts = t.client.withdraw(&t.app, &passenger);
        assert_eq!(
            facts,
            Vec::from_array(
                &t.env,
                [SuretyEvent::CreditWithdrawn(Withdrawal {
                    passenger: passenger.clone(),
                    amount: UNIT * 3 / 2,
                })]
            )
        );
        assert_eq!(t.balance_of(&passenger), UNIT * 3 / 2);
        assert_eq!(t.client.credit(&passenger), 0);

        assert_eq!(
            t.client.try_withdraw(&t.app, &passenger),
            Err(Ok(ContractError::NoCredit))
        );
        assert_eq!(t.balance_of(&passenger), UNIT * 3 / 2);
    }

    #[test]
    fn test_withdraw_pays_only_own_credit() {
        let t = setup();
        t.register_qf10();
        let p1 = t.passenger(UNIT);
        let p2 = t.passenger(UNIT / 2);

        let index = t.fetch();
        for oracle in t.oracles(3) {
            t.respond(&oracle, index, FlightStatus::LateAirline);
        }
        assert_eq!(t.client.credit(&p1), 15_000_000);
        assert_eq!(t.client.credit(&p2), 7_500_000);

        let held = t.client.balance();
        t.client.withdraw(&t.app, &p1);

        assert_eq!(t.client.credit(&p1), 0);
        assert_eq!(t.client.credit(&p2), 7_500_000);
        assert_eq!(t.balance_of(&p1), 15_000_000);
        assert_eq!(t.balance_of(&p2), 0);
        assert_eq!(t.client.balance(), held - 15_000_000);
        assert_eq!(
            t.client.try_withdraw(&t.app, &p1),
            Err(Ok(ContractError::NoCredit))
        );

        t.client.withdraw(&t.app, &p2);
        assert_eq!(t.balance_of(&p2), 7_500_000);
        assert_eq!(t.client.balance(), held - 22_500_000);
    }

    #[test]
    fn test_finalized_status_cannot_be_changed() {
        let t = setup();
        t.register_qf10();
        let passenger = t.passenger(UNIT);
        let index = t.fetch();
        let oracles = t.oracles(5);

        t.respond(&oracles[0], index, FlightStatus::OnTime);
        t.respond(&oracles[1], index, FlightStatus::OnTime);
        let facts = t.respond(&oracles[2], index, FlightStatus::OnTime);
        assert_eq!(facts.len(), 3);
        assert_eq!(
            facts.get(1),
            Some(SuretyEvent::FlightStatusInfo(StatusReport {
                request: RequestKey {
                    index,
                    flight: t.qf10(),
                },
                status: FlightStatus::OnTime,
            }))
        );
        assert_eq!(
            facts.get(2),
            Some(SuretyEvent::PremiumsForfeited(Forfeiture {
                flight: t.qf10(),
                amount: UNIT,
            }))
        );

        for oracle in [&oracles[3], &oracles[4], &oracles[0]] {
            let facts = t.respond(oracle, index, FlightStatus::LateAirline);
            assert_eq!(facts.len(), 1);
        }

        assert_eq!(t.status(), FlightStatus::OnTime);
        assert_eq!(t.client.credit(&passenger), 0);
        assert!(t.policy(&passenger).forfeited);
        assert_eq!(t.client.forfeited(), UNIT);
        assert_eq!(t.client.escrowed(), 0);

        let request = t.request(index);
        assert_eq!(request.state, RequestState::Closed(FlightStatus::OnTime));
        assert_eq!(request.responses_for(FlightStatus::LateAirline), 3);

        assert_eq!(
            t.client.try_fetch_flight_status(
                &t.app,
                &passenger,
                &t.first,
                &QF10,
                &DEPARTURE
            ),
            Err(Ok(ContractError::AlreadyFinalized))
        );
        let late = Address::generate(&t.env);
        t.mint(&late, UNIT);
        assert_eq!(
            t.client
                .try_buy(&t.app, &late, &t.first, &QF10, &DEPARTURE, &UNIT),
            Err(Ok(ContractError::AlreadyFinalized))
        );
    }

    #[test]
    fn test_quorum_on_finalized_flight_is_superseded() {
        let t = setup();
        t.register_qf10();
        let passenger = t.passenger(UNIT);

        let first = t.fetch();
        let second = (0..32)
            .map(|_| t.fetch())
            .find(|index| *index != first)
            .unwrap();
        let oracles = t.oracles(3);

        for oracle in &oracles {
            t.respond(oracle, first, FlightStatus::LateAirline);
        }
        assert_eq!(t.client.credit(&passenger), UNIT * 3 / 2);

        let mut last = Vec::new(&t.env);
        for oracle in &oracles {
            last = t.respond(oracle, second, FlightStatus::OnTime);
        }

        assert_eq!(
            last.last(),
            Some(SuretyEvent::RequestSuperseded(StatusReport {
                request: RequestKey {
                    index: second,
                    flight: t.qf10(),
                },
                status: FlightStatus::OnTime,
            }))
        );
        assert_eq!(
            t.request(second).state,
            RequestState::Closed(FlightStatus::OnTime)
        );
        assert_eq!(t.status(), FlightStatus::LateAirline);
        assert_eq!(t.client.credit(&passenger), UNIT * 3 / 2);
        assert_eq!(t.client.forfeited(), 0);
    }

    #[test]
    fn test_reopening_keeps_collected_responses() {
        let t = setup();
        t.register_qf10();
        let index = t.fetch();
        let oracles = t.oracles(2);
        t.respond(&oracles[0], index, FlightStatus::LateWeather);

        let again = (0..32).map(|_| t.fetch()).find(|i| *i == index);
        assert_eq!(again, Some(index));

        let request = t.request(index);
        assert!(request.is_open());
        assert_eq!(request.responses_for(FlightStatus::LateWeather), 1);
    }

    #[test]
    fn test_payout_overflow_leaves_request_open() {
        let premium = 10i128.pow(30);
        let t = setup_with(SuretyConfig {
            max_premium: premium,
            payout_multiplier: PayoutMultiplier::new(u32::MAX, 1),
            oracle_index_space: 3,
            ..SuretyConfig::default()
        });
        t.register_qf10();
        let passenger = t.passenger(premium);
        let index = t.fetch();
        let oracles = t.oracles(3);

        t.respond(&oracles[0], index, FlightStatus::LateAirline);
        t.respond(&oracles[1], index, FlightStatus::LateAirline);
        let held = t.client.balance();

        assert_eq!(
            t.client.try_submit_oracle_response(
                &t.app,
                &oracles[2],
                &index,
                &t.first,
                &QF10,
                &DEPARTURE,
                &FlightStatus::LateAirline.code(),
            ),
            Err(Ok(ContractError::ArithmeticOverflow))
        );

        let request = t.request(index);
        assert!(request.is_open());
        assert_eq!(request.responses_for(FlightStatus::LateAirline), 2);
        assert!(request.has_responded(&oracles[1], FlightStatus::LateAirline));
        assert!(!request.has_responded(&oracles[2], FlightStatus::LateAirline));

        let flight = t
            .client
            .get_flight(&t.first, &QF10, &DEPARTURE)
            .unwrap();
        assert!(!flight.finalized);
        assert_eq!(flight.status, FlightStatus::Unknown);

        let policy = t.policy(&passenger);
        assert!(!policy.is_settled());
        assert_eq!(t.client.escrowed(), premium);
        assert_eq!(t.client.credit(&passenger), 0);
        assert_eq!(t.client.balance(), held);
    }

    #[test]
    fn test_not_operational_blocks_mutations() {
        let t = setup();
        t.client.set_operating_status(&t.admin, &false);
        assert!(!t.client.is_operational());

        let a2 = Address::generate(&t.env);
        assert_eq!(
            t.client.try_register_airline(&t.app, &t.first, &a2),
            Err(Ok(ContractError::NotOperational))
        );
        let oracle = Address::generate(&t.env);
        t.mint(&oracle, UNIT);
        assert_eq!(
            t.client.try_register_oracle(&t.app, &oracle, &UNIT),
            Err(Ok(ContractError::NotOperational))
        );
        assert_eq!(t.balance_of(&oracle), UNIT);
        assert_eq!(t.client.number_of_airlines(), 1);
        assert_eq!(t.client.balance(), 10 * UNIT);

        t.client.set_operating_status(&t.admin, &true);
        t.client.register_airline(&t.app, &t.first, &a2);
        assert_eq!(t.client.number_of_airlines(), 2);
    }

    #[test]
    fn test_admin_operations_require_admin() {
        let t = setup();
        let rogue = Address::generate(&t.env);

        assert_eq!(
            t.client.try_set_operating_status(&t.first, &false),
            Err(Ok(ContractError::Unauthorized))
        );
        assert_eq!(
            t.client.try_authorize_caller(&t.first, &rogue),
            Err(Ok(ContractError::Unauthorized))
        );
        assert!(t.client.is_operational());
        assert!(!t.client.is_caller_authorized(&rogue));
    }

    #[test]
    fn test_unauthorized_origin_rejected() {
        let t = setup();
        let rogue = Address::generate(&t.env);
        let a2 = Address::generate(&t.env);

        assert_eq!(
            t.client.try_register_airline(&rogue, &t.first, &a2),
            Err(Ok(ContractError::Unauthorized))
        );

        t.client.deauthorize_caller(&t.admin, &t.app);
        assert!(!t.client.is_caller_authorized(&t.app));
        assert_eq!(
            t.client.try_register_airline(&t.app, &t.first, &a2),
            Err(Ok(ContractError::Unauthorized))
        );
    }

    #[test]
    fn test_buy_guards() {
        let t = setup();
        let passenger = Address::generate(&t.env);
        t.mint(&passenger, 2 * UNIT);

        assert_eq!(
            t.client
                .try_buy(&t.app, &passenger, &t.first, &QF10, &DEPARTURE, &UNIT),
            Err(Ok(ContractError::FlightNotFound))
        );

        t.register_qf10();
        assert_eq!(
            t.client
                .try_buy(&t.app, &passenger, &t.first, &QF10, &DEPARTURE, &0),
            Err(Ok(ContractError::InvalidAmount))
        );
        assert_eq!(
            t.client
                .try_buy(&t.app, &passenger, &t.first, &QF10, &DEPARTURE, &(UNIT + 1)),
            Err(Ok(ContractError::ExceedsCap))
        );

        let facts = t
            .client
            .buy(&t.app, &passenger, &t.first, &QF10, &DEPARTURE, &UNIT);
        assert_eq!(
            facts.get(0),
            Some(SuretyEvent::InsurancePurchased(Purchase {
                passenger: passenger.clone(),
                flight: t.qf10(),
                premium: UNIT,
            }))
        );
        assert_eq!(
            t.client
                .try_buy(&t.app, &passenger, &t.first, &QF10, &DEPARTURE, &UNIT),
            Err(Ok(ContractError::DuplicatePolicy))
        );

        assert_eq!(t.balance_of(&passenger), UNIT);
        assert_eq!(t.client.escrowed(), UNIT);
        assert_eq!(t.policy(&passenger).multiplier, PayoutMultiplier::new(3, 2));
    }

    #[test]
    fn test_oracle_registration() {
        let t = setup_with(SuretyConfig::default());
        let oracle = Address::generate(&t.env);
        t.mint(&oracle, 2 * UNIT);

        assert_eq!(
            t.client.try_register_oracle(&t.app, &oracle, &(UNIT - 1)),
            Err(Ok(ContractError::InsufficientFee))
        );
        assert_eq!(
            t.client.try_get_my_indexes(&oracle),
            Err(Ok(ContractError::NotRegistered))
        );

        let facts = t.client.register_oracle(&t.app, &oracle, &UNIT);
        let indexes = t.client.get_my_indexes(&oracle);
        assert_eq!(
            facts.get(0),
            Some(SuretyEvent::OracleRegistered(OracleRegistration {
                oracle: oracle.clone(),
                indexes: indexes.clone(),
            }))
        );
        assert_eq!(indexes.len(), INDEXES_PER_ORACLE);
        assert!(indexes.iter().all(|index| index < 10));

        assert_eq!(
            t.client.try_register_oracle(&t.app, &oracle, &UNIT),
            Err(Ok(ContractError::AlreadyRegistered))
        );
        assert_eq!(t.client.number_of_oracles(), 1);
        assert_eq!(t.balance_of(&oracle), UNIT);
    }

    #[test]
    fn test_response_guards() {
        let t = setup_with(SuretyConfig::default());
        t.register_qf10();
        let oracle = t.oracles(1).remove(0);
        let held = t.client.get_my_indexes(&oracle);
        let missing = (0..10u32).find(|index| !held.contains(*index)).unwrap();
        let owned = held.get(0).unwrap();

        let submit = |oracle: &Address, index: u32, code: u32| {
            t.client.try_submit_oracle_response(
                &t.app,
                oracle,
                &index,
                &t.first,
                &QF10,
                &DEPARTURE,
                &code,
            )
        };

        assert_eq!(
            submit(&oracle, missing, FlightStatus::OnTime.code()),
            Err(Ok(ContractError::InvalidIndex))
        );
        assert_eq!(
            submit(&Address::generate(&t.env), owned, FlightStatus::OnTime.code()),
            Err(Ok(ContractError::InvalidIndex))
        );
        assert_eq!(
            submit(&oracle, owned, FlightStatus::OnTime.code()),
            Err(Ok(ContractError::RequestNotOpen))
        );
        assert_eq!(
            submit(&oracle, owned, 15),
            Err(Ok(ContractError::InvalidStatusCode))
        );
    }

    #[test]
    fn test_withdraw_requires_contract_funds() {
        let t = setup_with(SuretyConfig {
            payout_multiplier: PayoutMultiplier::new(100, 1),
            oracle_index_space: 3,
            ..SuretyConfig::default()
        });
        t.register_qf10();
        let passenger = t.passenger(UNIT);
        let index = t.fetch();
        for oracle in t.oracles(3) {
            t.respond(&oracle, index, FlightStatus::LateAirline);
        }
        assert_eq!(t.client.credit(&passenger), 100 * UNIT);
        assert_eq!(t.client.balance(), 14 * UNIT);

        assert_eq!(
            t.client.try_withdraw(&t.app, &passenger),
            Err(Ok(ContractError::InsufficientFunds))
        );
        assert_eq!(t.client.credit(&passenger), 100 * UNIT);

        t.mint(&t.contract, 100 * UNIT);
        t.client.withdraw(&t.app, &passenger);
        assert_eq!(t.balance_of(&passenger), 100 * UNIT);
        assert_eq!(t.client.balance(), 14 * UNIT);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn test_quorum_is_order_independent(
            order in Just((0..7usize).collect::<std::vec::Vec<_>>()).prop_shuffle()
        ) {
            let reports = [
                FlightStatus::LateAirline,
                FlightStatus::OnTime,
                FlightStatus::LateAirline,
                FlightStatus::LateWeather,
                FlightStatus::OnTime,
                FlightStatus::LateAirline,
                FlightStatus::LateWeather,
            ];
            let t = setup();
            t.register_qf10();
            let passenger = t.passenger(UNIT);
            let index = t.fetch();
            let oracles = t.oracles(reports.len());

            for i in order {
                t.respond(&oracles[i], index, reports[i]);
            }

            prop_assert_eq!(t.status(), FlightStatus::LateAirline);
            prop_assert_eq!(t.client.credit(&passenger), UNIT * 3 / 2);
        }

        #[test]
        fn test_single_payout_per_policy(
            premiums in prop::collection::vec(1i128..=UNIT, 1..4),
            retries in 1usize..3,
        ) {
            let t = setup();
            t.register_qf10();
            let passengers: std::vec::Vec<Address> =
                premiums.iter().map(|premium| t.passenger(*premium)).collect();
            let index = t.fetch();
            for oracle in t.oracles(4) {
                t.respond(&oracle, index, FlightStatus::LateAirline);
            }

            let resettled = t.env.as_contract(&t.contract, || {
                let mut facts = Facts::new(&t.env);
                ledger::settle(&t.env, &t.qf10(), FlightStatus::LateAirline, &mut facts)
                    .map(|_| facts.into_vec().len())
            });
            prop_assert_eq!(resettled, Ok(0));

            for (passenger, premium) in passengers.iter().zip(&premiums) {
                let payout = premium * 3 / 2;
                prop_assert_eq!(t.client.credit(passenger), payout);

                t.client.withdraw(&t.app, passenger);
                for _ in 0..retries {
                    prop_assert_eq!(
                        t.client.try_withdraw(&t.app, passenger),
                        Err(Ok(ContractError::NoCredit))
                    );
                }
                prop_assert_eq!(t.balance_of(passenger), payout);
            }
        }
    }
}

//! Local Soroban host for the simulation.
//!
//! The sandbox deploys the contract and a Stellar asset into a fresh test
//! environment and mints participants their balances. Every authorization is
//! mocked, so the sandbox stands in for both the network and its signers.

use std::fmt::Debug;

use flight_surety::{ContractError, FlightSurety, FlightSuretyClient, SuretyConfig};
use soroban_sdk::testutils::Address as _;
use soroban_sdk::{token, Address, Env, InvokeError, Symbol, TryFromVal};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SandboxError {
    #[error("contract rejected the call: {0:?}")]
    Contract(ContractError),
    #[error("host failure: {0}")]
    Host(String),
}

impl SandboxError {
    /// Repeating the call cannot succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(self, SandboxError::Contract(err) if err.is_permanent())
    }
}

/// What a generated `try_*` client method returns.
pub type Invocation<T, C> = Result<Result<T, C>, Result<ContractError, InvokeError>>;

/// Flatten a `try_*` invocation into the value or a [`SandboxError`].
pub fn outcome<T, C: Debug>(invocation: Invocation<T, C>) -> Result<T, SandboxError> {
    match invocation {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(conversion)) => Err(SandboxError::Host(format!("{conversion:?}"))),
        Err(Ok(err)) => Err(SandboxError::Contract(err)),
        Err(Err(invoke)) => Err(SandboxError::Host(format!("{invoke:?}"))),
    }
}

#[derive(Clone)]
pub struct Sandbox {
    env: Env,
    contract: Address,
    token: Address,
    admin: Address,
    app: Address,
    first_airline: Address,
}

impl Sandbox {
    /// Deploy and initialize the contract, then authorize the app address
    /// every simulated participant routes its calls through.
    pub fn deploy(config: &SuretyConfig) -> Result<Self, SandboxError> {
        let env = Env::default();
        env.mock_all_auths();

        let admin = Address::generate(&env);
        let app = Address::generate(&env);
        let first_airline = Address::generate(&env);
        let token = env
            .register_stellar_asset_contract_v2(admin.clone())
            .address();
        let contract = env.register(FlightSurety, ());

        let sandbox = Self {
            env,
            contract,
            token,
            admin,
            app,
            first_airline,
        };
        let client = sandbox.client();
        outcome(client.try_initialize(
            &sandbox.admin,
            &sandbox.first_airline,
            &sandbox.token,
            config,
        ))?;
        outcome(client.try_authorize_caller(&sandbox.admin, &sandbox.app))?;

        info!(contract = ?sandbox.contract, token = ?sandbox.token, "contract deployed");
        Ok(sandbox)
    }

    pub fn client(&self) -> FlightSuretyClient<'_> {
        FlightSuretyClient::new(&self.env, &self.contract)
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn contract(&self) -> &Address {
        &self.contract
    }

    pub fn app(&self) -> &Address {
        &self.app
    }

    pub fn admin(&self) -> &Address {
        &self.admin
    }

    pub fn first_airline(&self) -> &Address {
        &self.first_airline
    }

    /// A fresh participant address.
    pub fn account(&self) -> Address {
        Address::generate(&self.env)
    }

    pub fn mint(&self, to: &Address, amount: i128) {
        token::StellarAssetClient::new(&self.env, &self.token).mint(to, &amount);
        debug!(account = ?to, amount, "minted");
    }

    pub fn token_balance(&self, account: &Address) -> i128 {
        token::Client::new(&self.env, &self.token).balance(account)
    }

    pub fn symbol(&self, designator: &str) -> Result<Symbol, SandboxError> {
        Symbol::try_from_val(&self.env, &designator)
            .map_err(|err| SandboxError::Host(format!("designator '{designator}': {err:?}")))
    }
}

use soroban_sdk::contracterror;

/// Rejections returned by the contract. A failed call leaves no state behind.
#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum ContractError {
    NotInitialized = 1,
    AlreadyInitialized = 2,
    InvalidConfig = 3,
    Unauthorized = 4,
    NotOperational = 5,
    NotRegistered = 6,
    NotFunded = 7,
    AlreadyRegistered = 8,
    AlreadyExists = 9,
    AlreadyFinalized = 10,
    InsufficientFunds = 11,
    InsufficientFee = 12,
    InvalidIndex = 13,
    RequestNotOpen = 14,
    FlightNotFound = 15,
    DuplicatePolicy = 16,
    ExceedsCap = 17,
    NoCredit = 18,
    /// Zero or negative premium, fee or funding amount.
    InvalidAmount = 19,
    ArithmeticOverflow = 20,
    /// Oracle reported a code that maps to no flight status.
    InvalidStatusCode = 21,
}

impl ContractError {
    /// Rejections that a retry of the same call can never turn into a success.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ContractError::AlreadyRegistered
                | ContractError::AlreadyExists
                | ContractError::AlreadyFinalized
                | ContractError::DuplicatePolicy
        )
    }
}

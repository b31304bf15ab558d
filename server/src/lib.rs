//! Flight Surety simulation server
//!
//! Deploys the contract into a local Soroban sandbox and drives it through an
//! in-process oracle network.

pub mod config;
pub mod demo;
pub mod services;

//! mcUSD Common Library
//!
//! Shared types, constants, and utilities for every mcUSD component.
//! This crate is the foundation of the solvency-accounting engine:
//!
//! - **Collateral Registry**: per-asset decimals, safety ratio, price feed, activation flag
//! - **Fixed-point Math**: 1e18 decimal math over u128 amounts with 256-bit
//!   intermediates, exponential decay, integer sqrt
//! - **Events**: typed, borsh-serializable event log for off-chain indexers
//! - **Protocol Params**: versioned governance configuration, re-read on every call
//! - **External Interfaces**: price feed and token ledger traits with in-memory
//!   implementations for simulation and tests
//!
//! ## Execution Model
//!
//! Every state-mutating call is serialized and atomic. Components expose pure
//! compute functions over borrowed state; the transaction layer in
//! `mcusd-trove-manager` commits the result and only then runs token effects.
//!
//! This crate is `no_std` compatible for WASM compilation when built
//! without the default `std` feature.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

// Re-export collections for submodules based on feature
#[cfg(not(feature = "std"))]
pub use alloc::{collections::BTreeMap, vec::Vec};
#[cfg(feature = "std")]
pub use std::{collections::BTreeMap, vec::Vec};

pub mod constants;
pub mod errors;
pub mod types;
pub mod math;
pub mod events;
pub mod config;
pub mod collateral;
pub mod oracle;
pub mod token_ops;

// Re-exports for convenience
pub use constants::*;
pub use errors::*;
pub use types::*;
pub use math::*;
pub use events::*;
pub use config::*;
pub use collateral::*;
pub use oracle::*;
pub use token_ops::*;

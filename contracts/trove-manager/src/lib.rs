//! mcUSD Trove Manager
//!
//! Core solvency engine of the mcUSD protocol. Borrowers lock a basket of
//! collateral assets in a trove and mint stablecoin against it; each asset
//! counts toward the trove's ratio at its governance safety ratio.
//!
//! ## Components
//!
//! - [`sorted_troves::SortedTroveIndex`]: troves ordered by AICR, riskiest at the tail
//! - [`trove::TroveLedger`]: positions, pools, stakes and lazy redistribution rewards
//! - [`borrower_ops::BorrowerOperations`]: open, adjust, close, claim surplus
//! - [`liquidation::LiquidationEngine`]: offset against the Stability Pool, then redistribute
//! - [`redemption::RedemptionEngine`]: stablecoin for collateral from the riskiest troves
//! - [`fees::FeeState`]: decaying base rate behind borrowing and redemption fees
//! - [`protocol::Protocol`]: transactional facade and read-only queries
//!
//! ## Ratios
//!
//! ```text
//! AICR = Σ(amount × price × safety_ratio) / debt
//! TCR  = same over every active trove and the default pool
//! ```
//!
//! | Condition       | Effect                                  |
//! |-----------------|-----------------------------------------|
//! | AICR < MCR      | liquidatable                            |
//! | TCR < CCR       | recovery mode                           |
//! | TCR < MCR       | redemptions blocked                     |

pub mod sorted_troves;
pub mod trove;
pub mod fees;
pub mod surplus;
pub mod context;
pub mod borrower_ops;
pub mod liquidation;
pub mod redemption;
pub mod protocol;

#[cfg(test)]
mod integration_tests;

pub use borrower_ops::{BorrowerOperations, DebtChange};
pub use context::{SystemState, TxContext};
pub use liquidation::{LiquidationEngine, LiquidationMode, LiquidationPlan};
pub use protocol::Protocol;
pub use redemption::{RedemptionEngine, RedemptionOutcome};
pub use sorted_troves::SortedTroveIndex;
pub use trove::TroveLedger;

//! Error Types for mcUSD Protocol
//!
//! Every failure aborts the whole call: nothing is committed and the caller
//! must re-read state before retrying. Each variant carries a stable
//! [`McUsdError::code`] for tooling and a [`McUsdError::category`].

use crate::types::{Address, AssetId, RewarderId, TroveId};

/// Result type alias for mcUSD operations
pub type McUsdResult<T> = Result<T, McUsdError>;

/// Main error enum for all mcUSD protocol errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum McUsdError {
    // ============ Trove Errors ============
    /// Trove not found with given ID
    #[error("trove {trove_id:?} not found")]
    TroveNotFound { trove_id: TroveId },

    /// Trove exists but is not active
    #[error("trove {trove_id:?} is not active")]
    TroveNotActive { trove_id: TroveId },

    /// Trove id already taken
    #[error("trove {trove_id:?} already exists")]
    TroveAlreadyExists { trove_id: TroveId },

    /// Resulting collateral ratio is below the required ratio
    #[error("collateral ratio {current_ratio} below required {required_ratio}")]
    Undercollateralized {
        current_ratio: u128,
        required_ratio: u128,
    },

    /// Net debt below the protocol minimum
    #[error("net debt {amount} below minimum {minimum}")]
    BelowMinimumNetDebt { amount: u128, minimum: u128 },

    /// Operation would push the system TCR below the critical ratio
    #[error("operation would move TCR from {current_tcr} to {new_tcr}")]
    WouldWorsenTcr { current_tcr: u128, new_tcr: u128 },

    /// Operation not allowed in Recovery Mode
    #[error("operation {operation:?} not allowed in recovery mode")]
    RecoveryModeRestriction { operation: RecoveryModeOp },

    /// The last active trove cannot be closed
    #[error("only one trove in the system")]
    OnlyOneTroveInSystem,

    // ============ Amount Errors ============
    /// Invalid amount provided
    #[error("invalid amount {amount}: {reason:?}")]
    InvalidAmount { amount: u128, reason: AmountErrorReason },

    /// Insufficient balance for operation
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: u128, requested: u128 },

    /// Zero amount not allowed
    #[error("zero amount")]
    ZeroAmount,

    // ============ Authorization Errors ============
    /// Caller is not authorized for this operation
    #[error("unauthorized caller {actual:?}, expected {expected:?}")]
    Unauthorized { expected: Address, actual: Address },

    /// Only protocol admin can perform this action
    #[error("admin only")]
    AdminOnly,

    // ============ Oracle Errors ============
    /// Oracle price is stale
    #[error("price for {asset:?} is stale: updated {updated_at}, now {now}, max age {max_age}")]
    OracleStale {
        asset: AssetId,
        updated_at: u64,
        now: u64,
        max_age: u64,
    },

    /// Oracle returned an unusable price
    #[error("invalid price for {asset:?}")]
    InvalidPrice { asset: AssetId },

    /// Oracle has no price for the asset
    #[error("no price available for {asset:?}")]
    PriceUnavailable { asset: AssetId },

    // ============ Collateral Errors ============
    /// Asset is not registered as collateral
    #[error("unknown collateral {asset:?}")]
    UnknownCollateral { asset: AssetId },

    /// Asset already registered
    #[error("collateral {asset:?} already registered")]
    CollateralAlreadyRegistered { asset: AssetId },

    /// Asset is deprecated and withdraw-only
    #[error("collateral {asset:?} is inactive")]
    CollateralInactive { asset: AssetId },

    /// Safety ratio outside (0, 1]
    #[error("invalid safety ratio {ratio}")]
    InvalidSafetyRatio { ratio: u128 },

    /// Registry is full
    #[error("too many collateral types (max {max})")]
    TooManyCollateralTypes { max: usize },

    /// Not enough collateral of an asset
    #[error("insufficient collateral {asset:?}: available {available}, requested {requested}")]
    InsufficientCollateral {
        asset: AssetId,
        available: u128,
        requested: u128,
    },

    // ============ Sorted Index Errors ============
    /// Risk score zero or non-finite
    #[error("invalid risk score {score}")]
    InvalidRiskScore { score: u128 },

    /// Node already present in the index
    #[error("trove {trove_id:?} already in sorted index")]
    TroveAlreadyInIndex { trove_id: TroveId },

    /// Node absent from the index
    #[error("trove {trove_id:?} not in sorted index")]
    TroveNotInIndex { trove_id: TroveId },

    // ============ Liquidation Errors ============
    /// Trove is not liquidatable
    #[error("trove {trove_id:?} not liquidatable at AICR {aicr}")]
    NotLiquidatable { trove_id: TroveId, aicr: u128 },

    /// Nothing to liquidate
    #[error("nothing to liquidate")]
    NothingToLiquidate,

    /// Redistribution with no remaining stake to absorb it
    #[error("last trove cannot be redistributed")]
    LastTroveCannotRedistribute,

    // ============ Redemption Errors ============
    /// Fee rate above the caller's maximum
    #[error("fee rate {fee_rate} exceeds maximum {max_fee}")]
    MaxFeeExceeded { fee_rate: u128, max_fee: u128 },

    /// Max fee outside [floor, 100%]
    #[error("invalid max fee {max_fee}")]
    InvalidMaxFee { max_fee: u128 },

    /// Redemptions are disabled while TCR < MCR
    #[error("redemptions blocked at TCR {tcr}")]
    RedemptionBlocked { tcr: u128 },

    /// No trove could be redeemed against
    #[error("nothing to redeem")]
    NothingToRedeem,

    // ============ Stability Pool Errors ============
    /// Deposit not found for user
    #[error("no deposit for {depositor:?}")]
    DepositNotFound { depositor: Address },

    /// Withdrawals blocked while liquidatable troves exist
    #[error("withdrawal blocked by undercollateralized troves")]
    WithdrawalBlocked,

    /// No gains to claim
    #[error("no gains to claim")]
    NoGainsToClaim,

    // ============ Surplus Errors ============
    /// Surplus claim not found
    #[error("no collateral surplus for {owner:?}")]
    SurplusNotFound { owner: Address },

    // ============ Boost Errors ============
    /// Owner has nothing locked
    #[error("no locked stake for {owner:?}")]
    NoLockedStake { owner: Address },

    /// Not enough unallocated ve balance
    #[error("insufficient ve balance: available {available}, requested {requested}")]
    InsufficientVeBalance { available: u128, requested: u128 },

    /// Rewarder is not registered
    #[error("unknown rewarder {rewarder:?}")]
    UnknownRewarder { rewarder: RewarderId },

    /// Rewarder already registered
    #[error("rewarder {rewarder:?} already registered")]
    RewarderAlreadyExists { rewarder: RewarderId },

    // ============ Token Errors ============
    /// Token transfer failed
    #[error("transfer of {amount} {token:?} from {from:?} to {to:?} failed")]
    TransferFailed {
        token: AssetId,
        from: Address,
        to: Address,
        amount: u128,
    },

    // ============ Math Errors ============
    /// Arithmetic overflow occurred
    #[error("arithmetic overflow")]
    Overflow,

    /// Arithmetic underflow occurred
    #[error("arithmetic underflow")]
    Underflow,

    /// Division by zero
    #[error("division by zero")]
    DivisionByZero,

    // ============ Configuration / State Errors ============
    /// Invalid parameter value
    #[error("invalid parameter {param}: {reason}")]
    InvalidParameter {
        param: &'static str,
        reason: &'static str,
    },

    /// Internal invariant broken; unreachable in correct operation
    #[error("invariant violation: {context}")]
    InvariantViolation { context: &'static str },
}

/// Reasons for amount-related errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountErrorReason {
    /// Amount exceeds what the position holds
    TooLarge,
}

/// Operations restricted during Recovery Mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryModeOp {
    /// Withdrawing collateral
    WithdrawCollateral,
    /// Adjustment that lowers the trove's ratio
    DecreaseRatio,
    /// Closing a trove
    CloseTrove,
}

/// Error taxonomy used by callers to decide how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller-fixable input or state precondition
    PreconditionViolation,
    /// Logic bug; never reachable in correct operation
    InvariantViolation,
    /// A pool or list ran dry where no degraded path exists
    ResourceExhaustion,
    /// Wrong caller
    CallerUnauthorized,
    /// Collaborator (oracle, token) failed
    ExternalFailure,
}

impl McUsdError {
    /// Returns a stable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::TroveNotFound { .. } => "E001_TROVE_NOT_FOUND",
            Self::TroveNotActive { .. } => "E002_TROVE_INACTIVE",
            Self::TroveAlreadyExists { .. } => "E003_TROVE_EXISTS",
            Self::Undercollateralized { .. } => "E004_UNDERCOLLATERALIZED",
            Self::BelowMinimumNetDebt { .. } => "E005_BELOW_MIN_NET_DEBT",
            Self::WouldWorsenTcr { .. } => "E006_WORSEN_TCR",
            Self::RecoveryModeRestriction { .. } => "E007_RECOVERY_MODE",
            Self::OnlyOneTroveInSystem => "E008_LAST_TROVE",
            Self::InvalidAmount { .. } => "E010_INVALID_AMOUNT",
            Self::InsufficientBalance { .. } => "E011_INSUFFICIENT_BALANCE",
            Self::ZeroAmount => "E013_ZERO_AMOUNT",
            Self::Unauthorized { .. } => "E020_UNAUTHORIZED",
            Self::AdminOnly => "E021_ADMIN_ONLY",
            Self::OracleStale { .. } => "E030_ORACLE_STALE",
            Self::InvalidPrice { .. } => "E031_INVALID_PRICE",
            Self::PriceUnavailable { .. } => "E032_PRICE_UNAVAILABLE",
            Self::UnknownCollateral { .. } => "E040_UNKNOWN_COLLATERAL",
            Self::CollateralAlreadyRegistered { .. } => "E041_COLLATERAL_EXISTS",
            Self::CollateralInactive { .. } => "E042_COLLATERAL_INACTIVE",
            Self::InvalidSafetyRatio { .. } => "E043_INVALID_SAFETY_RATIO",
            Self::TooManyCollateralTypes { .. } => "E044_TOO_MANY_COLLATERALS",
            Self::InsufficientCollateral { .. } => "E045_INSUFFICIENT_COLL",
            Self::InvalidRiskScore { .. } => "E050_INVALID_RISK_SCORE",
            Self::TroveAlreadyInIndex { .. } => "E051_ALREADY_INDEXED",
            Self::TroveNotInIndex { .. } => "E052_NOT_INDEXED",
            Self::NotLiquidatable { .. } => "E060_NOT_LIQUIDATABLE",
            Self::NothingToLiquidate => "E061_NOTHING_TO_LIQ",
            Self::LastTroveCannotRedistribute => "E062_LAST_TROVE_REDIST",
            Self::MaxFeeExceeded { .. } => "E070_MAX_FEE_EXCEEDED",
            Self::InvalidMaxFee { .. } => "E071_INVALID_MAX_FEE",
            Self::RedemptionBlocked { .. } => "E072_REDEMPTION_BLOCKED",
            Self::NothingToRedeem => "E073_NOTHING_TO_REDEEM",
            Self::DepositNotFound { .. } => "E080_DEPOSIT_NOT_FOUND",
            Self::WithdrawalBlocked => "E081_WITHDRAWAL_BLOCKED",
            Self::NoGainsToClaim => "E082_NO_GAINS",
            Self::SurplusNotFound { .. } => "E090_SURPLUS_NOT_FOUND",
            Self::NoLockedStake { .. } => "E100_NO_LOCKED_STAKE",
            Self::InsufficientVeBalance { .. } => "E101_INSUFFICIENT_VE",
            Self::UnknownRewarder { .. } => "E102_UNKNOWN_REWARDER",
            Self::RewarderAlreadyExists { .. } => "E103_REWARDER_EXISTS",
            Self::TransferFailed { .. } => "E110_TRANSFER_FAILED",
            Self::Overflow => "E120_OVERFLOW",
            Self::Underflow => "E121_UNDERFLOW",
            Self::DivisionByZero => "E122_DIV_ZERO",
            Self::InvalidParameter { .. } => "E130_INVALID_PARAM",
            Self::InvariantViolation { .. } => "E131_INVARIANT",
        }
    }

    /// Classify the error for callers
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Unauthorized { .. } | Self::AdminOnly => ErrorCategory::CallerUnauthorized,
            Self::Overflow
            | Self::Underflow
            | Self::DivisionByZero
            | Self::InvariantViolation { .. } => ErrorCategory::InvariantViolation,
            Self::NothingToLiquidate
            | Self::NothingToRedeem
            | Self::LastTroveCannotRedistribute => ErrorCategory::ResourceExhaustion,
            Self::OracleStale { .. }
            | Self::InvalidPrice { .. }
            | Self::PriceUnavailable { .. }
            | Self::TransferFailed { .. } => ErrorCategory::ExternalFailure,
            _ => ErrorCategory::PreconditionViolation,
        }
    }

    /// Returns true if this error is recoverable (user can fix it)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Undercollateralized { .. } => true, // Add more collateral
            Self::InsufficientBalance { .. } => true, // Get more funds
            Self::BelowMinimumNetDebt { .. } => true, // Increase amount
            Self::OracleStale { .. } => true,         // Wait for update
            Self::MaxFeeExceeded { .. } => true,      // Wait for decay
            _ => false,
        }
    }
}

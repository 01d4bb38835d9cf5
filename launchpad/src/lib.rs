//! DecentraMind Launchpad core
//! Features:
//! - Sale terms with validated constructors: rational price, TGE (bps), cliff, periodic vesting
//! - Vesting: allocation split, unlock grid with exact per-period shares, next unlock, sale progress
//! - Claims: claimable = unlocked - claimed; over-claims rejected before any transfer
//! - Staking: simple-interest APY accrual, minimum stake, lock period, early-exit quotes
//! - Registry: reference claim store with compare-and-swap on claimed totals, broadcast events
//!
//! Notes:
//! - Amounts are integers in the smallest unit of their asset; rates are basis points.
//! - Time is milliseconds since the Unix epoch and is always supplied by the caller.
//! - Calculators hold no state; persistence lives behind `registry::ClaimStore`.

#![forbid(unsafe_code)]
#![allow(clippy::too_many_arguments)]

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod claims;
pub mod config;
pub mod math;
pub mod registry;
pub mod sale;
pub mod staking;
pub mod telemetry;
pub mod vesting;

pub use claims::{ClaimLedger, ClaimState, ClaimStatus};
pub use registry::{ClaimRegistry, ClaimStore, MemClaimStore, RegistryEvent, StoreError};
pub use sale::{Contribution, ContributionLimits, Price, SaleTerms, VestingSchedule};
pub use staking::{StakePosition, StakingParams, StakingRewardModel};
pub use vesting::{Allocation, NextUnlock, UnlockAlignment, VestingCalculator};

// ---------- Primitives ----------

/// Amount in the smallest unit of an asset.
pub type Amount = u128;

/// Milliseconds since Unix epoch.
pub type Timestamp = i64;

pub const MILLIS_PER_DAY: i64 = 86_400_000;

/// Reward year used for APY accrual (365 days, no leap adjustment).
pub const MILLIS_PER_YEAR: i64 = 365 * MILLIS_PER_DAY;

/// Basis points denominator (100% == 10_000 bps).
pub const BPS_DENOM: u16 = 10_000;

/// Whole days expressed in milliseconds.
#[inline]
pub const fn days(n: u32) -> i64 {
    n as i64 * MILLIS_PER_DAY
}

/// Percentage in basis points.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bps(pub u16);

impl Bps {
    pub const ZERO: Bps = Bps(0);
    pub const FULL: Bps = Bps(BPS_DENOM);

    /// Whole percent (0..=100) to basis points.
    pub fn from_percent(percent: u16) -> Result<Self, LaunchpadError> {
        if percent > 100 {
            return Err(LaunchpadError::InvalidInput("percentage above 100"));
        }
        Ok(Bps(percent * 100))
    }

    #[inline]
    pub fn get(self) -> u16 {
        self.0
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self.0 <= BPS_DENOM
    }

    /// Complement to 100%, saturating at zero.
    #[inline]
    pub fn complement(self) -> Bps {
        Bps(BPS_DENOM.saturating_sub(self.0))
    }
}

impl fmt::Debug for Bps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}

impl fmt::Display for Bps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

/// Token sale identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaleId(pub u64);

/// Wallet address of an investor or staker (opaque, e.g. base58).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Wallet(String);

impl Wallet {
    pub fn new(address: impl Into<String>) -> Result<Self, LaunchpadError> {
        let address = address.into();
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(LaunchpadError::InvalidInput("wallet address is empty"));
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------- Errors ----------

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchpadError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("claim of {requested} exceeds claimable balance {claimable}")]
    OverClaim { requested: Amount, claimable: Amount },
    #[error("allocation already fully claimed")]
    AlreadyComplete,
    #[error("stake of {amount} below minimum {minimum}")]
    BelowMinimum { amount: Amount, minimum: Amount },
    #[error("stake locked for another {remaining_ms} ms")]
    LockActive { remaining_ms: u64 },
    #[error("contribution of {amount} below sale minimum {minimum}")]
    ContributionBelowMin { amount: Amount, minimum: Amount },
    #[error("contribution of {amount} above sale maximum {maximum}")]
    ContributionAboveMax { amount: Amount, maximum: Amount },
    #[error("outside sale window")]
    OutsideSaleWindow,
    #[error("arithmetic overflow")]
    MathOverflow,
    #[error("not found")]
    NotFound,
    #[error("store: {0}")]
    Store(#[from] StoreError),
}

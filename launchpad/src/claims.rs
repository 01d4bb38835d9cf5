//! Claim bookkeeping for vested allocations.
//!
//! A `ClaimState` only moves forward: `claimed_to_date` never decreases and is
//! changed exclusively through `ClaimLedger::record_claim`, which returns a new
//! state instead of mutating its input.

use crate::vesting::{Allocation, VestingCalculator};
use crate::sale::SaleTerms;
use crate::{Amount, LaunchpadError, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    NotStarted,
    PartiallyClaimed,
    FullyClaimed,
}

/// Per-contribution unlock bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawClaimState")]
pub struct ClaimState {
    total_tokens: Amount,
    tge_tokens: Amount,
    vesting_tokens: Amount,
    claimed_to_date: Amount,
}

#[derive(Deserialize)]
struct RawClaimState {
    total_tokens: Amount,
    tge_tokens: Amount,
    vesting_tokens: Amount,
    claimed_to_date: Amount,
}

impl TryFrom<RawClaimState> for ClaimState {
    type Error = LaunchpadError;

    fn try_from(r: RawClaimState) -> Result<Self, Self::Error> {
        ClaimState::restore(r.total_tokens, r.tge_tokens, r.vesting_tokens, r.claimed_to_date)
    }
}

impl ClaimState {
    /// Fresh state for a new allocation, nothing claimed.
    pub fn new(alloc: Allocation) -> Self {
        Self {
            total_tokens: alloc.total_tokens,
            tge_tokens: alloc.tge_tokens,
            vesting_tokens: alloc.vesting_tokens,
            claimed_to_date: 0,
        }
    }

    /// Rebuild a persisted state, checking its internal consistency.
    pub fn restore(
        total_tokens: Amount,
        tge_tokens: Amount,
        vesting_tokens: Amount,
        claimed_to_date: Amount,
    ) -> Result<Self, LaunchpadError> {
        if tge_tokens.checked_add(vesting_tokens) != Some(total_tokens) {
            return Err(LaunchpadError::InvalidInput("tge + vesting must equal total"));
        }
        if claimed_to_date > total_tokens {
            return Err(LaunchpadError::InvalidInput("claimed above total"));
        }
        Ok(Self { total_tokens, tge_tokens, vesting_tokens, claimed_to_date })
    }

    pub fn total_tokens(&self) -> Amount {
        self.total_tokens
    }

    pub fn tge_tokens(&self) -> Amount {
        self.tge_tokens
    }

    pub fn vesting_tokens(&self) -> Amount {
        self.vesting_tokens
    }

    pub fn claimed_to_date(&self) -> Amount {
        self.claimed_to_date
    }

    pub fn allocation(&self) -> Allocation {
        Allocation {
            total_tokens: self.total_tokens,
            tge_tokens: self.tge_tokens,
            vesting_tokens: self.vesting_tokens,
        }
    }

    pub fn status(&self) -> ClaimStatus {
        if self.total_tokens > 0 && self.claimed_to_date == self.total_tokens {
            ClaimStatus::FullyClaimed
        } else if self.claimed_to_date == 0 {
            ClaimStatus::NotStarted
        } else {
            ClaimStatus::PartiallyClaimed
        }
    }

    /// Fold a further contribution's allocation into this state.
    pub fn add_allocation(&self, alloc: Allocation) -> Result<Self, LaunchpadError> {
        let add = |a: Amount, b: Amount| a.checked_add(b).ok_or(LaunchpadError::MathOverflow);
        Ok(Self {
            total_tokens: add(self.total_tokens, alloc.total_tokens)?,
            tge_tokens: add(self.tge_tokens, alloc.tge_tokens)?,
            vesting_tokens: add(self.vesting_tokens, alloc.vesting_tokens)?,
            claimed_to_date: self.claimed_to_date,
        })
    }
}

/// Decides what is claimable and validates claims. Holds no state.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClaimLedger {
    calculator: VestingCalculator,
}

impl ClaimLedger {
    pub fn new(calculator: VestingCalculator) -> Self {
        Self { calculator }
    }

    /// Total released to the holder by `reference`.
    pub fn total_unlocked(&self, state: &ClaimState, terms: &SaleTerms, reference: Timestamp) -> Amount {
        self.calculator.unlocked_at(terms, &state.allocation(), reference)
    }

    /// Unlocked minus already claimed, floored at zero.
    pub fn claimable_now(&self, state: &ClaimState, terms: &SaleTerms, reference: Timestamp) -> Amount {
        self.total_unlocked(state, terms, reference)
            .saturating_sub(state.claimed_to_date)
    }

    /// Validate a claim of `amount` at `reference` and return the updated state.
    /// Rejected claims leave nothing to roll back.
    pub fn record_claim(
        &self,
        state: &ClaimState,
        terms: &SaleTerms,
        reference: Timestamp,
        amount: Amount,
    ) -> Result<ClaimState, LaunchpadError> {
        if state.status() == ClaimStatus::FullyClaimed {
            return Err(LaunchpadError::AlreadyComplete);
        }
        if amount == 0 {
            return Err(LaunchpadError::InvalidInput("claim amount must be > 0"));
        }
        let claimable = self.claimable_now(state, terms, reference);
        if amount > claimable {
            return Err(LaunchpadError::OverClaim { requested: amount, claimable });
        }
        Ok(ClaimState {
            claimed_to_date: state.claimed_to_date + amount,
            ..*state
        })
    }
}

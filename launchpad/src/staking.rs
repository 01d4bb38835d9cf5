//! Staking reward model: APY accrual, minimum stake and lock-period checks.
//!
//! Notation:
//! - Amounts are in the smallest unit of the staked token (u128).
//! - APY is in basis points; accrual is simple interest over a 365-day year.
//! - Time is milliseconds since Unix epoch; lock durations are `Duration`s.
//!
//! The model is pure. Moving tokens and persisting positions is left to the
//! caller; every check here runs before any transfer is attempted.

use crate::math;
use crate::{Amount, Bps, LaunchpadError, Timestamp, MILLIS_PER_DAY, MILLIS_PER_YEAR};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Economic parameters of the staking programme.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StakingParams {
    /// APY granted to new positions.
    pub base_apy: Bps,
    /// Highest APY any position may carry.
    pub max_apy: Bps,
    /// Smallest accepted stake.
    pub min_stake_amount: Amount,
    /// Lock applied from the stake start.
    #[serde(with = "humantime_serde")]
    pub lock_period: Duration,
    /// Rewards are credited in whole intervals.
    #[serde(with = "humantime_serde")]
    pub reward_interval: Duration,
    /// Share of principal forfeited when exiting during the lock.
    pub early_exit_penalty: Bps,
    /// Share of accrued reward kept when exiting during the lock.
    pub early_exit_reward_share: Bps,
}

impl Default for StakingParams {
    fn default() -> Self {
        Self {
            base_apy: Bps(1_200),
            max_apy: Bps(2_500),
            min_stake_amount: 100,
            lock_period: Duration::from_secs(30 * 24 * 60 * 60),
            reward_interval: Duration::from_secs(24 * 60 * 60),
            early_exit_penalty: Bps(500),
            early_exit_reward_share: Bps(5_000),
        }
    }
}

impl StakingParams {
    pub fn validate(&self) -> Result<(), LaunchpadError> {
        if self.base_apy == Bps::ZERO || !self.max_apy.is_valid() {
            return Err(LaunchpadError::InvalidInput("apy must be in (0, 100%]"));
        }
        if self.base_apy > self.max_apy {
            return Err(LaunchpadError::InvalidInput("base apy above max apy"));
        }
        if self.min_stake_amount == 0 {
            return Err(LaunchpadError::InvalidInput("min stake must be > 0"));
        }
        if self.reward_interval.is_zero() {
            return Err(LaunchpadError::InvalidInput("reward interval must be > 0"));
        }
        if !self.early_exit_penalty.is_valid() || !self.early_exit_reward_share.is_valid() {
            return Err(LaunchpadError::InvalidInput("early exit rates above 100%"));
        }
        duration_ms(self.lock_period)?;
        duration_ms(self.reward_interval)?;
        Ok(())
    }

    pub fn lock_period_ms(&self) -> i64 {
        duration_ms(self.lock_period).unwrap_or(i64::MAX)
    }

    pub fn reward_interval_ms(&self) -> i64 {
        duration_ms(self.reward_interval).unwrap_or(i64::MAX).max(1)
    }
}

fn duration_ms(d: Duration) -> Result<i64, LaunchpadError> {
    i64::try_from(d.as_millis()).map_err(|_| LaunchpadError::InvalidInput("duration too long"))
}

/// A staked principal and its lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakePosition {
    pub principal: Amount,
    pub apy: Bps,
    pub start: Timestamp,
    pub lock_end: Timestamp,
}

impl StakePosition {
    pub fn is_locked(&self, now: Timestamp) -> bool {
        now < self.lock_end
    }
}

/// Payout of a matured position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub principal: Amount,
    pub reward: Amount,
    pub payout: Amount,
}

/// What leaving a position at `now` would pay, including early-exit terms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitQuote {
    pub early: bool,
    pub penalty: Amount,
    pub reward: Amount,
    pub payout: Amount,
    pub remaining_ms: u64,
}

/// Aggregates over a holder's positions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingStats {
    pub positions: usize,
    pub locked_positions: usize,
    pub total_staked: Amount,
    pub total_rewards: Amount,
}

impl StakingStats {
    pub fn collect<'a, I>(model: &StakingRewardModel, positions: I, now: Timestamp) -> Result<Self, LaunchpadError>
    where
        I: IntoIterator<Item = &'a StakePosition>,
    {
        let mut out = StakingStats::default();
        for p in positions {
            out.positions += 1;
            if p.is_locked(now) {
                out.locked_positions += 1;
            }
            out.total_staked = out.total_staked.checked_add(p.principal).ok_or(LaunchpadError::MathOverflow)?;
            let r = model.reward_at(p, now)?;
            out.total_rewards = out.total_rewards.checked_add(r).ok_or(LaunchpadError::MathOverflow)?;
        }
        Ok(out)
    }
}

/// Stateless reward model over fixed programme parameters.
#[derive(Clone, Debug)]
pub struct StakingRewardModel {
    params: StakingParams,
}

impl Default for StakingRewardModel {
    fn default() -> Self {
        Self { params: StakingParams::default() }
    }
}

impl StakingRewardModel {
    pub fn new(params: StakingParams) -> Result<Self, LaunchpadError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &StakingParams {
        &self.params
    }

    /// Simple-interest reward: principal * apy * elapsed / year, floored.
    pub fn accrue(&self, principal: Amount, apy: Bps, elapsed_ms: i64) -> Result<Amount, LaunchpadError> {
        if principal == 0 {
            return Err(LaunchpadError::InvalidInput("principal must be > 0"));
        }
        if apy == Bps::ZERO || !apy.is_valid() {
            return Err(LaunchpadError::InvalidInput("apy must be in (0, 100%]"));
        }
        if elapsed_ms < 0 {
            return Err(LaunchpadError::InvalidInput("elapsed time must be >= 0"));
        }
        let rate_time = apy.get() as u128 * elapsed_ms as u128;
        let per_year = crate::BPS_DENOM as u128 * MILLIS_PER_YEAR as u128;
        math::mul_div(principal, rate_time, per_year)
    }

    pub fn can_stake(&self, amount: Amount) -> bool {
        amount >= self.params.min_stake_amount
    }

    /// Open a position at `start` with the programme lock.
    pub fn open_position(&self, principal: Amount, apy: Bps, start: Timestamp) -> Result<StakePosition, LaunchpadError> {
        if !self.can_stake(principal) {
            return Err(LaunchpadError::BelowMinimum { amount: principal, minimum: self.params.min_stake_amount });
        }
        if apy < self.params.base_apy || apy > self.params.max_apy {
            return Err(LaunchpadError::InvalidInput("apy outside programme range"));
        }
        let lock_end = start
            .checked_add(self.params.lock_period_ms())
            .ok_or(LaunchpadError::MathOverflow)?;
        Ok(StakePosition { principal, apy, start, lock_end })
    }

    pub fn can_unstake(&self, now: Timestamp, lock_end: Timestamp) -> bool {
        now >= lock_end
    }

    /// Milliseconds until `lock_end`, zero once passed.
    pub fn time_remaining(&self, lock_end: Timestamp, now: Timestamp) -> u64 {
        (lock_end as i128 - now as i128).clamp(0, u64::MAX as i128) as u64
    }

    pub fn ensure_unstakable(&self, position: &StakePosition, now: Timestamp) -> Result<(), LaunchpadError> {
        if self.can_unstake(now, position.lock_end) {
            Ok(())
        } else {
            Err(LaunchpadError::LockActive { remaining_ms: self.time_remaining(position.lock_end, now) })
        }
    }

    /// Reward credited by `now`, counted in whole reward intervals since start.
    pub fn reward_at(&self, position: &StakePosition, now: Timestamp) -> Result<Amount, LaunchpadError> {
        if now <= position.start {
            return Ok(0);
        }
        let interval = self.params.reward_interval_ms();
        let elapsed = now - position.start;
        let credited = elapsed - elapsed % interval;
        self.accrue(position.principal, position.apy, credited)
    }

    /// Principal plus reward for a position whose lock has ended.
    pub fn settle(&self, position: &StakePosition, now: Timestamp) -> Result<Settlement, LaunchpadError> {
        self.ensure_unstakable(position, now)?;
        let reward = self.reward_at(position, now)?;
        let payout = position.principal.checked_add(reward).ok_or(LaunchpadError::MathOverflow)?;
        Ok(Settlement { principal: position.principal, reward, payout })
    }

    /// Quote for leaving at `now`; inside the lock the penalty and reward cut apply.
    pub fn early_exit_quote(&self, position: &StakePosition, now: Timestamp) -> Result<ExitQuote, LaunchpadError> {
        let full_reward = self.reward_at(position, now)?;
        let remaining_ms = self.time_remaining(position.lock_end, now);
        if !position.is_locked(now) {
            return Ok(ExitQuote {
                early: false,
                penalty: 0,
                reward: full_reward,
                payout: position.principal.checked_add(full_reward).ok_or(LaunchpadError::MathOverflow)?,
                remaining_ms,
            });
        }
        let penalty = math::apply_bps(position.principal, self.params.early_exit_penalty)?;
        let reward = math::apply_bps(full_reward, self.params.early_exit_reward_share)?;
        Ok(ExitQuote {
            early: true,
            penalty,
            reward,
            payout: position.principal - penalty + reward,
            remaining_ms,
        })
    }

    /// Projected reward for a full lock period, as shown before staking.
    pub fn projected_lock_reward(&self, principal: Amount) -> Result<Amount, LaunchpadError> {
        self.accrue(principal, self.params.base_apy, self.params.lock_period_ms())
    }
}

/// Whole days left in a lock, rounded up; for display.
pub fn remaining_days(remaining_ms: u64) -> u64 {
    remaining_ms.div_ceil(MILLIS_PER_DAY as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::days;

    const T0: Timestamp = 1_700_000_000_000;

    fn model() -> StakingRewardModel {
        StakingRewardModel::new(StakingParams::default()).unwrap()
    }

    #[test]
    fn accrue_one_year() {
        assert_eq!(model().accrue(100, Bps(1_200), MILLIS_PER_YEAR).unwrap(), 12);
    }

    #[test]
    fn accrue_partial_year() {
        // 500 * 0.12 * 180/365 = 29.589..; 6 decimals of precision.
        let scale = 1_000_000u128;
        let r = model().accrue(500 * scale, Bps(1_200), days(180)).unwrap();
        assert_eq!(r, 29_589_041);
    }

    #[test]
    fn accrue_rejects_bad_input() {
        let m = model();
        assert!(m.accrue(0, Bps(1_200), 1).is_err());
        assert!(m.accrue(1, Bps(0), 1).is_err());
        assert!(m.accrue(1, Bps(10_001), 1).is_err());
        assert!(m.accrue(1, Bps(1_200), -1).is_err());
        assert_eq!(m.accrue(1_000, Bps(1_200), 0).unwrap(), 0);
    }

    #[test]
    fn minimum_stake() {
        let m = model();
        assert!(!m.can_stake(50));
        assert!(m.can_stake(100));
        assert_eq!(
            m.open_position(50, Bps(1_200), T0),
            Err(LaunchpadError::BelowMinimum { amount: 50, minimum: 100 })
        );
        assert!(m.open_position(100, Bps(3_000), T0).is_err());
        let p = m.open_position(100, Bps(1_200), T0).unwrap();
        assert_eq!(p.lock_end, T0 + days(30));
    }

    #[test]
    fn lock_reports_remaining() {
        let m = model();
        let p = m.open_position(1_000, Bps(1_200), T0).unwrap();
        let now = p.lock_end - days(5);
        assert!(!m.can_unstake(now, p.lock_end));
        assert_eq!(m.time_remaining(p.lock_end, now), 5 * 24 * 60 * 60 * 1000);
        assert_eq!(
            m.ensure_unstakable(&p, now),
            Err(LaunchpadError::LockActive { remaining_ms: 432_000_000 })
        );
        assert!(matches!(m.settle(&p, now), Err(LaunchpadError::LockActive { .. })));
        assert_eq!(m.time_remaining(p.lock_end, p.lock_end + 1), 0);
        assert_eq!(remaining_days(432_000_000), 5);
        assert_eq!(remaining_days(432_000_001), 6);
    }

    #[test]
    fn settle_after_lock() {
        let m = model();
        let p = m.open_position(365_000, Bps(1_200), T0).unwrap();
        let s = m.settle(&p, p.lock_end).unwrap();
        // 365000 * 12% * 30/365 = 3600
        assert_eq!(s.reward, 3_600);
        assert_eq!(s.payout, 368_600);
    }

    #[test]
    fn rewards_credit_whole_intervals() {
        let m = model();
        let p = m.open_position(365_000, Bps(1_200), T0).unwrap();
        assert_eq!(m.reward_at(&p, T0 - 1).unwrap(), 0);
        assert_eq!(m.reward_at(&p, T0 + days(1) - 1).unwrap(), 0);
        assert_eq!(m.reward_at(&p, T0 + days(1)).unwrap(), 120);
        assert_eq!(m.reward_at(&p, T0 + days(2) - 1).unwrap(), 120);
    }

    #[test]
    fn early_exit_quote_applies_penalty() {
        let m = model();
        let p = m.open_position(365_000, Bps(1_200), T0).unwrap();
        let q = m.early_exit_quote(&p, T0 + days(10)).unwrap();
        assert!(q.early);
        assert_eq!(q.penalty, 18_250);
        // half of 10 days at 120/day
        assert_eq!(q.reward, 600);
        assert_eq!(q.payout, 365_000 - 18_250 + 600);
        assert_eq!(q.remaining_ms, days(20) as u64);

        let q = m.early_exit_quote(&p, p.lock_end).unwrap();
        assert!(!q.early);
        assert_eq!(q.penalty, 0);
        assert_eq!(q.payout, 368_600);
    }

    #[test]
    fn positions_below_programme_rate_rejected() {
        let m = model();
        assert_eq!(
            m.open_position(365_000, Bps(1_000), T0),
            Err(LaunchpadError::InvalidInput("apy outside programme range"))
        );
        let cheap = StakingRewardModel::new(StakingParams { base_apy: Bps(1_000), ..StakingParams::default() }).unwrap();
        let p = cheap.open_position(365_000, Bps(1_000), T0).unwrap();
        assert_eq!(cheap.settle(&p, p.lock_end).unwrap().reward, 3_000);
    }

    #[test]
    fn stats_aggregate_positions() {
        let m = model();
        let a = m.open_position(365_000, Bps(1_200), T0).unwrap();
        let b = m.open_position(1_000, Bps(2_000), T0 + days(40)).unwrap();
        let stats = StakingStats::collect(&m, [&a, &b], T0 + days(41)).unwrap();
        assert_eq!(stats.positions, 2);
        assert_eq!(stats.locked_positions, 1);
        assert_eq!(stats.total_staked, 366_000);
        // 41 days * 120, plus 1000 * 20% / 365 floored to 0
        assert_eq!(stats.total_rewards, 4_920);
    }

    #[test]
    fn params_validation() {
        let mut p = StakingParams::default();
        p.base_apy = Bps(3_000);
        assert!(StakingRewardModel::new(p).is_err());
        let mut p = StakingParams::default();
        p.reward_interval = Duration::ZERO;
        assert!(StakingRewardModel::new(p).is_err());
        // 365000 * 12% * 30/365
        assert_eq!(model().projected_lock_reward(365_000).unwrap(), 3_600);
    }
}

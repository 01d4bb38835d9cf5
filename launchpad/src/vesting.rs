//! Vesting calculator for launchpad allocations.
//!
//! Features:
//! - Allocation split of a contribution into TGE and vesting portions (bps, floored).
//! - Unlock grid: period `i` is released at `cliff_end + i * frequency`, the
//!   first one a full period after the cliff. Nothing is released before the
//!   sale end; periods due earlier wait for it.
//! - Per-period shares are equal; the final period absorbs the rounding
//!   remainder so shares always sum to the vesting pool exactly.
//! - Next unlock in two flavours: drifting (`now + frequency`) or grid-aligned.
//!
//! Time model: milliseconds since Unix epoch. All computations are pure and
//! monotonic with respect to the reference time supplied by the caller.

use crate::math::{self, EvenSplit};
use crate::sale::SaleTerms;
use crate::{Amount, Bps, LaunchpadError, Timestamp};
use serde::{Deserialize, Serialize};

/// Token allocation produced by a contribution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub total_tokens: Amount,
    pub tge_tokens: Amount,
    pub vesting_tokens: Amount,
}

/// How the next unlock date is derived.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlockAlignment {
    /// One frequency period after the reference time.
    #[default]
    Drifting,
    /// Next release instant on the fixed grid anchored at the sale start.
    Grid,
}

/// Upcoming unlock as shown to a holder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextUnlock {
    pub date: Timestamp,
    pub amount: Amount,
    /// Whole frequency periods elapsed since the cliff ended.
    pub periods_elapsed: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnlockKind {
    Tge,
    Vesting { period: u32 },
}

/// One row of the release schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockEvent {
    pub date: Timestamp,
    pub amount: Amount,
    #[serde(flatten)]
    pub kind: UnlockKind,
}

/// Stateless vesting calculator.
#[derive(Clone, Copy, Debug, Default)]
pub struct VestingCalculator;

impl VestingCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Split a contribution into total, TGE and vesting tokens.
    pub fn allocate(&self, contribution: Amount, terms: &SaleTerms) -> Result<Allocation, LaunchpadError> {
        if contribution == 0 {
            return Err(LaunchpadError::InvalidInput("contribution must be > 0"));
        }
        let total_tokens = terms.price().tokens_for(contribution)?;
        let tge_tokens = math::apply_bps(total_tokens, terms.schedule().tge())?;
        Ok(Allocation {
            total_tokens,
            tge_tokens,
            vesting_tokens: total_tokens - tge_tokens,
        })
    }

    /// Cumulative tokens released by `at`: TGE after sale end plus released periods.
    pub fn unlocked_at(&self, terms: &SaleTerms, alloc: &Allocation, at: Timestamp) -> Amount {
        if at < terms.end() {
            return 0;
        }
        let split = terms.schedule().split(alloc.vesting_tokens);
        alloc.tge_tokens + split.released(self.released_periods(terms, at))
    }

    /// Periods whose release time is at or before `at`.
    pub fn released_periods(&self, terms: &SaleTerms, at: Timestamp) -> u32 {
        let schedule = terms.schedule();
        let periods = schedule.periods();
        if periods == 0 || at < terms.end() || at < terms.cliff_end() {
            return 0;
        }
        let elapsed = (at - terms.cliff_end()) / schedule.frequency_ms();
        elapsed.clamp(0, periods as i64) as u32
    }

    /// Next unlock relative to `reference`.
    ///
    /// `None` before the sale starts, after the vesting window (which runs from
    /// the cliff end), or when nothing vests.
    pub fn next_unlock(
        &self,
        terms: &SaleTerms,
        alloc: &Allocation,
        reference: Timestamp,
        alignment: UnlockAlignment,
    ) -> Option<NextUnlock> {
        let schedule = terms.schedule();
        if reference < terms.start() || schedule.periods() == 0 {
            return None;
        }
        let periods_elapsed = if reference < terms.cliff_end() {
            0
        } else {
            ((reference - terms.cliff_end()) / schedule.frequency_ms()).min(u32::MAX as i64) as u32
        };

        match alignment {
            UnlockAlignment::Drifting => {
                if reference > terms.vesting_end() {
                    return None;
                }
                let date = reference.checked_add(schedule.frequency_ms())?;
                let split = schedule.split(alloc.vesting_tokens);
                Some(NextUnlock { date, amount: split.base, periods_elapsed })
            }
            UnlockAlignment::Grid => {
                let events = self.unlock_schedule(terms, alloc);
                let date = events.iter().map(|e| e.date).find(|d| *d > reference)?;
                let amount = events.iter().filter(|e| e.date == date).map(|e| e.amount).sum();
                Some(NextUnlock { date, amount, periods_elapsed })
            }
        }
    }

    /// Sale-window progress: 0% before start, 100% after end, linear inside.
    pub fn progress(&self, terms: &SaleTerms, reference: Timestamp) -> Bps {
        if reference < terms.start() {
            return Bps::ZERO;
        }
        if reference >= terms.end() {
            return Bps::FULL;
        }
        let elapsed = (reference as i128 - terms.start() as i128) as u128;
        let window = (terms.end() as i128 - terms.start() as i128) as u128;
        // window > elapsed >= 0 here.
        math::ratio_bps(elapsed, window).unwrap_or(Bps::FULL)
    }

    /// Full release schedule: TGE followed by one row per vesting period.
    /// Rows are sorted by date and sum to `alloc.total_tokens`.
    pub fn unlock_schedule(&self, terms: &SaleTerms, alloc: &Allocation) -> Vec<UnlockEvent> {
        let schedule = terms.schedule();
        let split: EvenSplit = schedule.split(alloc.vesting_tokens);

        let mut out = Vec::with_capacity(split.parts as usize + 1);
        if alloc.tge_tokens > 0 || split.parts == 0 {
            out.push(UnlockEvent { date: terms.end(), amount: alloc.tge_tokens, kind: UnlockKind::Tge });
        }
        for period in 1..=split.parts {
            out.push(UnlockEvent {
                date: terms.period_release(period),
                amount: split.share(period),
                kind: UnlockKind::Vesting { period },
            });
        }
        out.sort_by_key(|e| e.date);
        out
    }
}

/* ---------------------------------- TESTS ---------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sale::{Price, VestingSchedule};
    use crate::days;

    const T0: Timestamp = 1_700_000_000_000;

    fn terms(tge_pct: u16, cliff: u32, vesting: u32, freq: u32, sale_days: u32) -> SaleTerms {
        SaleTerms::builder()
            .price(Price::new(1, 10).unwrap())
            .schedule(VestingSchedule::new(Bps::from_percent(tge_pct).unwrap(), cliff, vesting, freq).unwrap())
            .window(T0, T0 + days(sale_days))
            .build()
            .unwrap()
    }

    #[test]
    fn allocate_splits_tge_and_vesting() {
        let calc = VestingCalculator::new();
        let a = calc.allocate(1_000, &terms(20, 0, 180, 30, 7)).unwrap();
        assert_eq!(a.total_tokens, 10_000);
        assert_eq!(a.tge_tokens, 2_000);
        assert_eq!(a.vesting_tokens, 8_000);
        assert!(matches!(calc.allocate(0, &terms(20, 0, 180, 30, 7)), Err(LaunchpadError::InvalidInput(_))));
    }

    #[test]
    fn tge_only_after_sale_end() {
        let calc = VestingCalculator::new();
        let t = terms(20, 0, 180, 30, 7);
        let a = calc.allocate(1_000, &t).unwrap();
        assert_eq!(calc.unlocked_at(&t, &a, T0), 0);
        assert_eq!(calc.unlocked_at(&t, &a, t.end() - 1), 0);
        assert_eq!(calc.unlocked_at(&t, &a, t.end()), 2_000);
    }

    #[test]
    fn periods_start_one_step_after_cliff() {
        let calc = VestingCalculator::new();
        // 6 periods of 30 days after a 90-day cliff: releases on days 120..=270.
        let t = terms(10, 90, 180, 30, 7);
        let a = calc.allocate(1_000, &t).unwrap();
        let share = a.vesting_tokens / 6;

        assert_eq!(calc.unlocked_at(&t, &a, T0 + days(90)), a.tge_tokens);
        assert_eq!(calc.unlocked_at(&t, &a, T0 + days(120) - 1), a.tge_tokens);
        assert_eq!(calc.unlocked_at(&t, &a, T0 + days(120)), a.tge_tokens + share);
        assert_eq!(calc.unlocked_at(&t, &a, T0 + days(150)), a.tge_tokens + 2 * share);
        assert_eq!(calc.unlocked_at(&t, &a, T0 + days(270) - 1), a.tge_tokens + 5 * share);
        assert_eq!(calc.unlocked_at(&t, &a, T0 + days(270)), a.total_tokens);
    }

    #[test]
    fn periods_due_during_sale_wait_for_sale_end() {
        let calc = VestingCalculator::new();
        // No cliff, 45-day sale: periods 1 (day 30) and 2 (day 60) straddle the end.
        let t = terms(0, 0, 120, 30, 45);
        let a = calc.allocate(1_000, &t).unwrap();
        assert_eq!(calc.unlocked_at(&t, &a, T0 + days(44)), 0);
        assert_eq!(calc.unlocked_at(&t, &a, t.end()), 2_500);
        assert_eq!(calc.unlocked_at(&t, &a, T0 + days(60)), 5_000);
    }

    #[test]
    fn next_unlock_drifting() {
        let calc = VestingCalculator::new();
        let t = terms(20, 30, 180, 30, 7);
        let a = calc.allocate(1_000, &t).unwrap();

        assert_eq!(calc.next_unlock(&t, &a, T0 - 1, UnlockAlignment::Drifting), None);
        assert_eq!(calc.next_unlock(&t, &a, t.vesting_end() + 1, UnlockAlignment::Drifting), None);
        // The window runs from the cliff end, so day 200 still has unlocks ahead.
        assert!(calc.next_unlock(&t, &a, T0 + days(200), UnlockAlignment::Drifting).is_some());

        let now = T0 + days(75);
        let n = calc.next_unlock(&t, &a, now, UnlockAlignment::Drifting).unwrap();
        assert_eq!(n.date, now + days(30));
        assert_eq!(n.amount, 8_000 / 6);
        assert_eq!(n.periods_elapsed, 1);

        let inside_cliff = calc.next_unlock(&t, &a, T0 + days(10), UnlockAlignment::Drifting).unwrap();
        assert_eq!(inside_cliff.periods_elapsed, 0);
    }

    #[test]
    fn next_unlock_grid() {
        let calc = VestingCalculator::new();
        let t = terms(20, 60, 180, 30, 7);
        let a = calc.allocate(1_000, &t).unwrap();
        let split = t.schedule().split(a.vesting_tokens);

        // Before sale end the TGE is next.
        let n = calc.next_unlock(&t, &a, T0 + 1, UnlockAlignment::Grid).unwrap();
        assert_eq!((n.date, n.amount), (t.end(), 2_000));

        // After TGE the first period lands one step past the cliff, alone.
        let n = calc.next_unlock(&t, &a, t.end(), UnlockAlignment::Grid).unwrap();
        assert_eq!((n.date, n.amount), (T0 + days(90), 1_333));
        assert_eq!(split.base, 1_333);
        assert_eq!(calc.unlocked_at(&t, &a, T0 + days(60)), 2_000);

        // Exactly on a grid point: the following one is next.
        let n = calc.next_unlock(&t, &a, T0 + days(90), UnlockAlignment::Grid).unwrap();
        assert_eq!(n.date, T0 + days(120));
        assert_eq!(n.periods_elapsed, 1);

        // Final period carries the remainder.
        let n = calc.next_unlock(&t, &a, T0 + days(211), UnlockAlignment::Grid).unwrap();
        assert_eq!((n.date, n.amount), (T0 + days(240), split.last));
        assert_eq!(calc.next_unlock(&t, &a, T0 + days(240), UnlockAlignment::Grid), None);
    }

    #[test]
    fn immediate_schedule_has_no_next_unlock() {
        let calc = VestingCalculator::new();
        let t = SaleTerms::builder()
            .price(Price::new(1, 1).unwrap())
            .schedule(VestingSchedule::immediate())
            .window(T0, T0 + days(1))
            .build()
            .unwrap();
        let a = calc.allocate(500, &t).unwrap();
        assert_eq!(a.vesting_tokens, 0);
        assert_eq!(calc.next_unlock(&t, &a, T0, UnlockAlignment::Drifting), None);
        assert_eq!(calc.unlocked_at(&t, &a, t.end()), 500);
        let rows = calc.unlock_schedule(&t, &a);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, UnlockKind::Tge);
    }

    #[test]
    fn progress_linear_and_clamped() {
        let calc = VestingCalculator::new();
        let t = terms(20, 0, 180, 30, 10);
        assert_eq!(calc.progress(&t, T0 - 1), Bps::ZERO);
        assert_eq!(calc.progress(&t, T0), Bps::ZERO);
        assert_eq!(calc.progress(&t, T0 + days(5)), Bps(5_000));
        assert_eq!(calc.progress(&t, T0 + days(10) + 1), Bps::FULL);
    }

    #[test]
    fn schedule_sums_to_total() {
        let calc = VestingCalculator::new();
        let t = terms(15, 45, 365, 30, 14);
        let a = calc.allocate(12_345, &t).unwrap();
        let rows = calc.unlock_schedule(&t, &a);
        assert_eq!(rows.len(), 1 + 12);
        assert_eq!(rows.iter().map(|r| r.amount).sum::<u128>(), a.total_tokens);
        assert!(rows.windows(2).all(|w| w[0].date <= w[1].date));
        assert!(rows.iter().all(|r| r.date >= t.end()));
    }
}

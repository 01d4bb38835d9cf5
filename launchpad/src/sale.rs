//! Token sale economics: price, vesting schedule, sale window and
//! per-address contribution limits.
//!
//! Every type here is validated at construction; a `SaleTerms` value that
//! exists is always internally consistent, so the calculators never re-check it.

use crate::math::{self, EvenSplit};
use crate::{days, Amount, Bps, LaunchpadError, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest number of fractional digits accepted when parsing a decimal price.
const MAX_PRICE_DECIMALS: usize = 18;

/// Price defined as quote_per_token = num/den (both in smallest units).
/// quote = tokens * num / den; tokens = quote * den / num (floored).
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPrice", into = "RawPrice")]
pub struct Price {
    num: Amount,
    den: Amount,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
struct RawPrice {
    num: Amount,
    den: Amount,
}

impl TryFrom<RawPrice> for Price {
    type Error = LaunchpadError;

    fn try_from(raw: RawPrice) -> Result<Self, Self::Error> {
        Price::new(raw.num, raw.den)
    }
}

impl From<Price> for RawPrice {
    fn from(p: Price) -> Self {
        RawPrice { num: p.num, den: p.den }
    }
}

impl Price {
    pub fn new(num: Amount, den: Amount) -> Result<Self, LaunchpadError> {
        if num == 0 || den == 0 {
            return Err(LaunchpadError::InvalidInput("price num/den must be > 0"));
        }
        Ok(Self { num, den })
    }

    pub fn num(&self) -> Amount {
        self.num
    }

    pub fn den(&self) -> Amount {
        self.den
    }

    /// Tokens bought by `quote` units at this price.
    pub fn tokens_for(&self, quote: Amount) -> Result<Amount, LaunchpadError> {
        math::mul_div(quote, self.den, self.num)
    }

    /// Quote units needed for `tokens` at this price.
    pub fn cost_of(&self, tokens: Amount) -> Result<Amount, LaunchpadError> {
        math::mul_div(tokens, self.num, self.den)
    }
}

impl fmt::Debug for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Parses a plain decimal such as `0.1` or `2.5` into an exact rational.
impl FromStr for Price {
    type Err = LaunchpadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (int, frac) = s.split_once('.').unwrap_or((s, ""));
        if int.is_empty() && frac.is_empty() {
            return Err(LaunchpadError::InvalidInput("empty price"));
        }
        if !int.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(LaunchpadError::InvalidInput("price must be a plain decimal"));
        }
        if frac.len() > MAX_PRICE_DECIMALS {
            return Err(LaunchpadError::InvalidInput("too many price decimals"));
        }
        let den = 10u128.pow(frac.len() as u32);
        let digits = format!("{int}{frac}");
        let num: Amount = digits
            .parse()
            .map_err(|_| LaunchpadError::InvalidInput("price out of range"))?;
        Price::new(num, den)
    }
}

/// Vesting schedule: TGE unlock plus equal periodic releases.
///
/// Durations are whole days. The cliff runs from the sale start and must end
/// inside the vesting window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSchedule", into = "RawSchedule")]
pub struct VestingSchedule {
    tge: Bps,
    cliff_days: u32,
    vesting_days: u32,
    frequency_days: u32,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
struct RawSchedule {
    tge_bps: Bps,
    cliff_days: u32,
    vesting_days: u32,
    frequency_days: u32,
}

impl TryFrom<RawSchedule> for VestingSchedule {
    type Error = LaunchpadError;

    fn try_from(r: RawSchedule) -> Result<Self, Self::Error> {
        VestingSchedule::new(r.tge_bps, r.cliff_days, r.vesting_days, r.frequency_days)
    }
}

impl From<VestingSchedule> for RawSchedule {
    fn from(v: VestingSchedule) -> Self {
        RawSchedule {
            tge_bps: v.tge,
            cliff_days: v.cliff_days,
            vesting_days: v.vesting_days,
            frequency_days: v.frequency_days,
        }
    }
}

impl VestingSchedule {
    pub fn new(
        tge: Bps,
        cliff_days: u32,
        vesting_days: u32,
        frequency_days: u32,
    ) -> Result<Self, LaunchpadError> {
        if !tge.is_valid() {
            return Err(LaunchpadError::InvalidInput("tge above 100%"));
        }
        // Everything unlocks at TGE: no vesting window is needed.
        if vesting_days == 0 && tge == Bps::FULL {
            return Ok(Self { tge, cliff_days: 0, vesting_days: 0, frequency_days: 0 });
        }
        if frequency_days == 0 {
            return Err(LaunchpadError::InvalidInput("vesting frequency must be > 0"));
        }
        if frequency_days > vesting_days {
            return Err(LaunchpadError::InvalidInput("vesting frequency longer than vesting duration"));
        }
        if cliff_days > vesting_days {
            return Err(LaunchpadError::InvalidInput("cliff longer than vesting duration"));
        }
        Ok(Self { tge, cliff_days, vesting_days, frequency_days })
    }

    /// Whole TGE release, no vesting.
    pub fn immediate() -> Self {
        Self { tge: Bps::FULL, cliff_days: 0, vesting_days: 0, frequency_days: 0 }
    }

    pub fn tge(&self) -> Bps {
        self.tge
    }

    pub fn cliff_days(&self) -> u32 {
        self.cliff_days
    }

    pub fn vesting_days(&self) -> u32 {
        self.vesting_days
    }

    pub fn frequency_days(&self) -> u32 {
        self.frequency_days
    }

    /// Number of periodic releases.
    pub fn periods(&self) -> u32 {
        if self.frequency_days == 0 {
            0
        } else {
            self.vesting_days / self.frequency_days
        }
    }

    pub fn frequency_ms(&self) -> i64 {
        days(self.frequency_days)
    }

    /// Split of a vesting pool over the release periods.
    pub fn split(&self, vesting_tokens: Amount) -> EvenSplit {
        EvenSplit::new(vesting_tokens, self.periods())
    }
}

/// Per-address contribution bounds in quote units; 0 disables a bound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionLimits {
    pub min: Amount,
    pub max: Amount,
}

impl ContributionLimits {
    pub fn validate(&self) -> Result<(), LaunchpadError> {
        if self.max != 0 && self.min > self.max {
            return Err(LaunchpadError::InvalidInput("min contribution above max"));
        }
        Ok(())
    }

    pub fn check(&self, amount: Amount) -> Result<(), LaunchpadError> {
        if self.min != 0 && amount < self.min {
            return Err(LaunchpadError::ContributionBelowMin { amount, minimum: self.min });
        }
        if self.max != 0 && amount > self.max {
            return Err(LaunchpadError::ContributionAboveMax { amount, maximum: self.max });
        }
        Ok(())
    }
}

/// Immutable economics of one token sale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SaleTermsBuilder")]
pub struct SaleTerms {
    price: Price,
    schedule: VestingSchedule,
    start: Timestamp,
    end: Timestamp,
    limits: ContributionLimits,
}

/// Builder ensuring invariants at construction time.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SaleTermsBuilder {
    price: Option<Price>,
    schedule: Option<VestingSchedule>,
    start: Option<Timestamp>,
    end: Option<Timestamp>,
    #[serde(default)]
    limits: ContributionLimits,
}

impl SaleTermsBuilder {
    pub fn price(mut self, p: Price) -> Self {
        self.price = Some(p);
        self
    }
    pub fn schedule(mut self, s: VestingSchedule) -> Self {
        self.schedule = Some(s);
        self
    }
    pub fn window(mut self, start: Timestamp, end: Timestamp) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }
    pub fn limits(mut self, min: Amount, max: Amount) -> Self {
        self.limits = ContributionLimits { min, max };
        self
    }

    pub fn build(self) -> Result<SaleTerms, LaunchpadError> {
        let price = self.price.ok_or(LaunchpadError::InvalidInput("price"))?;
        let schedule = self.schedule.ok_or(LaunchpadError::InvalidInput("schedule"))?;
        let start = self.start.ok_or(LaunchpadError::InvalidInput("start"))?;
        let end = self.end.ok_or(LaunchpadError::InvalidInput("end"))?;
        if start > end {
            return Err(LaunchpadError::InvalidInput("sale start after end"));
        }
        // Every derived instant must be representable.
        start
            .checked_add(days(schedule.cliff_days()))
            .and_then(|t| t.checked_add(days(schedule.vesting_days())))
            .and_then(|t| t.checked_add(days(schedule.frequency_days())))
            .ok_or(LaunchpadError::MathOverflow)?;
        self.limits.validate()?;
        Ok(SaleTerms { price, schedule, start, end, limits: self.limits })
    }
}

impl TryFrom<SaleTermsBuilder> for SaleTerms {
    type Error = LaunchpadError;

    fn try_from(b: SaleTermsBuilder) -> Result<Self, Self::Error> {
        b.build()
    }
}

impl SaleTerms {
    pub fn builder() -> SaleTermsBuilder {
        SaleTermsBuilder::default()
    }

    pub fn price(&self) -> Price {
        self.price
    }

    pub fn schedule(&self) -> &VestingSchedule {
        &self.schedule
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    /// Sale completion; TGE happens here.
    pub fn end(&self) -> Timestamp {
        self.end
    }

    pub fn limits(&self) -> ContributionLimits {
        self.limits
    }

    pub fn cliff_end(&self) -> Timestamp {
        self.start + days(self.schedule.cliff_days())
    }

    /// End of the vesting window; periods run from the cliff end.
    pub fn vesting_end(&self) -> Timestamp {
        self.cliff_end() + days(self.schedule.vesting_days())
    }

    /// Release instant of period `i` (1-based): one frequency step per period
    /// after the cliff, never before the sale end.
    pub fn period_release(&self, i: u32) -> Timestamp {
        (self.cliff_end() + i as i64 * self.schedule.frequency_ms()).max(self.end)
    }

    /// Validate a contribution made at `at` against window and limits.
    pub fn check_contribution(&self, amount: Amount, at: Timestamp) -> Result<Contribution, LaunchpadError> {
        if amount == 0 {
            return Err(LaunchpadError::InvalidInput("contribution must be > 0"));
        }
        if at < self.start || at > self.end {
            return Err(LaunchpadError::OutsideSaleWindow);
        }
        self.limits.check(amount)?;
        Ok(Contribution { amount, timestamp: at })
    }
}

/// One investor commitment in quote units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub amount: Amount,
    pub timestamp: Timestamp,
}

impl Contribution {
    /// Tokens bought; derived, never stored.
    pub fn tokens(&self, terms: &SaleTerms) -> Result<Amount, LaunchpadError> {
        terms.price().tokens_for(self.amount)
    }
}

/// Raised-versus-target progress of a sale, clamped to 100%.
pub fn funding_progress(raised: Amount, target: Amount) -> Result<Bps, LaunchpadError> {
    if target == 0 {
        return Err(LaunchpadError::InvalidInput("funding target must be > 0"));
    }
    math::ratio_bps(raised, target)
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: Timestamp = 1_700_000_000_000;

    fn schedule() -> VestingSchedule {
        VestingSchedule::new(Bps(2_000), 30, 180, 30).unwrap()
    }

    fn terms() -> SaleTerms {
        SaleTerms::builder()
            .price("0.1".parse().unwrap())
            .schedule(schedule())
            .window(T0, T0 + days(14))
            .limits(100, 10_000)
            .build()
            .unwrap()
    }

    #[test]
    fn price_parses_decimals() {
        let p: Price = "0.1".parse().unwrap();
        assert_eq!((p.num(), p.den()), (1, 10));
        assert_eq!(p.tokens_for(1_000).unwrap(), 10_000);
        assert_eq!(p.cost_of(10_000).unwrap(), 1_000);

        let p: Price = "2.50".parse().unwrap();
        assert_eq!((p.num(), p.den()), (250, 100));
        assert!("0".parse::<Price>().is_err());
        assert!("0.000".parse::<Price>().is_err());
        assert!("-1".parse::<Price>().is_err());
        assert!("1e3".parse::<Price>().is_err());
        assert!(".".parse::<Price>().is_err());
    }

    #[test]
    fn schedule_rejects_malformed() {
        assert!(VestingSchedule::new(Bps(10_001), 0, 10, 1).is_err());
        assert!(VestingSchedule::new(Bps(0), 0, 10, 0).is_err());
        assert!(VestingSchedule::new(Bps(0), 0, 10, 20).is_err());
        assert!(VestingSchedule::new(Bps(0), 11, 10, 5).is_err());
        assert!(VestingSchedule::new(Bps(5_000), 0, 0, 0).is_err());
        let full = VestingSchedule::new(Bps::FULL, 0, 0, 0).unwrap();
        assert_eq!(full, VestingSchedule::immediate());
        assert_eq!(full.periods(), 0);
        assert_eq!(schedule().periods(), 6);
    }

    #[test]
    fn builder_requires_fields_and_order() {
        assert!(SaleTerms::builder().build().is_err());
        let r = SaleTerms::builder()
            .price(Price::new(1, 1).unwrap())
            .schedule(schedule())
            .window(T0 + 1, T0)
            .build();
        assert!(matches!(r, Err(LaunchpadError::InvalidInput(_))));
        let r = SaleTerms::builder()
            .price(Price::new(1, 1).unwrap())
            .schedule(schedule())
            .window(T0, T0)
            .limits(500, 100)
            .build();
        assert!(r.is_err());
    }

    #[test]
    fn contribution_checks() {
        let t = terms();
        assert!(matches!(t.check_contribution(0, T0), Err(LaunchpadError::InvalidInput(_))));
        assert!(matches!(t.check_contribution(500, T0 - 1), Err(LaunchpadError::OutsideSaleWindow)));
        assert!(matches!(t.check_contribution(500, t.end() + 1), Err(LaunchpadError::OutsideSaleWindow)));
        assert!(matches!(
            t.check_contribution(50, T0),
            Err(LaunchpadError::ContributionBelowMin { amount: 50, minimum: 100 })
        ));
        assert!(matches!(
            t.check_contribution(20_000, T0),
            Err(LaunchpadError::ContributionAboveMax { .. })
        ));
        let c = t.check_contribution(1_000, t.end()).unwrap();
        assert_eq!(c.tokens(&t).unwrap(), 10_000);
    }

    #[test]
    fn derived_instants() {
        let t = terms();
        assert_eq!(t.cliff_end(), T0 + days(30));
        assert_eq!(t.vesting_end(), T0 + days(210));
        assert_eq!(t.period_release(1), T0 + days(60));
        assert_eq!(t.period_release(6), T0 + days(210));

        // A sale running past the first periods holds them until it ends.
        let long = SaleTerms::builder()
            .price(Price::new(1, 1).unwrap())
            .schedule(schedule())
            .window(T0, T0 + days(75))
            .build()
            .unwrap();
        assert_eq!(long.period_release(1), T0 + days(75));
        assert_eq!(long.period_release(2), T0 + days(90));
    }

    #[test]
    fn terms_deserialize_validates() {
        let t = terms();
        let json = serde_json::to_string(&t).unwrap();
        let back: SaleTerms = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);

        let bad = json.replace("\"frequency_days\":30", "\"frequency_days\":0");
        assert!(serde_json::from_str::<SaleTerms>(&bad).is_err());
    }

    #[test]
    fn funding_progress_clamps() {
        assert_eq!(funding_progress(250, 1_000).unwrap(), Bps(2_500));
        assert_eq!(funding_progress(2_000, 1_000).unwrap(), Bps::FULL);
        assert!(funding_progress(1, 0).is_err());
    }
}

//! Checked fixed-point helpers shared by the calculators.
//!
//! All rounding is toward zero. Products are computed with a 256-bit
//! intermediate so `a * b / d` only fails when the quotient itself does not
//! fit in `u128`.

use crate::{Amount, Bps, LaunchpadError, BPS_DENOM};

/// floor(a * b / d).
pub fn mul_div(a: u128, b: u128, d: u128) -> Result<u128, LaunchpadError> {
    if d == 0 {
        return Err(LaunchpadError::InvalidInput("division by zero"));
    }
    if let Some(p) = a.checked_mul(b) {
        return Ok(p / d);
    }
    let (hi, lo) = widening_mul(a, b);
    // Quotient fits in 128 bits iff hi < d.
    if hi >= d {
        return Err(LaunchpadError::MathOverflow);
    }
    Ok(div_wide(hi, lo, d))
}

/// `amount * bps / 10_000`, floored.
#[inline]
pub fn apply_bps(amount: Amount, bps: Bps) -> Result<Amount, LaunchpadError> {
    mul_div(amount, bps.get() as u128, BPS_DENOM as u128)
}

/// `part / whole` in basis points, floored and clamped to 100%.
pub fn ratio_bps(part: u128, whole: u128) -> Result<Bps, LaunchpadError> {
    if whole == 0 {
        return Err(LaunchpadError::InvalidInput("ratio of zero whole"));
    }
    if part >= whole {
        return Ok(Bps::FULL);
    }
    // part < whole so the quotient is < 10_000.
    let q = mul_div(part, BPS_DENOM as u128, whole)?;
    Ok(Bps(q as u16))
}

/// Even split of `total` into `parts` shares; the last share absorbs the remainder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvenSplit {
    pub parts: u32,
    pub base: Amount,
    pub last: Amount,
}

impl EvenSplit {
    pub fn new(total: Amount, parts: u32) -> Self {
        if parts == 0 {
            return Self { parts, base: 0, last: 0 };
        }
        let base = total / parts as u128;
        let last = total - base * (parts as u128 - 1);
        Self { parts, base, last }
    }

    /// Sum of the first `k` shares (1-based, clamped to `parts`).
    pub fn released(&self, k: u32) -> Amount {
        if self.parts == 0 || k == 0 {
            return 0;
        }
        if k >= self.parts {
            return self.base * (self.parts as u128 - 1) + self.last;
        }
        self.base * k as u128
    }

    /// Share of period `i` (1-based).
    pub fn share(&self, i: u32) -> Amount {
        match i {
            0 => 0,
            i if i < self.parts => self.base,
            i if i == self.parts => self.last,
            _ => 0,
        }
    }
}

/// Full 256-bit product as (hi, lo).
fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = u64::MAX as u128;
    let (a_hi, a_lo) = (a >> 64, a & MASK);
    let (b_hi, b_lo) = (b >> 64, b & MASK);

    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;

    let mid = (ll >> 64) + (lh & MASK) + (hl & MASK);
    let lo = (mid << 64) | (ll & MASK);
    let hi = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    (hi, lo)
}

/// floor((hi << 128 | lo) / d), requires hi < d.
fn div_wide(hi: u128, lo: u128, d: u128) -> u128 {
    let mut rem = hi;
    let mut q = 0u128;
    for bit in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> bit) & 1);
        q <<= 1;
        if carry == 1 || rem >= d {
            rem = rem.wrapping_sub(d);
            q |= 1;
        }
    }
    q
}

//! Fixed-Point Arithmetic for the Keel ledger
//!
//! Three precision tiers share one 256-bit integer type:
//!
//! | Tier        | Scale  | Holds                                         |
//! |-------------|--------|-----------------------------------------------|
//! | Unit        | 10^18  | collateral, prices, normalized debt/equity    |
//! | Accumulator | 10^27  | interest accumulators, per-second rates       |
//! | Currency    | 10^45  | system currency balances and position values  |
//!
//! Products are formed at full 256-bit width and then divided; every
//! division truncates toward zero. Nothing here wraps or saturates: a
//! result that does not fit fails with `ArithmeticOverflow`.

use casper_types::U256;

use crate::constants::{fees::BPS_DENOMINATOR, scale};
use crate::errors::{KeelError, KeelResult};

/// Precision tier of a fixed-point value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Scale {
    Unit,
    Accumulator,
    Currency,
}

impl Scale {
    pub const fn decimals(self) -> usize {
        match self {
            Scale::Unit => scale::UNIT_DECIMALS,
            Scale::Accumulator => scale::ACCUMULATOR_DECIMALS,
            Scale::Currency => scale::CURRENCY_DECIMALS,
        }
    }

    /// The fixed-point representation of 1.0 at this scale.
    pub fn one(self) -> U256 {
        U256::exp10(self.decimals())
    }
}

/// 1.0 at unit scale (10^18)
pub fn unit() -> U256 {
    Scale::Unit.one()
}

/// 1.0 at accumulator scale (10^27)
pub fn ray() -> U256 {
    Scale::Accumulator.one()
}

// ============================================================================
// Checked primitives
// ============================================================================

pub fn add(a: U256, b: U256) -> KeelResult<U256> {
    a.checked_add(b).ok_or(KeelError::ArithmeticOverflow)
}

pub fn sub(a: U256, b: U256) -> KeelResult<U256> {
    a.checked_sub(b).ok_or(KeelError::ArithmeticUnderflow)
}

pub fn mul(a: U256, b: U256) -> KeelResult<U256> {
    a.checked_mul(b).ok_or(KeelError::ArithmeticOverflow)
}

/// Truncating division
pub fn div(a: U256, b: U256) -> KeelResult<U256> {
    if b.is_zero() {
        return Err(KeelError::DivisionByZero);
    }
    Ok(a / b)
}

/// `a × b / d`, keeping the full product before truncating.
pub fn mul_div(a: U256, b: U256, d: U256) -> KeelResult<U256> {
    if d.is_zero() {
        return Err(KeelError::DivisionByZero);
    }
    Ok(mul(a, b)? / d)
}

/// Multiply `x` by an accumulator-scale rate; the result keeps `x`'s scale.
pub fn rmul(x: U256, rate: U256) -> KeelResult<U256> {
    mul_div(x, rate, ray())
}

/// Divide `x` by `y` producing an accumulator-scale ratio when both share a scale.
pub fn rdiv(x: U256, y: U256) -> KeelResult<U256> {
    mul_div(x, ray(), y)
}

/// `base^exp` at accumulator scale by repeated squaring, truncating each step.
pub fn rpow(base: U256, exp: u64) -> KeelResult<U256> {
    let mut result = ray();
    let mut base = base;
    let mut exp = exp;
    while exp > 0 {
        if exp & 1 == 1 {
            result = rmul(result, base)?;
        }
        exp >>= 1;
        if exp > 0 {
            base = rmul(base, base)?;
        }
    }
    Ok(result)
}

// ============================================================================
// Tier conversion
// ============================================================================

/// Move a value between tiers. Narrowing truncates.
pub fn rescale(value: U256, from: Scale, to: Scale) -> KeelResult<U256> {
    let (f, t) = (from.decimals(), to.decimals());
    if t >= f {
        mul(value, U256::exp10(t - f))
    } else {
        Ok(value / U256::exp10(f - t))
    }
}

/// Unit amount → currency amount (`amount × 10^27`)
pub fn unit_to_currency(amount: U256) -> KeelResult<U256> {
    rescale(amount, Scale::Unit, Scale::Currency)
}

/// Currency amount → unit amount, truncating dust below one unit step
pub fn currency_to_unit(amount: U256) -> KeelResult<U256> {
    rescale(amount, Scale::Currency, Scale::Unit)
}

/// Whole numbers expressed at a scale, e.g. `from_whole(150, Scale::Unit)`.
pub fn from_whole(whole: u128, at: Scale) -> KeelResult<U256> {
    mul(U256::from(whole), at.one())
}

/// Currency value of `collateral` (unit) priced at `price` (unit per unit).
pub fn collateral_value(collateral: U256, price: U256) -> KeelResult<U256> {
    let unit_squared = mul(collateral, price)?;
    let widen = scale::CURRENCY_DECIMALS - 2 * scale::UNIT_DECIMALS;
    mul(unit_squared, U256::exp10(widen))
}

/// Normalized amount (unit) times an accumulator (accumulator) lands on currency scale.
pub fn position_value(normalized: U256, accumulator: U256) -> KeelResult<U256> {
    mul(normalized, accumulator)
}

/// Apply a signed unit-scale delta to a non-negative balance.
pub fn apply_delta(value: U256, delta: i128) -> KeelResult<U256> {
    let magnitude = U256::from(delta.unsigned_abs());
    if delta >= 0 {
        add(value, magnitude)
    } else {
        sub(value, magnitude)
    }
}

/// Basis-point share of a value, truncated.
pub fn bps_of(value: U256, bps: u64) -> KeelResult<U256> {
    mul_div(value, U256::from(bps), U256::from(BPS_DENOMINATOR))
}

/// Narrow to `u128` for external interfaces.
pub fn to_u128(value: U256) -> KeelResult<u128> {
    u128::try_from(value).map_err(|_| KeelError::ArithmeticOverflow)
}

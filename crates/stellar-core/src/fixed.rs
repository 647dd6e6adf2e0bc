use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
///
/// Used for resource stock, production rates and every multiplier that
/// feeds them, so that accrual is bit-identical on every worker.
pub type Fixed64 = I32F32;

/// Whole seconds. The granularity of every duration in the engine.
pub type Seconds = i64;

/// Convert an f64 to Fixed64. Use only for initialization, never in sim code.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// `base^exp` by repeated saturating multiplication.
pub fn pow(base: Fixed64, exp: u32) -> Fixed64 {
    let mut acc = Fixed64::ONE;
    for _ in 0..exp {
        acc = acc.saturating_mul(base);
    }
    acc
}

/// `base^exp`, or `None` once the result leaves the Q32.32 range.
pub fn checked_pow(base: Fixed64, exp: u32) -> Option<Fixed64> {
    (0..exp).try_fold(Fixed64::ONE, |acc, _| acc.checked_mul(base))
}

/// Truncate a value to a whole `u64`, clamping negatives to zero.
pub fn floor_u64(v: Fixed64) -> u64 {
    v.to_num::<i64>().max(0) as u64
}

/// Elapsed milliseconds expressed in hours without overflowing the 32-bit
/// integer part for long absences.
pub fn millis_to_hours(ms: i64) -> Fixed64 {
    if ms <= 0 {
        return Fixed64::ZERO;
    }
    let secs = Fixed64::saturating_from_num(ms / 1000)
        + Fixed64::from_num(ms % 1000) / Fixed64::from_num(1000);
    secs / Fixed64::from_num(3600)
}

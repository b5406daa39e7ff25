use crate::error::MathError;
use alloy_primitives::U256;

const TWO: U256 = U256::from_limbs([2, 0, 0, 0]);
const THREE: U256 = U256::from_limbs([3, 0, 0, 0]);

/// Computes floor(a * b / denominator) with a full 512-bit intermediate product
///
/// Fails with `DivideByZero` when `denominator == 0` and with `Overflow` when
/// the quotient does not fit in 256 bits.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivideByZero);
    }

    // 512-bit product as prod1 * 2^256 + prod0
    let mm = a.mul_mod(b, U256::MAX);
    let mut prod0 = a.wrapping_mul(b);
    let (mut prod1, borrow) = mm.overflowing_sub(prod0);
    if borrow {
        prod1 = prod1.wrapping_sub(U256::from(1u8));
    }

    if prod1.is_zero() {
        return Ok(prod0 / denominator);
    }

    // Quotient must fit in 256 bits
    if denominator <= prod1 {
        return Err(MathError::Overflow);
    }

    // Subtract the remainder to make the division exact
    let remainder = a.mul_mod(b, denominator);
    if remainder > prod0 {
        prod1 = prod1.wrapping_sub(U256::from(1u8));
    }
    prod0 = prod0.wrapping_sub(remainder);

    // Factor the largest power of two out of the denominator
    let twos = denominator & denominator.wrapping_neg();
    let denominator = denominator / twos;
    prod0 /= twos;

    // Shift in bits from prod1: flip = 2^256 / twos
    let flip = (twos.wrapping_neg() / twos).wrapping_add(U256::from(1u8));
    prod0 |= prod1.wrapping_mul(flip);

    // Inverse of the (now odd) denominator mod 2^256, correct to 4 bits then
    // doubled by each Newton-Raphson step
    let mut inv = THREE.wrapping_mul(denominator) ^ TWO;
    for _ in 0..6 {
        inv = inv.wrapping_mul(TWO.wrapping_sub(denominator.wrapping_mul(inv)));
    }

    Ok(prod0.wrapping_mul(inv))
}

/// Computes ceil(a * b / denominator)
pub fn mul_div_rounding_up(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    let result = mul_div(a, b, denominator)?;
    if a.mul_mod(b, denominator).is_zero() {
        return Ok(result);
    }
    if result == U256::MAX {
        return Err(MathError::Overflow);
    }
    Ok(result + U256::from(1u8))
}

/// Unsigned division with rounding up
pub fn div_rounding_up(a: U256, b: U256) -> Result<U256, MathError> {
    if b.is_zero() {
        return Err(MathError::DivideByZero);
    }
    let (quotient, remainder) = a.div_rem(b);
    if remainder.is_zero() {
        Ok(quotient)
    } else {
        Ok(quotient + U256::from(1u8))
    }
}

//! Exact output formulas and weight transforms for pricing edges.
//!
//! All amount math is integer `U256` against the true pool formulas. The
//! float conversion happens only at the weight transform, where precision
//! only steers path discovery.

use alloy::primitives::U256;

use crate::registry::DexFamily;

/// Fee denominator in basis points.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Exact output of one edge for a given input, per pricing family.
///
/// Overflow and empty reserves quote to zero, which the weight transform
/// maps to an infinite edge.
pub fn amount_out(
    family: DexFamily,
    fee_bps: u32,
    reserve_in: U256,
    reserve_out: U256,
    amount_in: U256,
) -> U256 {
    if amount_in.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() {
        return U256::ZERO;
    }

    match family {
        DexFamily::V2ConstantProduct | DexFamily::V3Concentrated => {
            constant_product_out(fee_bps, reserve_in, reserve_out, amount_in)
        }
        DexFamily::StableCurve | DexFamily::RouteList => {
            // Linear scaling of the cached reference quote, fee deducted.
            let fee_keep = U256::from(BPS_DENOMINATOR - fee_bps as u64);
            let numerator = amount_in
                .checked_mul(reserve_out)
                .and_then(|v| v.checked_mul(fee_keep));
            let denominator = reserve_in.checked_mul(U256::from(BPS_DENOMINATOR));
            match (numerator, denominator) {
                (Some(n), Some(d)) if !d.is_zero() => n / d,
                _ => U256::ZERO,
            }
        }
    }
}

/// Constant-product output with the fee applied to the input:
/// `out = in·(10000−fee)·R_out / (R_in·10000 + in·(10000−fee))`.
pub fn constant_product_out(
    fee_bps: u32,
    reserve_in: U256,
    reserve_out: U256,
    amount_in: U256,
) -> U256 {
    let fee_keep = U256::from(BPS_DENOMINATOR - fee_bps as u64);
    let in_after_fee = match amount_in.checked_mul(fee_keep) {
        Some(v) => v,
        None => return U256::ZERO,
    };
    let numerator = match in_after_fee.checked_mul(reserve_out) {
        Some(v) => v,
        None => return U256::ZERO,
    };
    let denominator = match reserve_in
        .checked_mul(U256::from(BPS_DENOMINATOR))
        .and_then(|v| v.checked_add(in_after_fee))
    {
        Some(v) if !v.is_zero() => v,
        _ => return U256::ZERO,
    };
    numerator / denominator
}

/// Virtual constant-product reserves of a v3 pool at its current price:
/// `r0 = L·2^96/√P`, `r1 = L·√P/2^96`. A local approximation good enough
/// for path discovery; final profitability is validated by simulation.
pub fn v3_virtual_reserves(sqrt_price_x96: U256, liquidity: u128) -> (U256, U256) {
    if sqrt_price_x96.is_zero() || liquidity == 0 {
        return (U256::ZERO, U256::ZERO);
    }
    let liquidity = U256::from(liquidity);
    let reserve0 = (liquidity << 96) / sqrt_price_x96;
    let reserve1 = match liquidity.checked_mul(sqrt_price_x96) {
        Some(v) => v >> 96,
        None => return (U256::ZERO, U256::ZERO),
    };
    (reserve0, reserve1)
}

/// Edge weight `−ln(out/δ)` for the marginal rate at reference input δ.
/// Unquotable edges weigh `+∞` and drop out of shortest paths.
pub fn edge_weight(
    family: DexFamily,
    fee_bps: u32,
    reserve_in: U256,
    reserve_out: U256,
    reference_in: U256,
) -> f64 {
    let out = amount_out(family, fee_bps, reserve_in, reserve_out, reference_in);
    if out.is_zero() || reference_in.is_zero() {
        return f64::INFINITY;
    }
    let rate = u256_to_f64(out) / u256_to_f64(reference_in);
    if rate <= 0.0 || !rate.is_finite() {
        f64::INFINITY
    } else {
        -rate.ln()
    }
}

/// Lossy conversion for weight math only; never used for amounts.
pub fn u256_to_f64(value: U256) -> f64 {
    value.to_string().parse().unwrap_or(f64::INFINITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(value: u128) -> U256 {
        U256::from(value)
    }

    #[test]
    fn constant_product_matches_reference_values() {
        // 1e18 in against 1000e18/3_000_000e6 reserves at 30 bps.
        let out = constant_product_out(
            30,
            u(1_000_000_000_000_000_000_000),
            u(3_000_000_000_000),
            u(1_000_000_000_000_000_000),
        );
        // Expected ≈ 3000e6 * 0.997 / 1.000997 ≈ 2.988e9.
        assert!(out > u(2_980_000_000));
        assert!(out < u(2_995_000_000));
    }

    #[test]
    fn zero_reserves_quote_zero_and_weigh_infinite() {
        assert_eq!(
            amount_out(DexFamily::V2ConstantProduct, 30, U256::ZERO, u(10), u(1)),
            U256::ZERO
        );
        assert!(edge_weight(
            DexFamily::V2ConstantProduct,
            30,
            U256::ZERO,
            u(10),
            u(1)
        )
        .is_infinite());
    }

    #[test]
    fn round_trip_weight_is_nonnegative() {
        // weight(A→B) + weight(B→A) >= 0: fees make round trips lossy.
        let r0 = u(5_000_000_000_000_000_000_000);
        let r1 = u(15_000_000_000_000_000);
        let delta0 = u(1_000_000_000_000_000_000);
        let delta1 = u(3_000_000_000_000);

        let forward = edge_weight(DexFamily::V2ConstantProduct, 30, r0, r1, delta0);
        let backward = edge_weight(DexFamily::V2ConstantProduct, 30, r1, r0, delta1);
        assert!(forward + backward >= 0.0);
    }

    #[test]
    fn spot_family_scales_linearly_with_fee() {
        // Reference quote 1:1.02, 4 bps fee.
        let out = amount_out(
            DexFamily::StableCurve,
            4,
            u(1_000_000),
            u(1_020_000),
            u(500_000),
        );
        // 500_000 * 1.02 * 0.9996 = 509_796
        assert_eq!(out, u(509_796));
    }

    #[test]
    fn v3_virtual_reserves_recover_spot_price() {
        // sqrtP = 2^96 means price 1:1, so virtual reserves are equal.
        let sqrt_price = U256::from(1u64) << 96;
        let (r0, r1) = v3_virtual_reserves(sqrt_price, 1_000_000);
        assert_eq!(r0, r1);
        assert_eq!(r0, u(1_000_000));

        // Doubling the sqrt price quadruples token1 per token0.
        let (r0, r1) = v3_virtual_reserves(sqrt_price * U256::from(2u64), 1_000_000);
        assert_eq!(r1 / r0, u(4));
    }

    #[test]
    fn weight_is_negative_log_of_rate() {
        // Deep balanced reserves, zero fee: rate ~1, weight ~0.
        let weight = edge_weight(
            DexFamily::V2ConstantProduct,
            0,
            u(1_000_000_000_000_000_000_000_000),
            u(1_000_000_000_000_000_000_000_000),
            u(1_000_000_000_000),
        );
        assert!(weight.abs() < 1e-6);

        // A 30 bps fee shows up as roughly +0.003.
        let weight = edge_weight(
            DexFamily::V2ConstantProduct,
            30,
            u(1_000_000_000_000_000_000_000_000),
            u(1_000_000_000_000_000_000_000_000),
            u(1_000_000_000_000),
        );
        assert!((weight - 0.003).abs() < 1e-4);
    }
}

//! Contract bindings and ABI encoding for the arbitrage pipeline.
//!
//! Call encoding goes through `alloy` `sol!` bindings; event payloads and
//! call returns are decoded word-wise, which keeps the hot decode path free
//! of intermediate allocations.

use std::sync::LazyLock;

use alloy::primitives::{keccak256, Address, B256, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

use crate::error::ChainError;

sol! {
    /// One swap hop executed by the arbitrage contract.
    #[derive(Debug)]
    struct SwapStep {
        address router;
        address tokenIn;
        address tokenOut;
        uint256 amountIn;
        bytes data;
        uint8 dexType;
    }

    /// Parameters of the single contract entry point.
    #[derive(Debug)]
    struct ArbParams {
        address flashToken;
        uint256 flashAmount;
        SwapStep[] swaps;
        uint256 minProfit;
    }

    function executeArbitrage(ArbParams params) external;

    function getPair(address tokenA, address tokenB) external view returns (address pair);
    function getPool(address tokenA, address tokenB, uint24 fee) external view returns (address pool);
    function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
    function slot0() external view returns (uint160 sqrtPriceX96, int24 tick, uint16 observationIndex, uint16 observationCardinality, uint16 observationCardinalityNext, uint8 feeProtocol, bool unlocked);
    function liquidity() external view returns (uint128);
    function balanceOf(address owner) external view returns (uint256);
    function decimals() external view returns (uint8);
    function get_dy(int128 i, int128 j, uint256 dx) external view returns (uint256);
    function getAmountOut(uint256 amountIn, address tokenIn) external view returns (uint256);
}

/// Topic0 of the v2-family `Sync(uint112,uint112)` event.
pub static SYNC_TOPIC: LazyLock<B256> =
    LazyLock::new(|| keccak256("Sync(uint112,uint112)".as_bytes()));

/// Topic0 of the v3-family `Swap(address,address,int256,int256,uint160,uint128,int24)` event.
pub static SWAP_TOPIC: LazyLock<B256> = LazyLock::new(|| {
    keccak256("Swap(address,address,int256,int256,uint160,uint128,int24)".as_bytes())
});

/// Selector of the standard `Error(string)` revert.
pub const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Read the i-th 32-byte word of an ABI payload.
pub fn word(data: &[u8], index: usize) -> Result<U256, ChainError> {
    let start = index * 32;
    let end = start + 32;
    if data.len() < end {
        return Err(ChainError::Decode(format!(
            "payload too short: need word {index}, have {} bytes",
            data.len()
        )));
    }
    Ok(U256::from_be_slice(&data[start..end]))
}

/// Decode an address from the i-th word.
pub fn word_address(data: &[u8], index: usize) -> Result<Address, ChainError> {
    let start = index * 32;
    let end = start + 32;
    if data.len() < end {
        return Err(ChainError::Decode(format!(
            "payload too short: need word {index}, have {} bytes",
            data.len()
        )));
    }
    Ok(Address::from_slice(&data[start + 12..end]))
}

/// Decode a `Sync(uint112,uint112)` payload into (reserve0, reserve1).
pub fn decode_sync_event(data: &[u8]) -> Result<(U256, U256), ChainError> {
    Ok((word(data, 0)?, word(data, 1)?))
}

/// Decode the v3 `Swap` payload into (sqrtPriceX96, liquidity).
///
/// Non-indexed layout: amount0, amount1, sqrtPriceX96, liquidity, tick.
pub fn decode_swap_event(data: &[u8]) -> Result<(U256, u128), ChainError> {
    let sqrt_price_x96 = word(data, 2)?;
    let liquidity = word(data, 3)?
        .try_into()
        .map_err(|_| ChainError::Decode("liquidity exceeds u128".to_string()))?;
    Ok((sqrt_price_x96, liquidity))
}

/// Decode a single-address return payload (factory lookups).
pub fn decode_address_return(data: &[u8]) -> Result<Address, ChainError> {
    word_address(data, 0)
}

/// Decode a `getReserves()` return into (reserve0, reserve1).
pub fn decode_reserves_return(data: &[u8]) -> Result<(U256, U256), ChainError> {
    Ok((word(data, 0)?, word(data, 1)?))
}

/// Decode a `slot0()` return into sqrtPriceX96.
pub fn decode_slot0_return(data: &[u8]) -> Result<U256, ChainError> {
    word(data, 0)
}

/// Decode a single-uint return payload.
pub fn decode_u256_return(data: &[u8]) -> Result<U256, ChainError> {
    word(data, 0)
}

/// Decode a `liquidity()` return.
pub fn decode_u128_return(data: &[u8]) -> Result<u128, ChainError> {
    word(data, 0)?
        .try_into()
        .map_err(|_| ChainError::Decode("value exceeds u128".to_string()))
}

/// Decode a `decimals()` return.
pub fn decode_u8_return(data: &[u8]) -> Result<u8, ChainError> {
    word(data, 0)?
        .try_into()
        .map_err(|_| ChainError::Decode("value exceeds u8".to_string()))
}

/// Encode the calldata of a factory `getPair` lookup.
pub fn encode_get_pair(token_a: Address, token_b: Address) -> Vec<u8> {
    getPairCall {
        tokenA: token_a,
        tokenB: token_b,
    }
    .abi_encode()
}

/// Encode the calldata of a factory `getPool` lookup.
pub fn encode_get_pool(token_a: Address, token_b: Address, fee_pips: u32) -> Vec<u8> {
    getPoolCall {
        tokenA: token_a,
        tokenB: token_b,
        fee: alloy::primitives::aliases::U24::from(fee_pips),
    }
    .abi_encode()
}

/// Encode the calldata of a pool `getReserves` call.
pub fn encode_get_reserves() -> Vec<u8> {
    getReservesCall {}.abi_encode()
}

/// Encode the calldata of a pool `slot0` call.
pub fn encode_slot0() -> Vec<u8> {
    slot0Call {}.abi_encode()
}

/// Encode the calldata of a pool `liquidity` call.
pub fn encode_liquidity() -> Vec<u8> {
    liquidityCall {}.abi_encode()
}

/// Encode the calldata of an ERC-20 `decimals` call.
pub fn encode_decimals() -> Vec<u8> {
    decimalsCall {}.abi_encode()
}

/// Encode the calldata of an ERC-20 `balanceOf` call.
pub fn encode_balance_of(owner: Address) -> Vec<u8> {
    balanceOfCall { owner }.abi_encode()
}

/// Encode the calldata of a stable pool `get_dy` reference quote.
pub fn encode_get_dy(i: i128, j: i128, dx: U256) -> Vec<u8> {
    get_dyCall { i, j, dx }.abi_encode()
}

/// Encode the calldata of a route-list `getAmountOut` reference quote.
pub fn encode_get_amount_out(amount_in: U256, token_in: Address) -> Vec<u8> {
    getAmountOutCall {
        amountIn: amount_in,
        tokenIn: token_in,
    }
    .abi_encode()
}

/// Encode the calldata of `executeArbitrage`.
pub fn encode_execute_arbitrage(
    flash_token: Address,
    flash_amount: U256,
    swaps: Vec<SwapStep>,
    min_profit: U256,
) -> Vec<u8> {
    executeArbitrageCall {
        params: ArbParams {
            flashToken: flash_token,
            flashAmount: flash_amount,
            swaps,
            minProfit: min_profit,
        },
    }
    .abi_encode()
}

// === Swap-step data payloads ===
//
// v2-family: empty. v3-family: uint24 fee tier. Stable-curve: (int128,int128)
// coin indices. Route-list: bool stable flag. Each ABI-encodes to padded
// 32-byte words.

/// Encode a v3 swap-step payload.
pub fn encode_v3_step_data(fee_pips: u32) -> Vec<u8> {
    U256::from(fee_pips).to_be_bytes::<32>().to_vec()
}

/// Decode a v3 swap-step payload.
pub fn decode_v3_step_data(data: &[u8]) -> Result<u32, ChainError> {
    word(data, 0)?
        .try_into()
        .map_err(|_| ChainError::Decode("fee tier exceeds u32".to_string()))
}

/// Encode a stable-curve swap-step payload.
pub fn encode_stable_step_data(i: i128, j: i128) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(&i128_word(i));
    out.extend_from_slice(&i128_word(j));
    out
}

/// Decode a stable-curve swap-step payload.
pub fn decode_stable_step_data(data: &[u8]) -> Result<(i128, i128), ChainError> {
    Ok((i128_from_word(data, 0)?, i128_from_word(data, 1)?))
}

/// Encode a route-list swap-step payload.
pub fn encode_route_step_data(stable: bool) -> Vec<u8> {
    let mut out = vec![0u8; 32];
    out[31] = stable as u8;
    out
}

/// Decode a route-list swap-step payload.
pub fn decode_route_step_data(data: &[u8]) -> Result<bool, ChainError> {
    Ok(!word(data, 0)?.is_zero())
}

/// Human-readable rendering of revert data: the `Error(string)` message if
/// present, otherwise the raw selector.
pub fn decode_revert_reason(data: &[u8]) -> String {
    if data.len() >= 4 && data[..4] == ERROR_STRING_SELECTOR {
        // selector | offset | length | bytes
        if let (Ok(offset), Ok(len)) = (word(&data[4..], 0), word(&data[4..], 1)) {
            let offset: usize = offset.try_into().unwrap_or(usize::MAX);
            let len: usize = len.try_into().unwrap_or(usize::MAX);
            let start = 4usize.saturating_add(offset).saturating_add(32);
            if offset == 32 && data.len() >= start.saturating_add(len) {
                if let Ok(msg) = std::str::from_utf8(&data[start..start + len]) {
                    return msg.to_string();
                }
            }
        }
    }
    if data.len() >= 4 {
        format!("selector 0x{}", hex::encode(&data[..4]))
    } else if data.is_empty() {
        "no revert data".to_string()
    } else {
        format!("0x{}", hex::encode(data))
    }
}

fn i128_word(value: i128) -> [u8; 32] {
    let mut out = if value < 0 { [0xffu8; 32] } else { [0u8; 32] };
    out[16..].copy_from_slice(&value.to_be_bytes());
    out
}

fn i128_from_word(data: &[u8], index: usize) -> Result<i128, ChainError> {
    let start = index * 32;
    let end = start + 32;
    if data.len() < end {
        return Err(ChainError::Decode(format!(
            "payload too short: need word {index}, have {} bytes",
            data.len()
        )));
    }
    let head = &data[start..start + 16];
    let negative = data[start + 16] & 0x80 != 0;
    let expected = if negative { 0xff } else { 0x00 };
    if head.iter().any(|b| *b != expected) {
        return Err(ChainError::Decode("value exceeds int128".to_string()));
    }
    let mut raw = [0u8; 16];
    raw.copy_from_slice(&data[start + 16..end]);
    Ok(i128::from_be_bytes(raw))
}

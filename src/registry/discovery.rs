//! Pool discovery against dex factories.

use alloy::primitives::{Address, U256};
use tracing::{debug, info, instrument, warn};

use super::{DexFamily, Pool, PoolRegistry, Token};
use crate::abi;
use crate::chain::client::fetch_decimals;
use crate::chain::{ChainClient, TxRequest};
use crate::config::ChainSettings;
use crate::error::RegistryError;
use crate::mirror::{PoolPricing, SpotQuote};

/// Enumerate pools for the curated token set of one chain.
///
/// v2 factories answer `getPair`, v3 factories answer `getPool` per fee
/// tier; a zero address means the pool does not exist and is silently
/// skipped. Stable-curve and route-list pools come straight from config.
#[instrument(skip(client, settings), fields(chain = settings.chain_id))]
pub async fn discover_pools(
    client: &dyn ChainClient,
    settings: &ChainSettings,
) -> Result<PoolRegistry, RegistryError> {
    let mut tokens = Vec::new();
    for entry in &settings.tokens {
        match fetch_decimals(client, entry.address).await {
            Ok(decimals) => tokens.push(Token {
                address: entry.address,
                symbol: entry.symbol.clone(),
                decimals,
            }),
            Err(e) => {
                warn!(
                    token = %entry.address,
                    symbol = %entry.symbol,
                    error = %e,
                    "token metadata unavailable, excluding from discovery"
                );
            }
        }
    }

    let mut pools: Vec<Pool> = Vec::new();

    for dex in &settings.dexes {
        let mut found = 0usize;

        for i in 0..tokens.len() {
            for j in (i + 1)..tokens.len() {
                let (a, b) = (tokens[i].address, tokens[j].address);
                // Factories order pairs by ascending address.
                let (token0, token1) = if a < b { (a, b) } else { (b, a) };

                match dex.family {
                    DexFamily::V2ConstantProduct => {
                        let ret = client
                            .call(&TxRequest {
                                to: dex.factory,
                                data: abi::encode_get_pair(token0, token1),
                                ..Default::default()
                            })
                            .await
                            .map_err(|e| RegistryError::Factory {
                                dex: dex.name.clone(),
                                reason: e.to_string(),
                            })?;
                        let pair = abi::decode_address_return(&ret)
                            .map_err(RegistryError::Chain)?;
                        if pair != Address::ZERO {
                            found += 1;
                            pools.push(Pool {
                                address: pair,
                                chain_id: settings.chain_id,
                                dex: dex.name.clone(),
                                family: dex.family,
                                token0,
                                token1,
                                fee_bps: dex.fee_bps,
                                fee_tier_pips: None,
                                stable: false,
                                router: dex.router,
                            });
                        }
                    }
                    DexFamily::V3Concentrated => {
                        for &fee_pips in &dex.fee_tiers {
                            let ret = client
                                .call(&TxRequest {
                                    to: dex.factory,
                                    data: abi::encode_get_pool(token0, token1, fee_pips),
                                    ..Default::default()
                                })
                                .await
                                .map_err(|e| RegistryError::Factory {
                                    dex: dex.name.clone(),
                                    reason: e.to_string(),
                                })?;
                            let pool = abi::decode_address_return(&ret)
                                .map_err(RegistryError::Chain)?;
                            if pool != Address::ZERO {
                                found += 1;
                                pools.push(Pool {
                                    address: pool,
                                    chain_id: settings.chain_id,
                                    dex: dex.name.clone(),
                                    family: dex.family,
                                    token0,
                                    token1,
                                    fee_bps: fee_pips / 100,
                                    fee_tier_pips: Some(fee_pips),
                                    stable: false,
                                    router: dex.router,
                                });
                            }
                        }
                    }
                    DexFamily::StableCurve | DexFamily::RouteList => {
                        // No uniform factory interface; registered via
                        // extra_pools below.
                    }
                }
            }
        }

        debug!(dex = %dex.name, found, "factory enumeration complete");
    }

    for extra in &settings.extra_pools {
        pools.push(Pool {
            address: extra.address,
            chain_id: settings.chain_id,
            dex: extra.name.clone(),
            family: extra.family,
            token0: extra.token0,
            token1: extra.token1,
            fee_bps: extra.fee_bps,
            fee_tier_pips: None,
            stable: extra.stable,
            router: extra.router,
        });
    }

    info!(
        chain = settings.chain_id,
        tokens = tokens.len(),
        pools = pools.len(),
        "pool discovery complete"
    );

    Ok(PoolRegistry::new(tokens, pools))
}

/// Read a pool's current pricing via view calls. Used for the initial
/// snapshot at discovery and for the post-reconnect refresh.
pub async fn fetch_pricing(
    client: &dyn ChainClient,
    pool: &Pool,
    decimals0: u8,
    decimals1: u8,
) -> Result<PoolPricing, RegistryError> {
    match pool.family {
        DexFamily::V2ConstantProduct => {
            let ret = client
                .call(&TxRequest {
                    to: pool.address,
                    data: abi::encode_get_reserves(),
                    ..Default::default()
                })
                .await
                .map_err(RegistryError::Chain)?;
            let (reserve0, reserve1) =
                abi::decode_reserves_return(&ret).map_err(RegistryError::Chain)?;
            Ok(PoolPricing::V2 { reserve0, reserve1 })
        }
        DexFamily::V3Concentrated => {
            let slot0 = client
                .call(&TxRequest {
                    to: pool.address,
                    data: abi::encode_slot0(),
                    ..Default::default()
                })
                .await
                .map_err(RegistryError::Chain)?;
            let sqrt_price_x96 =
                abi::decode_slot0_return(&slot0).map_err(RegistryError::Chain)?;

            let liq = client
                .call(&TxRequest {
                    to: pool.address,
                    data: abi::encode_liquidity(),
                    ..Default::default()
                })
                .await
                .map_err(RegistryError::Chain)?;
            let liquidity = abi::decode_u128_return(&liq).map_err(RegistryError::Chain)?;

            Ok(PoolPricing::V3 {
                sqrt_price_x96,
                liquidity,
            })
        }
        DexFamily::StableCurve | DexFamily::RouteList => {
            let ref_in0 = U256::from(10u64).pow(U256::from(decimals0));
            let ref_in1 = U256::from(10u64).pow(U256::from(decimals1));

            let zero_to_one = SpotQuote {
                amount_in: ref_in0,
                amount_out: spot_quote(client, pool, true, ref_in0).await?,
            };
            let one_to_zero = SpotQuote {
                amount_in: ref_in1,
                amount_out: spot_quote(client, pool, false, ref_in1).await?,
            };

            Ok(PoolPricing::Spot {
                zero_to_one,
                one_to_zero,
            })
        }
    }
}

async fn spot_quote(
    client: &dyn ChainClient,
    pool: &Pool,
    zero_to_one: bool,
    amount_in: U256,
) -> Result<U256, RegistryError> {
    let data = match pool.family {
        DexFamily::StableCurve => {
            let (i, j) = if zero_to_one { (0, 1) } else { (1, 0) };
            abi::encode_get_dy(i, j, amount_in)
        }
        _ => {
            let token_in = if zero_to_one { pool.token0 } else { pool.token1 };
            abi::encode_get_amount_out(amount_in, token_in)
        }
    };

    let ret = client
        .call(&TxRequest {
            to: pool.address,
            data,
            ..Default::default()
        })
        .await
        .map_err(RegistryError::Chain)?;
    abi::decode_u256_return(&ret).map_err(RegistryError::Chain)
}

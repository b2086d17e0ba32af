use alloy::primitives::{Address, B256, U256, address};
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use tracing::info;

use super::erc20::ensure_allowance;
use super::framework::{AdapterError, LegContext, ProtocolAdapter};

/// Base 上的 Aave v3 Pool。
pub const AAVE_V3_POOL_BASE: Address = address!("A238Dd80C259a72e81d7e4664a9801593F98d1c5");
/// Base 原生 USDC。
pub const USDC_BASE: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

sol! {
    interface IPool {
        function supply(address asset, uint256 amount, address onBehalfOf, uint16 referralCode) external;
    }
}

/// Aave v3 借贷市场适配器：先授权 Pool 扣款，授权打包后再存入。
/// Spark 与 Aave 共享同一个底层市场，二者都分发到本适配器。
pub struct AaveAdapter {
    pool: Address,
    asset: Address,
}

impl AaveAdapter {
    pub fn new() -> Self {
        Self {
            pool: AAVE_V3_POOL_BASE,
            asset: USDC_BASE,
        }
    }

    #[cfg(test)]
    pub fn with_addresses(pool: Address, asset: Address) -> Self {
        Self { pool, asset }
    }
}

impl Default for AaveAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtocolAdapter for AaveAdapter {
    fn venue(&self) -> &'static str {
        "aave-v3"
    }

    async fn supply(&self, ctx: &LegContext<'_>, amount_minor: u64) -> Result<B256, AdapterError> {
        let wallet = ctx.require_wallet(self.venue())?;
        let amount = U256::from(amount_minor);

        ensure_allowance(ctx, self.venue(), self.asset, self.pool, amount).await?;

        let call = IPool::supplyCall {
            asset: self.asset,
            amount,
            onBehalfOf: wallet.address,
            referralCode: 0,
        };
        let tx = ctx
            .client
            .submit(wallet.signer.as_ref(), self.pool, call.abi_encode().into())
            .await?;

        let receipt = ctx.client.wait_for_receipt(tx).await?;
        if !receipt.success {
            return Err(AdapterError::SupplyReverted {
                venue: self.venue(),
                tx,
            });
        }

        info!(
            target: "protocols::aave",
            pool = %self.pool,
            amount_minor,
            tx = %tx,
            block = receipt.block_number,
            "Aave 存入已确认"
        );
        Ok(tx)
    }
}

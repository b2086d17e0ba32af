use alloy::primitives::{Address, B256, U256, address};
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use tracing::info;

use super::erc20::ensure_allowance;
use super::framework::{AdapterError, LegContext, ProtocolAdapter};

/// Arbitrum 上的 Compound v3 USDC 市场（Comet）。
pub const COMET_USDC_ARBITRUM: Address = address!("9c4ec768c28520B50860ea7a15bd7213a9fF58bf");
/// Arbitrum 原生 USDC。
pub const USDC_ARBITRUM: Address = address!("af88d065e77c8cC2239327C5EDb3A432268e5831");

sol! {
    interface IComet {
        function supply(address asset, uint256 amount) external;
    }
}

/// Compound v3 适配器。Comet 自身就是扣款方，授权目标与存入目标同址。
pub struct CompoundAdapter {
    comet: Address,
    asset: Address,
}

impl CompoundAdapter {
    pub fn new() -> Self {
        Self {
            comet: COMET_USDC_ARBITRUM,
            asset: USDC_ARBITRUM,
        }
    }

    #[cfg(test)]
    pub fn with_addresses(comet: Address, asset: Address) -> Self {
        Self { comet, asset }
    }
}

impl Default for CompoundAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtocolAdapter for CompoundAdapter {
    fn venue(&self) -> &'static str {
        "compound-v3"
    }

    async fn supply(&self, ctx: &LegContext<'_>, amount_minor: u64) -> Result<B256, AdapterError> {
        let wallet = ctx.require_wallet(self.venue())?;
        let amount = U256::from(amount_minor);

        ensure_allowance(ctx, self.venue(), self.asset, self.comet, amount).await?;

        let call = IComet::supplyCall {
            asset: self.asset,
            amount,
        };
        let tx = ctx
            .client
            .submit(wallet.signer.as_ref(), self.comet, call.abi_encode().into())
            .await?;

        let receipt = ctx.client.wait_for_receipt(tx).await?;
        if !receipt.success {
            return Err(AdapterError::SupplyReverted {
                venue: self.venue(),
                tx,
            });
        }

        info!(
            target: "protocols::compound",
            comet = %self.comet,
            amount_minor,
            tx = %tx,
            block = receipt.block_number,
            "Compound 存入已确认"
        );
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::Address;

    use super::*;
    use crate::chain::ChainId;
    use crate::chain::testutil::{MockChainClient, test_wallet};

    #[tokio::test]
    async fn reverted_supply_maps_to_descriptive_error() {
        let adapter =
            CompoundAdapter::with_addresses(Address::repeat_byte(0xbb), Address::repeat_byte(0xdd));
        let client = MockChainClient::new(ChainId::ARBITRUM).with_receipt_results(vec![true, false]);
        let wallet = test_wallet();
        let ctx = LegContext {
            wallet: Some(&wallet),
            client: &client,
        };

        let err = adapter.supply(&ctx, 5_000).await.expect_err("revert");
        assert!(matches!(err, AdapterError::SupplyReverted { .. }));
    }
}

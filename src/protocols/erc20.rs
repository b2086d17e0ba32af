use alloy::primitives::{Address, B256, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use tracing::debug;

use super::framework::{AdapterError, LegContext};
use crate::chain::ChainError;

sol! {
    /// ERC-20 授权相关的最小接口面。
    interface IErc20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
    }
}

/// 确保 `spender` 对 `token` 至少持有 `amount` 的授权额度。
///
/// 额度足够时直接返回 `Ok(None)`；否则提交授权交易并阻塞到
/// 回执确认（存入依赖链上最终的 allowance，不允许投机流水线），
/// 返回授权交易哈希。
pub async fn ensure_allowance(
    ctx: &LegContext<'_>,
    venue: &'static str,
    token: Address,
    spender: Address,
    amount: U256,
) -> Result<Option<B256>, AdapterError> {
    let wallet = ctx.require_wallet(venue)?;

    let allowance_call = IErc20::allowanceCall {
        owner: wallet.address,
        spender,
    };
    let raw = ctx
        .client
        .call(token, allowance_call.abi_encode().into())
        .await?;
    let current = IErc20::allowanceCall::abi_decode_returns(&raw)
        .map_err(|err| ChainError::Read(format!("解码 allowance 返回值失败: {err}")))?;

    if current >= amount {
        debug!(
            target: "protocols::erc20",
            venue,
            token = %token,
            spender = %spender,
            "现有授权额度足够，跳过 approve"
        );
        return Ok(None);
    }

    let approve_call = IErc20::approveCall { spender, amount };
    let tx = ctx
        .client
        .submit(
            wallet.signer.as_ref(),
            token,
            approve_call.abi_encode().into(),
        )
        .await?;

    let receipt = ctx.client.wait_for_receipt(tx).await?;
    if !receipt.success {
        return Err(AdapterError::ApprovalReverted { venue, tx });
    }

    debug!(
        target: "protocols::erc20",
        venue,
        token = %token,
        spender = %spender,
        tx = %tx,
        block = receipt.block_number,
        "授权交易已打包"
    );
    Ok(Some(tx))
}

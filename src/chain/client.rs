use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, B256, Bytes};
use async_trait::async_trait;
use thiserror::Error;

use super::ChainId;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("签名者拒绝或不可用: {0}")]
    SignerUnavailable(String),
    #[error("切换链 {chain} 失败: {message}")]
    SwitchChain { chain: ChainId, message: String },
    #[error("链上读取失败: {0}")]
    Read(String),
    #[error("交易提交失败: {0}")]
    Submit(String),
    #[error("等待回执超时或失败: {0}")]
    Receipt(String),
    #[error("交易 {tx} 在链上回滚")]
    Reverted { tx: B256 },
}

/// 已挖出交易的最小回执视图。
#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: u64,
    /// 链上执行是否成功（status == 1）。
    pub success: bool,
}

/// 交易签名者（浏览器钱包或远程签名服务）的最小接口。
///
/// 签名动作本身由 [`ChainClient::submit`] 在内部驱动，这里只暴露
/// 结算编排需要的两件事：当前地址与活跃链的切换。
#[async_trait]
pub trait TxSigner: Send + Sync {
    fn address(&self) -> Address;

    /// 对任意消息做身份签名（链下会话的挑战/应答用）。
    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, ChainError>;

    /// 请求签名者把活跃链切到 `chain`。结算按腿顺序执行，
    /// 切链必须在该腿的签名请求之前完成。
    async fn switch_chain(&self, chain: ChainId) -> Result<(), ChainError>;
}

/// 单条链的读写能力。每条结算链各持有一个实例。
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn chain_id(&self) -> ChainId;

    /// 只读合约调用（eth_call 语义），返回原始返回值字节。
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError>;

    /// 由 `signer` 签名并提交一笔合约调用，返回交易哈希。
    async fn submit(
        &self,
        signer: &dyn TxSigner,
        to: Address,
        data: Bytes,
    ) -> Result<B256, ChainError>;

    /// 阻塞直到交易被打包，返回回执。超时语义由实现方决定。
    async fn wait_for_receipt(&self, tx: B256) -> Result<TxReceipt, ChainError>;
}

/// 钱包身份：地址 + 签名能力，显式传递给每个调用方。
#[derive(Clone)]
pub struct WalletIdentity {
    pub address: Address,
    pub signer: Arc<dyn TxSigner>,
}

impl WalletIdentity {
    pub fn new(signer: Arc<dyn TxSigner>) -> Self {
        Self {
            address: signer.address(),
            signer,
        }
    }
}

impl std::fmt::Debug for WalletIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletIdentity")
            .field("address", &self.address)
            .finish()
    }
}

/// 按链注册的客户端集合。构造一次后只读。
#[derive(Default, Clone)]
pub struct ChainClientRegistry {
    clients: HashMap<u64, Arc<dyn ChainClient>>,
}

impl ChainClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, client: Arc<dyn ChainClient>) {
        self.clients.insert(client.chain_id().as_u64(), client);
    }

    pub fn client_for(&self, chain: ChainId) -> Option<Arc<dyn ChainClient>> {
        self.clients.get(&chain.as_u64()).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }
}

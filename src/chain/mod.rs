pub mod client;
pub mod router;

pub use client::{ChainClient, ChainClientRegistry, ChainError, TxReceipt, TxSigner, WalletIdentity};
pub use router::chain_for;

use std::fmt;

/// EVM 链标识，数值与链上 `chainId` 一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(pub u64);

impl ChainId {
    pub const ETHEREUM: ChainId = ChainId(1);
    pub const BASE: ChainId = ChainId(8453);
    pub const ARBITRUM: ChainId = ChainId(42161);

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ChainId::ETHEREUM => write!(f, "ethereum(1)"),
            ChainId::BASE => write!(f, "base(8453)"),
            ChainId::ARBITRUM => write!(f, "arbitrum(42161)"),
            ChainId(other) => write!(f, "chain({other})"),
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    //! 供适配器与编排器测试共用的链客户端/签名者桩实现。

    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    use alloy::primitives::{Address, B256, Bytes, U256};
    use alloy::sol_types::SolValue;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::client::{ChainClient, ChainError, TxReceipt, TxSigner, WalletIdentity};
    use super::ChainId;

    pub struct MockSigner {
        pub address: Address,
        pub switched: Mutex<Vec<ChainId>>,
        pub signed: Mutex<Vec<Vec<u8>>>,
        pub fail_switch: bool,
        pub fail_sign: bool,
    }

    impl MockSigner {
        pub fn new() -> Self {
            Self {
                address: Address::repeat_byte(0x42),
                switched: Mutex::new(Vec::new()),
                signed: Mutex::new(Vec::new()),
                fail_switch: false,
                fail_sign: false,
            }
        }
    }

    #[async_trait]
    impl TxSigner for MockSigner {
        fn address(&self) -> Address {
            self.address
        }

        async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, ChainError> {
            if self.fail_sign {
                return Err(ChainError::SignerUnavailable("user rejected signature".into()));
            }
            self.signed.lock().push(message.to_vec());
            Ok(vec![0xab; 65])
        }

        async fn switch_chain(&self, chain: ChainId) -> Result<(), ChainError> {
            if self.fail_switch {
                return Err(ChainError::SwitchChain {
                    chain,
                    message: "user rejected".into(),
                });
            }
            self.switched.lock().push(chain);
            Ok(())
        }
    }

    pub fn test_wallet() -> WalletIdentity {
        WalletIdentity::new(Arc::new(MockSigner::new()))
    }

    /// 记录调用顺序的链客户端桩。`ops` 中每个条目形如
    /// `"call:<to>"`、`"submit:<selector>"`、`"wait"`。
    pub struct MockChainClient {
        pub chain: ChainId,
        pub allowance: U256,
        /// 依次弹出的回执结果；为空时默认成功。
        pub receipt_results: Mutex<Vec<bool>>,
        pub ops: Mutex<Vec<String>>,
        next_tx: AtomicU64,
    }

    impl MockChainClient {
        pub fn new(chain: ChainId) -> Self {
            Self {
                chain,
                allowance: U256::ZERO,
                receipt_results: Mutex::new(Vec::new()),
                ops: Mutex::new(Vec::new()),
                next_tx: AtomicU64::new(1),
            }
        }

        pub fn with_allowance(mut self, allowance: U256) -> Self {
            self.allowance = allowance;
            self
        }

        pub fn with_receipt_results(self, results: Vec<bool>) -> Self {
            *self.receipt_results.lock() = results;
            self
        }

        pub fn op_log(&self) -> Vec<String> {
            self.ops.lock().clone()
        }
    }

    #[async_trait]
    impl ChainClient for MockChainClient {
        fn chain_id(&self) -> ChainId {
            self.chain
        }

        async fn call(&self, to: Address, _data: Bytes) -> Result<Bytes, ChainError> {
            self.ops.lock().push(format!("call:{to}"));
            Ok(self.allowance.abi_encode().into())
        }

        async fn submit(
            &self,
            _signer: &dyn TxSigner,
            _to: Address,
            data: Bytes,
        ) -> Result<B256, ChainError> {
            let selector = hex::encode(&data[..4.min(data.len())]);
            self.ops.lock().push(format!("submit:{selector}"));
            let seq = self.next_tx.fetch_add(1, Ordering::Relaxed);
            Ok(B256::with_last_byte(seq as u8))
        }

        async fn wait_for_receipt(&self, tx: B256) -> Result<TxReceipt, ChainError> {
            self.ops.lock().push("wait".to_string());
            let mut results = self.receipt_results.lock();
            let success = if results.is_empty() {
                true
            } else {
                results.remove(0)
            };
            Ok(TxReceipt {
                tx_hash: tx,
                block_number: 1,
                success,
            })
        }
    }
}

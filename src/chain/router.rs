use crate::protocols::ProtocolId;

use super::ChainId;

/// 协议到结算链的纯映射。返回 `None` 表示该协议只做收益估算、
/// 不可上链结算，编排器遇到时直接跳过该实体而不是报错。
pub fn chain_for(protocol: ProtocolId) -> Option<ChainId> {
    match protocol {
        ProtocolId::Aave | ProtocolId::Spark => Some(ChainId::BASE),
        ProtocolId::Compound => Some(ChainId::ARBITRUM),
        ProtocolId::Treasury => Some(ChainId::ETHEREUM),
        ProtocolId::Simulated => None,
    }
}

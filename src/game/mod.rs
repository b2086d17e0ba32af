use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::chain::chain_for;
use crate::config::{EntityConfig, GameConfig};
use crate::protocols::ProtocolId;

/// 玩家拥有的生产单元（农场地块）。
///
/// 链下动作原地修改它；结算编排器只读取快照，从不回写。
/// 不变式：`deposited >= 0`。存入为零或协议不可结算的实体
/// 对结算而言是惰性的。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameEntity {
    pub id: String,
    pub name: String,
    pub protocol: ProtocolId,
    /// 等级，从 1 起。
    pub level: u32,
    /// 年化收益率，基点。
    pub apy_bps: u32,
    /// 美元计价的累计存入额。
    pub deposited: Decimal,
    /// 棋盘坐标，仅用于展示层。
    pub position: (i32, i32),
}

impl GameEntity {
    pub fn from_config(config: &EntityConfig) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            protocol: config.protocol,
            level: config.level.max(1),
            apy_bps: config.apy_bps,
            deposited: config.deposited.max(Decimal::ZERO),
            position: (config.position[0], config.position[1]),
        }
    }

    /// 该实体是否参与链上结算。
    pub fn is_settleable(&self) -> bool {
        self.deposited > Decimal::ZERO && chain_for(self.protocol).is_some()
    }

    /// 链下存入：追加美元金额，非正数直接忽略。
    pub fn deposit(&mut self, amount: Decimal) {
        if amount > Decimal::ZERO {
            self.deposited += amount;
        }
    }

    /// 升级一级，按固定步长抬高年化收益。
    pub fn upgrade(&mut self, apy_step_bps: u32) {
        self.level += 1;
        self.apy_bps += apy_step_bps;
    }

    /// 复投：把一天的应计收益折进本金，保留 6 位小数向下截断。
    pub fn compound(&mut self) {
        let daily =
            self.deposited * Decimal::from(self.apy_bps) / Decimal::from(10_000) / Decimal::from(365);
        self.deposited = (self.deposited + daily)
            .round_dp_with_strategy(6, rust_decimal::RoundingStrategy::ToZero);
    }
}

/// 链下会话里的一次微动作。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameAction {
    pub kind: ActionKind,
    pub entity_id: String,
    /// 仅 `Deposit` 携带金额。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Deposit,
    Upgrade,
    Compound,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Deposit => "deposit",
            ActionKind::Upgrade => "upgrade",
            ActionKind::Compound => "compound",
        };
        f.write_str(name)
    }
}

/// 按静态配置生成开局实体列表。
pub fn catalog_from(config: &GameConfig) -> Vec<GameEntity> {
    config.entities.iter().map(GameEntity::from_config).collect()
}

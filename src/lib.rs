//! demeter —— 链下农场会话与多协议结算引擎。
//!
//! 玩家的微动作（存入/升级/复投）在一个链下会话里批量确认，
//! 结算时一次性关闭会话并把净效果逐腿落到各独立链上协议。
//! UI、钱包签名与链客户端都是外部协作方，经由窄接口注入：
//!
//! - [`session`]：链下会话生命周期与状态快照推送；
//! - [`settlement`]：结算编排，逐腿隔离失败；
//! - [`protocols`]：各场馆的统一存入适配器；
//! - [`chain`]：链标识、客户端/签名者接口与协议路由；
//! - [`bridge`]：跨链转账进度状态机；
//! - [`game`]：棋盘实体数据模型。

pub mod bridge;
pub mod chain;
pub mod config;
pub mod game;
pub mod monitoring;
pub mod protocols;
pub mod session;
pub mod settlement;

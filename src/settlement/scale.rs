use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// 稳定币的最小单位位数（USDC 语义，6 位小数）。
pub const STABLE_DECIMALS: u32 = 6;

/// 把美元计价的十进制金额换算成 6 位小数的最小单位整数。
///
/// 全程精确十进制运算：`floor(amount * 10^6)`。超过 6 位小数的
/// 部分向下截断而不是四舍五入，避免向协议多记存入额。负数与
/// 超出 u64 的金额分别钳到 0 和 `u64::MAX`（前者在资格过滤阶段
/// 就已被排除）。
pub fn usd_to_minor(amount: Decimal) -> u64 {
    let scaled = (amount * Decimal::from(10u64.pow(STABLE_DECIMALS))).floor();
    if scaled.is_sign_negative() {
        return 0;
    }
    scaled.to_u64().unwrap_or(u64::MAX)
}

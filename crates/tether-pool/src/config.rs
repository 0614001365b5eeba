use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_core::TetherError;
use tether_core::config::{from_toml_str, millis};

/// 扩容时一次新增的通道数量。
///
/// TOML 写法：`channels_to_add = { kind = "percentage", percent = 50, minimum = 1 }`。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelsToAdd {
    /// 固定数量。
    Discrete { count: usize },
    /// 当前规模的百分比（向上取整），且不少于 `minimum`。
    Percentage { percent: u32, minimum: usize },
}

impl ChannelsToAdd {
    /// 在当前规模为 `current` 时应新增的通道数（尚未按上限截断）。
    pub fn channels_for(&self, current: usize) -> usize {
        match *self {
            ChannelsToAdd::Discrete { count } => count,
            ChannelsToAdd::Percentage { percent, minimum } => {
                let scaled = (current * percent as usize).div_ceil(100);
                scaled.max(minimum)
            }
        }
    }
}

impl Default for ChannelsToAdd {
    fn default() -> Self {
        ChannelsToAdd::Discrete { count: 1 }
    }
}

/// 通道池的扩缩容策略。
///
/// # 教案式说明
/// - **意图 (Why)**：池的规模由“每条通道平均在途 RPC 数”驱动；上下阈值之间留出滞回区间，
///   冷却时间防止抖动；
/// - **契约 (What)**：
///   - `1 <= minimum_channel_pool_size <= maximum_channel_pool_size`；
///   - `minimum_average_outstanding_rpcs_per_channel < maximum_average_outstanding_rpcs_per_channel`；
///   - 时长字段以毫秒书写；
/// - **默认值**：规模 1..=10，每次新增 1 条，冷却 60 秒，排空轮询 30 秒，平均负载阈值 1 与 25。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSizingPolicy {
    pub minimum_channel_pool_size: usize,
    pub maximum_channel_pool_size: usize,
    pub channels_to_add: ChannelsToAdd,
    #[serde(with = "millis")]
    pub pool_resize_cooldown: Duration,
    #[serde(with = "millis")]
    pub remove_channel_polling_interval: Duration,
    pub minimum_average_outstanding_rpcs_per_channel: usize,
    pub maximum_average_outstanding_rpcs_per_channel: usize,
}

impl Default for PoolSizingPolicy {
    fn default() -> Self {
        Self {
            minimum_channel_pool_size: 1,
            maximum_channel_pool_size: 10,
            channels_to_add: ChannelsToAdd::default(),
            pool_resize_cooldown: Duration::from_secs(60),
            remove_channel_polling_interval: Duration::from_secs(30),
            minimum_average_outstanding_rpcs_per_channel: 1,
            maximum_average_outstanding_rpcs_per_channel: 25,
        }
    }
}

impl PoolSizingPolicy {
    pub fn from_toml_str(text: &str) -> Result<Self, TetherError> {
        let policy: Self = from_toml_str(text)?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), TetherError> {
        if self.minimum_channel_pool_size == 0 {
            return Err(TetherError::invalid_config(
                "minimum_channel_pool_size",
                "must be at least 1",
            ));
        }
        if self.maximum_channel_pool_size < self.minimum_channel_pool_size {
            return Err(TetherError::invalid_config(
                "maximum_channel_pool_size",
                "must be >= minimum_channel_pool_size",
            ));
        }
        if self.minimum_average_outstanding_rpcs_per_channel
            >= self.maximum_average_outstanding_rpcs_per_channel
        {
            return Err(TetherError::invalid_config(
                "maximum_average_outstanding_rpcs_per_channel",
                "must be greater than minimum_average_outstanding_rpcs_per_channel",
            ));
        }
        if self.remove_channel_polling_interval.is_zero() {
            return Err(TetherError::invalid_config(
                "remove_channel_polling_interval",
                "must be greater than zero",
            ));
        }
        match self.channels_to_add {
            ChannelsToAdd::Discrete { count: 0 } => Err(TetherError::invalid_config(
                "channels_to_add",
                "discrete count must be at least 1",
            )),
            ChannelsToAdd::Percentage { percent: 0, .. } => Err(TetherError::invalid_config(
                "channels_to_add",
                "percent must be at least 1",
            )),
            _ => Ok(()),
        }
    }
}

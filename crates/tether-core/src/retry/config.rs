use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{from_toml_str, millis, optional_millis};
use crate::error::TetherError;
use crate::retry::{
    BackoffPolicy, ExponentialBackoffPolicy, LimitedErrorCountRetryPolicy,
    LimitedTimeRetryPolicy, RetryPolicy,
};
use crate::time::Clock;

/// 可恢复流的重试参数。
///
/// # 教案式说明
/// - **意图 (Why)**：让运维通过配置文件调整重连节律，而无需改动代码；
/// - **契约 (What)**：
///   - 时长字段以毫秒书写；缺省字段取 [`RetryConfig::default`]；
///   - 设置 `max_duration` 时使用时间窗口策略，否则使用失败计数策略；
/// - **示例**：
///   ```toml
///   max_failures = 5
///   initial_backoff = 100
///   max_backoff = 30000
///   backoff_multiplier = 2.0
///   jitter = true
///   ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_failures: u32,
    #[serde(with = "optional_millis", skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<Duration>,
    #[serde(with = "millis")]
    pub initial_backoff: Duration,
    #[serde(with = "millis")]
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            max_duration: None,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// 解析并校验 TOML 文本。
    pub fn from_toml_str(text: &str) -> Result<Self, TetherError> {
        let config: Self = from_toml_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 校验参数之间的约束。
    pub fn validate(&self) -> Result<(), TetherError> {
        if self.initial_backoff.is_zero() {
            return Err(TetherError::invalid_config(
                "initial_backoff",
                "must be greater than zero",
            ));
        }
        if self.max_backoff < self.initial_backoff {
            return Err(TetherError::invalid_config(
                "max_backoff",
                "must be >= initial_backoff",
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(TetherError::invalid_config(
                "backoff_multiplier",
                format!("must be a finite value >= 1.0, got {}", self.backoff_multiplier),
            ));
        }
        if let Some(window) = self.max_duration {
            if window.is_zero() {
                return Err(TetherError::invalid_config(
                    "max_duration",
                    "must be greater than zero when set",
                ));
            }
        }
        Ok(())
    }

    /// 构造重试策略原型。
    pub fn retry_policy(&self, clock: Arc<dyn Clock>) -> Box<dyn RetryPolicy> {
        match self.max_duration {
            Some(window) => Box::new(LimitedTimeRetryPolicy::new(window, clock)),
            None => Box::new(LimitedErrorCountRetryPolicy::new(self.max_failures)),
        }
    }

    /// 构造退避策略原型。
    pub fn backoff_policy(&self) -> Box<dyn BackoffPolicy> {
        if self.jitter {
            Box::new(ExponentialBackoffPolicy::new(
                self.initial_backoff,
                self.max_backoff,
                self.backoff_multiplier,
            ))
        } else {
            Box::new(ExponentialBackoffPolicy::without_jitter(
                self.initial_backoff,
                self.max_backoff,
                self.backoff_multiplier,
            ))
        }
    }
}

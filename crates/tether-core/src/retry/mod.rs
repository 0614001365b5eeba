//! 重试与退避策略。
//!
//! # 模块定位（Why）
//! - 可恢复流的重连循环只依赖两个问题的答案：“这次失败还值得再试吗？”与“下一次等多久？”；
//!   前者由 [`RetryPolicy`] 回答，后者由 [`BackoffPolicy`] 回答；
//! - 策略以原型形式传入，每个重连循环开始时 `clone_box` 一份，循环内的计数与退避节律
//!   不会跨循环累积。
//!
//! # 子模块
//! - `policy`：失败计数与时间窗口两种重试策略；
//! - `backoff`：带上限与可选抖动的指数退避；
//! - `config`：从 TOML 装载上述策略的参数。

mod backoff;
mod config;
mod policy;

use std::time::Duration;

use crate::status::Status;

pub use backoff::ExponentialBackoffPolicy;
pub use config::RetryConfig;
pub use policy::{LimitedErrorCountRetryPolicy, LimitedTimeRetryPolicy};

/// 重试判定契约。
///
/// # 契约说明（What）
/// - `on_failure`：记录一次失败，返回 `false` 表示该错误不可重试（永久失败）；
/// - `is_exhausted`：重试预算是否已经耗尽；
/// - `clone_box`：返回一份处于初始状态的独立副本。
///
/// # 使用方式（How）
/// 重连循环在每次失败后按 `!on_failure(status) || is_exhausted()` 判定是否放弃。
pub trait RetryPolicy: Send + Sync {
    fn on_failure(&mut self, status: &Status) -> bool;

    fn is_exhausted(&self) -> bool;

    fn clone_box(&self) -> Box<dyn RetryPolicy>;
}

/// 退避时长契约。
///
/// `on_completion` 每调用一次代表一次失败尝试结束，返回下一次尝试前应等待的时长。
pub trait BackoffPolicy: Send + Sync {
    fn on_completion(&mut self) -> Duration;

    fn clone_box(&self) -> Box<dyn BackoffPolicy>;
}

impl Clone for Box<dyn RetryPolicy> {
    fn clone(&self) -> Self {
        self.as_ref().clone_box()
    }
}

impl Clone for Box<dyn BackoffPolicy> {
    fn clone(&self) -> Self {
        self.as_ref().clone_box()
    }
}

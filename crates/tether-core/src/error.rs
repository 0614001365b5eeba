//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 运行期的 RPC 结果统一使用 [`Status`] 表达；本模块只覆盖“对象还没跑起来”之前的失败：
//!   配置校验、配置解析、运行时缺失与通道池初始建连；
//! - 与 `Status` 分离，避免调用方把构造期错误误当成可重试的传输故障。
//!
//! ## 设计要求（What）
//! - 所有变体派生 `thiserror::Error`，可直接交给 `anyhow` 等上层框架；
//! - `InvalidConfig` 携带字段名，便于从配置文件定位到具体键。

use thiserror::Error;

use crate::status::Status;

/// 构造期错误域。
#[derive(Debug, Error)]
pub enum TetherError {
    /// 配置项取值非法。
    ///
    /// - **契约 (What)**：`field` 为配置键名，`reason` 描述违反的约束；
    /// - **风险 (Trade-offs)**：仅报告首个违规字段，修复后可能暴露下一个。
    #[error("invalid configuration `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// TOML 文本无法解析为目标配置结构。
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// 调用点不在任何异步运行时上下文中。
    #[error("async runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// 通道池初始建连失败。
    #[error("channel creation failed: {0}")]
    ChannelCreation(Status),
}

impl TetherError {
    /// 便捷构造 [`TetherError::InvalidConfig`]。
    pub fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        TetherError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

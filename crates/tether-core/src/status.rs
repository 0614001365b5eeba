//! RPC 结果状态模型。
//!
//! # 模块定位（Why）
//! - 可恢复流、组合体与通道池都需要一个可克隆、可比较的“终态”来表达会话结束原因；
//! - 状态码沿用 gRPC 的规范码集合，调用方可直接与底层传输返回的码值对应，无需再做映射。
//!
//! # 契约（What）
//! - [`Status::ok`] 是唯一表示成功的值；其余构造函数都要求携带人类可读的 `message`；
//! - [`Status::is_transient`] 给出默认的“可重试”分类，供 [`crate::retry`] 中的策略复用。

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// gRPC 规范状态码。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl StatusCode {
    /// 返回稳定的大写蛇形名称，便于日志与告警规则按字面匹配。
    pub const fn as_str(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Cancelled => "CANCELLED",
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::AlreadyExists => "ALREADY_EXISTS",
            StatusCode::PermissionDenied => "PERMISSION_DENIED",
            StatusCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            StatusCode::FailedPrecondition => "FAILED_PRECONDITION",
            StatusCode::Aborted => "ABORTED",
            StatusCode::OutOfRange => "OUT_OF_RANGE",
            StatusCode::Unimplemented => "UNIMPLEMENTED",
            StatusCode::Internal => "INTERNAL",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::DataLoss => "DATA_LOSS",
            StatusCode::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次 RPC、一次流会话或一个生命周期对象的最终结果。
///
/// # 设计背景（Why）
/// - 组合体需要“首个失败者胜出”的语义，要求状态可以低成本克隆并按值比较；
/// - `message` 使用 `Cow<'static, str>`，常量消息零分配，动态消息按需分配。
///
/// # 契约说明（What）
/// - `code == Ok` 时 `message` 通常为空；
/// - 实现 [`std::error::Error`]，因此可以直接作为 `Result` 的错误分支向上传播。
#[derive(Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("{code}: {message}")]
pub struct Status {
    code: StatusCode,
    message: Cow<'static, str>,
}

impl Status {
    /// 构造任意状态码的结果。
    pub fn new(code: StatusCode, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// 成功结果。
    pub const fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            message: Cow::Borrowed(""),
        }
    }

    pub fn cancelled(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::Cancelled, message)
    }

    pub fn unknown(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::Unknown, message)
    }

    pub fn invalid_argument(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::InvalidArgument, message)
    }

    pub fn deadline_exceeded(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::DeadlineExceeded, message)
    }

    pub fn failed_precondition(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::FailedPrecondition, message)
    }

    pub fn aborted(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::Aborted, message)
    }

    pub fn internal(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::Internal, message)
    }

    pub fn unavailable(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::Unavailable, message)
    }

    pub fn permission_denied(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::PermissionDenied, message)
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }

    /// 判断该状态是否属于“换一条连接大概率会恢复”的瞬时故障。
    ///
    /// # 契约（What）
    /// - `Unavailable`、`Aborted`、`DeadlineExceeded`、`ResourceExhausted`、`Internal`、`Unknown`
    ///   视为瞬时；
    /// - 其余（含 `Ok`）均返回 `false`，重试策略应据此判定为永久失败。
    pub fn is_transient(&self) -> bool {
        matches!(
            self.code,
            StatusCode::Unavailable
                | StatusCode::Aborted
                | StatusCode::DeadlineExceeded
                | StatusCode::ResourceExhausted
                | StatusCode::Internal
                | StatusCode::Unknown
        )
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::ok()
    }
}

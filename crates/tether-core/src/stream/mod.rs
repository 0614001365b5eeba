//! 双向流契约与可恢复流状态机。
//!
//! # 模块定位（Why）
//! - 底层传输只提供“一次性”的双向流：断开即报废；
//! - [`ResumableStream`] 在其上叠加重连循环，使调用方看到的是一条“会自愈”的流，
//!   瞬时故障仅表现为一次 `None`/`false`，调用方重新发起即可继续。
//!
//! # 子模块
//! - `handshake`：首包握手初始化器；
//! - `resumable`：`Retrying / Initialized / Shutdown` 三态状态机。

mod handshake;
mod resumable;

use std::sync::Arc;

use async_trait::async_trait;

use crate::future::BoxFuture;
use crate::lifecycle::Lifecycle;
use crate::status::Status;

pub use handshake::{Handshake, passthrough_initializer};
pub use resumable::{ResumableStream, StreamState};

/// 底层一次性双向流。
///
/// # 契约说明（What）
/// - `start`：建立流，返回 `false` 表示失败，此时调用方应立即 `finish` 取回原因；
/// - `read`：读取下一条响应，`None` 表示流已断开或被取消；
/// - `write`：写入一条请求，`false` 表示流已断开；
/// - `cancel`：请求尽快终止，挂起的 `read`/`write` 应随之返回；
/// - `finish`：在所有读写结束后调用一次，返回流的最终状态。
///
/// # 前置条件
/// 同一时刻至多一个 `read` 与一个 `write` 在途，由 [`ResumableStream`] 保证。
#[async_trait]
pub trait RawStream<Req, Resp>: Send + Sync
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async fn start(&self) -> bool;

    async fn read(&self) -> Option<Resp>;

    async fn write(&self, request: Req) -> bool;

    fn cancel(&self);

    async fn finish(&self) -> Status;
}

/// 共享所有权的原始流。
pub type SharedStream<Req, Resp> = Arc<dyn RawStream<Req, Resp>>;

/// 每次重连调用一次，返回一条尚未启动的新流。
pub type StreamFactory<Req, Resp> = Arc<dyn Fn() -> SharedStream<Req, Resp> + Send + Sync>;

/// 对已启动的流做应用层初始化（例如握手）。
///
/// 失败时由初始化器负责对传入的流调用 `finish`。
pub type StreamInitializer<Req, Resp> = Arc<
    dyn Fn(SharedStream<Req, Resp>) -> BoxFuture<'static, Result<SharedStream<Req, Resp>, Status>>
        + Send
        + Sync,
>;

/// 可恢复双向流对外暴露的读写接口。
///
/// # 契约说明（What）
/// - 调用方保证同一时刻至多一个 `read` 与一个 `write` 未完成；
/// - `read` 返回 `None`、`write` 返回 `false` 仅表示“本次未成功”，不代表会话结束；
///   会话结束只通过 [`Lifecycle::start`] 的 Future 报告。
pub trait ResumableStreamingReadWriteRpc<Req, Resp>: Lifecycle {
    fn read(&self) -> BoxFuture<'static, Option<Resp>>;

    fn write(&self, request: Req) -> BoxFuture<'static, bool>;
}

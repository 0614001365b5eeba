#![deny(unsafe_code)]
#![doc = "tether-core: 面向云服务客户端的可恢复双向流 RPC 核心契约。"]
#![doc = ""]
#![doc = "== 模块分层 =="]
#![doc = "1. `status` / `error`：RPC 结果码与构造期错误；"]
#![doc = "2. `time` / `runtime`：可注入的时钟与任务派发接缝，默认提供 Tokio 实现；"]
#![doc = "3. `retry`：重试与退避策略契约及常用实现；"]
#![doc = "4. `lifecycle`：`Lifecycle` 接口与 `ServiceComposite` 组合体；"]
#![doc = "5. `stream`：原始双向流契约与 `ResumableStream` 状态机；"]
#![doc = "6. `test_stubs`：可脚本化的原始流、生命周期依赖与手动执行器。"]

pub mod config;
pub mod error;
pub mod future;
pub mod lifecycle;
pub mod retry;
pub mod runtime;
pub mod status;
pub mod stream;
/// 测试桩命名空间，集中维护可脚本化的原始流、生命周期依赖与手动执行器。
///
/// # 设计背景（Why）
/// - 状态机与组合体的契约测试需要精确控制“何时失败、何时恢复”，若每个测试自行编写桩对象，
///   行为漂移会让性质断言失去意义；
/// - 下游 crate（如 `tether-pool`）同样复用 [`test_stubs::ManualExecutor`] 获得确定性的任务调度。
pub mod test_stubs;
pub mod time;

pub use async_trait::async_trait;
pub use error::TetherError;
pub use future::{BoxFuture, Completion, Latch};
pub use lifecycle::{Lifecycle, ServiceComposite};
pub use retry::{
    BackoffPolicy, ExponentialBackoffPolicy, LimitedErrorCountRetryPolicy,
    LimitedTimeRetryPolicy, RetryConfig, RetryPolicy,
};
#[cfg(feature = "runtime-tokio")]
pub use runtime::TokioRuntime;
pub use runtime::{RuntimeServices, TaskSpawner};
pub use status::{Status, StatusCode};
pub use stream::{
    Handshake, RawStream, ResumableStream, ResumableStreamingReadWriteRpc, SharedStream,
    StreamFactory, StreamInitializer, StreamState,
};
pub use time::{Clock, MockClock, Sleep};

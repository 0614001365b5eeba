//! 可恢复流契约测试。
//!
//! - `resume`：断线后透明重连、排队读写、握手初始化；
//! - `exhaustion`：重试预算耗尽与永久错误；
//! - `shutdown`：关闭幂等、退避中关闭、启动前关闭；
//! - `contract`：调用方契约违规的断言；
//! - `tokio_runtime`：在真实 Tokio 运行时（暂停时钟）上跑通一轮重连。

mod contract;
mod exhaustion;
mod tokio_runtime;

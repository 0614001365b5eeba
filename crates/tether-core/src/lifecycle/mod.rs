//! 生命周期契约与组合体。
//!
//! # 模块定位（Why）
//! - 客户端内部的长寿对象（可恢复流、后台刷新器、子组合体）都暴露同一对 `start`/`shutdown`，
//!   上层可以把它们统一托管；
//! - [`ServiceComposite`] 负责“聚合启动、首个失败者胜出、幂等关闭”。

mod composite;

use crate::future::BoxFuture;
use crate::status::Status;

pub use composite::ServiceComposite;

/// 可启动、可关闭的长寿对象。
///
/// # 契约说明（What）
/// - `start`：至多调用一次；返回的 Future 仅在对象**永久结束**时完成，结果为结束原因；
/// - `shutdown`：可重复调用、可与任何操作并发；返回的 Future 在清理全部完成后就绪；
/// - 两个 Future 都是 `'static`，调用方丢弃它们不会中断对象内部的后台流程。
pub trait Lifecycle: Send + Sync {
    fn start(&self) -> BoxFuture<'static, Status>;

    fn shutdown(&self) -> BoxFuture<'static, ()>;
}

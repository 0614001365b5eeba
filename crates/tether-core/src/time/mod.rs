//! 时间抽象。
//!
//! 生产路径通过 [`crate::runtime::TokioRuntime`] 获得真实时钟；测试路径使用 [`MockClock`]
//! 手动推进虚拟时间，使退避与冷却窗口可以逐步断言。

pub mod clock;

pub use clock::{Clock, MockClock, Sleep};

#![deny(unsafe_code)]

//! `tether-pool` 提供按负载自动扩缩容的通道池。
//!
//! # 模块定位（Why）
//! - 单条连接的并发流数量受服务端限制，高负载时需要横向增加连接，低负载时又应及时回收；
//! - 选择连接时采用“随机两选一”（power of two choices），在不维护全局有序结构的前提下
//!   获得接近最优的负载分布。
//!
//! # 设计概要（How）
//! - `config`：[`PoolSizingPolicy`] 及其 TOML 装载；
//! - `usage`：[`ChannelUsage`] 为每条通道维护在途 RPC 计数、健康状态与生命周期阶段；
//! - `pool`：[`DynamicChannelPool`] 在一把互斥锁下维护活跃/排空列表，创建与销毁在后台任务中完成。
//!
//! # 契约说明（What）
//! - 选择只返回句柄，不改变计数；调用方通过 [`ChannelUsage::acquire`] 取得 [`RpcGuard`]，
//!   守卫释放时计数回落；
//! - 排空中的通道只有在计数归零后才会被移除。

mod config;
mod pool;
mod usage;

pub use config::{ChannelsToAdd, PoolSizingPolicy};
pub use pool::{ChannelFactory, DynamicChannelPool, PoolStats};
pub use usage::{ChannelState, ChannelUsage, RpcGuard};

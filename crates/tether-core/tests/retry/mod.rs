//! 重试配置装载与策略行为测试。

mod config;

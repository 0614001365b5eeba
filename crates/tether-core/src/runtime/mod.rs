//! 运行时接缝：任务派发与时钟的依赖注入集合。
//!
//! # 设计综述（Why）
//! - 可恢复流与通道池都需要“在后台跑一个任务”和“等待一段时间”两项能力；
//!   把它们收敛到 [`RuntimeServices`]，状态机本身就不再绑定具体执行器；
//! - 生产环境使用 [`TokioRuntime`]（`runtime-tokio` 特性，默认开启），
//!   测试环境组合 [`crate::test_stubs::ManualExecutor`] 与 [`crate::time::MockClock`]。
//!
//! # 使用契约（What）
//! - 派发的任务必须满足 `Send + 'static`；派发为“分离”语义，结果通过任务自身的通道回传；
//! - `RuntimeServices` 克隆只增加引用计数。

#[cfg(feature = "runtime-tokio")]
mod tokio_rt;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::future::BoxFuture;
use crate::time::{Clock, Sleep};

#[cfg(feature = "runtime-tokio")]
pub use self::tokio_rt::TokioRuntime;

/// 后台任务派发契约。
///
/// # 契约说明（What）
/// - **前置条件**：实现必须线程安全，可在任意线程上被调用；
/// - **后置条件**：提交的 Future 最终会被轮询至完成，除非运行时本身关闭。
///
/// # 风险提示（Trade-offs）
/// - 对象安全接口只接收装箱 Future，每次派发多一次堆分配；换取的是可在测试中替换为手动执行器。
pub trait TaskSpawner: Send + Sync + 'static {
    /// 以分离方式提交一个异步任务。
    fn spawn_boxed(&self, task: BoxFuture<'static, ()>);
}

/// `RuntimeServices` 汇集状态机运行所需的时钟与任务派发能力。
#[derive(Clone)]
pub struct RuntimeServices {
    clock: Arc<dyn Clock>,
    spawner: Arc<dyn TaskSpawner>,
}

impl RuntimeServices {
    pub fn new(clock: Arc<dyn Clock>, spawner: Arc<dyn TaskSpawner>) -> Self {
        Self { clock, spawner }
    }

    /// 绑定当前 Tokio 运行时。
    ///
    /// # 错误
    /// - 调用点不在 Tokio 运行时上下文内时返回 [`crate::TetherError::RuntimeUnavailable`]。
    #[cfg(feature = "runtime-tokio")]
    pub fn tokio() -> Result<Self, crate::TetherError> {
        let runtime = Arc::new(TokioRuntime::current()?);
        Ok(Self::new(runtime.clone(), runtime))
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn spawner(&self) -> &Arc<dyn TaskSpawner> {
        &self.spawner
    }

    /// 派发一个后台任务。
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawner.spawn_boxed(Box::pin(task));
    }

    pub fn sleep(&self, duration: Duration) -> Sleep {
        self.clock.sleep(duration)
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }
}

impl std::fmt::Debug for RuntimeServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeServices").finish_non_exhaustive()
    }
}

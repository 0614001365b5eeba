use std::time::{Duration, Instant};

use tokio::runtime::Handle;

use crate::error::TetherError;
use crate::future::BoxFuture;
use crate::runtime::TaskSpawner;
use crate::time::{Clock, Sleep};

/// 基于 Tokio 的运行时适配器，同时实现 [`TaskSpawner`] 与 [`Clock`]。
///
/// # 逻辑解析（How）
/// - 持有构造时捕获的 [`Handle`]，之后即便从非运行时线程调用也能派发任务；
/// - `now` 取自 `tokio::time::Instant`，因此在 `start_paused` 测试中随虚拟时间推进；
/// - `sleep` 在 `Handle::enter` 作用域内创建计时器，再装箱返回。
#[derive(Clone, Debug)]
pub struct TokioRuntime {
    handle: Handle,
}

impl TokioRuntime {
    /// 捕获当前线程所在的 Tokio 运行时。
    pub fn current() -> Result<Self, TetherError> {
        let handle =
            Handle::try_current().map_err(|err| TetherError::RuntimeUnavailable(err.to_string()))?;
        Ok(Self { handle })
    }

    pub fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }
}

impl TaskSpawner for TokioRuntime {
    fn spawn_boxed(&self, task: BoxFuture<'static, ()>) {
        drop(self.handle.spawn(task));
    }
}

impl Clock for TokioRuntime {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        let _guard = self.handle.enter();
        Box::pin(tokio::time::sleep(duration))
    }
}

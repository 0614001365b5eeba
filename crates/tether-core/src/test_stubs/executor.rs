use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Context;

use futures::task::{ArcWake, waker};
use parking_lot::Mutex;

use crate::future::BoxFuture;
use crate::runtime::{RuntimeServices, TaskSpawner};
use crate::time::MockClock;

/// 单线程手动执行器：任务只在 [`ManualExecutor::run_until_stalled`] 中被轮询。
///
/// # 教案式说明
/// - **意图 (Why)**：状态机的很多性质取决于“后台任务何时推进”；把推进时机交给测试，
///   就能在任意中间状态停下来断言；
/// - **逻辑 (How)**：每个任务带一个“已唤醒”标志，新任务初始即为已唤醒；
///   `run_until_stalled` 反复轮询已唤醒的任务，直到没有任务再被唤醒；
/// - **契约 (What)**：不得在任务内部调用 `run_until_stalled`。
#[derive(Clone, Default)]
pub struct ManualExecutor {
    tasks: Arc<Mutex<Vec<Arc<Task>>>>,
}

struct Task {
    future: Mutex<Option<BoxFuture<'static, ()>>>,
    woken: AtomicBool,
}

impl ArcWake for Task {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.woken.store(true, Ordering::Release);
    }
}

impl ManualExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以 trait 对象形式返回自身。
    pub fn spawner(&self) -> Arc<dyn TaskSpawner> {
        Arc::new(self.clone())
    }

    /// 组合本执行器与给定虚拟时钟。
    pub fn services(&self, clock: &MockClock) -> RuntimeServices {
        RuntimeServices::new(Arc::new(clock.clone()), self.spawner())
    }

    /// 轮询所有可推进的任务，直到全部挂起或完成。返回本次轮询的次数。
    pub fn run_until_stalled(&self) -> usize {
        let mut polls = 0;
        loop {
            let ready: Vec<Arc<Task>> = self
                .tasks
                .lock()
                .iter()
                .filter(|task| task.woken.swap(false, Ordering::AcqRel))
                .cloned()
                .collect();
            if ready.is_empty() {
                return polls;
            }
            for task in ready {
                let task_waker = waker(Arc::clone(&task));
                let mut cx = Context::from_waker(&task_waker);
                let mut slot = task.future.lock();
                if let Some(future) = slot.as_mut() {
                    polls += 1;
                    if future.as_mut().poll(&mut cx).is_ready() {
                        *slot = None;
                    }
                }
            }
            self.tasks.lock().retain(|task| task.future.lock().is_some());
        }
    }

    /// 尚未完成的任务数量。
    pub fn pending_tasks(&self) -> usize {
        self.tasks
            .lock()
            .iter()
            .filter(|task| task.future.lock().is_some())
            .count()
    }
}

impl TaskSpawner for ManualExecutor {
    fn spawn_boxed(&self, task: BoxFuture<'static, ()>) {
        self.tasks.lock().push(Arc::new(Task {
            future: Mutex::new(Some(task)),
            woken: AtomicBool::new(true),
        }));
    }
}

use std::sync::{Arc, Weak};

use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::Shared;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::future::{BoxFuture, Completion, Latch};
use crate::lifecycle::Lifecycle;
use crate::runtime::TaskSpawner;
use crate::status::Status;

/// 一组生命周期依赖的聚合体。
///
/// # 教案式说明
/// - **意图 (Why)**：上层对象通常由若干子服务拼成，任何一个子服务永久失败都意味着整体失败；
///   同时关闭需要“只做一次、全部等齐”；
/// - **逻辑 (How)**：
///   1. `start` 在簿记锁内逐个启动依赖，并为每个依赖的结束 Future 派发一个观察任务；
///   2. 观察任务发现非 `Ok` 结果即调用 [`ServiceComposite::abort`]，首个调用者写入状态并唤醒
///      组合体的启动 Future；
///   3. `shutdown` 把阶段切换为“已关闭”、以 `Aborted("Shutdown called")` 终止组合体，
///      然后在后台任务中**依次** `await` 每个已启动依赖的 `shutdown`；
/// - **契约 (What)**：
///   - `status()` 在组合体运行期间为 `Ok`，之后冻结为首个非 `Ok` 状态；
///   - 依赖“被启动”当且仅当它“会被关闭”：关闭之后加入的依赖既不启动也不关闭；
///   - 所有 `shutdown` 调用者拿到同一个完成信号；
/// - **风险 (Trade-offs)**：依赖的 `start` 在锁内调用，依赖实现不得在 `start` 中同步回调组合体。
#[derive(Clone)]
pub struct ServiceComposite {
    inner: Arc<CompositeInner>,
}

struct CompositeInner {
    spawner: Arc<dyn TaskSpawner>,
    outcome: Shared<BoxFuture<'static, Status>>,
    state: Mutex<CompositeState>,
}

struct CompositeState {
    phase: Phase,
    pending: Vec<Arc<dyn Lifecycle>>,
    started: Vec<Arc<dyn Lifecycle>>,
    status: Status,
    outcome_sender: Option<oneshot::Sender<Status>>,
    shutdown: Option<Completion>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Created,
    Started,
    ShutDown,
}

impl ServiceComposite {
    pub fn new(dependencies: Vec<Arc<dyn Lifecycle>>, spawner: Arc<dyn TaskSpawner>) -> Self {
        let (sender, receiver) = oneshot::channel();
        let outcome = receiver
            .map(|received| received.unwrap_or_else(|_| Status::aborted("composite dropped")))
            .boxed()
            .shared();
        Self {
            inner: Arc::new(CompositeInner {
                spawner,
                outcome,
                state: Mutex::new(CompositeState {
                    phase: Phase::Created,
                    pending: dependencies,
                    started: Vec::new(),
                    status: Status::ok(),
                    outcome_sender: Some(sender),
                    shutdown: None,
                }),
            }),
        }
    }

    /// 当前聚合状态。
    pub fn status(&self) -> Status {
        self.inner.state.lock().status.clone()
    }

    /// 以给定状态终止组合体；仅首个调用生效。
    ///
    /// 传入 `Ok` 属于调用方错误：调试构建触发断言，发布构建忽略。
    pub fn abort(&self, status: Status) {
        self.inner.abort(status);
    }

    /// 加入一个依赖。
    ///
    /// - 组合体尚未启动：登记，随 `start` 一起启动；
    /// - 已启动且未关闭：立即启动并纳入关闭清单；
    /// - 已关闭：忽略，该依赖既不会被启动也不会被关闭。
    pub fn add_service_object(&self, dependency: Arc<dyn Lifecycle>) {
        let watcher = {
            let mut state = self.inner.state.lock();
            match state.phase {
                Phase::Created => {
                    state.pending.push(dependency);
                    None
                }
                Phase::Started => {
                    let finished = dependency.start();
                    state.started.push(dependency);
                    Some(watch(Arc::downgrade(&self.inner), finished))
                }
                Phase::ShutDown => {
                    debug!("service object added after shutdown; ignoring");
                    None
                }
            }
        };
        if let Some(watcher) = watcher {
            self.inner.spawner.spawn_boxed(watcher);
        }
    }

    /// 已启动的依赖数量。
    pub fn started_len(&self) -> usize {
        self.inner.state.lock().started.len()
    }
}

impl Lifecycle for ServiceComposite {
    fn start(&self) -> BoxFuture<'static, Status> {
        let watchers = {
            let mut state = self.inner.state.lock();
            if state.phase != Phase::Created {
                Vec::new()
            } else {
                state.phase = Phase::Started;
                let pending = std::mem::take(&mut state.pending);
                let mut watchers = Vec::with_capacity(pending.len());
                for dependency in pending {
                    let finished = dependency.start();
                    state.started.push(dependency);
                    watchers.push(watch(Arc::downgrade(&self.inner), finished));
                }
                debug!(dependencies = watchers.len(), "service composite started");
                watchers
            }
        };
        for watcher in watchers {
            self.inner.spawner.spawn_boxed(watcher);
        }
        Box::pin(self.inner.outcome.clone())
    }

    fn shutdown(&self) -> BoxFuture<'static, ()> {
        let (latch, dependencies) = {
            let mut state = self.inner.state.lock();
            if let Some(done) = &state.shutdown {
                return Box::pin(done.clone());
            }
            let latch = Latch::new();
            state.shutdown = Some(latch.completion());
            state.phase = Phase::ShutDown;
            state.pending.clear();
            (latch, std::mem::take(&mut state.started))
        };
        let done = latch.completion();
        self.inner.abort(Status::aborted("Shutdown called"));
        debug!(dependencies = dependencies.len(), "service composite shutting down");
        self.inner.spawner.spawn_boxed(Box::pin(async move {
            for dependency in dependencies {
                dependency.shutdown().await;
            }
            debug!("service composite shutdown complete");
            latch.open();
        }));
        Box::pin(done)
    }
}

impl CompositeInner {
    /// 返回 `true` 表示本次调用写入了最终状态。
    fn abort(&self, status: Status) -> bool {
        debug_assert!(!status.is_ok(), "ServiceComposite::abort requires a non-OK status");
        if status.is_ok() {
            return false;
        }
        let sender = {
            let mut state = self.state.lock();
            if !state.status.is_ok() {
                return false;
            }
            state.status = status.clone();
            state.outcome_sender.take()
        };
        if let Some(sender) = sender {
            let _ = sender.send(status);
        }
        true
    }
}

fn watch(
    composite: Weak<CompositeInner>,
    finished: BoxFuture<'static, Status>,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let status = finished.await;
        if status.is_ok() {
            return;
        }
        if let Some(inner) = composite.upgrade() {
            if inner.abort(status.clone()) {
                warn!(%status, "service composite aborted by dependency");
            }
        }
    })
}

impl std::fmt::Debug for ServiceComposite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ServiceComposite")
            .field("phase", &state.phase)
            .field("status", &state.status)
            .field("started", &state.started.len())
            .finish()
    }
}

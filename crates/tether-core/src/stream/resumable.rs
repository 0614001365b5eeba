use std::sync::{Arc, Weak};

use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::{self, join_all};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::future::{BoxFuture, Completion, Latch, completed};
use crate::lifecycle::Lifecycle;
use crate::retry::{BackoffPolicy, RetryPolicy};
use crate::runtime::RuntimeServices;
use crate::status::Status;
use crate::stream::{
    ResumableStreamingReadWriteRpc, SharedStream, StreamFactory, StreamInitializer,
};

/// 可恢复流的三种状态。
///
/// - `Retrying`：没有可用的原始流，正在（或等待开始）建连；
/// - `Initialized`：恰好持有一条已初始化的原始流；
/// - `Shutdown`：终态，不再建连，读写立即失败。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamState {
    Retrying,
    Initialized,
    Shutdown,
}

/// 在一次性原始流之上提供透明重连的双向流。
///
/// # 教案式说明
/// - **意图 (Why)**：长连接流会因为负载均衡、服务端重启、网络抖动而断开；上层逻辑不应为每次
///   断开重写建连与退避代码；
/// - **逻辑 (How)**：
///   1. 全部状态集中在一把互斥锁保护的 `Slots` 中，完成信号一律在释放锁后触发；
///   2. 每个原始 `read`/`write` 在独立任务中执行，并占用对应的在途槽位；失败时切换到
///      `Retrying` 并派发重连任务；
///   3. 重连任务先等另一个在途操作结束、`finish` 旧流，再循环“工厂建流 → `start` →
///      初始化器”，成功即安装新流并唤醒排队的调用方，失败则按重试/退避策略决定等待或放弃；
///   4. 后台任务只持有 `Weak` 引用，每个阶段重新升级并检查是否已关闭；
/// - **契约 (What)**：
///   - `start` 至多一次，返回的 Future 仅在会话永久结束时完成；
///   - 同一时刻至多一个 `read` 与一个 `write`，违反时记录 `error` 并在调试构建中断言；
///   - 启动后必须在丢弃前调用 `shutdown`；
/// - **风险 (Trade-offs)**：
///   - `Retrying` 期间的读写不会被转发到新流，调用方收到 `None`/`false` 后需自行重发；
///   - 工厂在状态锁内调用，实现不得回调本对象。
pub struct ResumableStream<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    inner: Arc<Inner<Req, Resp>>,
}

struct Inner<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    factory: StreamFactory<Req, Resp>,
    initializer: StreamInitializer<Req, Resp>,
    retry_policy: Box<dyn RetryPolicy>,
    backoff_policy: Box<dyn BackoffPolicy>,
    services: RuntimeServices,
    halted: Completion,
    slots: Mutex<Slots<Req, Resp>>,
}

struct Slots<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    state: StreamState,
    started: bool,
    stream: Option<SharedStream<Req, Resp>>,
    connecting: Option<SharedStream<Req, Resp>>,
    read: Option<Latch>,
    write: Option<Latch>,
    retry: Option<Latch>,
    retry_done: Completion,
    session: Option<oneshot::Sender<Status>>,
    shutdown: Option<Completion>,
    halt: Option<Latch>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    Read,
    Write,
}

impl Op {
    fn name(self) -> &'static str {
        match self {
            Op::Read => "read",
            Op::Write => "write",
        }
    }

    fn other(self) -> Op {
        match self {
            Op::Read => Op::Write,
            Op::Write => Op::Read,
        }
    }
}

impl<Req, Resp> Slots<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn op(&mut self, op: Op) -> &mut Option<Latch> {
        match op {
            Op::Read => &mut self.read,
            Op::Write => &mut self.write,
        }
    }

    fn in_flight(&self) -> Vec<Completion> {
        self.read
            .iter()
            .chain(self.write.iter())
            .map(Latch::completion)
            .collect()
    }
}

enum AttemptOutcome<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    Ready(SharedStream<Req, Resp>),
    Failed(Status),
    Halted,
}

impl<Req, Resp> ResumableStream<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// 构造处于 `Retrying` 状态、尚未启动的可恢复流。
    ///
    /// `retry_policy` 与 `backoff_policy` 作为原型保存，每个重连循环开始时各克隆一份。
    pub fn new(
        factory: StreamFactory<Req, Resp>,
        initializer: StreamInitializer<Req, Resp>,
        retry_policy: Box<dyn RetryPolicy>,
        backoff_policy: Box<dyn BackoffPolicy>,
        services: RuntimeServices,
    ) -> Self {
        let retry = Latch::new();
        let halt = Latch::new();
        let halted = halt.completion();
        Self {
            inner: Arc::new(Inner {
                factory,
                initializer,
                retry_policy,
                backoff_policy,
                services,
                halted,
                slots: Mutex::new(Slots {
                    state: StreamState::Retrying,
                    started: false,
                    stream: None,
                    connecting: None,
                    read: None,
                    write: None,
                    retry_done: retry.completion(),
                    retry: Some(retry),
                    session: None,
                    shutdown: None,
                    halt: Some(halt),
                }),
            }),
        }
    }

    /// 当前状态快照。
    pub fn state(&self) -> StreamState {
        self.inner.slots.lock().state
    }

    fn dispatch<T, F>(&self, op: Op, call: F) -> BoxFuture<'static, Option<T>>
    where
        T: Send + 'static,
        F: FnOnce(SharedStream<Req, Resp>) -> BoxFuture<'static, Option<T>> + Send + 'static,
    {
        let stream = {
            let mut slots = self.inner.slots.lock();
            match slots.state {
                StreamState::Shutdown => return Box::pin(future::ready(None)),
                StreamState::Retrying => {
                    let retry_done = slots.retry_done.clone();
                    return Box::pin(async move {
                        retry_done.await;
                        None
                    });
                }
                StreamState::Initialized => {}
            }
            let busy = slots.op(op).is_some();
            if busy {
                drop(slots);
                error!(
                    operation = op.name(),
                    "resumable stream operation issued while another is outstanding"
                );
                debug_assert!(!busy, "only one outstanding {} is allowed", op.name());
                return Box::pin(future::ready(None));
            }
            let Some(stream) = slots.stream.clone() else {
                return Box::pin(future::ready(None));
            };
            *slots.op(op) = Some(Latch::new());
            stream
        };

        let (sender, receiver) = oneshot::channel();
        let inner = Arc::downgrade(&self.inner);
        self.inner.services.spawn(async move {
            let outcome = call(stream).await;
            let resume = match inner.upgrade() {
                Some(inner) if outcome.is_some() => {
                    inner.complete_op(op);
                    None
                }
                Some(inner) => Some(inner.on_read_write_failure(op)),
                None => None,
            };
            if let Some(resume) = resume {
                resume.await;
            }
            let _ = sender.send(outcome);
        });
        Box::pin(receiver.map(|received| received.ok().flatten()))
    }
}

impl<Req, Resp> Inner<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn complete_op(&self, op: Op) {
        let latch = self.slots.lock().op(op).take();
        if let Some(latch) = latch {
            latch.open();
        }
    }

    /// 原始读写失败：释放槽位；若仍处于 `Initialized` 则切换到 `Retrying` 并派发重连。
    ///
    /// 返回调用方在报告失败前应等待的信号。
    fn on_read_write_failure(self: &Arc<Self>, op: Op) -> Completion {
        let (latch, resume, reconnect) = {
            let mut slots = self.slots.lock();
            let latch = slots.op(op).take();
            match slots.state {
                StreamState::Initialized => {
                    slots.state = StreamState::Retrying;
                    let retry = Latch::new();
                    slots.retry_done = retry.completion();
                    slots.retry = Some(retry);
                    let dead = slots.stream.take();
                    let other = slots.op(op.other()).as_ref().map(Latch::completion);
                    (latch, slots.retry_done.clone(), Some((dead, other)))
                }
                StreamState::Retrying => (latch, slots.retry_done.clone(), None),
                StreamState::Shutdown => (latch, completed(), None),
            }
        };
        if let Some(latch) = latch {
            latch.open();
        }
        if let Some((dead, other)) = reconnect {
            debug!(operation = op.name(), "raw stream failed; reconnecting");
            self.services.spawn(reconnect_loop(
                Arc::downgrade(self),
                dead,
                other.into_iter().collect(),
            ));
        }
        resume
    }

    fn is_shutdown(&self) -> bool {
        self.slots.lock().state == StreamState::Shutdown
    }

    /// 登记一次建连尝试；已关闭时返回 `None`。
    fn begin_attempt(&self) -> Option<SharedStream<Req, Resp>> {
        let mut slots = self.slots.lock();
        if slots.state == StreamState::Shutdown {
            return None;
        }
        let stream = (self.factory)();
        slots.connecting = Some(Arc::clone(&stream));
        Some(stream)
    }

    /// 安装初始化完成的流；若关闭已抢先发生，原样退回该流供调用方清理。
    fn install(
        &self,
        stream: SharedStream<Req, Resp>,
        attempt: u32,
    ) -> Option<SharedStream<Req, Resp>> {
        let retry = {
            let mut slots = self.slots.lock();
            slots.connecting = None;
            if slots.state == StreamState::Shutdown {
                return Some(stream);
            }
            slots.state = StreamState::Initialized;
            slots.stream = Some(stream);
            slots.retry.take()
        };
        info!(attempt, "resumable stream initialized");
        if let Some(retry) = retry {
            retry.open();
        }
        None
    }

    /// 结束重连循环。`failure` 为 `None` 或关闭已抢先发生时，会话以 `Ok` 结束。
    fn end_session(&self, failure: Option<Status>) {
        let (retry, session, status) = {
            let mut slots = self.slots.lock();
            let status = match failure {
                Some(status) if slots.state != StreamState::Shutdown => {
                    slots.state = StreamState::Shutdown;
                    status
                }
                _ => Status::ok(),
            };
            slots.connecting = None;
            (slots.retry.take(), slots.session.take(), status)
        };
        if status.is_ok() {
            debug!("reconnection stopped by shutdown");
        } else {
            warn!(%status, "resumable stream failed permanently");
        }
        if let Some(retry) = retry {
            retry.open();
        }
        if let Some(session) = session {
            let _ = session.send(status);
        }
    }
}

async fn abandon<Req, Resp>(stream: &SharedStream<Req, Resp>)
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    stream.cancel();
    let status = stream.finish().await;
    debug!(%status, "abandoned stream finished");
}

/// 重连循环。
///
/// 1. 取消旧流，等待其上的在途操作结束，再 `finish` 旧流；
/// 2. 克隆策略原型；
/// 3. 循环建连，直至成功安装、策略放弃或发现关闭。
async fn reconnect_loop<Req, Resp>(
    inner: Weak<Inner<Req, Resp>>,
    dead: Option<SharedStream<Req, Resp>>,
    in_flight: Vec<Completion>,
) where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    if let Some(dead) = &dead {
        dead.cancel();
    }
    join_all(in_flight).await;
    if let Some(dead) = dead {
        let status = dead.finish().await;
        debug!(%status, "broken stream finished");
    }

    let Some((mut retry, mut backoff)) = inner
        .upgrade()
        .map(|this| (this.retry_policy.clone_box(), this.backoff_policy.clone_box()))
    else {
        return;
    };

    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        let (stream, initializer) = {
            let Some(this) = inner.upgrade() else { return };
            let Some(stream) = this.begin_attempt() else {
                this.end_session(None);
                return;
            };
            (stream, Arc::clone(&this.initializer))
        };

        let outcome = if stream.start().await {
            if inner.upgrade().is_none_or(|this| this.is_shutdown()) {
                abandon(&stream).await;
                AttemptOutcome::Halted
            } else {
                match initializer(stream).await {
                    Ok(stream) => AttemptOutcome::Ready(stream),
                    Err(status) => AttemptOutcome::Failed(status),
                }
            }
        } else {
            let status = stream.finish().await;
            AttemptOutcome::Failed(if status.is_ok() {
                Status::unavailable("raw stream failed to start")
            } else {
                status
            })
        };

        let Some(this) = inner.upgrade() else { return };
        match outcome {
            AttemptOutcome::Halted => {
                this.end_session(None);
                return;
            }
            AttemptOutcome::Ready(stream) => {
                if let Some(orphan) = this.install(stream, attempt) {
                    drop(this);
                    abandon(&orphan).await;
                    if let Some(this) = inner.upgrade() {
                        this.end_session(None);
                    }
                }
                return;
            }
            AttemptOutcome::Failed(status) => {
                if this.is_shutdown() {
                    this.end_session(None);
                    return;
                }
                if !retry.on_failure(&status) || retry.is_exhausted() {
                    this.end_session(Some(status));
                    return;
                }
                let delay = backoff.on_completion();
                debug!(
                    attempt,
                    %status,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "stream attempt failed; backing off"
                );
                let sleep = this.services.sleep(delay);
                let halted = this.halted.clone();
                drop(this);
                future::select(sleep, halted).await;
            }
        }
    }
}

impl<Req, Resp> Lifecycle for ResumableStream<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn start(&self) -> BoxFuture<'static, Status> {
        let receiver = {
            let mut slots = self.inner.slots.lock();
            let already_started = std::mem::replace(&mut slots.started, true);
            if already_started {
                drop(slots);
                error!("resumable stream started more than once");
                debug_assert!(!already_started, "ResumableStream::start called more than once");
                return Box::pin(future::ready(Status::failed_precondition(
                    "start() called more than once",
                )));
            }
            if slots.state == StreamState::Shutdown {
                return Box::pin(future::ready(Status::ok()));
            }
            let (sender, receiver) = oneshot::channel();
            slots.session = Some(sender);
            receiver
        };
        self.inner
            .services
            .spawn(reconnect_loop(Arc::downgrade(&self.inner), None, Vec::new()));
        Box::pin(receiver.map(|received| {
            received
                .unwrap_or_else(|_| Status::aborted("resumable stream dropped before completion"))
        }))
    }

    fn shutdown(&self) -> BoxFuture<'static, ()> {
        let mut slots = self.inner.slots.lock();
        if let Some(done) = &slots.shutdown {
            return Box::pin(done.clone());
        }
        let halt = slots.halt.take();
        let done = match slots.state {
            StreamState::Shutdown => completed(),
            StreamState::Retrying => {
                slots.state = StreamState::Shutdown;
                let connecting = slots.connecting.take();
                let retry = if slots.started { None } else { slots.retry.take() };
                let done = slots.retry_done.clone();
                slots.shutdown = Some(done.clone());
                drop(slots);
                debug!("resumable stream shutting down while retrying");
                if let Some(connecting) = connecting {
                    connecting.cancel();
                }
                if let Some(retry) = retry {
                    retry.open();
                }
                if let Some(halt) = halt {
                    halt.open();
                }
                return Box::pin(done);
            }
            StreamState::Initialized => {
                slots.state = StreamState::Shutdown;
                let stream = slots.stream.take();
                let in_flight = slots.in_flight();
                let session = slots.session.take();
                let cleanup = Latch::new();
                let done = cleanup.completion();
                slots.shutdown = Some(done.clone());
                drop(slots);
                debug!("resumable stream shutting down");
                if let Some(halt) = halt {
                    halt.open();
                }
                self.inner.services.spawn(async move {
                    if let Some(stream) = stream {
                        stream.cancel();
                        join_all(in_flight).await;
                        let status = stream.finish().await;
                        debug!(%status, "stream finished after shutdown");
                    }
                    if let Some(session) = session {
                        let _ = session.send(Status::ok());
                    }
                    cleanup.open();
                });
                return Box::pin(done);
            }
        };
        slots.shutdown = Some(done.clone());
        drop(slots);
        if let Some(halt) = halt {
            halt.open();
        }
        Box::pin(done)
    }
}

impl<Req, Resp> ResumableStreamingReadWriteRpc<Req, Resp> for ResumableStream<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn read(&self) -> BoxFuture<'static, Option<Resp>> {
        self.dispatch(Op::Read, |stream| Box::pin(async move { stream.read().await }))
    }

    fn write(&self, request: Req) -> BoxFuture<'static, bool> {
        let written = self.dispatch(Op::Write, move |stream| {
            Box::pin(async move { stream.write(request).await.then_some(()) })
        });
        Box::pin(written.map(|outcome| outcome.is_some()))
    }
}

impl<Req, Resp> Drop for ResumableStream<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let (started, state) = {
            let slots = self.inner.slots.lock();
            (slots.started, slots.state)
        };
        let leaked = started && state != StreamState::Shutdown;
        if leaked {
            error!(?state, "resumable stream dropped without shutdown");
        }
        debug_assert!(!leaked, "ResumableStream dropped after start() without shutdown()");
    }
}

impl<Req, Resp> std::fmt::Debug for ResumableStream<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.inner.slots.lock();
        f.debug_struct("ResumableStream")
            .field("state", &slots.state)
            .field("started", &slots.started)
            .field("read_outstanding", &slots.read.is_some())
            .field("write_outstanding", &slots.write.is_some())
            .finish()
    }
}

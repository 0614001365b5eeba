use std::collections::VecDeque;
use std::future::poll_fn;
use std::sync::Arc;
use std::task::{Poll, Waker};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::status::Status;
use crate::stream::{RawStream, SharedStream, StreamFactory};

/// 单次建连尝试的脚本。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attempt {
    start: bool,
    finish: Status,
}

impl Attempt {
    /// `start` 成功，`finish` 返回 `Ok`。
    pub fn healthy() -> Self {
        Self {
            start: true,
            finish: Status::ok(),
        }
    }

    /// `start` 失败，`finish` 返回给定状态。
    pub fn refuse(status: Status) -> Self {
        Self {
            start: false,
            finish: status,
        }
    }

    /// `start` 成功，之后 `finish` 返回给定状态。
    pub fn finishing_with(status: Status) -> Self {
        Self {
            start: true,
            finish: status,
        }
    }
}

impl Default for Attempt {
    fn default() -> Self {
        Self::healthy()
    }
}

/// 按脚本产出 [`ScriptedStream`] 的工厂。
///
/// 每次调用工厂弹出一条 [`Attempt`]，脚本耗尽后一律使用 [`Attempt::healthy`]；
/// 产出的每条流都会被记录，测试可按序号取回并注入响应或制造断线。
pub struct ScriptedStreamFactory<Req, Resp> {
    inner: Arc<FactoryInner<Req, Resp>>,
}

struct FactoryInner<Req, Resp> {
    script: Mutex<VecDeque<Attempt>>,
    created: Mutex<Vec<Arc<ScriptedStream<Req, Resp>>>>,
}

impl<Req, Resp> ScriptedStreamFactory<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    pub fn new() -> Self {
        Self::with_script(Vec::new())
    }

    pub fn with_script(script: impl IntoIterator<Item = Attempt>) -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                script: Mutex::new(script.into_iter().collect()),
                created: Mutex::new(Vec::new()),
            }),
        }
    }

    /// 追加一条尝试脚本。
    pub fn push(&self, attempt: Attempt) {
        self.inner.script.lock().push_back(attempt);
    }

    pub fn factory(&self) -> StreamFactory<Req, Resp> {
        let inner = Arc::clone(&self.inner);
        Arc::new(move || {
            let attempt = inner.script.lock().pop_front().unwrap_or_default();
            let stream = Arc::new(ScriptedStream::new(attempt));
            inner.created.lock().push(Arc::clone(&stream));
            stream as SharedStream<Req, Resp>
        })
    }

    /// 工厂被调用的次数。
    pub fn attempts(&self) -> usize {
        self.inner.created.lock().len()
    }

    /// 第 `index` 次（从 0 开始）产出的流。
    pub fn stream(&self, index: usize) -> Option<Arc<ScriptedStream<Req, Resp>>> {
        self.inner.created.lock().get(index).cloned()
    }

    /// 最近一次产出的流。
    pub fn latest(&self) -> Option<Arc<ScriptedStream<Req, Resp>>> {
        self.inner.created.lock().last().cloned()
    }
}

impl<Req, Resp> Default for ScriptedStreamFactory<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// 可脚本化的原始流。
///
/// # 行为
/// - `read`：有注入的响应即返回，流已断开或已取消返回 `None`，否则挂起；
/// - `write`：断开、取消或被设置为写失败时返回 `false`，否则记录请求并返回 `true`；
/// - `finish`：返回脚本中的状态，并累计调用次数。
pub struct ScriptedStream<Req, Resp> {
    attempt: Attempt,
    core: Mutex<StreamCore<Req, Resp>>,
}

struct StreamCore<Req, Resp> {
    responses: VecDeque<Resp>,
    writes: Vec<Req>,
    broken: bool,
    cancelled: bool,
    fail_writes: bool,
    reader: Option<Waker>,
    start_calls: usize,
    cancel_calls: usize,
    finish_calls: usize,
}

impl<Req, Resp> ScriptedStream<Req, Resp> {
    fn new(attempt: Attempt) -> Self {
        Self {
            attempt,
            core: Mutex::new(StreamCore {
                responses: VecDeque::new(),
                writes: Vec::new(),
                broken: false,
                cancelled: false,
                fail_writes: false,
                reader: None,
                start_calls: 0,
                cancel_calls: 0,
                finish_calls: 0,
            }),
        }
    }

    /// 注入一条响应并唤醒挂起的读。
    pub fn push_response(&self, response: Resp) {
        let reader = {
            let mut core = self.core.lock();
            core.responses.push_back(response);
            core.reader.take()
        };
        if let Some(reader) = reader {
            reader.wake();
        }
    }

    /// 模拟断线：挂起的读返回 `None`，之后的写返回 `false`。
    pub fn break_stream(&self) {
        let reader = {
            let mut core = self.core.lock();
            core.broken = true;
            core.reader.take()
        };
        if let Some(reader) = reader {
            reader.wake();
        }
    }

    /// 让后续写入返回 `false`，读不受影响。
    pub fn fail_writes(&self) {
        self.core.lock().fail_writes = true;
    }

    pub fn start_calls(&self) -> usize {
        self.core.lock().start_calls
    }

    pub fn cancel_calls(&self) -> usize {
        self.core.lock().cancel_calls
    }

    pub fn finish_calls(&self) -> usize {
        self.core.lock().finish_calls
    }

    pub fn is_cancelled(&self) -> bool {
        self.core.lock().cancelled
    }

    /// 已成功写入的请求。
    pub fn writes(&self) -> Vec<Req>
    where
        Req: Clone,
    {
        self.core.lock().writes.clone()
    }
}

#[async_trait]
impl<Req, Resp> RawStream<Req, Resp> for ScriptedStream<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async fn start(&self) -> bool {
        self.core.lock().start_calls += 1;
        self.attempt.start
    }

    async fn read(&self) -> Option<Resp> {
        poll_fn(|cx| {
            let mut core = self.core.lock();
            if let Some(response) = core.responses.pop_front() {
                return Poll::Ready(Some(response));
            }
            if core.broken || core.cancelled {
                return Poll::Ready(None);
            }
            core.reader = Some(cx.waker().clone());
            Poll::Pending
        })
        .await
    }

    async fn write(&self, request: Req) -> bool {
        let mut core = self.core.lock();
        if core.broken || core.cancelled || core.fail_writes {
            return false;
        }
        core.writes.push(request);
        true
    }

    fn cancel(&self) {
        let reader = {
            let mut core = self.core.lock();
            core.cancelled = true;
            core.cancel_calls += 1;
            core.reader.take()
        };
        if let Some(reader) = reader {
            reader.wake();
        }
    }

    async fn finish(&self) -> Status {
        self.core.lock().finish_calls += 1;
        self.attempt.finish.clone()
    }
}

use std::future::Future;
use std::pin::Pin;

use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::Shared;

/// `BoxFuture` 是 `tether-core` 所有对象安全契约使用的 Future 包装。
///
/// # 契约说明（What）
/// - 约束 Future 为 `Send + 'a`，可安全跨线程调度；
/// - 与 `futures::future::BoxFuture` 为同一类型，二者可以自由互换。
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 可被任意多个等待者克隆并 `await` 的一次性完成信号。
///
/// 发送端被丢弃时同样视为完成，等待者永远不会因为发送端提前释放而悬挂。
pub type Completion = Shared<BoxFuture<'static, ()>>;

/// 一次性闩锁：持有者调用 [`Latch::open`] 后，所有 [`Completion`] 同时就绪。
///
/// # 教案式说明
/// - **意图 (Why)**：状态机需要表达“等待某个进行中的操作结束”（在途读写、重连循环或关闭流程），
///   而等待者数量事先未知，因此用共享 Future 做广播；
/// - **逻辑 (How)**：内部是 `oneshot` 通道，接收端映射为 `()` 后装箱并 `shared()`；
/// - **契约 (What)**：`open` 消费闩锁，保证至多触发一次；`Drop` 未开启的闩锁等价于开启。
pub struct Latch {
    sender: oneshot::Sender<()>,
    completion: Completion,
}

impl Latch {
    pub fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        let completion = receiver.map(|_| ()).boxed().shared();
        Self { sender, completion }
    }

    /// 返回一个新的等待句柄。
    pub fn completion(&self) -> Completion {
        self.completion.clone()
    }

    /// 开启闩锁，唤醒全部等待者。
    pub fn open(self) {
        let _ = self.sender.send(());
    }
}

impl std::fmt::Debug for Latch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Latch").finish_non_exhaustive()
    }
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

/// 返回一个已经就绪的 [`Completion`]。
pub fn completed() -> Completion {
    futures::future::ready(()).boxed().shared()
}

use std::sync::Arc;

use futures::FutureExt;
use futures::channel::oneshot;
use parking_lot::Mutex;

use crate::future::{BoxFuture, Latch};
use crate::lifecycle::Lifecycle;
use crate::status::Status;

/// 可控的生命周期依赖。
///
/// - `start` 返回的 Future 在 [`RecordingService::finish`] 或 `shutdown` 之后完成
///   （后者以 `Ok` 结束）；
/// - [`RecordingService::hold_shutdown`] 之后，`shutdown` 的 Future 挂起直到
///   [`RecordingService::release_shutdown`]，用于断言关闭的先后次序。
#[derive(Default)]
pub struct RecordingService {
    state: Mutex<ServiceState>,
}

#[derive(Default)]
struct ServiceState {
    start_calls: usize,
    shutdown_calls: usize,
    finish: Option<oneshot::Sender<Status>>,
    hold: bool,
    gate: Option<Latch>,
}

impl RecordingService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 以给定状态结束 `start` 返回的 Future。
    pub fn finish(&self, status: Status) {
        if let Some(sender) = self.state.lock().finish.take() {
            let _ = sender.send(status);
        }
    }

    pub fn hold_shutdown(&self) {
        self.state.lock().hold = true;
    }

    pub fn release_shutdown(&self) {
        let gate = {
            let mut state = self.state.lock();
            state.hold = false;
            state.gate.take()
        };
        if let Some(gate) = gate {
            gate.open();
        }
    }

    pub fn start_calls(&self) -> usize {
        self.state.lock().start_calls
    }

    pub fn shutdown_calls(&self) -> usize {
        self.state.lock().shutdown_calls
    }
}

impl Lifecycle for RecordingService {
    fn start(&self) -> BoxFuture<'static, Status> {
        let (sender, receiver) = oneshot::channel();
        {
            let mut state = self.state.lock();
            state.start_calls += 1;
            state.finish = Some(sender);
        }
        receiver
            .map(|received| received.unwrap_or_else(|_| Status::cancelled("service dropped")))
            .boxed()
    }

    fn shutdown(&self) -> BoxFuture<'static, ()> {
        let (finish, wait) = {
            let mut state = self.state.lock();
            state.shutdown_calls += 1;
            let wait = if state.hold {
                let gate = Latch::new();
                let wait = gate.completion();
                state.gate = Some(gate);
                Some(wait)
            } else {
                None
            };
            (state.finish.take(), wait)
        };
        if let Some(sender) = finish {
            let _ = sender.send(Status::ok());
        }
        match wait {
            Some(wait) => Box::pin(wait),
            None => Box::pin(futures::future::ready(())),
        }
    }
}

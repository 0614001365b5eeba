use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// 时钟接口返回的统一延迟 Future。
///
/// # 契约说明（What）
/// - Future 完成表示给定时长已经流逝；
/// - 必须满足 `Send + 'static`，以便在重连循环、排空轮询等后台任务中跨线程持有。
pub type Sleep = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// 可注入的时间源：重试退避、通道池冷却与排空轮询都只通过该接口感知时间。
///
/// # 设计背景（Why）
/// - 若直接调用系统时钟，冷却窗口与退避节律在测试中无法复现；
/// - 通过 trait 注入，生产环境使用 Tokio 计时器，测试使用 [`MockClock`] 手动推进。
///
/// # 接口约束（What）
/// - `now` 单调不减；
/// - `sleep` 返回的 Future 完成前至少经过给定时长（以同一时钟的 `now` 衡量）。
pub trait Clock: Send + Sync + 'static {
    /// 返回当前的单调时间点。
    fn now(&self) -> Instant;

    /// 返回一个在指定时长后完成的睡眠 Future。
    fn sleep(&self, duration: Duration) -> Sleep;
}

/// 虚拟时钟：时间只在调用 [`MockClock::advance`] 时前进。
///
/// # 行为概览（How）
/// - 内部记录起点与累计偏移，`now = origin + elapsed`；
/// - 每个 `sleep` 登记一个截止偏移，`advance` 越过截止点时按登记顺序唤醒；
/// - 截止时长为零的睡眠在首次轮询时直接完成。
///
/// # 契约说明（What）
/// - 克隆共享同一条时间线；
/// - 被提前丢弃的睡眠会从等待表中移除，不会在之后被唤醒。
#[derive(Clone, Debug)]
pub struct MockClock {
    timeline: Arc<Mutex<Timeline>>,
}

#[derive(Debug)]
struct Timeline {
    origin: Instant,
    elapsed: Duration,
    next_ticket: u64,
    sleepers: Vec<Sleeper>,
}

#[derive(Debug)]
struct Sleeper {
    ticket: u64,
    deadline: Duration,
    waker: Option<Waker>,
}

impl MockClock {
    pub fn new() -> Self {
        Self::with_origin(Instant::now())
    }

    /// 以指定起点构造虚拟时钟。
    pub fn with_origin(origin: Instant) -> Self {
        Self {
            timeline: Arc::new(Mutex::new(Timeline {
                origin,
                elapsed: Duration::ZERO,
                next_ticket: 0,
                sleepers: Vec::new(),
            })),
        }
    }

    /// 推进虚拟时间并唤醒所有到期的睡眠。
    ///
    /// 唤醒在释放内部锁之后执行，被唤醒的任务可以立即再次调用 `now`/`sleep`。
    pub fn advance(&self, delta: Duration) {
        let due: Vec<Waker> = {
            let mut timeline = self.timeline.lock();
            timeline.elapsed = timeline.elapsed.saturating_add(delta);
            let elapsed = timeline.elapsed;
            let mut due = Vec::new();
            timeline.sleepers.retain_mut(|sleeper| {
                if sleeper.deadline <= elapsed {
                    if let Some(waker) = sleeper.waker.take() {
                        due.push(waker);
                    }
                    false
                } else {
                    true
                }
            });
            due
        };
        for waker in due {
            waker.wake();
        }
    }

    /// 自起点以来累计推进的虚拟时间。
    pub fn elapsed(&self) -> Duration {
        self.timeline.lock().elapsed
    }

    /// 尚未到期的睡眠数量，测试可据此确认后台任务已进入等待。
    pub fn pending_sleepers(&self) -> usize {
        self.timeline.lock().sleepers.len()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        let timeline = self.timeline.lock();
        timeline.origin + timeline.elapsed
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        let (ticket, deadline) = {
            let mut timeline = self.timeline.lock();
            let ticket = timeline.next_ticket;
            timeline.next_ticket += 1;
            let deadline = timeline.elapsed.saturating_add(duration);
            if deadline > timeline.elapsed {
                timeline.sleepers.push(Sleeper {
                    ticket,
                    deadline,
                    waker: None,
                });
            }
            (ticket, deadline)
        };
        Box::pin(MockSleep {
            timeline: Arc::clone(&self.timeline),
            ticket,
            deadline,
            done: false,
        })
    }
}

struct MockSleep {
    timeline: Arc<Mutex<Timeline>>,
    ticket: u64,
    deadline: Duration,
    done: bool,
}

impl Future for MockSleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.done {
            return Poll::Ready(());
        }
        let mut timeline = self.timeline.lock();
        if timeline.elapsed >= self.deadline {
            drop(timeline);
            self.done = true;
            return Poll::Ready(());
        }
        let ticket = self.ticket;
        if let Some(sleeper) = timeline.sleepers.iter_mut().find(|s| s.ticket == ticket) {
            match &sleeper.waker {
                Some(existing) if existing.will_wake(cx.waker()) => {}
                _ => sleeper.waker = Some(cx.waker().clone()),
            }
        }
        Poll::Pending
    }
}

impl Drop for MockSleep {
    fn drop(&mut self) {
        if !self.done {
            let ticket = self.ticket;
            self.timeline.lock().sleepers.retain(|s| s.ticket != ticket);
        }
    }
}

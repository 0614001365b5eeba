use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::retry::RetryPolicy;
use crate::status::Status;
use crate::time::Clock;

/// 按“连续瞬时失败次数”限额的重试策略。
///
/// # 教案式说明
/// - **意图 (Why)**：最常见的重连预算是“最多再试 N 次”，与时间无关，测试中也最易推演；
/// - **契约 (What)**：
///   - 非瞬时错误（见 [`Status::is_transient`]）立即判为不可重试，不计入次数；
///   - 瞬时失败计数超过 `maximum_failures` 后 `is_exhausted` 返回 `true`，
///     即共允许 `maximum_failures + 1` 次连续失败中的前 `maximum_failures` 次被重试；
/// - **风险 (Trade-offs)**：只看次数不看时长，后端长时间不可用时总等待由退避策略决定。
#[derive(Clone, Debug)]
pub struct LimitedErrorCountRetryPolicy {
    maximum_failures: u32,
    failures: u32,
}

impl LimitedErrorCountRetryPolicy {
    pub fn new(maximum_failures: u32) -> Self {
        Self {
            maximum_failures,
            failures: 0,
        }
    }

    pub fn maximum_failures(&self) -> u32 {
        self.maximum_failures
    }
}

impl RetryPolicy for LimitedErrorCountRetryPolicy {
    fn on_failure(&mut self, status: &Status) -> bool {
        if !status.is_transient() {
            return false;
        }
        self.failures = self.failures.saturating_add(1);
        !self.is_exhausted()
    }

    fn is_exhausted(&self) -> bool {
        self.failures > self.maximum_failures
    }

    fn clone_box(&self) -> Box<dyn RetryPolicy> {
        Box::new(Self::new(self.maximum_failures))
    }
}

/// 按“首个失败以来的时间窗口”限额的重试策略。
///
/// 窗口从第一次 `on_failure` 开始计时，时间取自注入的 [`Clock`]；副本不继承计时起点。
#[derive(Clone)]
pub struct LimitedTimeRetryPolicy {
    maximum_duration: Duration,
    clock: Arc<dyn Clock>,
    first_failure: Option<Instant>,
}

impl LimitedTimeRetryPolicy {
    pub fn new(maximum_duration: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            maximum_duration,
            clock,
            first_failure: None,
        }
    }

    pub fn maximum_duration(&self) -> Duration {
        self.maximum_duration
    }
}

impl std::fmt::Debug for LimitedTimeRetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimitedTimeRetryPolicy")
            .field("maximum_duration", &self.maximum_duration)
            .field("first_failure", &self.first_failure)
            .finish()
    }
}

impl RetryPolicy for LimitedTimeRetryPolicy {
    fn on_failure(&mut self, status: &Status) -> bool {
        if !status.is_transient() {
            return false;
        }
        if self.first_failure.is_none() {
            self.first_failure = Some(self.clock.now());
        }
        !self.is_exhausted()
    }

    fn is_exhausted(&self) -> bool {
        match self.first_failure {
            Some(since) => {
                self.clock.now().saturating_duration_since(since) > self.maximum_duration
            }
            None => false,
        }
    }

    fn clone_box(&self) -> Box<dyn RetryPolicy> {
        Box::new(Self::new(self.maximum_duration, Arc::clone(&self.clock)))
    }
}

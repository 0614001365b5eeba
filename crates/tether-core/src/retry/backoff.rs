use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::retry::BackoffPolicy;

/// 指数退避：每次失败后等待时长乘以 `scaling`，并夹紧在 `maximum_delay` 以内。
///
/// # 逻辑解析（How）
/// 1. 记录当前基准 `current`，初值为 `initial_delay`；
/// 2. `on_completion` 以 `current` 为本次等待的上界；开启抖动时在 `[current / 2, current]`
///    中均匀取值，否则直接返回 `current`；
/// 3. 随后 `current = min(current * scaling, maximum_delay)`。
///
/// # 契约说明（What）
/// - `scaling >= 1.0`，`initial_delay <= maximum_delay`（由 [`crate::RetryConfig::validate`] 保证）；
/// - 通过 [`ExponentialBackoffPolicy::with_seed`] 固定随机种子后，副本复用同一种子，
///   抖动序列可在测试中复现。
#[derive(Clone, Debug)]
pub struct ExponentialBackoffPolicy {
    initial_delay: Duration,
    maximum_delay: Duration,
    scaling: f64,
    jitter: bool,
    seed: Option<u64>,
    current: Duration,
    rng: StdRng,
}

impl ExponentialBackoffPolicy {
    /// 构造带抖动的指数退避。
    pub fn new(initial_delay: Duration, maximum_delay: Duration, scaling: f64) -> Self {
        Self::build(initial_delay, maximum_delay, scaling, true, None)
    }

    /// 构造不带抖动的指数退避，等待序列完全确定。
    pub fn without_jitter(initial_delay: Duration, maximum_delay: Duration, scaling: f64) -> Self {
        Self::build(initial_delay, maximum_delay, scaling, false, None)
    }

    /// 固定抖动随机源的种子。
    pub fn with_seed(self, seed: u64) -> Self {
        Self::build(
            self.initial_delay,
            self.maximum_delay,
            self.scaling,
            self.jitter,
            Some(seed),
        )
    }

    fn build(
        initial_delay: Duration,
        maximum_delay: Duration,
        scaling: f64,
        jitter: bool,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            initial_delay,
            maximum_delay,
            scaling: scaling.max(1.0),
            jitter,
            seed,
            current: initial_delay.min(maximum_delay),
            rng,
        }
    }
}

impl BackoffPolicy for ExponentialBackoffPolicy {
    fn on_completion(&mut self) -> Duration {
        let upper = self.current;
        let delay = if self.jitter && !upper.is_zero() {
            let upper_nanos = u64::try_from(upper.as_nanos()).unwrap_or(u64::MAX);
            Duration::from_nanos(self.rng.gen_range(upper_nanos / 2..=upper_nanos))
        } else {
            upper
        };
        let cap_nanos = u64::try_from(self.maximum_delay.as_nanos()).unwrap_or(u64::MAX);
        let scaled = upper.as_nanos() as f64 * self.scaling;
        self.current = if scaled >= cap_nanos as f64 {
            self.maximum_delay
        } else {
            Duration::from_nanos(scaled as u64)
        };
        delay
    }

    fn clone_box(&self) -> Box<dyn BackoffPolicy> {
        Box::new(Self::build(
            self.initial_delay,
            self.maximum_delay,
            self.scaling,
            self.jitter,
            self.seed,
        ))
    }
}

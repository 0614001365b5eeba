use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tether_core::test_stubs::ManualExecutor;
use tether_core::{MockClock, Status};
use tether_pool::{
    ChannelFactory, ChannelUsage, ChannelsToAdd, DynamicChannelPool, PoolSizingPolicy, RpcGuard,
};

pub const COOLDOWN: Duration = Duration::from_secs(1);
pub const POLL: Duration = Duration::from_millis(100);

/// 通道即其编号；工厂记录调用次序并可按编号注入失败。
#[derive(Clone, Default)]
pub struct RecordingFactory {
    calls: Arc<Mutex<Vec<u64>>>,
    failing: Arc<Mutex<HashSet<u64>>>,
}

impl RecordingFactory {
    pub fn fail(&self, id: u64) {
        self.failing.lock().insert(id);
    }

    pub fn calls(&self) -> Vec<u64> {
        self.calls.lock().clone()
    }

    pub fn factory(&self) -> ChannelFactory<u64> {
        let calls = Arc::clone(&self.calls);
        let failing = Arc::clone(&self.failing);
        Arc::new(move |id: u64| {
            calls.lock().push(id);
            let result = if failing.lock().contains(&id) {
                Err(Status::unavailable("connect refused"))
            } else {
                Ok(id)
            };
            futures::future::ready(result).boxed()
        })
    }
}

/// 默认测试策略：冷却 1 秒，排空轮询 100 毫秒，平均负载阈值 1 与 5。
pub fn policy(minimum: usize, maximum: usize) -> PoolSizingPolicy {
    PoolSizingPolicy {
        minimum_channel_pool_size: minimum,
        maximum_channel_pool_size: maximum,
        channels_to_add: ChannelsToAdd::Discrete { count: 1 },
        pool_resize_cooldown: COOLDOWN,
        remove_channel_polling_interval: POLL,
        minimum_average_outstanding_rpcs_per_channel: 1,
        maximum_average_outstanding_rpcs_per_channel: 5,
    }
}

/// 阈值足够宽，任何负载都不会触发扩缩容。
pub fn static_policy(maximum: usize) -> PoolSizingPolicy {
    PoolSizingPolicy {
        minimum_average_outstanding_rpcs_per_channel: 0,
        maximum_average_outstanding_rpcs_per_channel: 1_000,
        ..policy(1, maximum)
    }
}

pub struct Fixture {
    pub executor: ManualExecutor,
    pub clock: MockClock,
    pub factory: RecordingFactory,
    pub pool: DynamicChannelPool<u64>,
}

impl Fixture {
    pub fn new(policy: PoolSizingPolicy, initial: usize) -> Self {
        Self::seeded(policy, initial, 7)
    }

    pub fn seeded(policy: PoolSizingPolicy, initial: usize, seed: u64) -> Self {
        let executor = ManualExecutor::new();
        let clock = MockClock::new();
        let factory = RecordingFactory::default();
        let pool = DynamicChannelPool::new(
            policy,
            (0..initial as u64).collect(),
            factory.factory(),
            executor.services(&clock),
        )
        .expect("valid pool")
        .with_seed(seed);
        Self {
            executor,
            clock,
            factory,
            pool,
        }
    }

    pub fn run(&self) {
        self.executor.run_until_stalled();
    }

    pub fn advance(&self, delta: Duration) {
        self.clock.advance(delta);
        self.run();
    }

    pub fn channel(&self, id: u64) -> Arc<ChannelUsage<u64>> {
        self.pool
            .active_channels()
            .into_iter()
            .find(|usage| usage.id() == id)
            .expect("channel is active")
    }

    /// 每次选择后跑空执行器，让派发的后台工作立即推进到挂起点。
    pub fn select(&self) -> Option<u64> {
        let chosen = self
            .pool
            .get_channel_random_two_least_used()
            .map(|usage| usage.id());
        self.run();
        chosen
    }
}

/// 在通道上登记 `count` 次在途 RPC。
pub fn load(usage: &Arc<ChannelUsage<u64>>, count: usize) -> Vec<RpcGuard<u64>> {
    (0..count).map(|_| usage.acquire()).collect()
}

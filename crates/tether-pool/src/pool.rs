use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use futures::future::join_all;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tether_core::{BoxFuture, RuntimeServices, Status, TetherError};
use tracing::{debug, info, warn};

use crate::config::PoolSizingPolicy;
use crate::usage::{ChannelState, ChannelUsage};

/// 按通道编号异步创建一条新连接。
pub type ChannelFactory<C> =
    Arc<dyn Fn(u64) -> BoxFuture<'static, Result<C, Status>> + Send + Sync>;

/// 通道池的瞬时统计。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub active: usize,
    pub draining: usize,
    pub pending_creations: usize,
    /// 活跃与排空通道上的在途 RPC 总数。
    pub outstanding_rpcs: usize,
}

/// 负载感知、自动扩缩容的通道池。
///
/// # 教案式说明
/// - **意图 (Why)**：把“选哪条连接”与“池该多大”合并到同一入口，调用方只需在每次 RPC 前
///   调用 [`DynamicChannelPool::get_channel_random_two_least_used`]；
/// - **逻辑 (How)**：
///   1. 在池锁内根据冷却时间与平均在途数决定扩容、缩容或不动；
///   2. 同一把锁内用池私有的 `StdRng` 做随机两选一；
///   3. 释放锁后再派发后台工作：建连任务或排空轮询任务；
/// - **契约 (What)**：
///   - 选择本身不修改计数，调用方通过 [`ChannelUsage::acquire`] 登记；
///   - 排空中的通道只在计数为 0 时由轮询任务移除；
///   - 后台任务只持有 `Weak`，池被释放后自然退出；
/// - **风险 (Trade-offs)**：计数快照无锁读取，并发下两选一可能基于过期数值，属可接受的近似。
pub struct DynamicChannelPool<C> {
    inner: Arc<PoolInner<C>>,
}

impl<C> Clone for DynamicChannelPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct PoolInner<C> {
    policy: PoolSizingPolicy,
    factory: ChannelFactory<C>,
    services: RuntimeServices,
    state: Mutex<PoolState<C>>,
}

struct PoolState<C> {
    active: Vec<Arc<ChannelUsage<C>>>,
    draining: Vec<Arc<ChannelUsage<C>>>,
    next_id: u64,
    pending_creations: usize,
    next_resize_at: Option<Instant>,
    drain_poller_running: bool,
    rng: StdRng,
}

/// 锁内做出、锁外执行的后台工作。
enum Deferred {
    Idle,
    Create(Vec<u64>),
    StartDrainPoller,
}

impl<C> DynamicChannelPool<C>
where
    C: Send + Sync + 'static,
{
    /// 以一组已建立的连接构造通道池，编号从 0 开始依次分配。
    pub fn new(
        policy: PoolSizingPolicy,
        channels: Vec<C>,
        factory: ChannelFactory<C>,
        services: RuntimeServices,
    ) -> Result<Self, TetherError> {
        policy.validate()?;
        check_initial_size(&policy, channels.len(), "channels")?;

        let active: Vec<_> = channels
            .into_iter()
            .enumerate()
            .map(|(id, channel)| Arc::new(ChannelUsage::new(id as u64, channel)))
            .collect();
        let next_id = active.len() as u64;
        Ok(Self {
            inner: Arc::new(PoolInner {
                policy,
                factory,
                services,
                state: Mutex::new(PoolState {
                    active,
                    draining: Vec::new(),
                    next_id,
                    pending_creations: 0,
                    next_resize_at: None,
                    drain_poller_running: false,
                    rng: StdRng::from_entropy(),
                }),
            }),
        })
    }

    /// 通过工厂并发创建 `initial_size` 条连接后构造通道池。
    ///
    /// 任意一条创建失败即返回 [`TetherError::ChannelCreation`]，已创建的连接随之释放。
    pub async fn connect(
        policy: PoolSizingPolicy,
        initial_size: usize,
        factory: ChannelFactory<C>,
        services: RuntimeServices,
    ) -> Result<Self, TetherError> {
        policy.validate()?;
        check_initial_size(&policy, initial_size, "initial_size")?;

        let created = join_all((0..initial_size as u64).map(|id| factory(id))).await;
        let channels = created
            .into_iter()
            .collect::<Result<Vec<_>, Status>>()
            .map_err(TetherError::ChannelCreation)?;
        Self::new(policy, channels, factory, services)
    }

    /// 用固定种子替换随机源，使选择序列可复现。
    pub fn with_seed(self, seed: u64) -> Self {
        self.inner.state.lock().rng = StdRng::seed_from_u64(seed);
        self
    }

    /// 随机抽取两条可用通道，返回在途 RPC 较少的一条；无可用通道时返回 `None`。
    ///
    /// 每次调用同时驱动一次扩缩容判定（冷却期内跳过）。
    pub fn get_channel_random_two_least_used(&self) -> Option<Arc<ChannelUsage<C>>> {
        let now = self.inner.services.now();
        let (chosen, deferred) = {
            let mut state = self.inner.state.lock();
            let deferred = self.inner.plan_resize(&mut state, now);
            let PoolState { active, rng, .. } = &mut *state;
            (pick_two_least_used(active, rng), deferred)
        };
        self.inner.dispatch(deferred);
        chosen
    }

    /// 手动把指定通道移入排空列表，不受最小规模约束。
    ///
    /// 通道不在活跃列表中时返回 `false`。
    pub fn drain_channel(&self, id: u64) -> bool {
        let deferred = {
            let mut state = self.inner.state.lock();
            let Some(index) = state.active.iter().position(|usage| usage.id() == id) else {
                return false;
            };
            let usage = state.active.swap_remove(index);
            PoolInner::begin_draining(&mut state, usage)
        };
        self.inner.dispatch(deferred);
        true
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        let outstanding_rpcs = state
            .active
            .iter()
            .chain(state.draining.iter())
            .map(|usage| usage.outstanding())
            .sum();
        PoolStats {
            active: state.active.len(),
            draining: state.draining.len(),
            pending_creations: state.pending_creations,
            outstanding_rpcs,
        }
    }

    /// 活跃通道数量。
    pub fn size(&self) -> usize {
        self.inner.state.lock().active.len()
    }

    pub fn draining_len(&self) -> usize {
        self.inner.state.lock().draining.len()
    }

    /// 活跃通道的快照。
    pub fn active_channels(&self) -> Vec<Arc<ChannelUsage<C>>> {
        self.inner.state.lock().active.clone()
    }

    pub fn policy(&self) -> &PoolSizingPolicy {
        &self.inner.policy
    }
}

impl<C> std::fmt::Debug for DynamicChannelPool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("DynamicChannelPool")
            .field("active", &state.active.len())
            .field("draining", &state.draining.len())
            .field("pending_creations", &state.pending_creations)
            .finish_non_exhaustive()
    }
}

impl<C> PoolInner<C>
where
    C: Send + Sync + 'static,
{
    /// 扩缩容判定，只修改簿记，不做任何 I/O。
    ///
    /// # 逻辑 (How)
    /// - 平均值以整数比较：`total < min * n` 等价于 `total / n < min`，避免浮点误差；
    /// - 健康状态异常的通道不计入平均值，它们的计数不代表真实负载。
    fn plan_resize(&self, state: &mut PoolState<C>, now: Instant) -> Deferred {
        if state.next_resize_at.is_some_and(|at| now < at) {
            return Deferred::Idle;
        }

        let (total, usable) = state
            .active
            .iter()
            .filter(|usage| usage.is_usable())
            .fold((0usize, 0usize), |(total, usable), usage| {
                (total + usage.outstanding(), usable + 1)
            });
        if usable == 0 {
            return Deferred::Idle;
        }
        let mean_outstanding = total as f64 / usable as f64;
        let policy = &self.policy;

        if total < policy.minimum_average_outstanding_rpcs_per_channel.saturating_mul(usable)
            && state.active.len() > policy.minimum_channel_pool_size
        {
            let Some(index) = least_loaded(&state.active) else {
                return Deferred::Idle;
            };
            let usage = state.active.swap_remove(index);
            debug!(
                channel_id = usage.id(),
                mean_outstanding,
                size = state.active.len(),
                "channel pool shrinking"
            );
            state.next_resize_at = Some(now + policy.pool_resize_cooldown);
            return Self::begin_draining(state, usage);
        }

        if total > policy.maximum_average_outstanding_rpcs_per_channel.saturating_mul(usable) {
            let planned = state.active.len() + state.pending_creations;
            let room = policy.maximum_channel_pool_size.saturating_sub(planned);
            if room == 0 {
                return Deferred::Idle;
            }
            let count = policy
                .channels_to_add
                .channels_for(state.active.len())
                .min(room);
            let ids: Vec<u64> = (state.next_id..state.next_id + count as u64).collect();
            state.next_id += count as u64;
            state.pending_creations += count;
            state.next_resize_at = Some(now + policy.pool_resize_cooldown);
            info!(
                count,
                mean_outstanding,
                size = state.active.len(),
                "channel pool growing"
            );
            return Deferred::Create(ids);
        }

        Deferred::Idle
    }

    fn begin_draining(state: &mut PoolState<C>, usage: Arc<ChannelUsage<C>>) -> Deferred {
        usage.set_state(ChannelState::Draining);
        state.draining.push(usage);
        if state.drain_poller_running {
            Deferred::Idle
        } else {
            state.drain_poller_running = true;
            Deferred::StartDrainPoller
        }
    }

    fn dispatch(self: &Arc<Self>, deferred: Deferred) {
        match deferred {
            Deferred::Idle => {}
            Deferred::Create(ids) => self.spawn_creations(ids),
            Deferred::StartDrainPoller => self.spawn_drain_poller(),
        }
    }

    fn spawn_creations(self: &Arc<Self>, ids: Vec<u64>) {
        let pending: Vec<_> = ids
            .into_iter()
            .map(|id| (self.factory)(id).map(move |created| (id, created)))
            .collect();
        let weak = Arc::downgrade(self);
        self.services.spawn(async move {
            let results = join_all(pending).await;
            if let Some(inner) = weak.upgrade() {
                inner.finish_creations(results);
            }
        });
    }

    fn finish_creations(&self, results: Vec<(u64, Result<C, Status>)>) {
        let mut failures = Vec::new();
        let size = {
            let mut state = self.state.lock();
            state.pending_creations = state.pending_creations.saturating_sub(results.len());
            for (id, created) in results {
                match created {
                    Ok(channel) => state.active.push(Arc::new(ChannelUsage::new(id, channel))),
                    Err(status) => failures.push((id, status)),
                }
            }
            state.active.len()
        };
        for (channel_id, status) in failures {
            warn!(channel_id, %status, "channel creation failed");
        }
        debug!(size, "channel creation finished");
    }

    fn spawn_drain_poller(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let interval = self.policy.remove_channel_polling_interval;
        let services = self.services.clone();
        self.services.spawn(async move {
            loop {
                services.sleep(interval).await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if !inner.sweep_draining() {
                    return;
                }
            }
        });
    }

    /// 移除计数归零的排空通道；返回轮询是否需要继续。
    fn sweep_draining(&self) -> bool {
        let (removed, keep_polling) = {
            let mut state = self.state.lock();
            let (idle, busy): (Vec<_>, Vec<_>) = std::mem::take(&mut state.draining)
                .into_iter()
                .partition(|usage| usage.outstanding() == 0);
            state.draining = busy;
            let keep_polling = !state.draining.is_empty();
            state.drain_poller_running = keep_polling;
            (idle, keep_polling)
        };
        for usage in &removed {
            usage.set_state(ChannelState::Removed);
            debug!(channel_id = usage.id(), "drained channel removed");
        }
        drop(removed);
        keep_polling
    }
}

fn check_initial_size(
    policy: &PoolSizingPolicy,
    size: usize,
    field: &'static str,
) -> Result<(), TetherError> {
    if size < policy.minimum_channel_pool_size || size > policy.maximum_channel_pool_size {
        return Err(TetherError::invalid_config(
            field,
            format!(
                "pool size {size} is outside [{}, {}]",
                policy.minimum_channel_pool_size, policy.maximum_channel_pool_size
            ),
        ));
    }
    Ok(())
}

fn least_loaded<C>(entries: &[Arc<ChannelUsage<C>>]) -> Option<usize> {
    entries
        .iter()
        .enumerate()
        .min_by_key(|(_, usage)| (usage.is_usable(), usage.outstanding()))
        .map(|(index, _)| index)
}

/// 随机两选一。
///
/// 快路径直接抽两个不同下标；任一不可用时退化为惰性 Fisher–Yates 无放回抽样，
/// 直到凑齐两条可用通道或遍历完整个列表。
fn pick_two_least_used<C>(
    entries: &[Arc<ChannelUsage<C>>],
    rng: &mut StdRng,
) -> Option<Arc<ChannelUsage<C>>> {
    let len = entries.len();
    if len < 2 {
        return entries.first().filter(|usage| usage.is_usable()).cloned();
    }

    let first = rng.gen_range(0..len);
    let mut second = rng.gen_range(0..len - 1);
    if second >= first {
        second += 1;
    }
    if entries[first].is_usable() && entries[second].is_usable() {
        return Some(lesser(&entries[first], &entries[second]));
    }

    let mut order: Vec<usize> = (0..len).collect();
    let mut picked: Vec<usize> = Vec::with_capacity(2);
    for position in 0..len {
        let swap_with = rng.gen_range(position..len);
        order.swap(position, swap_with);
        let candidate = order[position];
        if entries[candidate].is_usable() {
            picked.push(candidate);
            if picked.len() == 2 {
                break;
            }
        }
    }
    match picked[..] {
        [a, b] => Some(lesser(&entries[a], &entries[b])),
        [only] => Some(Arc::clone(&entries[only])),
        _ => None,
    }
}

fn lesser<C>(a: &Arc<ChannelUsage<C>>, b: &Arc<ChannelUsage<C>>) -> Arc<ChannelUsage<C>> {
    if b.outstanding() < a.outstanding() {
        Arc::clone(b)
    } else {
        Arc::clone(a)
    }
}

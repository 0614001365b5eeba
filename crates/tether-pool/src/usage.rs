use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tether_core::Status;

/// 通道在池中的阶段。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// 参与选择。
    Active,
    /// 不再参与选择，等待在途 RPC 归零。
    Draining,
    /// 已从池中移除。
    Removed,
}

impl ChannelState {
    const fn to_u8(self) -> u8 {
        match self {
            ChannelState::Active => 0,
            ChannelState::Draining => 1,
            ChannelState::Removed => 2,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ChannelState::Active,
            1 => ChannelState::Draining,
            _ => ChannelState::Removed,
        }
    }
}

/// 通道句柄及其使用统计。
///
/// # 契约说明（What）
/// - `outstanding` 为“尽力而为”的并发计数，读取时不加锁，选择算法容忍其瞬时不一致；
/// - 健康状态非 `Ok` 的通道不参与选择与平均负载计算；
/// - 计数只能通过 [`RpcGuard`] 增减，保证每次增加都有且仅有一次对应的减少。
pub struct ChannelUsage<C> {
    id: u64,
    channel: C,
    outstanding: AtomicUsize,
    health: Mutex<Status>,
    state: AtomicU8,
}

impl<C> ChannelUsage<C> {
    pub(crate) fn new(id: u64, channel: C) -> Self {
        Self {
            id,
            channel,
            outstanding: AtomicUsize::new(0),
            health: Mutex::new(Status::ok()),
            state: AtomicU8::new(ChannelState::Active.to_u8()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// 登记一次在途 RPC。
    pub fn acquire(self: &Arc<Self>) -> RpcGuard<C> {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        RpcGuard {
            usage: Arc::clone(self),
        }
    }

    /// 当前在途 RPC 数的快照。
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// 健康时返回在途 RPC 数，否则返回记录的健康状态。
    pub fn outstanding_rpcs(&self) -> Result<usize, Status> {
        let health = self.health.lock();
        if health.is_ok() {
            Ok(self.outstanding())
        } else {
            Err(health.clone())
        }
    }

    /// 标记健康状态；非 `Ok` 的通道被选择算法跳过。
    pub fn set_health(&self, status: Status) {
        *self.health.lock() = status;
    }

    pub fn health(&self) -> Status {
        self.health.lock().clone()
    }

    pub fn is_usable(&self) -> bool {
        self.health.lock().is_ok()
    }

    pub fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ChannelState) {
        self.state.store(state.to_u8(), Ordering::Release);
    }

    fn release_one(&self) {
        let previous = self.outstanding.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "outstanding RPC counter underflow");
    }
}

impl<C> std::fmt::Debug for ChannelUsage<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelUsage")
            .field("id", &self.id)
            .field("outstanding", &self.outstanding())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// 一次在途 RPC 的占用凭证；`Drop` 或 [`RpcGuard::release`] 时计数减一。
pub struct RpcGuard<C> {
    usage: Arc<ChannelUsage<C>>,
}

impl<C> RpcGuard<C> {
    pub fn channel(&self) -> &C {
        self.usage.channel()
    }

    pub fn usage(&self) -> &Arc<ChannelUsage<C>> {
        &self.usage
    }

    /// 显式结束本次 RPC。
    pub fn release(self) {
        drop(self);
    }
}

impl<C> Drop for RpcGuard<C> {
    fn drop(&mut self) {
        self.usage.release_one();
    }
}

use tether_pool::ChannelState;

use crate::support::{Fixture, POLL, load, static_policy};

#[test]
fn draining_channel_survives_until_its_last_release() {
    let fixture = Fixture::new(static_policy(4), 2);
    let usage = fixture.channel(0);
    let mut guards = load(&usage, 3);

    assert!(fixture.pool.drain_channel(0));
    fixture.run();
    assert_eq!(usage.state(), ChannelState::Draining);
    assert_eq!(fixture.pool.size(), 1);

    while let Some(guard) = guards.pop() {
        fixture.advance(POLL);
        assert_eq!(usage.state(), ChannelState::Draining);
        assert_eq!(fixture.pool.draining_len(), 1);
        guard.release();
    }

    fixture.advance(POLL);
    assert_eq!(usage.state(), ChannelState::Removed);
    assert_eq!(fixture.pool.draining_len(), 0);
    assert_eq!(fixture.executor.pending_tasks(), 0);
}

#[test]
fn draining_channel_is_never_selected() {
    let fixture = Fixture::new(static_policy(4), 3);
    let _guard = load(&fixture.channel(1), 1);
    assert!(fixture.pool.drain_channel(2));
    for _ in 0..32 {
        assert_ne!(fixture.select(), Some(2));
    }
}

#[test]
fn unknown_channel_cannot_be_drained() {
    let fixture = Fixture::new(static_policy(4), 2);
    assert!(!fixture.pool.drain_channel(42));
    assert!(fixture.pool.drain_channel(1));
    assert!(!fixture.pool.drain_channel(1));
}

#[test]
fn one_poller_serves_every_draining_channel() {
    let fixture = Fixture::new(static_policy(4), 3);
    let busy = load(&fixture.channel(0), 1);
    fixture.pool.drain_channel(0);
    fixture.pool.drain_channel(1);
    fixture.run();
    assert_eq!(fixture.executor.pending_tasks(), 1);

    fixture.advance(POLL);
    assert_eq!(fixture.pool.draining_len(), 1);
    drop(busy);
    fixture.advance(POLL);
    assert_eq!(fixture.pool.draining_len(), 0);
    assert_eq!(fixture.executor.pending_tasks(), 0);
}

#[test]
fn stats_cover_active_and_draining_channels() {
    let fixture = Fixture::new(static_policy(4), 3);
    let _active = load(&fixture.channel(0), 2);
    let _draining = load(&fixture.channel(1), 3);
    fixture.pool.drain_channel(1);

    let stats = fixture.pool.stats();
    assert_eq!(stats.active, 2);
    assert_eq!(stats.draining, 1);
    assert_eq!(stats.pending_creations, 0);
    assert_eq!(stats.outstanding_rpcs, 5);
}

#[test]
fn dropping_the_pool_stops_the_poller() {
    let fixture = Fixture::new(static_policy(4), 2);
    let usage = fixture.channel(0);
    let _guard = usage.acquire();
    fixture.pool.drain_channel(0);
    fixture.run();

    let Fixture {
        executor,
        clock,
        pool,
        ..
    } = fixture;
    drop(pool);
    clock.advance(POLL);
    executor.run_until_stalled();
    assert_eq!(executor.pending_tasks(), 0);
    assert_eq!(usage.state(), ChannelState::Draining);
}

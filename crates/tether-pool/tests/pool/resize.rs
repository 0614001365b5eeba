use tether_pool::{ChannelState, ChannelsToAdd, PoolSizingPolicy};

use crate::support::{COOLDOWN, Fixture, POLL, load, policy};

#[test]
fn overloaded_pool_grows_in_the_background() {
    let fixture = Fixture::new(policy(1, 4), 1);
    let _busy = load(&fixture.channel(0), 6);

    let chosen = fixture.pool.get_channel_random_two_least_used();
    assert_eq!(chosen.map(|usage| usage.id()), Some(0));
    assert_eq!(fixture.pool.stats().pending_creations, 1);
    assert_eq!(fixture.pool.size(), 1);

    fixture.run();
    assert_eq!(fixture.factory.calls(), vec![1]);
    assert_eq!(fixture.pool.size(), 2);
    assert_eq!(fixture.pool.stats().pending_creations, 0);
    assert_eq!(fixture.select(), Some(1));
}

#[test]
fn cooldown_suppresses_back_to_back_resizes() {
    let fixture = Fixture::new(policy(1, 4), 1);
    let _first = load(&fixture.channel(0), 6);
    fixture.select();
    assert_eq!(fixture.pool.size(), 2);

    let _second = load(&fixture.channel(1), 12);
    fixture.select();
    assert_eq!(fixture.factory.calls(), vec![1]);

    fixture.clock.advance(COOLDOWN);
    fixture.select();
    assert_eq!(fixture.factory.calls(), vec![1, 2]);
    assert_eq!(fixture.pool.size(), 3);
}

fn percentage_policy(maximum: usize) -> PoolSizingPolicy {
    PoolSizingPolicy {
        channels_to_add: ChannelsToAdd::Percentage {
            percent: 50,
            minimum: 1,
        },
        ..policy(1, maximum)
    }
}

#[test]
fn percentage_growth_rounds_up() {
    let fixture = Fixture::new(percentage_policy(10), 3);
    let _guards: Vec<_> = (0..3)
        .flat_map(|id| load(&fixture.channel(id), 6))
        .collect();

    fixture.select();
    assert_eq!(fixture.factory.calls(), vec![3, 4]);
    assert_eq!(fixture.pool.size(), 5);
}

#[test]
fn growth_is_capped_by_the_ceiling() {
    let fixture = Fixture::new(percentage_policy(4), 3);
    let _guards: Vec<_> = (0..3)
        .flat_map(|id| load(&fixture.channel(id), 6))
        .collect();

    fixture.select();
    assert_eq!(fixture.factory.calls(), vec![3]);
    assert_eq!(fixture.pool.size(), 4);

    let _more = load(&fixture.channel(3), 6);
    fixture.clock.advance(COOLDOWN);
    fixture.select();
    assert_eq!(fixture.factory.calls(), vec![3]);
    assert_eq!(fixture.pool.stats().pending_creations, 0);
}

#[test]
fn pending_creations_count_toward_the_ceiling() {
    let fixture = Fixture::new(policy(1, 2), 1);
    let _busy = load(&fixture.channel(0), 6);

    fixture.pool.get_channel_random_two_least_used();
    fixture.clock.advance(COOLDOWN);
    fixture.pool.get_channel_random_two_least_used();

    assert_eq!(fixture.factory.calls(), vec![1]);
    assert_eq!(fixture.pool.stats().pending_creations, 1);
    fixture.run();
    assert_eq!(fixture.pool.size(), 2);
}

#[test]
fn failed_creation_releases_its_reservation() {
    let fixture = Fixture::new(policy(1, 3), 1);
    fixture.factory.fail(1);
    let _busy = load(&fixture.channel(0), 6);

    fixture.select();
    assert_eq!(fixture.pool.size(), 1);
    assert_eq!(fixture.pool.stats().pending_creations, 0);

    fixture.clock.advance(COOLDOWN);
    fixture.select();
    assert_eq!(fixture.factory.calls(), vec![1, 2]);
    assert_eq!(fixture.pool.size(), 2);
}

#[test]
fn idle_pool_shrinks_toward_the_floor() {
    let fixture = Fixture::new(policy(2, 4), 3);
    let active = fixture.pool.active_channels();

    fixture.select();
    assert_eq!(fixture.pool.size(), 2);
    assert_eq!(fixture.pool.draining_len(), 1);
    let drained: Vec<_> = active
        .iter()
        .filter(|usage| usage.state() == ChannelState::Draining)
        .collect();
    assert_eq!(drained.len(), 1);

    fixture.advance(POLL);
    assert_eq!(fixture.pool.draining_len(), 0);
    assert_eq!(drained[0].state(), ChannelState::Removed);

    fixture.clock.advance(COOLDOWN);
    fixture.select();
    assert_eq!(fixture.pool.size(), 2);
    assert_eq!(fixture.pool.draining_len(), 0);
}

#[test]
fn shrinking_picks_the_least_loaded_channel() {
    let fixture = Fixture::new(policy(1, 4), 3);
    let _zero = load(&fixture.channel(0), 1);
    let _two = load(&fixture.channel(2), 1);

    fixture.select();
    let remaining: Vec<u64> = fixture
        .pool
        .active_channels()
        .iter()
        .map(|usage| usage.id())
        .collect();
    assert!(!remaining.contains(&1));
    assert_eq!(fixture.pool.draining_len(), 1);
}

#[test]
fn load_between_thresholds_keeps_the_pool_stable() {
    let fixture = Fixture::new(policy(1, 4), 2);
    let _guards: Vec<_> = (0..2)
        .flat_map(|id| load(&fixture.channel(id), 3))
        .collect();
    for _ in 0..8 {
        fixture.select();
        fixture.clock.advance(COOLDOWN);
    }
    assert!(fixture.factory.calls().is_empty());
    assert_eq!(fixture.pool.size(), 2);
    assert_eq!(fixture.pool.draining_len(), 0);
}

use std::collections::HashSet;

use proptest::prelude::*;
use tether_core::Status;

use crate::support::{Fixture, load, static_policy};

#[test]
fn two_channels_always_yield_the_less_loaded() {
    let fixture = Fixture::new(static_policy(4), 2);
    let _busy = load(&fixture.channel(0), 3);
    for _ in 0..64 {
        assert_eq!(fixture.select(), Some(1));
    }
}

#[test]
fn selection_does_not_touch_counters() {
    let fixture = Fixture::new(static_policy(4), 3);
    for _ in 0..16 {
        fixture.select();
    }
    assert_eq!(fixture.pool.stats().outstanding_rpcs, 0);

    let usage = fixture
        .pool
        .get_channel_random_two_least_used()
        .expect("channel available");
    let guard = usage.acquire();
    assert_eq!(fixture.pool.stats().outstanding_rpcs, 1);
    guard.release();
    assert_eq!(fixture.pool.stats().outstanding_rpcs, 0);
}

#[test]
fn single_channel_is_returned_as_is() {
    let fixture = Fixture::new(static_policy(4), 1);
    let _busy = load(&fixture.channel(0), 10);
    assert_eq!(fixture.select(), Some(0));
}

#[test]
fn unhealthy_channels_are_skipped() {
    let fixture = Fixture::new(static_policy(8), 6);
    for id in [0, 1, 2, 4] {
        fixture.channel(id).set_health(Status::unavailable("socket closed"));
    }
    let _busy = load(&fixture.channel(3), 2);

    let seen: HashSet<u64> = (0..64).filter_map(|_| fixture.select()).collect();
    assert_eq!(seen, HashSet::from([5]));
}

#[test]
fn lone_healthy_channel_is_found_by_the_fallback_scan() {
    let fixture = Fixture::new(static_policy(8), 5);
    for id in 0..4 {
        fixture.channel(id).set_health(Status::unavailable("socket closed"));
    }
    for _ in 0..32 {
        assert_eq!(fixture.select(), Some(4));
    }
}

#[test]
fn no_usable_channel_yields_none() {
    let fixture = Fixture::new(static_policy(4), 3);
    for usage in fixture.pool.active_channels() {
        usage.set_health(Status::unavailable("socket closed"));
    }
    assert_eq!(fixture.select(), None);
}

#[test]
fn equal_seeds_replay_the_same_choices() {
    let first = Fixture::seeded(static_policy(16), 12, 99);
    let second = Fixture::seeded(static_policy(16), 12, 99);
    let left: Vec<_> = (0..32).map(|_| first.select()).collect();
    let right: Vec<_> = (0..32).map(|_| second.select()).collect();
    assert_eq!(left, right);
}

proptest! {
    /// 负载两两不同时，全局负载最大的通道永远不会被选中。
    #[test]
    fn most_loaded_channel_is_never_chosen(
        loads in proptest::collection::hash_set(0usize..40, 2..8),
        seed in any::<u64>(),
    ) {
        let loads: Vec<usize> = loads.into_iter().collect();
        let fixture = Fixture::seeded(static_policy(8), loads.len(), seed);
        let _guards: Vec<_> = loads
            .iter()
            .enumerate()
            .flat_map(|(id, &count)| load(&fixture.channel(id as u64), count))
            .collect();
        let busiest = loads
            .iter()
            .enumerate()
            .max_by_key(|(_, count)| **count)
            .map(|(id, _)| id as u64);

        for _ in 0..24 {
            let chosen = fixture.select();
            prop_assert!(chosen.is_some());
            prop_assert_ne!(chosen, busiest);
        }
    }
}

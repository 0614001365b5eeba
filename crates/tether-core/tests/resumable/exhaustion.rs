use std::time::Duration;

use futures::FutureExt;
use tether_core::test_stubs::Attempt;
use tether_core::{Lifecycle, ResumableStreamingReadWriteRpc, Status, StreamState};

use super::support::{Harness, INITIAL_BACKOFF};

/// 失败计数上限为 K 时，恰好进行 K + 1 次尝试后放弃，会话以最后一次失败结束。
#[test]
fn exhausted_retry_policy_ends_the_session() {
    let unavailable = Status::unavailable("backend down");
    let harness = Harness::new(vec![Attempt::refuse(unavailable.clone()); 5], 2);
    let mut session = harness.stream.start();
    harness.run();
    assert_eq!(harness.factory.attempts(), 1);

    harness.advance(INITIAL_BACKOFF);
    assert_eq!(harness.factory.attempts(), 2);
    assert!((&mut session).now_or_never().is_none());

    harness.advance(INITIAL_BACKOFF * 2);
    assert_eq!(harness.factory.attempts(), 3);
    assert_eq!(session.now_or_never(), Some(unavailable));
    assert_eq!(harness.stream.state(), StreamState::Shutdown);
    assert_eq!(harness.clock.pending_sleepers(), 0);

    for index in 0..3 {
        let stream = harness.factory.stream(index).expect("attempted stream");
        assert_eq!(stream.finish_calls(), 1);
    }

    assert_eq!(harness.stream.read().now_or_never(), Some(None));
    assert_eq!(harness.stream.write("late".to_string()).now_or_never(), Some(false));
    assert!(harness.stream.shutdown().now_or_never().is_some());
}

#[test]
fn permanent_error_is_not_retried() {
    let harness = Harness::new(
        vec![Attempt::refuse(Status::permission_denied("no access"))],
        5,
    );
    let session = harness.stream.start();
    harness.run();

    assert_eq!(session.now_or_never(), Some(Status::permission_denied("no access")));
    assert_eq!(harness.factory.attempts(), 1);
    assert_eq!(harness.clock.pending_sleepers(), 0);
}

/// 每个重连循环使用全新的策略副本：一次成功恢复后，失败预算重新计算。
#[test]
fn each_reconnection_loop_gets_fresh_policies() {
    let unavailable = Status::unavailable("flaky");
    let harness = Harness::new(
        vec![
            Attempt::refuse(unavailable.clone()),
            Attempt::healthy(),
            Attempt::refuse(unavailable.clone()),
            Attempt::healthy(),
        ],
        1,
    );
    let mut session = harness.stream.start();
    harness.run();
    harness.advance(INITIAL_BACKOFF);
    assert_eq!(harness.stream.state(), StreamState::Initialized);

    harness.factory.stream(1).expect("second stream").break_stream();
    let read = harness.stream.read();
    harness.run();
    assert_eq!(harness.stream.state(), StreamState::Retrying);

    // 新循环的退避从初始值重新开始。
    harness.advance(INITIAL_BACKOFF);
    assert_eq!(harness.stream.state(), StreamState::Initialized);
    assert_eq!(read.now_or_never(), Some(None));
    assert!((&mut session).now_or_never().is_none());

    let shutdown = harness.stream.shutdown();
    harness.run();
    assert!(shutdown.now_or_never().is_some());
    assert_eq!(session.now_or_never(), Some(Status::ok()));
}

#[test]
fn ok_finish_after_failed_start_is_reported_as_unavailable() {
    let harness = Harness::new(vec![Attempt::refuse(Status::ok())], 0);
    let session = harness.stream.start();
    harness.run();
    let status = session.now_or_never().expect("session ended");
    assert_eq!(status.code(), tether_core::StatusCode::Unavailable);
    assert_eq!(harness.clock.elapsed(), Duration::ZERO);
}

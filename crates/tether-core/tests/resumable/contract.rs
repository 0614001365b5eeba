use futures::FutureExt;
use tether_core::{Lifecycle, ResumableStreamingReadWriteRpc};

use super::support::Harness;

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "only one outstanding read is allowed")]
fn second_outstanding_read_is_a_contract_violation() {
    let harness = Harness::new(Vec::new(), 3);
    let _session = harness.stream.start();
    harness.run();
    let _first = harness.stream.read();
    let _second = harness.stream.read();
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "only one outstanding write is allowed")]
fn second_outstanding_write_is_a_contract_violation() {
    let harness = Harness::new(Vec::new(), 3);
    let _session = harness.stream.start();
    harness.run();
    let _first = harness.stream.write("a".to_string());
    let _second = harness.stream.write("b".to_string());
}

#[cfg(not(debug_assertions))]
#[test]
fn second_outstanding_read_resolves_to_none_in_release() {
    let harness = Harness::new(Vec::new(), 3);
    let _session = harness.stream.start();
    harness.run();
    let first = harness.stream.read();
    assert_eq!(harness.stream.read().now_or_never(), Some(None));
    harness.factory.stream(0).expect("stream").push_response("one".to_string());
    harness.run();
    assert_eq!(first.now_or_never(), Some(Some("one".to_string())));
    let shutdown = harness.stream.shutdown();
    harness.run();
    assert!(shutdown.now_or_never().is_some());
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "start called more than once")]
fn second_start_is_a_contract_violation() {
    let harness = Harness::new(Vec::new(), 3);
    let _first = harness.stream.start();
    let _second = harness.stream.start();
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "dropped after start() without shutdown()")]
fn dropping_a_started_stream_without_shutdown_is_a_contract_violation() {
    let harness = Harness::new(Vec::new(), 3);
    let _session = harness.stream.start();
    harness.run();
    drop(harness);
}

/// 读与写各占一个槽位，二者可以同时在途。
#[test]
fn one_read_and_one_write_may_be_outstanding_together() {
    let harness = Harness::new(Vec::new(), 3);
    let _session = harness.stream.start();
    harness.run();
    let read = harness.stream.read();
    let write = harness.stream.write("w".to_string());
    harness.run();
    assert_eq!(write.now_or_never(), Some(true));
    harness.factory.stream(0).expect("stream").push_response("r".to_string());
    harness.run();
    assert_eq!(read.now_or_never(), Some(Some("r".to_string())));
    let shutdown = harness.stream.shutdown();
    harness.run();
    assert!(shutdown.now_or_never().is_some());
}

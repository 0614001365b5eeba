use std::time::Duration;

use tether_core::stream::passthrough_initializer;
use tether_core::test_stubs::{Attempt, ScriptedStreamFactory};
use tether_core::{
    ExponentialBackoffPolicy, Lifecycle, LimitedErrorCountRetryPolicy, ResumableStream,
    ResumableStreamingReadWriteRpc, RuntimeServices, Status, StreamState, TetherError,
};

async fn wait_for_state(stream: &ResumableStream<String, String>, expected: StreamState) {
    for _ in 0..100 {
        if stream.state() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("stream never reached {expected:?}");
}

#[tokio::test(start_paused = true)]
async fn reconnects_with_tokio_timers() {
    let factory = ScriptedStreamFactory::with_script(vec![
        Attempt::refuse(Status::unavailable("warming up")),
        Attempt::healthy(),
    ]);
    let stream = ResumableStream::new(
        factory.factory(),
        passthrough_initializer(),
        Box::new(LimitedErrorCountRetryPolicy::new(3)),
        Box::new(ExponentialBackoffPolicy::new(
            Duration::from_millis(50),
            Duration::from_secs(1),
            2.0,
        )),
        RuntimeServices::tokio().expect("inside a tokio runtime"),
    );
    let session = stream.start();
    wait_for_state(&stream, StreamState::Initialized).await;
    assert_eq!(factory.attempts(), 2);

    let live = factory.latest().expect("live stream");
    live.push_response("tick".to_string());
    assert_eq!(stream.read().await, Some("tick".to_string()));
    assert!(stream.write("tock".to_string()).await);

    stream.shutdown().await;
    assert_eq!(session.await, Status::ok());
    assert_eq!(live.finish_calls(), 1);
}

#[test]
fn tokio_services_require_a_runtime() {
    let err = RuntimeServices::tokio().expect_err("no runtime on this thread");
    assert!(matches!(err, TetherError::RuntimeUnavailable(_)));
}

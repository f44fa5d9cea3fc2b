//! Integration tests for the load-test client against the mock transport.

#![cfg(feature = "transport-mock")]

use std::time::Duration;

use amqp_bench::client::{Client, ClientState};
use amqp_bench::config::Options;
use amqp_bench::transport::Engine;
use amqp_bench::workload::{ReceiverWorkload, SenderWorkload};

fn mock_options(node: &str, count: u64, requests: u32) -> Options {
    Options {
        engine: Engine::Mock,
        node: node.to_string(),
        count,
        requests,
        op_timeout: Duration::from_millis(200),
        ..Options::default()
    }
}

fn sender_client(options: Options) -> Client<SenderWorkload> {
    let workload = SenderWorkload::new(
        options.node.clone(),
        options.payload_size,
        options.op_timeout,
    );
    Client::new(options, workload)
}

fn receiver_client(options: Options) -> Client<ReceiverWorkload> {
    let workload = ReceiverWorkload::new(options.node.clone(), options.op_timeout);
    Client::new(options, workload)
}

#[tokio::test]
async fn run_records_exactly_count_operations() {
    let mut client = sender_client(mock_options("it-exact-count", 10, 2));
    client.init().await.expect("init");
    client.run().await.expect("run");

    let state = client.run_state();
    assert_eq!(state.successes() + state.failures(), 10);
    assert_eq!(client.status(), "success 10 failure 0");

    client.cleanup().await.expect("cleanup");
    assert_eq!(client.state(), ClientState::Closed);
}

#[tokio::test]
async fn failures_are_counted_and_swallowed() {
    let mut options = mock_options("it-failures", 10, 2);
    options.params.insert("fail_every".into(), "2".into());
    let mut client = sender_client(options);
    client.init().await.expect("init");
    client.run().await.expect("run despite per-op failures");

    let state = client.run_state();
    assert_eq!(state.successes() + state.failures(), 10);
    assert_eq!(state.failures(), 5);
    assert_eq!(client.status(), "success 5 failure 5");
    client.cleanup().await.expect("cleanup");
}

#[tokio::test]
async fn progress_scenario_two_marks() {
    // C=10, P=2, interval=5: marks at attempts 5 and 10 only.
    let mut options = mock_options("it-progress", 10, 2);
    options.progress = 5;
    let mut client = sender_client(options);
    client.init().await.expect("init");
    client.run().await.expect("run");

    let state = client.run_state();
    assert_eq!(state.progress_marks(), 2);
    assert_eq!(state.successes() + state.failures(), 10);
    client.cleanup().await.expect("cleanup");
}

#[tokio::test]
async fn sender_then_receiver_end_to_end() {
    let node = "it-end-to-end";

    let mut sender = sender_client(mock_options(node, 5, 1));
    sender.init().await.expect("sender init");
    sender.run().await.expect("sender run");
    sender.cleanup().await.expect("sender cleanup");
    assert_eq!(sender.status(), "success 5 failure 0");

    let mut receiver = receiver_client(mock_options(node, 5, 1));
    receiver.init().await.expect("receiver init");
    receiver.run().await.expect("receiver run");
    receiver.cleanup().await.expect("receiver cleanup");
    assert_eq!(receiver.status(), "success 5 failure 0");
}

#[tokio::test]
async fn receiver_on_empty_queue_records_timeouts_as_failures() {
    let mut receiver = receiver_client(mock_options("it-empty-queue", 3, 1));
    receiver.init().await.expect("init");
    receiver.run().await.expect("run");
    assert_eq!(receiver.status(), "success 0 failure 3");
    receiver.cleanup().await.expect("cleanup");
}

#[tokio::test]
async fn cleanup_without_init_is_noop() {
    let mut client = sender_client(mock_options("it-no-init", 1, 1));
    client.cleanup().await.expect("cleanup without init");
    assert_eq!(client.state(), ClientState::Closed);
}

#[tokio::test]
async fn run_requires_init() {
    let mut client = sender_client(mock_options("it-run-first", 1, 1));
    assert!(client.run().await.is_err());
}

#[tokio::test]
async fn run_after_cleanup_is_rejected() {
    let mut client = sender_client(mock_options("it-run-after-close", 1, 1));
    client.init().await.expect("init");
    client.cleanup().await.expect("cleanup");
    assert!(client.run().await.is_err());
    assert_eq!(client.state(), ClientState::Closed);
}

#[tokio::test]
async fn init_twice_is_rejected() {
    let mut client = sender_client(mock_options("it-double-init", 1, 1));
    client.init().await.expect("init");
    assert!(client.init().await.is_err());
    client.cleanup().await.expect("cleanup");
}

#[tokio::test]
async fn connect_failure_propagates_from_init() {
    let mut options = mock_options("it-refused", 1, 1);
    options.params.insert("refuse".into(), "1".into());
    let mut client = sender_client(options);
    assert!(client.init().await.is_err());
    // Connection never opened; cleanup must still be a clean no-op.
    client.cleanup().await.expect("cleanup after failed init");
}

#[tokio::test]
async fn cleanup_after_failed_open_still_closes_connection() {
    let node = "it-fail-open";
    let mut options = mock_options(node, 1, 1);
    options.params.insert("fail_open".into(), "1".into());
    let mut client = sender_client(options);

    assert!(client.init().await.is_err());
    // Connect succeeded before the open failed, so the connection must get
    // a real timed close rather than being dropped on the floor.
    client.cleanup().await.expect("cleanup after failed open");
    assert_eq!(amqp_bench::transport::mock::closed_connections(node), 1);
    assert_eq!(client.state(), ClientState::Closed);
}

#[tokio::test]
async fn interrupted_run_stops_loops_before_close() {
    let mut client = sender_client(mock_options("it-interrupt", 0, 2));
    client.init().await.expect("init");

    // Unbounded run: drop the run future mid-flight, as the driver does on
    // Ctrl+C.
    tokio::select! {
        _ = client.run() => unreachable!("unbounded run cannot finish"),
        _ = tokio::time::sleep(Duration::from_millis(50)) => {}
    }
    client.cleanup().await.expect("cleanup");

    // The loops must be gone: counters stay frozen after cleanup.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let frozen = client.run_state().attempts();
    assert!(frozen > 0);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.run_state().attempts(), frozen);
}

#[tokio::test]
async fn many_loops_share_one_attempt_counter() {
    let mut client = sender_client(mock_options("it-many-loops", 100, 8));
    client.init().await.expect("init");
    client.run().await.expect("run");

    let state = client.run_state();
    assert_eq!(state.successes() + state.failures(), 100);
    // Every loop overshoots by at most one refused attempt.
    assert!(state.attempts() >= 100);
    assert!(state.attempts() <= 108);
    client.cleanup().await.expect("cleanup");
}

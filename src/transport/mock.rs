//! Mock transport for unit tests: in-process queues backed by flume.
//!
//! Queues live in a process-global bus so a sender client and a receiver
//! client in the same test can exchange messages. Tests should use unique
//! node names to stay isolated. `params["fail_every"] = N` makes every
//! N-th send fail deterministically; `params["refuse"]` rejects the
//! connect; `params["fail_open"]` makes the session open fail.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::time::timeout;

use super::{Entity, LifecycleEvent, Link, Session, Transport, TransportError};
use crate::config::Options;

type Queue = (flume::Sender<Bytes>, flume::Receiver<Bytes>);

static BUS: OnceLock<Mutex<HashMap<String, Queue>>> = OnceLock::new();
static CLOSED: OnceLock<Mutex<HashMap<String, u64>>> = OnceLock::new();

fn queue(name: &str) -> Queue {
    let bus = BUS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut map = bus.lock().unwrap();
    // Bounded so a runaway sender blocks (and can be cancelled there)
    // instead of ballooning memory, like a real broker applying
    // backpressure.
    map.entry(name.to_string())
        .or_insert_with(|| flume::bounded(1024))
        .clone()
}

/// Number of mock connections for `node` that were closed through
/// `Transport::close` (as opposed to being dropped). Test hook.
pub fn closed_connections(node: &str) -> u64 {
    let closed = CLOSED.get_or_init(|| Mutex::new(HashMap::new()));
    let map = closed.lock().unwrap();
    map.get(node).copied().unwrap_or(0)
}

fn record_close(node: &str) {
    let closed = CLOSED.get_or_init(|| Mutex::new(HashMap::new()));
    let mut map = closed.lock().unwrap();
    *map.entry(node.to_string()).or_insert(0) += 1;
}

pub struct MockTransport {
    node: String,
    fail_every: Option<u64>,
    fail_open: bool,
    events_tx: flume::Sender<LifecycleEvent>,
    events_rx: flume::Receiver<LifecycleEvent>,
}

pub async fn connect(options: &Options) -> Result<Box<dyn Transport>, TransportError> {
    if options.params.get("refuse").is_some() {
        return Err(TransportError::Connect("connection refused".into()));
    }
    let fail_every = options
        .params
        .get("fail_every")
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|n| *n > 0);
    let (events_tx, events_rx) = flume::unbounded();
    let _ = events_tx.try_send(LifecycleEvent::opened(Entity::Connection));
    Ok(Box::new(MockTransport {
        node: options.node.clone(),
        fail_every,
        fail_open: options.params.get("fail_open").is_some(),
        events_tx,
        events_rx,
    }))
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    fn create_session(&self) -> Arc<dyn Session> {
        Arc::new(MockSession {
            fail_every: self.fail_every,
            fail_open: self.fail_open,
            sent: AtomicU64::new(0),
            events: self.events_tx.clone(),
        })
    }

    fn lifecycle(&self) -> flume::Receiver<LifecycleEvent> {
        self.events_rx.clone()
    }

    async fn close(&self, _timeout: Duration) -> Result<(), TransportError> {
        record_close(&self.node);
        let _ = self
            .events_tx
            .try_send(LifecycleEvent::closed(Entity::Connection));
        Ok(())
    }
}

pub struct MockSession {
    fail_every: Option<u64>,
    fail_open: bool,
    sent: AtomicU64,
    events: flume::Sender<LifecycleEvent>,
}

#[async_trait::async_trait]
impl Session for MockSession {
    async fn open(&self, _timeout: Duration) -> Result<(), TransportError> {
        if self.fail_open {
            return Err(TransportError::Open("injected open failure".into()));
        }
        let _ = self.events.try_send(LifecycleEvent::opened(Entity::Session));
        Ok(())
    }

    fn create_sender(self: Arc<Self>, address: &str) -> Box<dyn Link> {
        let (tx, _) = queue(address);
        Box::new(MockSenderLink { session: self, tx })
    }

    fn create_receiver(self: Arc<Self>, address: &str) -> Box<dyn Link> {
        let (_, rx) = queue(address);
        Box::new(MockReceiverLink { session: self, rx })
    }
}

pub struct MockSenderLink {
    session: Arc<MockSession>,
    tx: flume::Sender<Bytes>,
}

#[async_trait::async_trait]
impl Link for MockSenderLink {
    async fn open(&self, _timeout: Duration) -> Result<(), TransportError> {
        let _ = self
            .session
            .events
            .try_send(LifecycleEvent::opened(Entity::Link));
        Ok(())
    }

    async fn send(&self, payload: Bytes) -> Result<(), TransportError> {
        let n = self.session.sent.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(every) = self.session.fail_every {
            if n % every == 0 {
                return Err(TransportError::Publish("injected failure".into()));
            }
        }
        self.tx
            .send_async(payload)
            .await
            .map_err(|_| TransportError::Disconnected)
    }

    async fn close(&self) -> Result<(), TransportError> {
        let _ = self
            .session
            .events
            .try_send(LifecycleEvent::closed(Entity::Link));
        Ok(())
    }
}

pub struct MockReceiverLink {
    session: Arc<MockSession>,
    rx: flume::Receiver<Bytes>,
}

#[async_trait::async_trait]
impl Link for MockReceiverLink {
    async fn open(&self, _timeout: Duration) -> Result<(), TransportError> {
        let _ = self
            .session
            .events
            .try_send(LifecycleEvent::opened(Entity::Link));
        Ok(())
    }

    async fn receive(&self, op_timeout: Duration) -> Result<Bytes, TransportError> {
        match timeout(op_timeout, self.rx.recv_async()).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err(TransportError::Disconnected),
            Err(_) => Err(TransportError::Timeout),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        let _ = self
            .session
            .events
            .try_send(LifecycleEvent::closed(Entity::Link));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn opts(node: &str) -> Options {
        let mut o = Options::default();
        o.engine = crate::transport::Engine::Mock;
        o.node = node.to_string();
        o
    }

    #[tokio::test]
    async fn send_receive_mock_smoke() {
        let options = opts("mock-smoke");
        let transport = connect(&options).await.expect("connect");
        let session = transport.create_session();
        session.open(Duration::from_secs(1)).await.expect("session");

        let sender: Arc<dyn Link> = Arc::from(Arc::clone(&session).create_sender("mock-smoke"));
        let receiver: Arc<dyn Link> = Arc::from(session.create_receiver("mock-smoke"));
        sender.open(Duration::from_secs(1)).await.expect("sender");
        receiver.open(Duration::from_secs(1)).await.expect("receiver");

        sender
            .send(Bytes::from_static(b"hello"))
            .await
            .expect("send");
        let got = receiver.receive(Duration::from_secs(1)).await.expect("recv");
        assert_eq!(got.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn fail_every_injects_deterministically() {
        let mut options = opts("mock-fail");
        options.params.insert("fail_every".into(), "2".into());
        let transport = connect(&options).await.expect("connect");
        let session = transport.create_session();
        let sender: Arc<dyn Link> = Arc::from(session.create_sender("mock-fail"));

        assert!(sender.send(Bytes::new()).await.is_ok());
        assert!(sender.send(Bytes::new()).await.is_err());
        assert!(sender.send(Bytes::new()).await.is_ok());
        assert!(sender.send(Bytes::new()).await.is_err());
    }

    #[tokio::test]
    async fn receive_times_out_on_empty_queue() {
        let options = opts("mock-empty");
        let transport = connect(&options).await.expect("connect");
        let session = transport.create_session();
        let receiver: Arc<dyn Link> = Arc::from(session.create_receiver("mock-empty"));
        let err = receiver
            .receive(Duration::from_millis(20))
            .await
            .expect_err("should time out");
        assert!(matches!(err, TransportError::Timeout));
    }

    #[tokio::test]
    async fn wrong_direction_is_unsupported() {
        let options = opts("mock-dir");
        let transport = connect(&options).await.expect("connect");
        let session = transport.create_session();
        let sender: Arc<dyn Link> = Arc::from(session.create_sender("mock-dir"));
        let err = sender
            .receive(Duration::from_millis(10))
            .await
            .expect_err("sender cannot receive");
        assert!(matches!(err, TransportError::Unsupported(_)));
    }
}

//! AMQP adapter using lapin. Sessions map to channels; links map to a
//! declared queue plus a publisher (confirms enabled) or consumer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, ConfirmSelectOptions,
        QueueDeclareOptions,
    },
    publisher_confirm::Confirmation,
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
};
use tokio::sync::{Mutex, OnceCell};
use tokio::time::timeout;

use super::{Entity, LifecycleEvent, Link, Session, Transport, TransportError};
use crate::config::Options;

static CONSUMER_SEQ: AtomicU64 = AtomicU64::new(0);

pub struct AmqpTransport {
    conn: Arc<Connection>,
    events_tx: flume::Sender<LifecycleEvent>,
    events_rx: flume::Receiver<LifecycleEvent>,
}

pub async fn connect(options: &Options) -> Result<Box<dyn Transport>, TransportError> {
    let url = amqp_url(options);
    let props = ConnectionProperties::default().with_connection_name("amqp-bench".into());
    let conn = timeout(options.open_timeout, Connection::connect(&url, props))
        .await
        .map_err(|_| TransportError::Timeout)?
        .map_err(|e| TransportError::Connect(e.to_string()))?;

    let (events_tx, events_rx) = flume::unbounded();
    let _ = events_tx.try_send(LifecycleEvent::opened(Entity::Connection));
    {
        let tx = events_tx.clone();
        conn.on_error(move |_err| {
            let _ = tx.try_send(LifecycleEvent::closed(Entity::Connection));
        });
    }

    Ok(Box::new(AmqpTransport {
        conn: Arc::new(conn),
        events_tx,
        events_rx,
    }))
}

/// Build the connection URL. Credentials from `Options` replace any
/// userinfo already present in the address.
fn amqp_url(options: &Options) -> String {
    match (&options.username, &options.password) {
        (Some(user), pass) => {
            let rest = options
                .address
                .strip_prefix("amqp://")
                .unwrap_or(&options.address);
            // Drop existing userinfo if the address carries one
            let rest = rest.rsplit_once('@').map(|(_, r)| r).unwrap_or(rest);
            format!(
                "amqp://{}:{}@{}",
                user,
                pass.as_deref().unwrap_or(""),
                rest
            )
        }
        (None, _) => options.address.clone(),
    }
}

#[async_trait::async_trait]
impl Transport for AmqpTransport {
    fn create_session(&self) -> Arc<dyn Session> {
        Arc::new(AmqpSession {
            conn: Arc::clone(&self.conn),
            channel: OnceCell::new(),
            events: self.events_tx.clone(),
        })
    }

    fn lifecycle(&self) -> flume::Receiver<LifecycleEvent> {
        self.events_rx.clone()
    }

    async fn close(&self, close_timeout: Duration) -> Result<(), TransportError> {
        timeout(close_timeout, self.conn.close(200, "client shutdown"))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::Other(e.to_string()))?;
        let _ = self
            .events_tx
            .try_send(LifecycleEvent::closed(Entity::Connection));
        Ok(())
    }
}

pub struct AmqpSession {
    conn: Arc<Connection>,
    channel: OnceCell<Channel>,
    events: flume::Sender<LifecycleEvent>,
}

impl AmqpSession {
    /// Lazily open the channel. Session and link opens may race; the cell
    /// serializes them onto a single channel creation.
    async fn channel(&self) -> Result<&Channel, TransportError> {
        self.channel
            .get_or_try_init(|| async {
                let channel = self
                    .conn
                    .create_channel()
                    .await
                    .map_err(|e| TransportError::Open(e.to_string()))?;
                let _ = self.events.try_send(LifecycleEvent::opened(Entity::Session));
                Ok(channel)
            })
            .await
    }
}

#[async_trait::async_trait]
impl Session for AmqpSession {
    async fn open(&self, open_timeout: Duration) -> Result<(), TransportError> {
        timeout(open_timeout, self.channel())
            .await
            .map_err(|_| TransportError::Timeout)?
            .map(|_| ())
    }

    fn create_sender(self: Arc<Self>, address: &str) -> Box<dyn Link> {
        Box::new(AmqpSenderLink {
            session: self,
            address: address.to_string(),
        })
    }

    fn create_receiver(self: Arc<Self>, address: &str) -> Box<dyn Link> {
        Box::new(AmqpReceiverLink {
            session: self,
            address: address.to_string(),
            consumer: Mutex::new(None),
        })
    }
}

pub struct AmqpSenderLink {
    session: Arc<AmqpSession>,
    address: String,
}

#[async_trait::async_trait]
impl Link for AmqpSenderLink {
    async fn open(&self, open_timeout: Duration) -> Result<(), TransportError> {
        timeout(open_timeout, async {
            let channel = self.session.channel().await?;
            channel
                .confirm_select(ConfirmSelectOptions::default())
                .await
                .map_err(|e| TransportError::Open(e.to_string()))?;
            channel
                .queue_declare(
                    &self.address,
                    QueueDeclareOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| TransportError::Open(e.to_string()))?;
            let _ = self
                .session
                .events
                .try_send(LifecycleEvent::opened(Entity::Link));
            Ok(())
        })
        .await
        .map_err(|_| TransportError::Timeout)?
    }

    async fn send(&self, payload: Bytes) -> Result<(), TransportError> {
        let channel = self.session.channel().await?;
        // Publish to the default exchange; routing key is the queue name.
        let confirm = channel
            .basic_publish(
                "",
                &self.address,
                BasicPublishOptions::default(),
                payload.as_ref(),
                BasicProperties::default(),
            )
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?;
        match confirm {
            Confirmation::Nack(_) => Err(TransportError::Publish("broker nacked message".into())),
            _ => Ok(()),
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

pub struct AmqpReceiverLink {
    session: Arc<AmqpSession>,
    address: String,
    consumer: Mutex<Option<Consumer>>,
}

#[async_trait::async_trait]
impl Link for AmqpReceiverLink {
    async fn open(&self, open_timeout: Duration) -> Result<(), TransportError> {
        timeout(open_timeout, async {
            let channel = self.session.channel().await?;
            channel
                .queue_declare(
                    &self.address,
                    QueueDeclareOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| TransportError::Open(e.to_string()))?;
            let tag = format!(
                "amqp-bench-{}",
                CONSUMER_SEQ.fetch_add(1, Ordering::Relaxed)
            );
            let consumer = channel
                .basic_consume(
                    &self.address,
                    &tag,
                    BasicConsumeOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| TransportError::Open(e.to_string()))?;
            *self.consumer.lock().await = Some(consumer);
            let _ = self
                .session
                .events
                .try_send(LifecycleEvent::opened(Entity::Link));
            Ok(())
        })
        .await
        .map_err(|_| TransportError::Timeout)?
    }

    async fn receive(&self, op_timeout: Duration) -> Result<Bytes, TransportError> {
        let mut guard = self.consumer.lock().await;
        let consumer = guard
            .as_mut()
            .ok_or(TransportError::Receive("link not opened".into()))?;
        match timeout(op_timeout, consumer.next()).await {
            Ok(Some(Ok(delivery))) => {
                delivery
                    .ack(BasicAckOptions::default())
                    .await
                    .map_err(|e| TransportError::Receive(e.to_string()))?;
                Ok(Bytes::from(delivery.data))
            }
            Ok(Some(Err(e))) => Err(TransportError::Receive(e.to_string())),
            Ok(None) => Err(TransportError::Disconnected),
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

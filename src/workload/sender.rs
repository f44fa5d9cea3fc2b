//! Sender workload: one operation = send one sequence-stamped message.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::timeout;

use super::Workload;
use crate::payload::generate_payload;
use crate::transport::{Link, Session, TransportError};

pub struct SenderWorkload {
    node: String,
    payload_size: usize,
    op_timeout: Duration,
    sequence: AtomicU64,
}

impl SenderWorkload {
    pub fn new(node: impl Into<String>, payload_size: usize, op_timeout: Duration) -> Self {
        Self {
            node: node.into(),
            payload_size,
            op_timeout,
            sequence: AtomicU64::new(0),
        }
    }
}

#[async_trait::async_trait]
impl Workload for SenderWorkload {
    fn create_link(&self, session: &Arc<dyn Session>) -> Result<Box<dyn Link>, TransportError> {
        Ok(Arc::clone(session).create_sender(&self.node))
    }

    async fn execute(&self, link: &dyn Link) -> Result<(), TransportError> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let payload = Bytes::from(generate_payload(sequence, self.payload_size));
        timeout(self.op_timeout, link.send(payload))
            .await
            .map_err(|_| TransportError::Timeout)?
    }
}

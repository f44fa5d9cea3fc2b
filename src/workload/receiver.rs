//! Receiver workload: one operation = receive and acknowledge one message.

use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use super::Workload;
use crate::payload::parse_header;
use crate::transport::{Link, Session, TransportError};

pub struct ReceiverWorkload {
    node: String,
    op_timeout: Duration,
}

impl ReceiverWorkload {
    pub fn new(node: impl Into<String>, op_timeout: Duration) -> Self {
        Self {
            node: node.into(),
            op_timeout,
        }
    }
}

#[async_trait::async_trait]
impl Workload for ReceiverWorkload {
    fn create_link(&self, session: &Arc<dyn Session>) -> Result<Box<dyn Link>, TransportError> {
        Ok(Arc::clone(session).create_receiver(&self.node))
    }

    async fn execute(&self, link: &dyn Link) -> Result<(), TransportError> {
        let payload = link.receive(self.op_timeout).await?;
        if let Some(header) = parse_header(&payload) {
            trace!(sequence = header.sequence, bytes = payload.len(), "received");
        }
        Ok(())
    }
}

//! Workload capability: what kind of link to open and what operation to
//! repeat. One implementation per scenario (sender, receiver); the harness
//! holds a value of this trait rather than being parameterized by
//! inheritance.

pub mod receiver;
pub mod sender;

use std::sync::Arc;

use crate::transport::{Link, Session, TransportError};

pub use receiver::ReceiverWorkload;
pub use sender::SenderWorkload;

#[async_trait::async_trait]
pub trait Workload: Send + Sync {
    /// Create the (unopened) link this workload operates on.
    fn create_link(&self, session: &Arc<dyn Session>) -> Result<Box<dyn Link>, TransportError>;
    /// Perform one logical operation on the link.
    async fn execute(&self, link: &dyn Link) -> Result<(), TransportError>;
}

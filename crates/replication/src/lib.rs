pub mod crypto;
pub mod sibling;
pub mod sync;
pub mod transport;

pub use sibling::{Sibling, SiblingCounters};
pub use transport::{ReplicationCounters, ReplicationTransport};

pub mod config;
pub mod error;
pub mod event;
pub mod replication_msg;
pub mod sink;

pub use error::{Error, Result};
pub use event::{canonical_ip, AttrValue, DeviceAttrs, LoginEvent};
pub use replication_msg::{DumpSlot, ListStoreKind, ListType, ReplicationMessage, StatsOp};
pub use sink::EventSink;

pub mod dispatch;
pub mod engine;

pub use dispatch::PolicyDispatcher;
pub use engine::{AllowVerdict, NullPolicy, PolicyEngine};

pub mod hook;
pub mod runner;

pub use hook::{validate_config, WebHook};
pub use runner::WebhookRunner;

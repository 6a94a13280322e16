pub mod noop;
pub mod sink;
pub mod wecom;

pub use noop::NoopSink;
pub use sink::NotifySink;
pub use wecom::WeComWebhook;

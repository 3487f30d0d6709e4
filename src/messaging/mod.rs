pub mod envelope;
pub mod publisher;

pub use envelope::{
    EventEnvelope, EVENT_ANALYZE_FEED_COMPLETED, EVENT_HTTP_AUDIT_LOG, EVENT_MESSAGE_RECEIVED,
    SUPPORTED_EVENT_NAMES,
};
pub use publisher::{LapinPublisher, NullPublisher, Publisher};

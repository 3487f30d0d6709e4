pub mod ingestion_consumer;
pub mod metrics;
pub mod outbox_dispatcher;

pub use ingestion_consumer::IngestionConsumer;
pub use metrics::WorkerMetrics;
pub use outbox_dispatcher::OutboxDispatcher;

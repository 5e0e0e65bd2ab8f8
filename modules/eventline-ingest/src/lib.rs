//! Event ingestion: the gateway that accepts and normalizes batches, and the
//! worker that drains the queue into the event store.
//!
//! Acceptance and persistence are decoupled by the durable queue — the
//! gateway confirms acceptance, not durability. Persistence is idempotent on
//! (tenant, event_id), so at-least-once delivery is safe.

pub mod gateway;
pub mod worker;

pub use gateway::{Accepted, Gateway, IngestBatchRequest, RawEventRecord};
pub use worker::Worker;

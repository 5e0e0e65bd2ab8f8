//! Postgres event store — the single durable home of persisted events.
//!
//! Writes are idempotent on (org_id, project_id, event_id) via a partial
//! unique index; reads are tenant-scoped queries consumed by the analytics
//! engine. The worker is the sole writer; analytics reads run concurrently
//! with no cross-locking.

pub mod api_keys;
pub mod store;

pub use api_keys::{ApiKeyRecord, ApiKeyStore};
pub use store::{CohortEntry, EventStore, FirstSeenRow, StoredEvent, UserEventRow};

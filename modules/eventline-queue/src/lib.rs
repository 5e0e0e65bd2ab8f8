//! Durable ingestion queue backed by Postgres.
//!
//! Decouples batch acceptance from persistence with at-least-once delivery:
//! a job is claimed with FOR UPDATE SKIP LOCKED (concurrent workers never
//! share a job), retried with exponential backoff on failure, and
//! dead-lettered after exhausting its attempts. Failed jobs keep their
//! payload for manual replay; completed jobs are deleted.

pub mod queue;

pub use queue::{FailOutcome, Job, JobQueue};

//! Read-only analytics over the event store: conversion funnels, retention
//! cohorts, time-bucketed metric counts, and per-user journeys.
//!
//! Every operation takes an explicit tenant scope and filters on it before
//! any other predicate. Each is one tenant-scoped fetch plus a pure fold,
//! so the algorithms are unit-testable without a database.

pub mod engine;
pub mod funnel;
pub mod metrics;
pub mod retention;

pub use engine::{AnalyticsEngine, JourneyReport};
pub use funnel::{FunnelQuery, FunnelReport, StepCount, UserFunnel};
pub use metrics::{BucketCount, Interval, MetricsQuery, MetricsReport};
pub use retention::{RetentionDay, RetentionQuery, RetentionReport};

//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! infrastructure (in-process store, file snapshots, HTTP).
//! Each sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `api`: axum REST surface, health and metrics routes
//! - `identity`: static bearer-token identity provider
//! - `metrics`: Prometheus registry and health state
//! - `persistence`: in-memory store and JSON snapshots

pub mod api;
pub mod identity;
pub mod metrics;
pub mod persistence;

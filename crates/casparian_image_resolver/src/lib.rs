//! Per-workflow Docker image tag to content-hash resolver.
//!
//! One `ResolverHandle`/resolver task pair is bound to exactly one
//! running workflow. For that workflow's lifetime it guarantees every
//! reference to a tag (e.g. `ubuntu:18.04`) resolves to exactly one
//! immutable content hash, even if the upstream registry re-publishes
//! the tag mid-run: concurrent lookups for the same tag are coalesced
//! into a single outbound request, and a hash is never handed back to a
//! caller before it has been durably persisted.
//!
//! The resolver does not share mappings across workflows, evict entries,
//! re-verify a hash after the fact, or rate-limit the `HashingService`.

mod config;
mod error;
mod hashing_service;
mod ids;
mod messages;
mod resolver;
mod store;

pub use config::{ResolverConfig, StartMode};
pub use error::{ResolverError, StoreError};
pub use hashing_service::{HashingOutcome, HashingService};
pub use ids::{HashValue, ParseError, TagId};
pub use messages::LookupOutcome;
pub use resolver::{spawn_resolver, spawn_resolver_with_sqlite_store, ResolverHandle, TerminalReason};
pub use store::{SqlxStore, Store};

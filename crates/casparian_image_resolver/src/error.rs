//! Error types for the image hash resolver.

use thiserror::Error;

/// Errors from the `Store` collaborator, as observed by the resolver.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors that can prevent a resolver from starting, or that it can hand
/// back to the embedding workflow engine once its mailbox is gone.
///
/// Distinct from the FSM's own internal `Failed` state, which can only be
/// observed once the resolver task is already running: these errors
/// surface while a caller is still wiring up a `Store` (see
/// `spawn_resolver_with_sqlite_store`, where `SqlxStore::connect` can
/// fail before any resolver task is even spawned), or once a
/// `ResolverHandle` call can no longer reach the resolver task at all.
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("failed to start resolver: {0}")]
    Startup(#[from] StoreError),

    #[error("resolver mailbox closed")]
    MailboxClosed,
}

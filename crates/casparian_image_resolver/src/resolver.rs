//! The resolver FSM: `LoadingCache` -> `Running` -> `Failed`.
//!
//! One instance is one spawned `tokio::task` that owns an mpsc mailbox
//! and reacts to one message at a time, to completion, before the next.
//! No lock is ever taken on `ResolverState`: the task is the only thing
//! that ever touches it. This is the async analogue of
//! `casparian_mcp::core::Core::run`'s synchronous command loop.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::ResolverError;
use crate::hashing_service::{Driver, HashingService};
use crate::ids::{HashValue, ParseError, TagId};
use crate::messages::{LookupOutcome, Msg, Waiter};
use crate::store::{SqlxStore, Store};
use crate::{ResolverConfig, StartMode};

/// Terminal reason recorded when a resolver enters `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalReason(String);

impl TerminalReason {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    fn corrupt_store() -> Self {
        Self::new("corrupt store")
    }

    fn catastrophic_timeout() -> Self {
        Self::new(
            "lookup timed out with no attributable tag; resolver cannot safely continue",
        )
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

type QueuedMap = HashMap<TagId, Vec<Waiter>>;
type PendingSet = HashMap<TagId, Vec<Waiter>>;
type ResolvedMap = HashMap<TagId, HashValue>;

/// The resolver's three states. Exactly one of `{QueuedMap}`,
/// `{PendingSet, ResolvedMap}`, or `{TerminalReason}` is live at a time.
enum ResolverState {
    LoadingCache { queued: QueuedMap },
    Running { pending: PendingSet, resolved: ResolvedMap },
    Failed { reason: TerminalReason },
}

/// Handle for Requesters to reach a running resolver instance.
///
/// Cloneable and cheap to share; never touches `ResolverState` directly.
#[derive(Clone)]
pub struct ResolverHandle {
    tx: mpsc::UnboundedSender<Msg>,
}

impl ResolverHandle {
    /// Request the hash for `tag`. The returned receiver completes with
    /// exactly one `LookupOutcome`, unless the resolver instance
    /// terminates first (in which case it is dropped without a value).
    pub fn lookup(&self, tag: TagId) -> Result<oneshot::Receiver<LookupOutcome>, ResolverError> {
        let (waiter, receiver) = oneshot::channel();
        self.tx
            .send(Msg::LookupRequest { tag, waiter })
            .map_err(|_| ResolverError::MailboxClosed)?;
        Ok(receiver)
    }
}

/// Spawn one resolver instance bound to `workflow_id`.
pub fn spawn_resolver(
    workflow_id: impl Into<String>,
    config: ResolverConfig,
    hashing_service: Arc<dyn HashingService>,
    store: Arc<dyn Store>,
) -> ResolverHandle {
    let workflow_id = workflow_id.into();
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = ResolverHandle { tx: tx.clone() };

    tokio::spawn(run(workflow_id, config, hashing_service, store, tx, rx));

    handle
}

/// Connect a SQLite-backed `Store` at `store_url` and spawn a resolver
/// instance against it in one step.
///
/// Unlike `spawn_resolver`, this can fail before any resolver task
/// exists: `SqlxStore::connect` opening the pool or initializing the
/// schema surfaces as `ResolverError::Startup`, distinct from the FSM's
/// own `Failed` state, which can only be observed once the task is
/// already running.
pub async fn spawn_resolver_with_sqlite_store(
    workflow_id: impl Into<String>,
    config: ResolverConfig,
    hashing_service: Arc<dyn HashingService>,
    store_url: &str,
) -> Result<ResolverHandle, ResolverError> {
    let store = SqlxStore::connect(store_url).await?;
    Ok(spawn_resolver(workflow_id, config, hashing_service, Arc::new(store)))
}

async fn run(
    workflow_id: String,
    config: ResolverConfig,
    hashing_service: Arc<dyn HashingService>,
    store: Arc<dyn Store>,
    mailbox: mpsc::UnboundedSender<Msg>,
    mut inbox: mpsc::UnboundedReceiver<Msg>,
) {
    let driver = Driver::new(
        hashing_service,
        config.backpressure_base,
        config.backpressure_jitter_factor,
        config.request_timeout,
        mailbox.clone(),
    );

    let mut state = match config.start_mode {
        StartMode::Fresh => {
            info!(workflow_id, "resolver starting fresh");
            ResolverState::Running {
                pending: HashMap::new(),
                resolved: HashMap::new(),
            }
        }
        StartMode::Restart => {
            info!(workflow_id, "resolver starting from restart, loading persisted state");
            spawn_load_all(store.clone(), workflow_id.clone(), mailbox.clone());
            ResolverState::LoadingCache { queued: HashMap::new() }
        }
    };

    while let Some(msg) = inbox.recv().await {
        state = handle_msg(state, msg, &workflow_id, &driver, &store, &mailbox);
    }

    debug!(workflow_id, "resolver mailbox closed, instance terminating");
}

fn spawn_load_all(store: Arc<dyn Store>, workflow_id: String, mailbox: mpsc::UnboundedSender<Msg>) {
    tokio::spawn(async move {
        match store.load_all(&workflow_id).await {
            Ok(persisted) => {
                let _ = mailbox.send(Msg::StoreLoaded { persisted });
            }
            Err(err) => {
                let _ = mailbox.send(Msg::StoreLoadFailed { reason: err.to_string() });
            }
        }
    });
}

fn spawn_store_put(
    store: Arc<dyn Store>,
    workflow_id: String,
    tag: TagId,
    hash: HashValue,
    mailbox: mpsc::UnboundedSender<Msg>,
) {
    tokio::spawn(async move {
        let result = store.put(&workflow_id, tag.as_str(), hash.as_str()).await;
        match result {
            Ok(()) => {
                let _ = mailbox.send(Msg::StorePutOk { tag, hash });
            }
            Err(err) => {
                let reason = err.to_string();
                let _ = mailbox.send(Msg::StorePutFailed { tag, reason });
            }
        }
    });
}

/// Parse every persisted `(tag, hash)` pair, failing on the first
/// unparseable entry.
fn parse_persisted(persisted: &HashMap<String, String>) -> Result<ResolvedMap, ParseError> {
    let mut out = HashMap::with_capacity(persisted.len());
    for (tag_str, hash_str) in persisted {
        let tag = TagId::parse(tag_str)?;
        let hash = HashValue::parse(hash_str)?;
        out.insert(tag, hash);
    }
    Ok(out)
}

fn reply(waiter: Waiter, outcome: LookupOutcome) {
    // The Requester may have already given up; a failed send is a no-op.
    let _ = waiter.send(outcome);
}

fn fail_all(waiters: impl IntoIterator<Item = Waiter>, reason: &TerminalReason) {
    for waiter in waiters {
        reply(waiter, LookupOutcome::Failure(reason.message().to_string()));
    }
}

/// React to one inbound message, to completion, and return the next state.
///
/// Never awaits: every external call this triggers is spawned as its own
/// task, whose own completion re-enters the mailbox as a new `Msg`.
fn handle_msg(
    state: ResolverState,
    msg: Msg,
    workflow_id: &str,
    driver: &Driver,
    store: &Arc<dyn Store>,
    mailbox: &mpsc::UnboundedSender<Msg>,
) -> ResolverState {
    match (state, msg) {
        (ResolverState::LoadingCache { mut queued }, Msg::LookupRequest { tag, waiter }) => {
            queued.entry(tag).or_default().push(waiter);
            ResolverState::LoadingCache { queued }
        }

        (ResolverState::LoadingCache { queued }, Msg::StoreLoaded { persisted }) => {
            match parse_persisted(&persisted) {
                Ok(resolved) => {
                    let mut pending = HashMap::new();
                    for (tag, waiters) in queued {
                        if let Some(hash) = resolved.get(&tag) {
                            for waiter in waiters {
                                reply(waiter, LookupOutcome::Result(hash.clone()));
                            }
                        } else {
                            driver.issue(tag.clone());
                            pending.insert(tag, waiters);
                        }
                    }
                    info!(
                        workflow_id,
                        resolved = resolved.len(),
                        pending = pending.len(),
                        "persisted state loaded"
                    );
                    ResolverState::Running { pending, resolved }
                }
                Err(parse_err) => {
                    warn!(workflow_id, %parse_err, "persisted store entry failed to parse");
                    let reason = TerminalReason::corrupt_store();
                    fail_all(queued.into_values().flatten(), &reason);
                    ResolverState::Failed { reason }
                }
            }
        }

        (ResolverState::LoadingCache { queued }, Msg::StoreLoadFailed { reason }) => {
            warn!(workflow_id, %reason, "failed to load persisted state");
            let reason = TerminalReason::new(reason);
            fail_all(queued.into_values().flatten(), &reason);
            ResolverState::Failed { reason }
        }

        (ResolverState::Running { mut pending, resolved }, Msg::LookupRequest { tag, waiter }) => {
            if let Some(hash) = resolved.get(&tag) {
                reply(waiter, LookupOutcome::Result(hash.clone()));
            } else if let Some(waiters) = pending.get_mut(&tag) {
                waiters.push(waiter);
            } else {
                pending.insert(tag.clone(), vec![waiter]);
                driver.issue(tag);
            }
            ResolverState::Running { pending, resolved }
        }

        (ResolverState::Running { pending, resolved }, Msg::HashOk { tag, hash }) => {
            // Not yet committed: waiters are replied to only after the
            // Store confirms the write, never on HashOk alone.
            spawn_store_put(store.clone(), workflow_id.to_string(), tag, hash, mailbox.clone());
            ResolverState::Running { pending, resolved }
        }

        (ResolverState::Running { mut pending, resolved }, Msg::HashErr { tag, reason }) => {
            if let Some(waiters) = pending.remove(&tag) {
                for waiter in waiters {
                    reply(waiter, LookupOutcome::Failure(reason.clone()));
                }
            }
            ResolverState::Running { pending, resolved }
        }

        (ResolverState::Running { mut pending, mut resolved }, Msg::StorePutOk { tag, hash }) => {
            resolved.insert(tag.clone(), hash.clone());
            if let Some(waiters) = pending.remove(&tag) {
                for waiter in waiters {
                    reply(waiter, LookupOutcome::Result(hash.clone()));
                }
            }
            ResolverState::Running { pending, resolved }
        }

        (ResolverState::Running { mut pending, resolved }, Msg::StorePutFailed { tag, reason }) => {
            if let Some(waiters) = pending.remove(&tag) {
                for waiter in waiters {
                    reply(waiter, LookupOutcome::Failure(reason.clone()));
                }
            }
            ResolverState::Running { pending, resolved }
        }

        (ResolverState::Running { pending, .. }, Msg::LookupTimeout) => {
            warn!(workflow_id, "catastrophic timeout, resolver failing workflow");
            let reason = TerminalReason::catastrophic_timeout();
            fail_all(pending.into_values().flatten(), &reason);
            ResolverState::Failed { reason }
        }

        (ResolverState::Failed { reason }, Msg::LookupRequest { waiter, .. }) => {
            reply(waiter, LookupOutcome::Failure(reason.message().to_string()));
            ResolverState::Failed { reason }
        }

        // `StoreLoaded`/`StoreLoadFailed` only ever arrive from the
        // restart-path task spawned while still in `LoadingCache`, which
        // sends at most once; they cannot reach an already-`Running`
        // resolver. Late completions from driver/store tasks issued
        // before a terminal transition are likewise safely ignorable:
        // the resolver no longer has a waiter list to update.
        (state @ ResolverState::Running { .. }, _other) => state,
        (state @ ResolverState::Failed { .. }, _other) => state,
        (state @ ResolverState::LoadingCache { .. }, _other) => state,
    }
}

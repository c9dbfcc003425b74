//! Message vocabulary exchanged with the resolver mailbox.
//!
//! `Msg` is the resolver's closed inbound vocabulary: every reaction in
//! `resolver::handle_msg` matches on one of these variants. Nothing else
//! ever reaches the state machine.

use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::ids::{HashValue, TagId};

/// Reply handle for one Requester awaiting resolution of one `TagId`.
///
/// The resolver never inspects a waiter beyond sending it exactly one
/// `LookupOutcome`; a dropped receiver (the Requester gave up) makes the
/// send a no-op, which is safe to ignore.
pub type Waiter = oneshot::Sender<LookupOutcome>;

/// What a Requester eventually receives for one `LookupRequest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Result(HashValue),
    Failure(String),
}

/// Messages the resolver task's mailbox accepts, from Requesters and
/// from its own `HashingService`/`Store` driver tasks.
#[derive(Debug)]
pub(crate) enum Msg {
    /// A Requester wants the hash for `tag`.
    LookupRequest { tag: TagId, waiter: Waiter },
    /// `Store::load_all` completed successfully on restart.
    StoreLoaded { persisted: HashMap<String, String> },
    /// `Store::load_all` failed on restart.
    StoreLoadFailed { reason: String },
    /// The `HashingService` resolved `tag` to `hash`.
    HashOk { tag: TagId, hash: HashValue },
    /// The `HashingService` could not resolve `tag`.
    HashErr { tag: TagId, reason: String },
    /// `Store::put` for `tag` succeeded; the mapping is now durable.
    StorePutOk { tag: TagId, hash: HashValue },
    /// `Store::put` for `tag` failed.
    StorePutFailed { tag: TagId, reason: String },
    /// A send to the `HashingService` never got a reply in time. Carries
    /// no tag: the driver cannot attribute the loss to one attempt.
    LookupTimeout,
}

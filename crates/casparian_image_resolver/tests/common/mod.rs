//! Hand-rolled fakes for `HashingService` and `Store`, driven by the test
//! rather than by a mocking framework, in the style of
//! `casparian_sentinel/tests/integration.rs`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use casparian_image_resolver::{HashingOutcome, HashingService, Store, StoreError, TagId};
use tokio::sync::{mpsc, oneshot};

/// A `HashingService` that relays every `lookup` call back to the test,
/// which decides the outcome and when to deliver it.
pub struct FakeHashingService {
    calls: Mutex<HashMap<TagId, usize>>,
    relay: mpsc::UnboundedSender<(TagId, oneshot::Sender<HashingOutcome>)>,
}

impl FakeHashingService {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(TagId, oneshot::Sender<HashingOutcome>)>) {
        let (relay, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                calls: Mutex::new(HashMap::new()),
                relay,
            }),
            rx,
        )
    }

    pub fn call_count(&self, tag: &TagId) -> usize {
        self.calls.lock().unwrap().get(tag).copied().unwrap_or(0)
    }
}

#[async_trait]
impl HashingService for FakeHashingService {
    async fn lookup(&self, tag: &TagId) -> HashingOutcome {
        *self.calls.lock().unwrap().entry(tag.clone()).or_insert(0) += 1;
        let (tx, rx) = oneshot::channel();
        if self.relay.send((tag.clone(), tx)).is_err() {
            return HashingOutcome::Err("test harness dropped".to_string());
        }
        // A dropped sender (the test never answers, e.g. the timeout
        // scenario) leaves this pending forever, which is the point:
        // the driver's own timeout is what ends it.
        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => std::future::pending().await,
        }
    }
}

/// Wait for the next relayed lookup call and answer it.
pub async fn answer_next(
    rx: &mut mpsc::UnboundedReceiver<(TagId, oneshot::Sender<HashingOutcome>)>,
    expected_tag: &TagId,
    outcome: HashingOutcome,
) {
    let (tag, responder) = rx.recv().await.expect("expected a hashing service call");
    assert_eq!(&tag, expected_tag, "hashing service called for unexpected tag");
    let _ = responder.send(outcome);
}

#[derive(Default)]
struct FakeStoreInner {
    load_all_result: Option<Result<HashMap<String, String>, StoreError>>,
    load_all_gate: Option<oneshot::Receiver<()>>,
    put_failures: HashMap<String, usize>,
    puts: Vec<(String, String, String)>,
}

/// A `Store` whose `load_all` outcome and `put` failure schedule are
/// configured by the test before the resolver touches it.
pub struct FakeStore {
    inner: Mutex<FakeStoreInner>,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(FakeStoreInner::default()),
        })
    }

    pub fn set_load_all(&self, result: Result<HashMap<String, String>, StoreError>) {
        self.inner.lock().unwrap().load_all_result = Some(result);
    }

    /// Block `load_all` until the returned sender's matching `send` fires,
    /// so the test can enqueue `LookupRequest`s while still in `LoadingCache`.
    pub fn gate_load_all(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().unwrap().load_all_gate = Some(rx);
        tx
    }

    /// Make the next `n` `put` calls for `tag` fail before succeeding.
    pub fn fail_next_put_for(&self, tag: &str, n: usize) {
        self.inner.lock().unwrap().put_failures.insert(tag.to_string(), n);
    }

    pub fn recorded_puts(&self) -> Vec<(String, String, String)> {
        self.inner.lock().unwrap().puts.clone()
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn load_all(&self, _workflow_id: &str) -> Result<HashMap<String, String>, StoreError> {
        let gate = self.inner.lock().unwrap().load_all_gate.take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.load_all_result.take().unwrap_or_else(|| Ok(HashMap::new()))
    }

    async fn put(&self, workflow_id: &str, tag: &str, hash: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .puts
            .push((workflow_id.to_string(), tag.to_string(), hash.to_string()));
        if let Some(remaining) = inner.put_failures.get_mut(tag) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Backend("forced failure".to_string()));
            }
        }
        Ok(())
    }
}

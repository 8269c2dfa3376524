//! In-memory transports for unit tests

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

use super::entry::{BatchEntry, FailedEntry};
use super::error::DeliveryError;
use super::ids::EntryId;
use crate::ports::BatchTransport;

/// Scripted response to one remote call
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Accept,
    /// Reject the entries at these positions of the submitted batch
    Reject(Vec<usize>),
    Fail,
    /// The request could not even be built
    Malformed,
}

#[derive(Default)]
struct FakeState {
    script: VecDeque<Reply>,
    fallback: Option<Reply>,
    calls: Vec<Vec<EntryId>>,
    targets: Vec<String>,
}

/// Records every call and answers from a script, accepting once it runs out
#[derive(Clone, Default)]
pub(crate) struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_script(replies: Vec<Reply>) -> Self {
        let transport = Self::new();
        transport.state.lock().unwrap().script = replies.into();
        transport
    }

    /// Fails every call with a transport error
    pub(crate) fn failing() -> Self {
        let transport = Self::new();
        transport.state.lock().unwrap().fallback = Some(Reply::Fail);
        transport
    }

    pub(crate) fn calls(&self) -> Vec<Vec<EntryId>> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub(crate) fn targets(&self) -> Vec<String> {
        self.state.lock().unwrap().targets.clone()
    }

    pub(crate) fn delivered_ids(&self) -> usize {
        self.calls().iter().map(Vec::len).sum()
    }
}

impl<E: BatchEntry> BatchTransport<E> for FakeTransport {
    fn submit_batch(
        &self,
        target: &str,
        entries: &[E],
    ) -> impl Future<Output = Result<Vec<FailedEntry>, DeliveryError>> + Send {
        let ids: Vec<EntryId> = entries.iter().map(|e| e.id().clone()).collect();
        let target = target.to_string();
        let state = Arc::clone(&self.state);

        async move {
            let reply = {
                let mut state = state.lock().unwrap();
                state.calls.push(ids.clone());
                state.targets.push(target);
                let fallback = state.fallback.clone().unwrap_or(Reply::Accept);
                state.script.pop_front().unwrap_or(fallback)
            };

            match reply {
                Reply::Accept => Ok(Vec::new()),
                Reply::Fail => Err(DeliveryError::transport("connection reset by peer")),
                Reply::Malformed => Err(DeliveryError::internal("partition key is empty")),
                Reply::Reject(positions) => Ok(positions
                    .iter()
                    .rev()
                    .map(|&i| FailedEntry::new(ids[i].clone(), "InternalFailure"))
                    .collect()),
            }
        }
    }
}

/// Panics on any batch that carries `poison`, accepts every other batch
#[derive(Clone)]
pub(crate) struct PoisonedTransport {
    poison: EntryId,
}

impl PoisonedTransport {
    pub(crate) fn new(poison: impl Into<EntryId>) -> Self {
        Self {
            poison: poison.into(),
        }
    }
}

impl<E: BatchEntry> BatchTransport<E> for PoisonedTransport {
    fn submit_batch(
        &self,
        _target: &str,
        entries: &[E],
    ) -> impl Future<Output = Result<Vec<FailedEntry>, DeliveryError>> + Send {
        let poisoned = entries.iter().any(|e| *e.id() == self.poison);

        async move {
            if poisoned {
                panic!("transport bug");
            }
            Ok(Vec::new())
        }
    }
}

/// Holds every call until released, tracking how many run at once
#[derive(Clone)]
pub(crate) struct GatedTransport {
    gate: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl GatedTransport {
    pub(crate) fn new() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Let `n` blocked or future calls complete
    pub(crate) fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl<E: BatchEntry> BatchTransport<E> for GatedTransport {
    fn submit_batch(
        &self,
        _target: &str,
        _entries: &[E],
    ) -> impl Future<Output = Result<Vec<FailedEntry>, DeliveryError>> + Send {
        let this = self.clone();

        async move {
            this.calls.fetch_add(1, Ordering::SeqCst);
            let now = this.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            this.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let permit = this
                .gate
                .acquire()
                .await
                .map_err(|e| DeliveryError::internal(e.to_string()))?;
            permit.forget();

            this.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }
}

/// Wait (in virtual or real time) until `condition` holds
pub(crate) async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

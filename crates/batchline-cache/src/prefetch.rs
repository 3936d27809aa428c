//! Pattern-driven prefetch.
//!
//! Callers register `(prefix, producer)` pairs; a true miss whose key
//! matches a registered prefix is enqueued fire-and-forget, and a single
//! background worker invokes producers to populate the cache. While a
//! producer runs, misses matching the same prefix do not schedule further
//! prefetches, which bounds producer-triggered recursion.

use batchline_core::BoxError;
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;

/// A fallible, async value producer invoked with the missed key.
///
/// Producers must not `get` their own key from inside the producer; the
/// recursion guard turns such lookups into plain misses.
pub type PrefetchProducer =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<Option<Vec<u8>>, BoxError>> + Send + Sync>;

pub(crate) struct PrefetchPattern {
    pub(crate) prefix: String,
    pub(crate) producer: PrefetchProducer,
}

pub(crate) struct PrefetchState {
    /// Registration order matters: the first matching producer that
    /// returns a value wins.
    patterns: RwLock<Vec<PrefetchPattern>>,
    /// Prefixes whose producer is currently running.
    active: Mutex<HashSet<String>>,
    /// Send half of the bounded queue; replaced on each start.
    tx: Mutex<Option<mpsc::Sender<String>>>,
}

impl PrefetchState {
    pub(crate) fn new() -> Self {
        Self {
            patterns: RwLock::new(Vec::new()),
            active: Mutex::new(HashSet::new()),
            tx: Mutex::new(None),
        }
    }

    pub(crate) fn register(&self, prefix: String, producer: PrefetchProducer) {
        self.patterns
            .write()
            .unwrap()
            .push(PrefetchPattern { prefix, producer });
    }

    pub(crate) fn has_patterns(&self) -> bool {
        !self.patterns.read().unwrap().is_empty()
    }

    /// Producers matching `key`, in registration order.
    pub(crate) fn matching(&self, key: &str) -> Vec<(String, PrefetchProducer)> {
        self.patterns
            .read()
            .unwrap()
            .iter()
            .filter(|p| key.starts_with(&p.prefix))
            .map(|p| (p.prefix.clone(), Arc::clone(&p.producer)))
            .collect()
    }

    /// True when `key` falls under a prefix whose producer is mid-flight.
    pub(crate) fn is_recursive(&self, key: &str) -> bool {
        self.active
            .lock()
            .unwrap()
            .iter()
            .any(|prefix| key.starts_with(prefix.as_str()))
    }

    pub(crate) fn mark_active(&self, prefix: &str) {
        self.active.lock().unwrap().insert(prefix.to_string());
    }

    pub(crate) fn mark_idle(&self, prefix: &str) {
        self.active.lock().unwrap().remove(prefix);
    }

    pub(crate) fn attach(&self, tx: mpsc::Sender<String>) {
        *self.tx.lock().unwrap() = Some(tx);
    }

    pub(crate) fn detach(&self) {
        self.tx.lock().unwrap().take();
    }

    /// Fire-and-forget enqueue; a full queue drops the request.
    pub(crate) fn schedule(&self, key: &str) -> bool {
        let tx = self.tx.lock().unwrap();
        match tx.as_ref() {
            Some(tx) => tx.try_send(key.to_string()).is_ok(),
            None => false,
        }
    }
}

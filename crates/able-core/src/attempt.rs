//! Attempt registry: "fire at most one of {event, timeout}" bookkeeping
//!
//! The transport reports completions through callbacks that carry no request
//! identifier. Each family of operations keeps one [`AttemptRegistry`] keyed
//! by the identity the transport callbacks *do* carry (a peripheral
//! identifier, a timer token, a service UUID, or `()` for single-slot
//! families). Removal from the registry is the gate that makes completion
//! exactly-once: whichever of `resolve` or `take_timed_out` removes the
//! attempt first owns its payload, the other observes nothing.
//!
//! The registry never invokes continuations itself. It hands the payload
//! back so the caller can release its locks before running user code.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::debug;

use crate::timer::{Timer, Token};

// ----------------------------------------------------------------------------
// Continuations
// ----------------------------------------------------------------------------

/// One-shot continuation receiving an operation's outcome
pub type Completion<T> = Box<dyn FnOnce(T) + Send + 'static>;

/// Continuation paired with a receiver, for callers that prefer `.await`
///
/// A superseded attempt drops its continuation without calling it; the
/// receiver then resolves to `Err(RecvError)`.
pub fn completion_channel<T>() -> (impl FnOnce(T) + Send + 'static, oneshot::Receiver<T>)
where
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let complete = move |value: T| {
        // Receiver may have been dropped by a caller that lost interest
        let _ = tx.send(value);
    };
    (complete, rx)
}

/// Lock a state mutex, recovering the data if a previous holder panicked
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

struct Attempt<C> {
    payload: C,
    timer: Option<Timer>,
}

/// Pending attempts of one family, at most one per identity
pub struct AttemptRegistry<K, C> {
    family: &'static str,
    attempts: BTreeMap<K, Attempt<C>>,
    timers: HashMap<Token, K>,
}

impl<K, C> AttemptRegistry<K, C>
where
    K: Ord + Clone + fmt::Debug,
{
    pub fn new(family: &'static str) -> Self {
        Self {
            family,
            attempts: BTreeMap::new(),
            timers: HashMap::new(),
        }
    }

    /// Store an attempt for `key`, arming `timer` as its deadline
    ///
    /// A pending attempt for the same key is discarded first: its timer is
    /// invalidated and its payload returned without having been completed.
    pub fn register(&mut self, key: K, payload: C, timer: Option<Timer>) -> Option<C> {
        let superseded = self.discard(&key);
        if superseded.is_some() {
            debug!(family = self.family, key = ?key, "superseded pending attempt");
        }
        if let Some(timer) = &timer {
            self.timers.insert(timer.token(), key.clone());
        }
        debug!(
            family = self.family,
            key = ?key,
            timed = timer.is_some(),
            "registered attempt"
        );
        self.attempts.insert(key, Attempt { payload, timer });
        superseded
    }

    /// Remove the attempt for `key` after a genuine completion event
    ///
    /// Returns `None` when nothing is pending; transports may deliver
    /// spurious or late events and those are not errors.
    pub fn resolve(&mut self, key: &K) -> Option<C> {
        let payload = self.discard(key);
        if payload.is_some() {
            debug!(family = self.family, key = ?key, "resolved attempt");
        }
        payload
    }

    /// Remove the attempt whose deadline timer carries `token`
    ///
    /// Returns `None` when a racing `resolve` (or a re-registration) already
    /// removed it.
    pub fn take_timed_out(&mut self, token: Token) -> Option<(K, C)> {
        let key = self.timers.remove(&token)?;
        let matches = self
            .attempts
            .get(&key)
            .and_then(|attempt| attempt.timer.as_ref())
            .is_some_and(|timer| timer.token() == token);
        if !matches {
            return None;
        }
        let attempt = self.attempts.remove(&key)?;
        debug!(family = self.family, key = ?key, "attempt timed out");
        Some((key, attempt.payload))
    }

    /// Remove every attempt matching `predicate`, in key order
    pub fn take_where<F>(&mut self, mut predicate: F) -> Vec<(K, C)>
    where
        F: FnMut(&K, &C) -> bool,
    {
        let keys: Vec<K> = self
            .attempts
            .iter()
            .filter(|(key, attempt)| predicate(key, &attempt.payload))
            .map(|(key, _)| key.clone())
            .collect();

        keys.into_iter()
            .filter_map(|key| self.resolve(&key).map(|payload| (key, payload)))
            .collect()
    }

    /// Remove the lowest-keyed attempt matching `predicate`
    pub fn take_first_where<F>(&mut self, mut predicate: F) -> Option<(K, C)>
    where
        F: FnMut(&K, &C) -> bool,
    {
        let key = self
            .attempts
            .iter()
            .find(|(key, attempt)| predicate(key, &attempt.payload))
            .map(|(key, _)| key.clone())?;
        self.resolve(&key).map(|payload| (key, payload))
    }

    pub fn get(&self, key: &K) -> Option<&C> {
        self.attempts.get(key).map(|attempt| &attempt.payload)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.attempts.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    /// Number of live deadline timers
    pub fn armed_timers(&self) -> usize {
        self.timers.len()
    }

    fn discard(&mut self, key: &K) -> Option<C> {
        let attempt = self.attempts.remove(key)?;
        if let Some(timer) = attempt.timer {
            self.timers.remove(&timer.token());
            timer.invalidate();
        }
        Some(attempt.payload)
    }
}

impl<K: fmt::Debug, C> fmt::Debug for AttemptRegistry<K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttemptRegistry")
            .field("family", &self.family)
            .field("pending", &self.attempts.keys().collect::<Vec<_>>())
            .field("armed_timers", &self.timers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::TimerScheduler;
    use std::sync::Arc;
    use std::time::Duration;

    type Outcome = Arc<Mutex<Vec<&'static str>>>;

    fn recorder() -> Outcome {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn completion(outcome: &Outcome) -> Completion<&'static str> {
        let outcome = outcome.clone();
        Box::new(move |value| outcome.lock().unwrap().push(value))
    }

    #[test]
    fn test_resolve_without_attempt_is_noop() {
        let mut registry: AttemptRegistry<u8, Completion<&'static str>> =
            AttemptRegistry::new("test");
        assert!(registry.resolve(&1).is_none());
        assert!(registry.take_timed_out(Token::next()).is_none());
    }

    #[test]
    fn test_resolve_removes_attempt() {
        let outcome = recorder();
        let mut registry = AttemptRegistry::new("test");
        registry.register(7u8, completion(&outcome), None);
        assert!(registry.contains(&7));

        let complete = registry.resolve(&7).expect("attempt pending");
        complete("done");
        assert!(registry.is_empty());
        assert!(registry.resolve(&7).is_none());
        assert_eq!(*outcome.lock().unwrap(), vec!["done"]);
    }

    #[test]
    fn test_register_supersedes_without_completing() {
        let first = recorder();
        let second = recorder();
        let mut registry = AttemptRegistry::new("test");

        assert!(registry.register((), completion(&first), None).is_none());
        let superseded = registry.register((), completion(&second), None);
        assert!(superseded.is_some());
        drop(superseded);

        registry.resolve(&()).expect("latest attempt pending")("ok");
        assert!(first.lock().unwrap().is_empty());
        assert_eq!(*second.lock().unwrap(), vec!["ok"]);
    }

    #[test]
    fn test_take_where_matches_in_key_order() {
        let mut registry = AttemptRegistry::new("test");
        registry.register(3u8, "c", None);
        registry.register(1u8, "a", None);
        registry.register(2u8, "b", None);

        let taken = registry.take_where(|_, payload| *payload != "b");
        assert_eq!(taken, vec![(1, "a"), (3, "c")]);
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.take_first_where(|_, _| true), Some((2, "b")));
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_and_resolve_are_mutually_exclusive() {
        let scheduler = TimerScheduler::current().unwrap();
        let registry: Arc<Mutex<AttemptRegistry<u8, Completion<&'static str>>>> =
            Arc::new(Mutex::new(AttemptRegistry::new("test")));
        let outcome = recorder();

        let timeout_registry = registry.clone();
        let timer = scheduler.schedule(Duration::from_secs(1), move |token| {
            let timed_out = lock(&timeout_registry).take_timed_out(token);
            if let Some((_, complete)) = timed_out {
                complete("timeout");
            }
        });
        lock(&registry).register(1u8, completion(&outcome), Some(timer));
        assert_eq!(lock(&registry).armed_timers(), 1);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        // Late genuine completion finds nothing
        assert!(lock(&registry).resolve(&1).is_none());
        assert_eq!(*outcome.lock().unwrap(), vec!["timeout"]);
        assert_eq!(lock(&registry).armed_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_invalidates_timer() {
        let scheduler = TimerScheduler::current().unwrap();
        let registry: Arc<Mutex<AttemptRegistry<u8, Completion<&'static str>>>> =
            Arc::new(Mutex::new(AttemptRegistry::new("test")));
        let outcome = recorder();

        let timeout_registry = registry.clone();
        let timeout_outcome = outcome.clone();
        let timer = scheduler.schedule(Duration::from_secs(1), move |token| {
            if lock(&timeout_registry).take_timed_out(token).is_some() {
                timeout_outcome.lock().unwrap().push("timeout");
            }
        });
        lock(&registry).register(1u8, completion(&outcome), Some(timer));

        let complete = lock(&registry).resolve(&1).expect("attempt pending");
        complete("success");
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(*outcome.lock().unwrap(), vec!["success"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_timer_token_is_stale() {
        let scheduler = TimerScheduler::current().unwrap();
        let mut registry = AttemptRegistry::new("test");

        let first = scheduler.schedule(Duration::from_secs(10), |_| {});
        let stale = first.token();
        registry.register((), "first", Some(first));
        let second = scheduler.schedule(Duration::from_secs(10), |_| {});
        let live = second.token();
        registry.register((), "second", Some(second));

        assert!(registry.take_timed_out(stale).is_none());
        assert_eq!(registry.take_timed_out(live), Some(((), "second")));
    }

    #[tokio::test]
    async fn test_completion_channel_delivers_value() {
        let (complete, rx) = completion_channel::<u32>();
        complete(42);
        assert_eq!(rx.await.unwrap(), 42);

        let (complete, rx) = completion_channel::<u32>();
        drop(complete);
        assert!(rx.await.is_err());
    }
}

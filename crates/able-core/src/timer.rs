//! One-shot deadline timers on the callback executor

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

use crate::errors::{AbleError, Result};

// ----------------------------------------------------------------------------
// Tokens
// ----------------------------------------------------------------------------

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Opaque identity minted for timers and anonymous attempts
///
/// Tokens are process-unique and increase monotonically, so ordering by
/// token is ordering by registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(u64);

impl Token {
    pub fn next() -> Self {
        Token(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Timer
// ----------------------------------------------------------------------------

/// A live deadline timer
///
/// Dropping the timer invalidates it: the sleeping task is aborted and the
/// fire callback never runs.
pub struct Timer {
    token: Token,
    deadline: Instant,
    task: JoinHandle<()>,
}

impl Timer {
    pub fn token(&self) -> Token {
        self.token
    }

    pub fn invalidate(self) {
        drop(self);
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("token", &self.token)
            .field("deadline", &self.deadline)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Scheduler
// ----------------------------------------------------------------------------

/// Schedules timers and dispatch loops on the designated callback executor
#[derive(Debug, Clone)]
pub struct TimerScheduler {
    runtime: Handle,
}

impl TimerScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Scheduler bound to the runtime the caller is running on
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| AbleError::RuntimeUnavailable)
    }

    /// Use `runtime` when given, otherwise the ambient runtime
    pub fn resolve(runtime: Option<Handle>) -> Result<Self> {
        match runtime {
            Some(runtime) => Ok(Self::new(runtime)),
            None => Self::current(),
        }
    }

    /// Arm a timer that calls `on_fire` with its token once `after` elapses
    pub fn schedule<F>(&self, after: Duration, on_fire: F) -> Timer
    where
        F: FnOnce(Token) + Send + 'static,
    {
        let token = Token::next();
        let deadline = Instant::now() + after;
        let task = self.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            trace!(timer = %token, "timer fired");
            on_fire(token);
        });
        Timer {
            token,
            deadline,
            task,
        }
    }

    /// Arm a timer only for a positive deadline
    pub fn schedule_optional<F>(&self, after: Option<Duration>, on_fire: F) -> Option<Timer>
    where
        F: FnOnce(Token) + Send + 'static,
    {
        after
            .filter(|after| !after.is_zero())
            .map(|after| self.schedule(after, on_fire))
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(future)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_tokens_are_monotonic() {
        let a = Token::next();
        let b = Token::next();
        assert!(b > a);
    }

    #[test]
    fn test_scheduler_requires_runtime() {
        assert_eq!(
            TimerScheduler::current().err(),
            Some(AbleError::RuntimeUnavailable)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once_with_its_token() {
        let scheduler = TimerScheduler::current().unwrap();
        let fired = Arc::new(std::sync::Mutex::new(Vec::new()));

        let sink = fired.clone();
        let timer = scheduler.schedule(Duration::from_secs(2), move |token| {
            sink.lock().unwrap().push(token);
        });
        let token = timer.token();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(fired.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*fired.lock().unwrap(), vec![token]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_timer_never_fires() {
        let scheduler = TimerScheduler::current().unwrap();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = count.clone();
        let timer = scheduler.schedule(Duration::from_secs(1), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        timer.invalidate();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_deadline_arms_nothing() {
        let scheduler = TimerScheduler::current().unwrap();
        assert!(scheduler
            .schedule_optional(Some(Duration::ZERO), |_| {})
            .is_none());
        assert!(scheduler.schedule_optional(None, |_| {}).is_none());
        assert!(scheduler
            .schedule_optional(Some(Duration::from_millis(1)), |_| {})
            .is_some());
    }
}

//! Bounded polling against the gateway.
//!
//! A poll makes up to `max_attempts` sequential attempts. The first one runs at once,
//! later ones after `interval`. Each attempt either finishes the poll with a value or
//! leaves it pending; a failed attempt is logged and counted like a pending one.

use std::future::Future;
use std::time::Duration;

use futures_util::future::LocalBoxFuture;
use tracing::{debug, warn};

use crate::config::PollPolicy;
use crate::errors::AppError;

/// Source of delays and background tasks for a single-threaded client.
pub trait Scheduler {
    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()>;
    fn spawn(&self, task: LocalBoxFuture<'static, ()>);
}

/// How a poll ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Succeeded(T),
    TimedOut { attempts: u32 },
    /// The session that started the poll is gone.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState<T> {
    Pending { attempts: u32 },
    Finished(PollOutcome<T>),
}

/// Attempt bookkeeping, free of any timing concerns.
#[derive(Debug, Clone)]
pub struct PollMachine {
    label: &'static str,
    max_attempts: u32,
    attempts: u32,
}

impl PollMachine {
    pub fn new(label: &'static str, max_attempts: u32) -> Self {
        Self { label, max_attempts, attempts: 0 }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Records the result of one attempt. `Ok(None)` means "not ready yet".
    pub fn record<T>(&mut self, result: Result<Option<T>, AppError>) -> PollState<T> {
        self.attempts += 1;
        match result {
            Ok(Some(value)) => {
                debug!("{} poll finished after {} attempt(s)", self.label, self.attempts);
                return PollState::Finished(PollOutcome::Succeeded(value));
            }
            Ok(None) => {}
            Err(e) => warn!("{} poll attempt {} failed: {e}", self.label, self.attempts),
        }
        if self.is_exhausted() {
            warn!("{} poll gave up after {} attempt(s)", self.label, self.attempts);
            PollState::Finished(PollOutcome::TimedOut { attempts: self.attempts })
        } else {
            PollState::Pending { attempts: self.attempts }
        }
    }
}

/// Drives `attempt` until it yields a value, the budget runs out, or `is_live` turns false.
///
/// `is_live` is checked before every attempt and again once it resolves, so a poll
/// whose session ended never reports a value.
pub async fn run_poll<T, F, Fut>(
    label: &'static str,
    policy: PollPolicy,
    scheduler: &dyn Scheduler,
    is_live: impl Fn() -> bool,
    mut attempt: F,
) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, AppError>>,
{
    let mut machine = PollMachine::new(label, policy.max_attempts);
    if machine.is_exhausted() {
        return PollOutcome::TimedOut { attempts: 0 };
    }
    loop {
        if !is_live() {
            debug!("{label} poll cancelled");
            return PollOutcome::Cancelled;
        }
        let result = attempt().await;
        if !is_live() {
            debug!("{label} poll cancelled");
            return PollOutcome::Cancelled;
        }
        match machine.record(result) {
            PollState::Finished(outcome) => return outcome,
            PollState::Pending { .. } => scheduler.sleep(policy.interval).await,
        }
    }
}

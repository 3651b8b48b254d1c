//! Deadline bookkeeping for the session task.
//!
//! The session owns all of its timers as plain deadlines and sleeps until
//! the earliest one inside its `select!` loop. Cancelling a timer is a map
//! removal, so nothing can fire after the session is torn down.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    /// One-shot reconnect after a close or a failed open.
    Reconnect,
    /// One-shot fallback that marks the session synced.
    SyncTimeout,
    /// Periodic token age check.
    TokenRefresh,
}

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    deadline: Instant,
    period: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct Timers {
    scheduled: HashMap<TimerKind, Scheduled>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot timer, replacing any existing one of the same kind.
    pub fn once(&mut self, kind: TimerKind, delay: Duration) {
        self.scheduled.insert(
            kind,
            Scheduled {
                deadline: Instant::now() + delay,
                period: None,
            },
        );
    }

    /// Arm a periodic timer, replacing any existing one of the same kind.
    pub fn every(&mut self, kind: TimerKind, period: Duration) {
        self.scheduled.insert(
            kind,
            Scheduled {
                deadline: Instant::now() + period,
                period: Some(period),
            },
        );
    }

    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        self.scheduled.remove(&kind).is_some()
    }

    pub fn cancel_all(&mut self) {
        self.scheduled.clear();
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.scheduled.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.scheduled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scheduled.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduled.values().map(|s| s.deadline).min()
    }

    /// Pop every timer due at `now`, earliest first. Periodic timers are
    /// re-armed one period after `now`.
    pub fn fire_due(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut due: Vec<(Instant, TimerKind)> = self
            .scheduled
            .iter()
            .filter(|(_, s)| s.deadline <= now)
            .map(|(kind, s)| (s.deadline, *kind))
            .collect();
        due.sort();

        for (_, kind) in &due {
            let period = self.scheduled.get(kind).and_then(|s| s.period);
            match period {
                Some(period) => {
                    self.scheduled.insert(
                        *kind,
                        Scheduled {
                            deadline: now + period,
                            period: Some(period),
                        },
                    );
                }
                None => {
                    self.scheduled.remove(kind);
                }
            }
        }
        due.into_iter().map(|(_, kind)| kind).collect()
    }
}

/// Sleep until `deadline`, or forever when there is none.
pub async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

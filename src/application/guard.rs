use crate::domain::UserId;
use crate::domain::ports::ClockRef;
use crate::domain::step::Step;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::HashSet;

/// Notice sent once a user keeps hammering the same input.
pub const SLOW_DOWN_NOTICE: &str = "⏳ Please wait a moment, your previous message is still being processed.";

#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Admitted,
    /// The input arrived too soon after the last admitted one for the same
    /// handler and must not be processed.
    Rejected { notice: Option<String> },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Drops near-duplicate inputs sent faster than a minimum interval.
///
/// Keys are `(user, handler)`. The guard also remembers the last state each
/// user's conversation was left in so a rejected input can answer with it.
pub trait InputGuard: Send + Sync {
    fn admit(&self, user_id: UserId, handler: &str) -> Admission;
    /// `None` forgets the state.
    fn remember(&self, user_id: UserId, state: Option<Step>);
    fn last_state(&self, user_id: UserId) -> Option<Step>;
    /// Drops every timestamp and remembered state for the user.
    fn clear(&self, user_id: UserId);
    /// Forgets admissions and remembered states older than `cutoff`;
    /// returns how many admissions were dropped.
    fn purge_older_than(&self, cutoff: DateTime<Utc>) -> usize;
}

pub type InputGuardBox = Box<dyn InputGuard>;

/// Process-local guard. Correct for a single process; a shared
/// implementation is needed once several processes serve the same user.
pub struct InMemoryInputGuard {
    clock: ClockRef,
    min_interval: Duration,
    notice_after: u32,
    last_admitted: DashMap<(UserId, String), DateTime<Utc>>,
    rejections: DashMap<UserId, u32>,
    states: DashMap<UserId, (Step, DateTime<Utc>)>,
}

impl InMemoryInputGuard {
    pub fn new(clock: ClockRef, min_interval: Duration, notice_after: u32) -> Self {
        Self {
            clock,
            min_interval,
            notice_after,
            last_admitted: DashMap::new(),
            rejections: DashMap::new(),
            states: DashMap::new(),
        }
    }

    pub fn tracked_entries(&self) -> usize {
        self.last_admitted.len()
    }

    pub fn remembered_states(&self) -> usize {
        self.states.len()
    }
}

impl InputGuard for InMemoryInputGuard {
    fn admit(&self, user_id: UserId, handler: &str) -> Admission {
        let now = self.clock.now();
        let key = (user_id, handler.to_string());

        let too_soon = match self.last_admitted.get(&key) {
            Some(last) => now - *last < self.min_interval,
            None => false,
        };

        if !too_soon {
            self.last_admitted.insert(key, now);
            self.rejections.remove(&user_id);
            return Admission::Admitted;
        }

        let mut count = self.rejections.entry(user_id).or_insert(0);
        *count += 1;
        let notice = if self.notice_after > 0 && *count >= self.notice_after {
            *count = 0;
            Some(SLOW_DOWN_NOTICE.to_string())
        } else {
            None
        };
        drop(count);

        tracing::info!(user_id, handler, notify = notice.is_some(), "debounce: ignoring fast input");
        Admission::Rejected { notice }
    }

    fn remember(&self, user_id: UserId, state: Option<Step>) {
        match state {
            Some(state) => {
                self.states.insert(user_id, (state, self.clock.now()));
            }
            None => {
                self.states.remove(&user_id);
            }
        }
    }

    fn last_state(&self, user_id: UserId) -> Option<Step> {
        self.states.get(&user_id).map(|entry| entry.0)
    }

    fn clear(&self, user_id: UserId) {
        self.last_admitted.retain(|(user, _), _| *user != user_id);
        self.rejections.remove(&user_id);
        self.states.remove(&user_id);
        tracing::debug!(user_id, "debounce: cleared user state");
    }

    fn purge_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.last_admitted.len();
        self.last_admitted.retain(|_, at| *at >= cutoff);
        self.states.retain(|_, (_, at)| *at >= cutoff);
        // A rejection streak only counts against a live admission.
        let live: HashSet<UserId> = self.last_admitted.iter().map(|entry| entry.key().0).collect();
        self.rejections.retain(|user, _| live.contains(user));
        before - self.last_admitted.len()
    }
}

//! In-memory session store with idle expiry

use super::{DedupGuard, Session, DEFAULT_DEDUP_CAPACITY};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Sessions idle for longer than this many minutes are dropped
pub const DEFAULT_IDLE_TIMEOUT_MINUTES: i64 = 30;

/// Full expiry sweep runs once every this many store operations
const SWEEP_EVERY: u64 = 64;

#[derive(Debug)]
struct StoreInner {
    sessions: HashMap<String, Session>,
    dedup: DedupGuard,
    /// Users whose session was ended while the message that ended it stays
    /// recorded, with the time it ended
    ended: HashMap<String, DateTime<Utc>>,
    ops: u64,
}

impl StoreInner {
    fn is_expired(session: &Session, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
        now - session.last_activity_at > idle_timeout
    }

    fn sweep(&mut self, now: DateTime<Utc>, idle_timeout: Duration) {
        let expired: Vec<String> = self
            .sessions
            .values()
            .filter(|s| Self::is_expired(s, now, idle_timeout))
            .map(|s| s.user_id.clone())
            .collect();
        for user_id in &expired {
            self.sessions.remove(user_id);
            self.dedup.forget(user_id);
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired idle sessions");
        }

        let dead = &mut self.dedup;
        self.ended.retain(|user_id, ended_at| {
            let keep = now - *ended_at <= idle_timeout;
            if !keep {
                dead.forget(user_id);
            }
            keep
        });
    }

    /// Drop the session of `user_id` and its dedup record if idle too long
    fn expire_if_idle(&mut self, user_id: &str, now: DateTime<Utc>, idle_timeout: Duration) {
        let expired = self
            .sessions
            .get(user_id)
            .is_some_and(|s| Self::is_expired(s, now, idle_timeout));
        if expired {
            tracing::debug!(user_id, "Session expired, starting over");
            self.sessions.remove(user_id);
            self.dedup.forget(user_id);
        }

        let stale = self
            .ended
            .get(user_id)
            .is_some_and(|ended_at| now - *ended_at > idle_timeout);
        if stale {
            self.ended.remove(user_id);
            self.dedup.forget(user_id);
        }
    }

    /// Existing or new session of `user_id` with its idle clock reset
    fn touch_session(&mut self, user_id: &str, now: DateTime<Utc>) -> Session {
        // A new session takes over whatever the ended one left recorded
        self.ended.remove(user_id);
        let session = self
            .sessions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                tracing::info!(user_id, "New session");
                Session::new(user_id, now)
            });
        session.touch(now);
        session.clone()
    }

    /// Count an operation and sweep when due
    fn tick(&mut self, now: DateTime<Utc>, idle_timeout: Duration) {
        self.ops = self.ops.wrapping_add(1);
        if self.ops % SWEEP_EVERY == 0 {
            self.sweep(now, idle_timeout);
        }
    }
}

/// Owns all sessions and the dedup records of their users
///
/// A single lock covers both maps so that ending or expiring a session
/// removes its dedup record in the same step. Missing sessions are created,
/// never reported as errors.
#[derive(Debug)]
pub struct SessionStore {
    idle_timeout: Duration,
    inner: Mutex<StoreInner>,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration, dedup_capacity: usize) -> Self {
        Self {
            idle_timeout,
            inner: Mutex::new(StoreInner {
                sessions: HashMap::new(),
                dedup: DedupGuard::new(dedup_capacity),
                ended: HashMap::new(),
                ops: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // A panicking turn must not take the whole store down with it
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch the session of `user_id`, creating it if absent, and reset its
    /// idle clock
    pub fn get(&self, user_id: &str) -> Session {
        self.get_at(user_id, Utc::now())
    }

    pub fn get_at(&self, user_id: &str, now: DateTime<Utc>) -> Session {
        let idle_timeout = self.idle_timeout;
        let mut inner = self.lock();
        inner.tick(now, idle_timeout);
        inner.expire_if_idle(user_id, now, idle_timeout);
        inner.touch_session(user_id, now)
    }

    /// Open a turn for one delivery: expire an idle session, check and mark
    /// `message_id`, then fetch and touch the session, all under one lock.
    /// Returns `None` when `message_id` was already recorded; the session is
    /// left untouched in that case.
    pub fn begin_turn(&self, user_id: &str, message_id: Option<&str>) -> Option<Session> {
        self.begin_turn_at(user_id, message_id, Utc::now())
    }

    pub fn begin_turn_at(
        &self,
        user_id: &str,
        message_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<Session> {
        let idle_timeout = self.idle_timeout;
        let mut inner = self.lock();
        inner.tick(now, idle_timeout);
        // Expiry forgets dedup records, so it must run before the check
        inner.expire_if_idle(user_id, now, idle_timeout);
        if let Some(message_id) = message_id {
            if !inner.dedup.check_and_record(user_id, message_id) {
                return None;
            }
        }
        Some(inner.touch_session(user_id, now))
    }

    /// Write back a session after a turn
    pub fn put(&self, session: Session) {
        let mut inner = self.lock();
        inner.sessions.insert(session.user_id.clone(), session);
    }

    /// Delete the session and dedup record of `user_id`. `ended_by`, the id
    /// of the message that ended the session, stays recorded for one idle
    /// timeout so its redelivery is still dropped.
    pub fn end(&self, user_id: &str, ended_by: Option<&str>) -> bool {
        self.end_at(user_id, ended_by, Utc::now())
    }

    pub fn end_at(&self, user_id: &str, ended_by: Option<&str>, now: DateTime<Utc>) -> bool {
        let mut inner = self.lock();
        inner.dedup.forget(user_id);
        inner.ended.remove(user_id);
        if let Some(message_id) = ended_by {
            inner.dedup.record(user_id, message_id);
            inner.ended.insert(user_id.to_string(), now);
        }
        let existed = inner.sessions.remove(user_id).is_some();
        if existed {
            tracing::info!(user_id, "Session ended");
        }
        existed
    }

    /// Number of live sessions, after an expiry sweep
    pub fn active_count(&self) -> usize {
        self.active_count_at(Utc::now())
    }

    pub fn active_count_at(&self, now: DateTime<Utc>) -> usize {
        let mut inner = self.lock();
        inner.sweep(now, self.idle_timeout);
        inner.sessions.len()
    }

    #[cfg(test)]
    pub fn seen(&self, user_id: &str, message_id: &str) -> bool {
        self.lock().dedup.seen(user_id, message_id)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(
            Duration::minutes(DEFAULT_IDLE_TIMEOUT_MINUTES),
            DEFAULT_DEDUP_CAPACITY,
        )
    }
}

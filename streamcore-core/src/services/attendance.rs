use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use streamcore_common::models::{AttendanceKey, AttendanceOutcome, Platform};
use streamcore_common::traits::AttendanceRepository;
use crate::Error;

/// Session-scoped "one attendance per user per platform" guard in front of
/// the persistent totals.
///
/// The session set only grows (until [`reset_session`](Self::reset_session))
/// and only after the store accepted the increment, so the set and the
/// persisted totals cannot disagree.
pub struct AttendanceDedupGuard {
    registered: DashMap<AttendanceKey, ()>,
    repo: Arc<dyn AttendanceRepository>,
}

impl AttendanceDedupGuard {
    pub fn new(repo: Arc<dyn AttendanceRepository>) -> Self {
        Self {
            registered: DashMap::new(),
            repo,
        }
    }

    /// Registers `nickname` on `platform` for this session.
    ///
    /// The entry's shard stays locked while the store is written, so two
    /// concurrent calls for the same key produce exactly one `Accepted`.
    /// A store failure is returned and nothing is recorded.
    pub fn try_register(
        &self,
        nickname: &str,
        platform: Platform,
    ) -> Result<AttendanceOutcome, Error> {
        let key = AttendanceKey::new(nickname, platform);
        match self.registered.entry(key) {
            Entry::Occupied(e) => {
                debug!(user = %e.key().nickname, %platform, "attendance already registered");
                Ok(AttendanceOutcome::AlreadyRegistered)
            }
            Entry::Vacant(slot) => {
                let total = self
                    .repo
                    .register_attendance(&slot.key().nickname, platform)?;
                info!(user = %slot.key().nickname, %platform, total, "attendance registered");
                slot.insert(());
                Ok(AttendanceOutcome::Accepted { total })
            }
        }
    }

    pub fn is_registered(&self, nickname: &str, platform: Platform) -> bool {
        self.registered
            .contains_key(&AttendanceKey::new(nickname, platform))
    }

    pub fn session_len(&self) -> usize {
        self.registered.len()
    }

    /// Starts a new stream session; persisted totals are untouched.
    pub fn reset_session(&self) {
        let n = self.registered.len();
        self.registered.clear();
        info!("Attendance session reset ({} entries cleared)", n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::thread;
    use mockall::predicate::*;
    use streamcore_common::traits::MockAttendanceRepository;

    #[test]
    fn second_registration_in_session_is_rejected() {
        let mut repo = MockAttendanceRepository::new();
        repo.expect_register_attendance()
            .with(eq("alice"), eq(Platform::Twitch))
            .times(1)
            .returning(|_, _| Ok(3));

        let guard = AttendanceDedupGuard::new(Arc::new(repo));
        assert_eq!(
            guard.try_register("Alice", Platform::Twitch).unwrap(),
            AttendanceOutcome::Accepted { total: 3 }
        );
        assert_eq!(
            guard.try_register("alice ", Platform::Twitch).unwrap(),
            AttendanceOutcome::AlreadyRegistered
        );
        assert!(guard.is_registered("ALICE", Platform::Twitch));
    }

    #[test]
    fn platforms_are_independent() {
        let mut repo = MockAttendanceRepository::new();
        repo.expect_register_attendance()
            .times(2)
            .returning(|_, _| Ok(1));

        let guard = AttendanceDedupGuard::new(Arc::new(repo));
        assert!(matches!(
            guard.try_register("bob", Platform::Twitch).unwrap(),
            AttendanceOutcome::Accepted { .. }
        ));
        assert!(matches!(
            guard.try_register("bob", Platform::Kick).unwrap(),
            AttendanceOutcome::Accepted { .. }
        ));
        assert_eq!(guard.session_len(), 2);
    }

    #[test]
    fn store_failure_leaves_user_unregistered() {
        let mut repo = MockAttendanceRepository::new();
        let mut calls = 0;
        repo.expect_register_attendance()
            .times(2)
            .returning(move |_, _| {
                calls += 1;
                if calls == 1 {
                    Err(Error::Database(sqlx::Error::PoolTimedOut))
                } else {
                    Ok(1)
                }
            });

        let guard = AttendanceDedupGuard::new(Arc::new(repo));
        assert!(guard.try_register("carol", Platform::YouTube).is_err());
        assert!(!guard.is_registered("carol", Platform::YouTube));
        assert_eq!(
            guard.try_register("carol", Platform::YouTube).unwrap(),
            AttendanceOutcome::Accepted { total: 1 }
        );
    }

    #[test]
    fn reset_session_allows_registering_again() {
        let mut repo = MockAttendanceRepository::new();
        let totals = AtomicU64::new(0);
        repo.expect_register_attendance()
            .times(2)
            .returning(move |_, _| Ok(totals.fetch_add(1, Ordering::SeqCst) + 1));

        let guard = AttendanceDedupGuard::new(Arc::new(repo));
        guard.try_register("dave", Platform::Twitch).unwrap();
        guard.reset_session();
        assert_eq!(guard.session_len(), 0);
        assert_eq!(
            guard.try_register("dave", Platform::Twitch).unwrap(),
            AttendanceOutcome::Accepted { total: 2 }
        );
    }

    #[test]
    fn concurrent_same_key_accepts_once() {
        let mut repo = MockAttendanceRepository::new();
        repo.expect_register_attendance()
            .times(1)
            .returning(|_, _| {
                thread::sleep(std::time::Duration::from_millis(10));
                Ok(1)
            });

        let guard = Arc::new(AttendanceDedupGuard::new(Arc::new(repo)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                thread::spawn(move || guard.try_register("eve", Platform::Kick).unwrap())
            })
            .collect();
        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| matches!(o, AttendanceOutcome::Accepted { .. }))
            .count();
        assert_eq!(accepted, 1);
    }
}

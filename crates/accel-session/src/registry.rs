//! The session registry: every live session, plus aggregate counters.
//!
//! The registry is the process-wide view of subscribers. It is
//! responsible for:
//! - Creating sessions (fresh, or restored from a backup)
//! - Enumerating them in creation order
//! - Keeping the STARTING / ACTIVE / FINISHING counters exact
//! - Publishing lifecycle events to subscribers
//! - Refusing new sessions once shutdown has begun
//!
//! # Concurrency note
//!
//! Unlike a single-owner manager, the registry is shared (`Arc`) between
//! every front-end task. One `Mutex` guards the session list and the
//! counters together, so a reader never sees a count that disagrees with
//! the list.
//!
//! Lock order is always *session, then registry*: a session updates the
//! counters while holding its own lock. The login lock, when taken, comes
//! before both. The registry therefore never
//! touches a session's state while holding its own lock; lookups copy the
//! matching handles out first and inspect them afterwards.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use accel_net::NetHandle;
use accel_protocol::{SessionId, TerminateCause};
use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::{
    ControlInterface, Session, SessionBackup, SessionConfig, SessionError, SessionEvent,
};

/// Aggregate session counts.
///
/// `starting + active + finishing` always equals the number of sessions in
/// the registry. Restored sessions count as starting until they go active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStat {
    pub starting: usize,
    pub active: usize,
    pub finishing: usize,
}

impl SessionStat {
    pub fn total(&self) -> usize {
        self.starting + self.active + self.finishing
    }

    fn slot_mut(&mut self, slot: StatSlot) -> &mut usize {
        match slot {
            StatSlot::Starting => &mut self.starting,
            StatSlot::Active => &mut self.active,
            StatSlot::Finishing => &mut self.finishing,
        }
    }
}

/// Which counter a session state is counted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatSlot {
    Starting,
    Active,
    Finishing,
}

struct RegistryInner {
    /// Sessions in creation order, keyed by a private sequence number.
    sessions: BTreeMap<u64, Session>,
    /// Session id → sequence number.
    index: HashMap<SessionId, u64>,
    next_seq: u64,
    stat: SessionStat,
}

impl RegistryInner {
    fn insert(&mut self, session: Session) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(session.id(), seq);
        self.sessions.insert(seq, session);
        self.stat.starting += 1;
    }
}

/// Registry of all sessions on this concentrator.
pub struct SessionRegistry {
    config: SessionConfig,
    inner: Mutex<RegistryInner>,
    events: broadcast::Sender<SessionEvent>,
    stat_tx: watch::Sender<SessionStat>,
    shutting_down: AtomicBool,
    /// Serializes username assignment under a single-session policy.
    logins: Mutex<()>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new(config: SessionConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (stat_tx, _) = watch::channel(SessionStat::default());
        Arc::new(Self {
            config,
            inner: Mutex::new(RegistryInner {
                sessions: BTreeMap::new(),
                index: HashMap::new(),
                next_seq: 0,
                stat: SessionStat::default(),
            }),
            events,
            stat_tx,
            shutting_down: AtomicBool::new(false),
            logins: Mutex::new(()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Held across the duplicate check and the assignment in
    /// [`Session::set_username`]. Taken before any session lock.
    pub(crate) fn lock_logins(&self) -> MutexGuard<'_, ()> {
        self.logins.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Creates and registers a fresh session in STARTING, bound to `ctrl`
    /// and the namespace `net`. The registry keeps one reference; the
    /// returned handle is the caller's.
    ///
    /// # Errors
    /// Returns [`SessionError::ShuttingDown`] once
    /// [`begin_shutdown`](Self::begin_shutdown) was called.
    pub fn create(
        self: &Arc<Self>,
        ctrl: Arc<dyn ControlInterface>,
        net: NetHandle,
    ) -> Result<Session, SessionError> {
        if self.is_shutting_down() {
            return Err(SessionError::ShuttingDown);
        }

        let session = {
            let mut inner = self.lock();
            // Checked again under the lock: `terminate_all` snapshots the
            // list after the flag is set, so anything inserted here is seen.
            if self.is_shutting_down() {
                return Err(SessionError::ShuttingDown);
            }
            let id = loop {
                let id = SessionId::generate();
                if !inner.index.contains_key(&id) {
                    break id;
                }
            };
            let session = Session::fresh(id, Arc::clone(self), ctrl, net);
            inner.insert(session.share());
            self.stat_tx.send_replace(inner.stat);
            session
        };

        tracing::info!(session_id = %session.id(), kind = %session.ctrl_kind(), "session created");
        self.emit(SessionEvent::Starting {
            id: session.id(),
            restored: false,
        });
        Ok(session)
    }

    /// Rebuilds a session from a backup and registers it in RESTORE.
    ///
    /// The session keeps its id, identity, start time and counters. Call
    /// [`Session::start`] to have the front-end re-attach.
    ///
    /// # Errors
    /// - [`SessionError::BackupMismatch`] if `ctrl` is a different kind of
    ///   front-end than the one that took the backup
    /// - [`SessionError::AlreadyRegistered`] if the id is in use
    /// - [`SessionError::ShuttingDown`] during shutdown
    pub fn restore(
        self: &Arc<Self>,
        backup: SessionBackup,
        ctrl: Arc<dyn ControlInterface>,
        net: NetHandle,
    ) -> Result<Session, SessionError> {
        if self.is_shutting_down() {
            return Err(SessionError::ShuttingDown);
        }
        if backup.ctrl_kind != ctrl.kind() {
            return Err(SessionError::BackupMismatch {
                id: backup.session_id,
                expected: backup.ctrl_kind,
                actual: ctrl.kind(),
            });
        }

        let session = {
            let mut inner = self.lock();
            if self.is_shutting_down() {
                return Err(SessionError::ShuttingDown);
            }
            if inner.index.contains_key(&backup.session_id) {
                return Err(SessionError::AlreadyRegistered(backup.session_id));
            }
            let session = Session::from_backup(backup, Arc::clone(self), ctrl, net);
            inner.insert(session.share());
            self.stat_tx.send_replace(inner.stat);
            session
        };

        tracing::info!(
            session_id = %session.id(),
            kind = %session.ctrl_kind(),
            username = ?session.username(),
            "session restored"
        );
        self.emit(SessionEvent::Starting {
            id: session.id(),
            restored: true,
        });
        Ok(session)
    }

    /// Moves one session between counters. Called with the session's lock
    /// held.
    pub(crate) fn transition(&self, from: Option<StatSlot>, to: Option<StatSlot>) {
        let mut inner = self.lock();
        if let Some(from) = from {
            let count = inner.stat.slot_mut(from);
            *count = count.saturating_sub(1);
        }
        if let Some(to) = to {
            *inner.stat.slot_mut(to) += 1;
        }
        self.stat_tx.send_replace(inner.stat);
    }

    /// Unregisters a session and hands back the registry's reference. The
    /// caller drops it once no locks are held. Called with the session's
    /// lock held.
    pub(crate) fn remove(&self, id: SessionId, from: Option<StatSlot>) -> Option<Session> {
        let mut inner = self.lock();
        let seq = inner.index.remove(&id)?;
        let session = inner.sessions.remove(&seq);
        if let Some(from) = from {
            let count = inner.stat.slot_mut(from);
            *count = count.saturating_sub(1);
        }
        self.stat_tx.send_replace(inner.stat);
        session
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Looks up a session by id, taking a reference to it.
    pub fn get(&self, id: SessionId) -> Option<Session> {
        let candidate = {
            let inner = self.lock();
            let seq = inner.index.get(&id)?;
            inner.sessions.get(seq).map(Session::share)
        };
        candidate.and_then(|session| session.acquire())
    }

    /// References to every registered session, in creation order.
    pub fn sessions(&self) -> Vec<Session> {
        let inner = self.lock();
        inner.sessions.values().map(Session::share).collect()
    }

    /// Sessions for `username` that are not already terminating.
    pub fn find_by_username(&self, username: &str) -> Vec<Session> {
        self.sessions()
            .into_iter()
            .filter(|session| {
                !session.state().is_terminating()
                    && session.username().as_deref() == Some(username)
            })
            .collect()
    }

    /// Current counters.
    pub fn stat(&self) -> SessionStat {
        self.lock().stat
    }

    /// Counters and registry size, read atomically together.
    pub fn stat_and_len(&self) -> (SessionStat, usize) {
        let inner = self.lock();
        (inner.stat, inner.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().sessions.is_empty()
    }

    /// Subscribes to lifecycle events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// A receiver that observes every counter change.
    pub fn watch_stat(&self) -> watch::Receiver<SessionStat> {
        self.stat_tx.subscribe()
    }

    /// Stops accepting new sessions. Existing sessions are not touched.
    pub fn begin_shutdown(&self) {
        if !self.shutting_down.swap(true, Ordering::SeqCst) {
            tracing::info!("session registry shutting down");
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Terminates every session that is not already terminating. Returns
    /// how many terminations this call initiated.
    pub fn terminate_all(&self, cause: TerminateCause, hard: bool) -> usize {
        let mut initiated = 0;
        for session in self.sessions() {
            if session.terminate(cause, hard) {
                initiated += 1;
            }
        }
        tracing::info!(%cause, hard, initiated, "terminated all sessions");
        initiated
    }

    /// Backups of every active session, in creation order.
    pub fn backup_all(&self) -> Vec<SessionBackup> {
        self.sessions().iter().filter_map(Session::backup).collect()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (stat, len) = self.stat_and_len();
        f.debug_struct("SessionRegistry")
            .field("len", &len)
            .field("stat", &stat)
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `SessionRegistry`.
    //!
    //! Naming convention: `test_{function}_{scenario}_{expected}`.
    //!
    //! Every test checks the counters against the registry size after the
    //! operation under test, since that agreement is what the rest of the
    //! system relies on.

    use accel_protocol::Counters;

    use super::*;
    use crate::CtrlKind;
    use crate::testing::{MockCtrl, registry, static_net};

    fn assert_consistent(reg: &SessionRegistry) {
        let (stat, len) = reg.stat_and_len();
        assert_eq!(stat.total(), len, "counters disagree with registry: {stat:?}");
    }

    // =====================================================================
    // create()
    // =====================================================================

    #[test]
    fn test_create_counts_as_starting() {
        let reg = registry();
        let s = reg.create(MockCtrl::ppp(), static_net()).unwrap();

        assert_eq!(reg.stat().starting, 1);
        assert_eq!(reg.len(), 1);
        assert!(reg.get(s.id()).is_some());
        assert_consistent(&reg);
    }

    #[test]
    fn test_create_assigns_unique_ids() {
        let reg = registry();
        let a = reg.create(MockCtrl::ppp(), static_net()).unwrap();
        let b = reg.create(MockCtrl::ppp(), static_net()).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_create_after_shutdown_returns_error() {
        let reg = registry();
        reg.begin_shutdown();

        let result = reg.create(MockCtrl::ppp(), static_net());

        assert!(matches!(result, Err(SessionError::ShuttingDown)));
        assert!(reg.is_empty());
    }

    // =====================================================================
    // transitions
    // =====================================================================

    #[test]
    fn test_started_moves_starting_to_active() {
        let reg = registry();
        let s = reg.create(MockCtrl::ppp(), static_net()).unwrap();
        s.started().unwrap();

        assert_eq!(reg.stat(), SessionStat { starting: 0, active: 1, finishing: 0 });
        assert_consistent(&reg);
    }

    #[test]
    fn test_terminate_moves_active_to_finishing() {
        let reg = registry();
        let s = reg.create(MockCtrl::ppp(), static_net()).unwrap();
        s.started().unwrap();
        s.terminate(TerminateCause::UserRequest, false);

        assert_eq!(reg.stat(), SessionStat { starting: 0, active: 0, finishing: 1 });
        assert_consistent(&reg);
    }

    #[test]
    fn test_terminate_from_starting_moves_to_finishing() {
        let reg = registry();
        let s = reg.create(MockCtrl::ppp(), static_net()).unwrap();
        s.terminate(TerminateCause::AuthError, false);

        assert_eq!(reg.stat(), SessionStat { starting: 0, active: 0, finishing: 1 });
        assert_consistent(&reg);
    }

    #[test]
    fn test_finished_removes_from_registry() {
        let reg = registry();
        let s = reg.create(MockCtrl::ppp(), static_net()).unwrap();
        s.started().unwrap();
        s.terminate(TerminateCause::UserRequest, false);
        s.finished();

        assert!(reg.is_empty());
        assert!(reg.get(s.id()).is_none());
        assert_eq!(reg.stat(), SessionStat::default());
    }

    // =====================================================================
    // lookups
    // =====================================================================

    #[test]
    fn test_sessions_returns_creation_order() {
        let reg = registry();
        let ids: Vec<_> = (0..5)
            .map(|_| reg.create(MockCtrl::ppp(), static_net()).unwrap().id())
            .collect();

        let listed: Vec<_> = reg.sessions().iter().map(Session::id).collect();
        assert_eq!(listed, ids);
    }

    #[test]
    fn test_find_by_username_skips_terminating_sessions() {
        let reg = registry();
        let a = reg.create(MockCtrl::ppp(), static_net()).unwrap();
        let b = reg.create(MockCtrl::ppp(), static_net()).unwrap();
        a.set_username("alice").unwrap();
        b.set_username("alice").unwrap();
        a.terminate(TerminateCause::UserRequest, false);

        let found = reg.find_by_username("alice");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), b.id());
    }

    // =====================================================================
    // restore()
    // =====================================================================

    fn backup_of(reg: &Arc<SessionRegistry>) -> SessionBackup {
        let ctrl = MockCtrl::ppp();
        ctrl.set_stats(Counters {
            rx_bytes: 4096,
            tx_bytes: 8192,
            rx_packets: 40,
            tx_packets: 80,
        });
        let s = reg.create(ctrl, static_net()).unwrap();
        s.set_username("bob").unwrap();
        s.started().unwrap();
        s.read_stats();
        s.backup().unwrap()
    }

    #[test]
    fn test_restore_registers_in_restore_state() {
        let old = registry();
        let backup = backup_of(&old);

        let reg = registry();
        let s = reg.restore(backup.clone(), MockCtrl::ppp(), static_net()).unwrap();

        assert_eq!(s.id(), backup.session_id);
        assert_eq!(s.state(), crate::SessionState::Restore);
        assert_eq!(s.username().as_deref(), Some("bob"));
        assert_eq!(s.counters().rx_bytes, 4096);
        assert_eq!(reg.stat().starting, 1);
        assert_consistent(&reg);
    }

    #[test]
    fn test_restore_wrong_kind_returns_mismatch() {
        let old = registry();
        let backup = backup_of(&old);

        let result = registry().restore(backup, MockCtrl::new(CtrlKind::Ipoe), static_net());

        assert!(matches!(
            result,
            Err(SessionError::BackupMismatch { expected: CtrlKind::Ppp, actual: CtrlKind::Ipoe, .. })
        ));
    }

    #[test]
    fn test_restore_duplicate_id_returns_error() {
        let old = registry();
        let backup = backup_of(&old);

        let reg = registry();
        let _first = reg.restore(backup.clone(), MockCtrl::ppp(), static_net()).unwrap();
        let result = reg.restore(backup, MockCtrl::ppp(), static_net());

        assert!(matches!(result, Err(SessionError::AlreadyRegistered(_))));
        assert_eq!(reg.len(), 1);
    }

    // =====================================================================
    // terminate_all() / backup_all()
    // =====================================================================

    #[test]
    fn test_terminate_all_counts_only_new_terminations() {
        let reg = registry();
        let a = reg.create(MockCtrl::ppp(), static_net()).unwrap();
        let _b = reg.create(MockCtrl::ppp(), static_net()).unwrap();
        a.terminate(TerminateCause::UserRequest, false);

        let initiated = reg.terminate_all(TerminateCause::NasReboot, true);

        assert_eq!(initiated, 1);
        assert_eq!(reg.stat().finishing, 2);
        assert_eq!(a.terminate_cause(), Some(TerminateCause::UserRequest));
    }

    #[test]
    fn test_backup_all_skips_sessions_not_active() {
        let reg = registry();
        let a = reg.create(MockCtrl::ppp(), static_net()).unwrap();
        let _b = reg.create(MockCtrl::ppp(), static_net()).unwrap();
        a.started().unwrap();

        let backups = reg.backup_all();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].session_id, a.id());
    }

    // =====================================================================
    // events
    // =====================================================================

    #[test]
    fn test_subscribe_sees_lifecycle_in_order() {
        let reg = registry();
        let mut rx = reg.subscribe();

        let s = reg.create(MockCtrl::ppp(), static_net()).unwrap();
        let id = s.id();
        s.started().unwrap();
        s.terminate(TerminateCause::UserRequest, false);
        s.finished();

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            events,
            vec![
                SessionEvent::Starting { id, restored: false },
                SessionEvent::Started { id },
                SessionEvent::Finishing { id, cause: TerminateCause::UserRequest },
                SessionEvent::IfDown { id },
                SessionEvent::Finished { id, cause: TerminateCause::UserRequest },
            ]
        );
    }

    #[test]
    fn test_watch_stat_observes_changes() {
        let reg = registry();
        let rx = reg.watch_stat();

        let s = reg.create(MockCtrl::ppp(), static_net()).unwrap();
        s.started().unwrap();

        assert_eq!(rx.borrow().active, 1);
    }
}

//! The session object and its state machine.
//!
//! A session is the core's record of one subscriber connection. It is
//! shared between the registry (for enumeration), the front-end (for
//! lifecycle calls) and any task holding a [`WeakSession`]. The last
//! strong reference to go away frees it.
//!
//! ```text
//!   Starting ──(started)──→ Active ──(terminate)──→ Finishing ──(finished)──→ Terminated
//!      │                                              ↑    ↑
//!      └───────────────────(terminate)────────────────┘    │
//!   Restore ──(started)──→ Active                           │
//!      └───────────────────(terminate)─────────────────────┘
//! ```
//!
//! Every transition updates the registry's aggregate counters under the
//! session's own lock, so the counters and the session states never
//! disagree. Locks are never held while calling the front-end.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4, SocketAddrV6};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use accel_net::{NetHandle, validate_ifname};
use accel_protocol::{Counters, Dhcpv6Option, SessionId, TerminateCause, match_client_id};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::extensions::{Extensions, SessionExtension};
use crate::registry::StatSlot;
use crate::traffic::{AcctRecord, Traffic};
use crate::{
    ControlInterface, CtrlError, CtrlKind, Ipv4Lease, Ipv6Lease, SessionBackup, SessionError,
    SessionEvent, SessionRegistry,
};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// What to do when a user who already has a session authenticates again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SingleSessionPolicy {
    /// Allow any number of sessions per user.
    #[default]
    Off,
    /// Refuse the new login.
    Deny,
    /// Terminate the older session and accept the new one.
    Replace,
}

/// Configuration shared by every session in a registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle timeout applied to new sessions. `None` disables it.
    pub idle_timeout: Option<Duration>,

    /// Session timeout applied to new sessions. `None` disables it.
    pub session_timeout: Option<Duration>,

    /// Policy for duplicate usernames.
    pub single_session: SingleSessionPolicy,

    /// Capacity of the lifecycle event channel. Subscribers that fall
    /// further behind than this lose events.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: None,
            session_timeout: None,
            single_session: SingleSessionPolicy::Off,
            event_capacity: 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Lifecycle state of a session.
///
/// Flags that only make sense while tearing down (hard vs. soft, whether
/// the interface is already down) live inside [`Finishing`](Self::Finishing),
/// so a terminated-but-active session cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// Fresh session: authentication and address assignment in progress.
    Starting,
    /// Rebuilt from a backup after a restart, waiting to be re-validated.
    Restore,
    /// Traffic flowing, accounting running.
    Active,
    /// Termination requested; the front-end is cleaning up.
    Finishing {
        /// Termination skips graceful protocol shutdown.
        hard: bool,
        /// The interface has been torn down.
        down: bool,
    },
    /// Cleanup complete; the session has left the registry.
    Terminated,
}

impl SessionState {
    /// Returns `true` once termination has begun.
    pub fn is_terminating(self) -> bool {
        matches!(self, Self::Finishing { .. } | Self::Terminated)
    }

    /// Returns `true` for states that have not reached ACTIVE yet.
    pub fn is_starting(self) -> bool {
        matches!(self, Self::Starting | Self::Restore)
    }

    /// The registry counter this state is counted under.
    pub(crate) fn slot(self) -> Option<StatSlot> {
        match self {
            Self::Starting | Self::Restore => Some(StatSlot::Starting),
            Self::Active => Some(StatSlot::Active),
            Self::Finishing { .. } => Some(StatSlot::Finishing),
            Self::Terminated => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Restore => write!(f, "restore"),
            Self::Active => write!(f, "active"),
            Self::Finishing { .. } => write!(f, "finishing"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionInfo
// ---------------------------------------------------------------------------

/// Point-in-time view of a session, for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub kind: CtrlKind,
    pub state: SessionState,
    pub username: Option<String>,
    pub ifname: Option<String>,
    pub ifindex: Option<u32>,
    pub hwaddr: Option<String>,
    pub vrf_name: Option<String>,
    pub counters: Counters,
    pub uptime: Option<Duration>,
    pub terminate_cause: Option<TerminateCause>,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

struct SessionData {
    state: SessionState,
    terminate_cause: Option<TerminateCause>,

    username: Option<String>,
    hwaddr: Option<String>,
    comp: Option<String>,

    ifname: Option<String>,
    ifname_rename: Option<String>,
    ifindex: Option<u32>,
    vrf_name: Option<String>,
    ipv4_addr: Option<SocketAddrV4>,
    ipv6_addr: Option<SocketAddrV6>,
    ipv4: Option<Arc<Ipv4Lease>>,
    ipv6: Option<Arc<Ipv6Lease>>,

    traffic: Traffic,
    acct_started: bool,

    start_time: Option<SystemTime>,
    started_at: Option<Instant>,
    idle_since: Instant,
    stop_time: Option<SystemTime>,
    idle_timeout: Option<Duration>,
    session_timeout: Option<Duration>,
}

impl SessionData {
    fn new(state: SessionState, idle_timeout: Option<Duration>, session_timeout: Option<Duration>) -> Self {
        Self {
            state,
            terminate_cause: None,
            username: None,
            hwaddr: None,
            comp: None,
            ifname: None,
            ifname_rename: None,
            ifindex: None,
            vrf_name: None,
            ipv4_addr: None,
            ipv6_addr: None,
            ipv4: None,
            ipv6: None,
            traffic: Traffic::default(),
            acct_started: false,
            start_time: None,
            started_at: None,
            idle_since: Instant::now(),
            stop_time: None,
            idle_timeout,
            session_timeout,
        }
    }

    /// Folds a link reading into the totals. Incoming packets from the
    /// subscriber reset the idle clock.
    fn apply_reading(&mut self, reading: Counters) {
        let before = self.traffic.totals().rx_packets;
        self.traffic.update(reading);
        if self.traffic.totals().rx_packets != before {
            self.idle_since = Instant::now();
        }
    }
}

struct SessionInner {
    id: SessionId,
    ctrl: Arc<dyn ControlInterface>,
    net: NetHandle,
    registry: Arc<SessionRegistry>,
    data: Mutex<SessionData>,
    extensions: Mutex<Extensions>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let extensions = self
            .extensions
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        let attached = extensions.len();
        extensions.release_all(self.id);
        tracing::debug!(session_id = %self.id, extensions = attached, "session freed");
    }
}

/// A strong reference to a subscriber session.
///
/// There is deliberately no `Clone`: new references come from
/// [`acquire`](Self::acquire), which refuses once the session has
/// terminated. Dropping a `Session` releases the reference; the last
/// release frees the session and releases its extensions.
pub struct Session {
    inner: Arc<SessionInner>,
}

/// A reference that does not keep the session alive.
///
/// Timer tasks and other contexts that outlive a single event hold one of
/// these and [`acquire`](Self::acquire) a strong reference per use.
#[derive(Clone)]
pub struct WeakSession {
    id: SessionId,
    inner: Weak<SessionInner>,
}

impl WeakSession {
    /// Takes a strong reference, unless the session has been freed or has
    /// terminated.
    ///
    /// The upgraded pointer is only turned into a [`Session`] after the
    /// state check; a terminated session drops it straight back.
    pub fn acquire(&self) -> Option<Session> {
        let inner = self.inner.upgrade()?;
        let terminated = inner
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
            == SessionState::Terminated;
        if terminated {
            return None;
        }
        Some(Session { inner })
    }

    /// The session's id, available even after it is freed.
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl fmt::Debug for WeakSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakSession").field("id", &self.id).finish()
    }
}

impl Session {
    pub(crate) fn fresh(
        id: SessionId,
        registry: Arc<SessionRegistry>,
        ctrl: Arc<dyn ControlInterface>,
        net: NetHandle,
    ) -> Self {
        let config = registry.config();
        let data = SessionData::new(SessionState::Starting, config.idle_timeout, config.session_timeout);
        Self::with_data(id, registry, ctrl, net, data)
    }

    pub(crate) fn from_backup(
        backup: SessionBackup,
        registry: Arc<SessionRegistry>,
        ctrl: Arc<dyn ControlInterface>,
        net: NetHandle,
    ) -> Self {
        let mut data = SessionData::new(SessionState::Restore, backup.idle_timeout, backup.session_timeout);

        let start_time = UNIX_EPOCH + Duration::from_secs(backup.start_time);
        let age = SystemTime::now().duration_since(start_time).unwrap_or_default();
        let now = Instant::now();
        data.start_time = Some(start_time);
        data.started_at = Some(now.checked_sub(age).unwrap_or(now));

        data.username = backup.username;
        data.ifname = backup.ifname;
        data.hwaddr = backup.hwaddr;
        data.vrf_name = backup.vrf_name;
        data.ipv4_addr = backup.ipv4_addr;
        data.ipv6_addr = backup.ipv6_addr;
        data.traffic = Traffic::restored(backup.counters);
        data.acct_started = backup.acct_started;

        Self::with_data(backup.session_id, registry, ctrl, net, data)
    }

    fn with_data(
        id: SessionId,
        registry: Arc<SessionRegistry>,
        ctrl: Arc<dyn ControlInterface>,
        net: NetHandle,
        data: SessionData,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id,
                ctrl,
                net,
                registry,
                data: Mutex::new(data),
                extensions: Mutex::new(Extensions::default()),
            }),
        }
    }

    fn data(&self) -> MutexGuard<'_, SessionData> {
        self.inner.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn extensions(&self) -> MutexGuard<'_, Extensions> {
        self.inner
            .extensions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn invalid(&self, state: SessionState, op: &'static str) -> SessionError {
        if state.is_terminating() {
            SessionError::Terminating(self.id())
        } else {
            SessionError::InvalidState {
                id: self.id(),
                state,
                op,
            }
        }
    }

    fn ensure_alive(&self) -> Result<(), SessionError> {
        if self.state().is_terminating() {
            return Err(SessionError::Terminating(self.id()));
        }
        Ok(())
    }

    /// Runs a front-end call, logging a failure before handing it back.
    fn ctrl_call(
        &self,
        op: &'static str,
        call: impl FnOnce(&dyn ControlInterface) -> Result<(), CtrlError>,
    ) -> Result<(), SessionError> {
        call(self.inner.ctrl.as_ref()).map_err(|e| {
            tracing::warn!(session_id = %self.id(), op, error = %e, "front-end call failed");
            SessionError::from(e)
        })
    }

    pub(crate) fn share(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }

    // -- References -------------------------------------------------------

    /// Takes another strong reference. Returns `None` once the session has
    /// terminated: nothing may extend a finished session's lifetime.
    pub fn acquire(&self) -> Option<Session> {
        let data = self.data();
        if data.state == SessionState::Terminated {
            return None;
        }
        Some(self.share())
    }

    /// A weak reference for use from other contexts.
    pub fn downgrade(&self) -> WeakSession {
        WeakSession {
            id: self.id(),
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Number of live strong references (registry included).
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Returns `true` if both references point at the same session.
    pub fn ptr_eq(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // -- Accessors --------------------------------------------------------

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn ctrl_kind(&self) -> CtrlKind {
        self.inner.ctrl.kind()
    }

    /// The namespace the session's interface lives in.
    pub fn net(&self) -> &NetHandle {
        &self.inner.net
    }

    pub fn state(&self) -> SessionState {
        self.data().state
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == SessionState::Terminated
    }

    pub fn terminate_cause(&self) -> Option<TerminateCause> {
        self.data().terminate_cause
    }

    pub fn username(&self) -> Option<String> {
        self.data().username.clone()
    }

    pub fn ifname(&self) -> Option<String> {
        self.data().ifname.clone()
    }

    /// Name the interface will take when it comes up, if a rename was
    /// requested before that.
    pub fn pending_ifname(&self) -> Option<String> {
        self.data().ifname_rename.clone()
    }

    pub fn ifindex(&self) -> Option<u32> {
        self.data().ifindex
    }

    pub fn hwaddr(&self) -> Option<String> {
        self.data().hwaddr.clone()
    }

    pub fn comp(&self) -> Option<String> {
        self.data().comp.clone()
    }

    pub fn vrf_name(&self) -> Option<String> {
        self.data().vrf_name.clone()
    }

    pub fn ipv4_addr(&self) -> Option<SocketAddrV4> {
        self.data().ipv4_addr
    }

    pub fn ipv6_addr(&self) -> Option<SocketAddrV6> {
        self.data().ipv6_addr
    }

    pub fn ipv4_lease(&self) -> Option<Arc<Ipv4Lease>> {
        self.data().ipv4.clone()
    }

    pub fn ipv6_lease(&self) -> Option<Arc<Ipv6Lease>> {
        self.data().ipv6.clone()
    }

    /// Totals as of the last link reading. See [`read_stats`](Self::read_stats)
    /// for a fresh reading.
    pub fn counters(&self) -> Counters {
        self.data().traffic.totals()
    }

    pub fn acct_started(&self) -> bool {
        self.data().acct_started
    }

    pub fn start_time(&self) -> Option<SystemTime> {
        self.data().start_time
    }

    pub fn stop_time(&self) -> Option<SystemTime> {
        self.data().stop_time
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.data().idle_timeout
    }

    pub fn session_timeout(&self) -> Option<Duration> {
        self.data().session_timeout
    }

    /// Snapshot for status reporting.
    pub fn info(&self) -> SessionInfo {
        let kind = self.ctrl_kind();
        let data = self.data();
        SessionInfo {
            id: self.id(),
            kind,
            state: data.state,
            username: data.username.clone(),
            ifname: data.ifname.clone(),
            ifindex: data.ifindex,
            hwaddr: data.hwaddr.clone(),
            vrf_name: data.vrf_name.clone(),
            counters: data.traffic.totals(),
            uptime: data.started_at.map(|t| t.elapsed()),
            terminate_cause: data.terminate_cause,
        }
    }

    // -- Identity and binding ---------------------------------------------

    /// Sets the username, applying the registry's single-session policy.
    ///
    /// # Errors
    /// - [`SessionError::Terminating`] if the session is tearing down
    /// - [`SessionError::DuplicateUsername`] under [`SingleSessionPolicy::Deny`]
    pub fn set_username(&self, username: &str) -> Result<(), SessionError> {
        self.ensure_alive()?;

        let policy = self.inner.registry.config().single_session;
        if policy == SingleSessionPolicy::Off {
            return self.store_username(username);
        }

        let others = {
            let _login = self.inner.registry.lock_logins();
            let others: Vec<Session> = self
                .inner
                .registry
                .find_by_username(username)
                .into_iter()
                .filter(|other| other.id() != self.id())
                .collect();

            if !others.is_empty() && policy == SingleSessionPolicy::Deny {
                tracing::info!(session_id = %self.id(), username, "duplicate login denied");
                return Err(SessionError::DuplicateUsername(username.to_string()));
            }
            self.store_username(username)?;
            others
        };

        for other in others {
            tracing::info!(
                session_id = %self.id(),
                replaced = %other.id(),
                username,
                "replacing older session for user"
            );
            other.terminate(TerminateCause::AdminReset, false);
        }
        Ok(())
    }

    fn store_username(&self, username: &str) -> Result<(), SessionError> {
        let mut data = self.data();
        if data.state.is_terminating() {
            return Err(SessionError::Terminating(self.id()));
        }
        data.username = Some(username.to_string());
        Ok(())
    }

    /// Records the interface the front-end created for this session.
    pub fn set_ifname(&self, ifname: &str) -> Result<(), SessionError> {
        validate_ifname(ifname)?;
        let mut data = self.data();
        if data.state.is_terminating() {
            return Err(SessionError::Terminating(self.id()));
        }
        data.ifname = Some(ifname.to_string());
        Ok(())
    }

    /// Renames the session's interface.
    ///
    /// Before the interface is up the new name is kept pending and applied
    /// by [`ifup`](Self::ifup). On an active session the name must already
    /// resolve in the session's namespace.
    pub fn rename(&self, ifname: &str) -> Result<(), SessionError> {
        validate_ifname(ifname)?;

        let state = self.state();
        if state.is_starting() {
            let mut data = self.data();
            if !data.state.is_starting() {
                return Err(self.invalid(data.state, "rename"));
            }
            data.ifname_rename = Some(ifname.to_string());
            tracing::debug!(session_id = %self.id(), ifname, "rename deferred until interface is up");
            return Ok(());
        }
        if state != SessionState::Active {
            return Err(self.invalid(state, "rename"));
        }

        let ifindex = self.inner.net.get_ifindex(ifname)?;
        let mut data = self.data();
        if data.state != SessionState::Active {
            return Err(self.invalid(data.state, "rename"));
        }
        let old = data.ifname.replace(ifname.to_string());
        data.ifindex = Some(ifindex);
        self.inner.registry.emit(SessionEvent::Renamed {
            id: self.id(),
            ifname: ifname.to_string(),
        });
        tracing::info!(session_id = %self.id(), old = ?old, new = ifname, "interface renamed");
        Ok(())
    }

    /// Binds the session to a VRF. An empty name unbinds it.
    pub fn bind_vrf(&self, vrf_name: &str) -> Result<(), SessionError> {
        let vrf = if vrf_name.is_empty() {
            None
        } else {
            validate_ifname(vrf_name)?;
            Some(vrf_name.to_string())
        };

        let mut data = self.data();
        if data.state.is_terminating() {
            return Err(SessionError::Terminating(self.id()));
        }
        tracing::debug!(session_id = %self.id(), vrf = ?vrf, "vrf binding changed");
        data.vrf_name = vrf;
        Ok(())
    }

    pub fn set_hwaddr(&self, hwaddr: impl Into<String>) {
        self.data().hwaddr = Some(hwaddr.into());
    }

    pub fn set_comp(&self, comp: impl Into<String>) {
        self.data().comp = Some(comp.into());
    }

    pub fn set_ipv4_addr(&self, addr: Option<SocketAddrV4>) {
        self.data().ipv4_addr = addr;
    }

    pub fn set_ipv6_addr(&self, addr: Option<SocketAddrV6>) {
        self.data().ipv6_addr = addr;
    }

    pub fn set_ipv4_lease(&self, lease: Option<Arc<Ipv4Lease>>) {
        self.data().ipv4 = lease;
    }

    /// Attaches an IPv6 lease. On an active session the front-end is asked
    /// to push the change to the link.
    pub fn set_ipv6_lease(&self, lease: Option<Arc<Ipv6Lease>>) -> Result<(), SessionError> {
        let active = {
            let mut data = self.data();
            data.ipv6 = lease;
            data.state == SessionState::Active
        };
        if active {
            self.ctrl_call("update_ipv6_addr", |ctrl| ctrl.update_ipv6_addr(self))?;
        }
        Ok(())
    }

    pub fn set_idle_timeout(&self, timeout: Option<Duration>) {
        self.data().idle_timeout = timeout;
    }

    pub fn set_session_timeout(&self, timeout: Option<Duration>) {
        self.data().session_timeout = timeout;
    }

    // -- Lifecycle --------------------------------------------------------

    /// Asks the front-end to begin: `start` for a fresh session, `restart`
    /// for a restored one.
    pub fn start(&self) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Starting => self.ctrl_call("start", |ctrl| ctrl.start(self)),
            SessionState::Restore => self.ctrl_call("restart", |ctrl| ctrl.restart(self)),
            other => Err(self.invalid(other, "start")),
        }
    }

    /// The interface is up: apply a pending rename, resolve the interface
    /// index, let the front-end configure the link, then go ACTIVE.
    ///
    /// # Errors
    /// - [`SessionError::Net`] if the interface name does not resolve
    /// - [`SessionError::Terminating`] if termination already began
    pub fn ifup(&self) -> Result<(), SessionError> {
        let target = {
            let data = self.data();
            if !data.state.is_starting() {
                return Err(self.invalid(data.state, "ifup"));
            }
            data.ifname_rename.clone().or_else(|| data.ifname.clone())
        };

        let ifindex = match &target {
            Some(name) => Some(self.inner.net.get_ifindex(name)?),
            None => None,
        };

        {
            let mut data = self.data();
            if !data.state.is_starting() {
                return Err(self.invalid(data.state, "ifup"));
            }
            if let Some(pending) = data.ifname_rename.take() {
                data.ifname = Some(pending.clone());
                self.inner.registry.emit(SessionEvent::Renamed {
                    id: self.id(),
                    ifname: pending,
                });
            }
            data.ifindex = ifindex;
        }

        // Configuration failures are the front-end's to handle.
        let _ = self.ctrl_call("ifcfg", |ctrl| ctrl.ifcfg(self));
        self.inner.registry.emit(SessionEvent::PreUp { id: self.id() });

        self.started()
    }

    /// Moves STARTING (or RESTORE) to ACTIVE.
    ///
    /// A fresh session records its start time here; a restored one keeps
    /// the start time and counters from its backup.
    ///
    /// # Errors
    /// - [`SessionError::Terminating`] if termination already began
    /// - [`SessionError::InvalidState`] if the session is already active
    pub fn started(&self) -> Result<(), SessionError> {
        let mut data = self.data();
        let restored = match data.state {
            SessionState::Starting => false,
            SessionState::Restore => true,
            other => return Err(self.invalid(other, "start")),
        };

        let now = Instant::now();
        if !restored || data.started_at.is_none() {
            data.start_time = Some(SystemTime::now());
            data.started_at = Some(now);
        }
        data.idle_since = now;
        data.state = SessionState::Active;
        self.inner
            .registry
            .transition(Some(StatSlot::Starting), Some(StatSlot::Active));
        self.inner.registry.emit(SessionEvent::Started { id: self.id() });

        tracing::info!(
            session_id = %self.id(),
            ifname = ?data.ifname,
            username = ?data.username,
            restored,
            "session started"
        );
        Ok(())
    }

    /// Requests termination.
    ///
    /// Only the first call has any effect: it records `cause`, moves the
    /// session to FINISHING and asks the front-end to tear down (`hard`
    /// skips graceful shutdown). Returns `true` if this call initiated
    /// termination.
    pub fn terminate(&self, cause: TerminateCause, hard: bool) -> bool {
        {
            let mut data = self.data();
            let from = data.state;
            if from.is_terminating() {
                tracing::debug!(session_id = %self.id(), %cause, "terminate ignored, already terminating");
                return false;
            }
            data.state = SessionState::Finishing { hard, down: false };
            let cause = *data.terminate_cause.get_or_insert(cause);
            self.inner
                .registry
                .transition(from.slot(), Some(StatSlot::Finishing));
            self.inner
                .registry
                .emit(SessionEvent::Finishing { id: self.id(), cause });
        }

        tracing::info!(session_id = %self.id(), %cause, hard, "terminating session");
        let _ = self.ctrl_call("terminate", |ctrl| ctrl.terminate(self, hard));
        true
    }

    /// The interface has been torn down. Only meaningful while FINISHING;
    /// returns `false` if it was already down.
    pub fn ifdown(&self) -> Result<bool, SessionError> {
        let mut data = self.data();
        match data.state {
            SessionState::Finishing { hard, down: false } => {
                data.state = SessionState::Finishing { hard, down: true };
                self.inner.registry.emit(SessionEvent::IfDown { id: self.id() });
                tracing::debug!(session_id = %self.id(), "interface down");
                Ok(true)
            }
            SessionState::Finishing { down: true, .. } => Ok(false),
            other => Err(SessionError::InvalidState {
                id: self.id(),
                state: other,
                op: "ifdown",
            }),
        }
    }

    /// The front-end has finished cleaning up.
    ///
    /// Brings the interface down if nobody did, marks the session
    /// terminated and removes it from the registry. A front-end that lost
    /// its link without a termination request may call this directly; the
    /// cause is then recorded as [`TerminateCause::NasError`]. Returns
    /// `false` if the session had already finished.
    pub fn finished(&self) -> bool {
        let (cause, registry_ref) = {
            let mut data = self.data();
            let from = data.state;
            let down = match from {
                SessionState::Terminated => return false,
                SessionState::Finishing { down, .. } => down,
                _ => {
                    tracing::debug!(session_id = %self.id(), state = %from, "finished without termination request");
                    false
                }
            };

            let cause = *data.terminate_cause.get_or_insert(TerminateCause::NasError);
            if !from.is_terminating() {
                self.inner
                    .registry
                    .emit(SessionEvent::Finishing { id: self.id(), cause });
            }
            if !down {
                self.inner.registry.emit(SessionEvent::IfDown { id: self.id() });
            }

            // Unregister first: every handle the registry hands out is
            // taken before the session reads as terminated.
            let registry_ref = self.inner.registry.remove(self.id(), from.slot());
            data.state = SessionState::Terminated;
            data.stop_time = Some(SystemTime::now());
            self.inner
                .registry
                .emit(SessionEvent::Finished { id: self.id(), cause });
            (cause, registry_ref)
        };

        let totals = self.counters();
        tracing::info!(
            session_id = %self.id(),
            %cause,
            rx_bytes = totals.rx_bytes,
            tx_bytes = totals.tx_bytes,
            "session finished"
        );
        self.inner.ctrl.finished(self);

        // The registry's reference goes last, after every callback ran.
        drop(registry_ref);
        true
    }

    // -- Accounting -------------------------------------------------------

    /// Marks accounting as started and notifies the front-end. Happens at
    /// most once per session; later calls return `Ok(false)`.
    pub fn accounting_started(&self) -> Result<bool, SessionError> {
        {
            let mut data = self.data();
            if data.state != SessionState::Active {
                return Err(self.invalid(data.state, "start accounting"));
            }
            if data.acct_started {
                return Ok(false);
            }
            data.acct_started = true;
            data.traffic.reset_interval();
            self.inner.registry.emit(SessionEvent::AcctStart { id: self.id() });
        }

        let _ = self.ctrl_call("acct_start", |ctrl| ctrl.acct_start(self));
        Ok(true)
    }

    /// Refreshes counters from the front-end and returns the totals.
    pub fn read_stats(&self) -> Counters {
        if self.is_terminated() {
            return self.counters();
        }
        let reading = self.inner.ctrl.read_stats(self);
        let mut data = self.data();
        if let Some(reading) = reading {
            data.apply_reading(reading);
        }
        data.traffic.totals()
    }

    /// Closes the current accounting interval.
    pub fn interim_accounting(&self) -> AcctRecord {
        self.read_stats();
        let mut data = self.data();
        let (interval, totals) = data.traffic.take_interval();
        AcctRecord {
            session_id: self.id(),
            interval,
            totals,
            session_time: data
                .started_at
                .map(|t| t.elapsed())
                .unwrap_or_default(),
        }
    }

    /// Checks session and idle timeouts on an active session. Returns the
    /// cause to terminate with, if one has expired.
    pub fn check_timeouts(&self) -> Option<TerminateCause> {
        if self.state() != SessionState::Active {
            return None;
        }
        self.read_stats();

        let data = self.data();
        if data.state != SessionState::Active {
            return None;
        }
        let now = Instant::now();
        if let (Some(limit), Some(started_at)) = (data.session_timeout, data.started_at) {
            if now.saturating_duration_since(started_at) >= limit {
                return Some(TerminateCause::SessionTimeout);
            }
        }
        if let Some(limit) = data.idle_timeout {
            if now.saturating_duration_since(data.idle_since) >= limit {
                return Some(TerminateCause::IdleTimeout);
            }
        }
        None
    }

    // -- Front-end pass-throughs ------------------------------------------

    /// Applies new shaper rates (kbit/s).
    pub fn change_shaper(&self, down: u32, up: u32) -> Result<(), SessionError> {
        self.ensure_alive()?;
        self.ctrl_call("change_shaper", |ctrl| ctrl.change_shaper(self, down, up))
    }

    pub fn set_mtu(&self, mtu: u16) -> Result<(), SessionError> {
        self.ensure_alive()?;
        self.ctrl_call("set_mtu", |ctrl| ctrl.set_mtu(self, mtu))
    }

    pub fn set_gw_addr(&self, addr: Ipv4Addr) -> Result<(), SessionError> {
        self.ensure_alive()?;
        self.ctrl_call("set_gw_addr", |ctrl| ctrl.set_gw_addr(self, addr))
    }

    pub fn delay_close(&self) -> Result<(), SessionError> {
        self.ctrl_call("delay_close", |ctrl| ctrl.delay_close(self))
    }

    /// Installs MPPE keys negotiated during authentication.
    pub fn set_mppe_keys(&self, send_key: &[u8], recv_key: &[u8]) -> Result<(), SessionError> {
        self.ensure_alive()?;
        self.inner.ctrl.set_mppe_keys(self, send_key, recv_key);
        Ok(())
    }

    /// Returns `true` if a DHCPv6 client identifier plausibly belongs to
    /// this session. Only IPoE sessions carry a hardware address to match
    /// against; every other kind returns `false`.
    pub fn match_client_id(&self, client_id: &Dhcpv6Option) -> bool {
        if self.ctrl_kind() != CtrlKind::Ipoe {
            return false;
        }
        match self.inner.ctrl.hwaddr(self) {
            Some(hwaddr) => match_client_id(&hwaddr, client_id),
            None => false,
        }
    }

    // -- Extensions -------------------------------------------------------

    /// Attaches `value`, replacing (and returning) any earlier value of the
    /// same type. A replaced value is not released.
    pub fn insert_extension<T: SessionExtension>(&self, value: T) -> Option<T> {
        self.extensions().insert(value)
    }

    /// Runs `f` on the attached `T`, if any.
    ///
    /// The extension map is locked while `f` runs; `f` must not touch
    /// this session's extensions again.
    pub fn with_extension<T: SessionExtension, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.extensions().get_mut::<T>().map(f)
    }

    /// Detaches and returns the `T`, without releasing it.
    pub fn remove_extension<T: SessionExtension>(&self) -> Option<T> {
        self.extensions().remove::<T>()
    }

    pub fn has_extension<T: SessionExtension>(&self) -> bool {
        self.extensions().contains::<T>()
    }

    // -- Backup -----------------------------------------------------------

    /// Snapshot for persistence across a restart. Only active sessions are
    /// worth restoring.
    pub fn backup(&self) -> Option<SessionBackup> {
        let kind = self.ctrl_kind();
        let data = self.data();
        if data.state != SessionState::Active {
            return None;
        }
        let start_time = data
            .start_time
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or_default();

        Some(SessionBackup {
            session_id: self.id(),
            ctrl_kind: kind,
            username: data.username.clone(),
            ifname: data.ifname.clone(),
            hwaddr: data.hwaddr.clone(),
            vrf_name: data.vrf_name.clone(),
            ipv4_addr: data.ipv4_addr,
            ipv6_addr: data.ipv6_addr,
            counters: data.traffic.totals(),
            start_time,
            idle_timeout: data.idle_timeout,
            session_timeout: data.session_timeout,
            acct_started: data.acct_started,
        })
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("kind", &self.ctrl_kind())
            .field("state", &self.state())
            .finish()
    }
}

// =========================================================================
// Tests
// =========================================================================

//! The `Concentrator`: process-wide context for the session core.
//!
//! It ties the layers together: a default network namespace, the session
//! registry, per-session timers, authentication response hooks, and
//! administrative shutdown.

use std::sync::Arc;
use std::time::Duration;

use accel_net::NetHandle;
use accel_protocol::{
    AuthResponse, Codec, RateLimitRejectOverride, ResponseHook, TerminateCause,
    run_response_hooks,
};
use accel_session::{
    ControlInterface, Session, SessionBackup, SessionConfig, SessionRegistry, SessionStat,
};
use accel_timer::{SessionTimer, TimerConfig};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::AccelError;

/// Configuration for a [`Concentrator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcentratorConfig {
    /// Defaults applied to every session.
    pub session: SessionConfig,

    /// Period of the per-session timeout check.
    pub timer: TimerConfig,

    /// How long shutdown waits for terminated sessions to finish.
    ///
    /// Default: 10 seconds.
    pub shutdown_timeout: Duration,
}

impl Default for ConcentratorConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            timer: TimerConfig::default(),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// The session core of one access concentrator.
///
/// # Example
///
/// ```rust,no_run
/// use accel::prelude::*;
/// use accel_net::SysfsNet;
///
/// # async fn run(ctrl: std::sync::Arc<dyn ControlInterface>) -> Result<(), AccelError> {
/// let concentrator = Concentrator::new(
///     ConcentratorConfig::default(),
///     NetHandle::new(SysfsNet::default_namespace()),
/// );
///
/// let session = concentrator.create_session(ctrl)?;
/// session.start()?;
/// concentrator.spawn_timer(&session);
///
/// // Later, on SIGTERM:
/// concentrator.shutdown(TerminateCause::NasReboot).await;
/// # Ok(())
/// # }
/// ```
pub struct Concentrator {
    config: ConcentratorConfig,
    registry: Arc<SessionRegistry>,
    net: NetHandle,
    response_hooks: Vec<Box<dyn ResponseHook>>,
}

impl Concentrator {
    /// Creates a concentrator whose sessions live in `net` unless told
    /// otherwise. The Mikrotik rate-limit override is installed as the
    /// first response hook.
    pub fn new(config: ConcentratorConfig, net: NetHandle) -> Self {
        let config = ConcentratorConfig {
            timer: config.timer.validated(),
            ..config
        };
        let registry = SessionRegistry::new(config.session.clone());
        tracing::info!(
            net = net.name(),
            timer_period_ms = config.timer.period.as_millis() as u64,
            "concentrator ready"
        );
        Self {
            config,
            registry,
            net,
            response_hooks: vec![Box::new(RateLimitRejectOverride)],
        }
    }

    /// Appends a hook run on every authentication response.
    pub fn with_response_hook(mut self, hook: impl ResponseHook) -> Self {
        self.response_hooks.push(Box::new(hook));
        self
    }

    pub fn config(&self) -> &ConcentratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// The default namespace.
    pub fn net(&self) -> &NetHandle {
        &self.net
    }

    pub fn stat(&self) -> SessionStat {
        self.registry.stat()
    }

    /// Creates a session in the default namespace.
    pub fn create_session(&self, ctrl: Arc<dyn ControlInterface>) -> Result<Session, AccelError> {
        self.create_session_in(ctrl, self.net.acquire())
    }

    /// Creates a session in a specific namespace.
    pub fn create_session_in(
        &self,
        ctrl: Arc<dyn ControlInterface>,
        net: NetHandle,
    ) -> Result<Session, AccelError> {
        Ok(self.registry.create(ctrl, net)?)
    }

    /// Restores a session from an encoded backup, in the default
    /// namespace. The caller starts it with [`Session::start`].
    pub fn restore_session(
        &self,
        codec: &impl Codec,
        record: &[u8],
        ctrl: Arc<dyn ControlInterface>,
    ) -> Result<Session, AccelError> {
        let backup = SessionBackup::decode(codec, record)?;
        Ok(self.registry.restore(backup, ctrl, self.net.acquire())?)
    }

    /// Encoded backups of every active session.
    pub fn backup_sessions(&self, codec: &impl Codec) -> Result<Vec<Vec<u8>>, AccelError> {
        let records = self
            .registry
            .backup_all()
            .iter()
            .map(|backup| backup.encode(codec))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::info!(sessions = records.len(), "sessions backed up");
        Ok(records)
    }

    /// Runs the response hooks over an authentication response. Returns
    /// how many hooks rewrote it.
    pub fn process_auth_response(&self, response: &mut dyn AuthResponse) -> usize {
        run_response_hooks(&self.response_hooks, response)
    }

    /// Starts the periodic timeout check for `session`.
    ///
    /// The task holds only a weak reference. It stops once the session
    /// begins terminating, or after terminating it on timeout. Returns
    /// `None` when the timer is disabled.
    pub fn spawn_timer(&self, session: &Session) -> Option<JoinHandle<()>> {
        if self.config.timer.is_disabled() {
            return None;
        }
        let weak = session.downgrade();
        let mut timer = SessionTimer::new(self.config.timer.clone());

        Some(tokio::spawn(async move {
            loop {
                timer.wait_for_tick().await;
                let Some(session) = weak.acquire() else {
                    break;
                };
                if session.state().is_terminating() {
                    break;
                }
                if let Some(cause) = session.check_timeouts() {
                    tracing::info!(session_id = %session.id(), %cause, "session timed out");
                    session.terminate(cause, false);
                    break;
                }
            }
            tracing::debug!(session_id = %weak.id(), "session timer stopped");
        }))
    }

    /// Hard-terminates every session and waits for them to finish.
    ///
    /// New sessions are refused from here on. Returns `true` if every
    /// session finished within
    /// [`shutdown_timeout`](ConcentratorConfig::shutdown_timeout).
    pub async fn shutdown(&self, cause: TerminateCause) -> bool {
        self.stop(cause, true).await
    }

    /// Like [`shutdown`](Self::shutdown), with soft termination so
    /// front-ends can close their links gracefully.
    pub async fn drain(&self, cause: TerminateCause) -> bool {
        self.stop(cause, false).await
    }

    async fn stop(&self, cause: TerminateCause, hard: bool) -> bool {
        self.registry.begin_shutdown();
        let mut stat = self.registry.watch_stat();

        let initiated = self.registry.terminate_all(cause, hard);
        tracing::info!(%cause, hard, initiated, "waiting for sessions to finish");

        let drained = tokio::time::timeout(
            self.config.shutdown_timeout,
            stat.wait_for(|stat| stat.total() == 0),
        )
        .await
        .map(|waited| waited.is_ok());

        match drained {
            Ok(true) => {
                tracing::info!("all sessions finished");
                true
            }
            Ok(false) => false,
            Err(_) => {
                let left = self.registry.stat();
                tracing::warn!(
                    finishing = left.finishing,
                    timeout_ms = self.config.shutdown_timeout.as_millis() as u64,
                    "shutdown timed out with sessions still finishing"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for Concentrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Concentrator")
            .field("net", &self.net)
            .field("registry", &self.registry)
            .field("response_hooks", &self.response_hooks.len())
            .finish()
    }
}

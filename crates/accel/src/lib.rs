//! # accel
//!
//! Session core for an access concentrator (BRAS/BNG).
//!
//! Access front-ends (PPPoE, IPoE, L2TP, ...) implement a single
//! [`ControlInterface`](accel_session::ControlInterface) trait and drive
//! their sessions through the lifecycle; the core keeps the registry,
//! counters, timers and teardown consistent.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use accel::prelude::*;
//!
//! // Implement ControlInterface for your front-end, then:
//! // let concentrator = Concentrator::new(config, NetHandle::new(SysfsNet::default_namespace()));
//! // let session = concentrator.create_session(Arc::new(MyFrontEnd))?;
//! // session.start()?;
//! // ... front-end calls session.ifup(), session.finished(), ...
//! // concentrator.shutdown(TerminateCause::NasReboot).await;
//! ```

mod concentrator;
mod error;

pub use concentrator::{Concentrator, ConcentratorConfig};
pub use error::AccelError;

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (e.g. `"info"` or `"accel_session=debug"`).
///
/// DHCPv6 client matching logs at `trace`. Returns `false` if a global
/// subscriber was already installed.
pub fn init_logging(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}

/// Everything a front-end or daemon typically needs.
pub mod prelude {
    pub use std::sync::Arc;

    pub use accel_net::{Net, NetError, NetHandle, StaticNet, SysfsNet};
    pub use accel_protocol::{
        Attribute, AuthResponse, Codec, Counters, Dhcpv6Option, HwAddr, JsonCodec, RadiusCode,
        RadiusReply, ResponseHook, SessionId, TerminateCause,
    };
    pub use accel_session::{
        AcctRecord, ControlInterface, CtrlError, CtrlKind, Session, SessionBackup,
        SessionConfig, SessionError, SessionEvent, SessionExtension, SessionRegistry,
        SessionState, SessionStat, SingleSessionPolicy, WeakSession,
    };
    pub use accel_timer::TimerConfig;

    pub use crate::{AccelError, Concentrator, ConcentratorConfig, init_logging};
}

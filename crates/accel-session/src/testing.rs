//! Shared fixtures for unit tests.

use std::sync::{Arc, Mutex};

use accel_net::{NetHandle, StaticNet};
use accel_protocol::{Counters, HwAddr};

use crate::{ControlInterface, CtrlError, CtrlKind, Session, SessionConfig, SessionRegistry};

/// A front-end that records every call it receives.
pub(crate) struct MockCtrl {
    kind: CtrlKind,
    hwaddr: Option<HwAddr>,
    finish_on_terminate: bool,
    stats: Mutex<Option<Counters>>,
    calls: Mutex<Vec<&'static str>>,
}

impl MockCtrl {
    fn build(kind: CtrlKind, hwaddr: Option<HwAddr>, finish_on_terminate: bool) -> Arc<Self> {
        Arc::new(Self {
            kind,
            hwaddr,
            finish_on_terminate,
            stats: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn new(kind: CtrlKind) -> Arc<Self> {
        Self::build(kind, None, false)
    }

    pub(crate) fn ppp() -> Arc<Self> {
        Self::new(CtrlKind::Ppp)
    }

    pub(crate) fn ipoe(hwaddr: HwAddr) -> Arc<Self> {
        Self::build(CtrlKind::Ipoe, Some(hwaddr), false)
    }

    /// A front-end whose `terminate` tears down synchronously and calls
    /// `finished` before returning.
    pub(crate) fn finishing(kind: CtrlKind) -> Arc<Self> {
        Self::build(kind, None, true)
    }

    pub(crate) fn set_stats(&self, counters: Counters) {
        *self.stats.lock().unwrap() = Some(counters);
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ControlInterface for MockCtrl {
    fn kind(&self) -> CtrlKind {
        self.kind
    }

    fn start(&self, _session: &Session) -> Result<(), CtrlError> {
        self.record("start");
        Ok(())
    }

    fn restart(&self, _session: &Session) -> Result<(), CtrlError> {
        self.record("restart");
        Ok(())
    }

    fn terminate(&self, session: &Session, _hard: bool) -> Result<(), CtrlError> {
        self.record("terminate");
        if self.finish_on_terminate {
            session.finished();
        }
        Ok(())
    }

    fn finished(&self, _session: &Session) {
        self.record("finished");
    }

    fn ifcfg(&self, _session: &Session) -> Result<(), CtrlError> {
        self.record("ifcfg");
        Ok(())
    }

    fn update_ipv6_addr(&self, _session: &Session) -> Result<(), CtrlError> {
        self.record("update_ipv6_addr");
        Ok(())
    }

    fn acct_start(&self, _session: &Session) -> Result<(), CtrlError> {
        self.record("acct_start");
        Ok(())
    }

    fn read_stats(&self, _session: &Session) -> Option<Counters> {
        *self.stats.lock().unwrap()
    }

    fn hwaddr(&self, _session: &Session) -> Option<HwAddr> {
        self.hwaddr
    }
}

pub(crate) fn registry() -> Arc<SessionRegistry> {
    SessionRegistry::new(SessionConfig::default())
}

pub(crate) fn registry_with(config: SessionConfig) -> Arc<SessionRegistry> {
    SessionRegistry::new(config)
}

pub(crate) fn static_net() -> NetHandle {
    NetHandle::new(
        StaticNet::new("default")
            .with_link("ppp0", 10)
            .with_link("ppp1", 11)
            .with_link("ipoe0", 20),
    )
}

//! Concurrency tests: many threads driving sessions through the registry
//! while an observer checks that the counters always add up.

use std::sync::{Arc, Barrier};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use accel_net::{NetHandle, StaticNet};
use accel_protocol::TerminateCause;
use accel_session::{
    ControlInterface, CtrlError, CtrlKind, Session, SessionConfig, SessionError, SessionRegistry,
    SessionStat, SingleSessionPolicy,
};

/// A PPPoE-like front-end. Hard terminations finish synchronously;
/// soft ones leave the session FINISHING for the test to complete.
#[derive(Default)]
struct CountingCtrl {
    terminations: AtomicUsize,
}

impl ControlInterface for CountingCtrl {
    fn kind(&self) -> CtrlKind {
        CtrlKind::Pppoe
    }

    fn terminate(&self, session: &Session, hard: bool) -> Result<(), CtrlError> {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        if hard {
            session.finished();
        }
        Ok(())
    }
}

fn net() -> NetHandle {
    NetHandle::new(StaticNet::new("default"))
}

#[test]
fn test_concurrent_lifecycles_keep_counters_consistent() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 200;

    let reg = SessionRegistry::new(SessionConfig::default());
    let stop = Arc::new(AtomicBool::new(false));

    let observer = {
        let reg = Arc::clone(&reg);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut samples = 0usize;
            while !stop.load(Ordering::SeqCst) {
                let (stat, len) = reg.stat_and_len();
                assert_eq!(stat.total(), len, "inconsistent snapshot: {stat:?} vs {len}");
                samples += 1;
            }
            samples
        })
    };

    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let reg = Arc::clone(&reg);
            thread::spawn(move || {
                let ctrl = Arc::new(CountingCtrl::default());
                for i in 0..PER_THREAD {
                    let s = reg.create(ctrl.clone(), net()).unwrap();
                    match (t + i) % 3 {
                        // Normal soft teardown.
                        0 => {
                            s.started().unwrap();
                            s.terminate(TerminateCause::UserRequest, false);
                            s.ifdown().unwrap();
                            s.finished();
                        }
                        // Hard teardown, finished from inside terminate.
                        1 => {
                            s.started().unwrap();
                            s.terminate(TerminateCause::AdminReset, true);
                        }
                        // Authentication failure before going active.
                        _ => {
                            s.terminate(TerminateCause::AuthError, true);
                        }
                    }
                    assert!(s.is_terminated());
                }
                ctrl.terminations.load(Ordering::SeqCst)
            })
        })
        .collect();

    let terminations: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
    stop.store(true, Ordering::SeqCst);
    observer.join().unwrap();

    assert_eq!(terminations, THREADS * PER_THREAD);
    assert_eq!(reg.stat(), SessionStat::default());
    assert!(reg.is_empty());
}

#[test]
fn test_racing_terminate_initiates_exactly_once() {
    let reg = SessionRegistry::new(SessionConfig::default());
    let ctrl = Arc::new(CountingCtrl::default());
    let s = reg.create(ctrl.clone(), net()).unwrap();
    s.started().unwrap();
    let weak = s.downgrade();

    let racers: Vec<_> = (0..16)
        .map(|i| {
            let weak = weak.clone();
            thread::spawn(move || {
                let Some(s) = weak.acquire() else {
                    return false;
                };
                let cause = if i % 2 == 0 {
                    TerminateCause::SessionTimeout
                } else {
                    TerminateCause::IdleTimeout
                };
                s.terminate(cause, false)
            })
        })
        .collect();

    let initiated = racers
        .into_iter()
        .map(|r| r.join().unwrap())
        .filter(|won| *won)
        .count();

    assert_eq!(initiated, 1);
    assert_eq!(ctrl.terminations.load(Ordering::SeqCst), 1);
    assert_eq!(reg.stat().finishing, 1);
    assert!(matches!(
        s.terminate_cause(),
        Some(TerminateCause::SessionTimeout | TerminateCause::IdleTimeout)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_finishing_drains_through_watch_stat() {
    let reg = SessionRegistry::new(SessionConfig::default());
    let sessions: Vec<_> = (0..32)
        .map(|_| {
            let s = reg.create(Arc::new(CountingCtrl::default()), net()).unwrap();
            s.started().unwrap();
            s
        })
        .collect();

    let mut stat = reg.watch_stat();
    assert_eq!(reg.terminate_all(TerminateCause::NasReboot, false), 32);
    assert_eq!(reg.stat().finishing, 32);

    for s in sessions {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            s.finished();
        });
    }

    tokio::time::timeout(Duration::from_secs(5), stat.wait_for(|s| s.finishing == 0))
        .await
        .expect("finishing sessions should drain")
        .unwrap();
    assert!(reg.is_empty());
}

#[test]
fn test_create_racing_shutdown_leaves_no_session_behind() {
    const CREATORS: usize = 4;

    for _ in 0..200 {
        let reg = SessionRegistry::new(SessionConfig::default());
        let ctrl = Arc::new(CountingCtrl::default());
        let barrier = Arc::new(Barrier::new(CREATORS + 1));

        let creators: Vec<_> = (0..CREATORS)
            .map(|_| {
                let reg = Arc::clone(&reg);
                let ctrl = Arc::clone(&ctrl);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let mut created = Vec::new();
                    barrier.wait();
                    loop {
                        match reg.create(ctrl.clone(), net()) {
                            Ok(s) => created.push(s),
                            Err(SessionError::ShuttingDown) => break created,
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                })
            })
            .collect();

        barrier.wait();
        reg.begin_shutdown();
        let initiated = reg.terminate_all(TerminateCause::NasReboot, true);

        let created: Vec<Session> = creators
            .into_iter()
            .flat_map(|c| c.join().unwrap())
            .collect();

        assert_eq!(initiated, created.len());
        assert!(created.iter().all(Session::is_terminated));
        assert!(reg.is_empty());
        assert_eq!(reg.stat(), SessionStat::default());
    }
}

#[test]
fn test_concurrent_duplicate_logins_deny_admits_one() {
    const LOGINS: usize = 8;

    let config = SessionConfig {
        single_session: SingleSessionPolicy::Deny,
        ..SessionConfig::default()
    };

    for _ in 0..100 {
        let reg = SessionRegistry::new(config.clone());
        let barrier = Arc::new(Barrier::new(LOGINS));

        let logins: Vec<_> = (0..LOGINS)
            .map(|_| {
                let s = reg.create(Arc::new(CountingCtrl::default()), net()).unwrap();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let admitted = s.set_username("dave").is_ok();
                    (s, admitted)
                })
            })
            .collect();

        let results: Vec<(Session, bool)> = logins.into_iter().map(|l| l.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|(_, admitted)| *admitted).count(), 1);
        assert_eq!(reg.find_by_username("dave").len(), 1);
    }
}

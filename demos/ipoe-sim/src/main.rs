use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use accel::prelude::*;
use accel_protocol::radius::{MIKROTIK_RATE_LIMIT, VENDOR_MIKROTIK};
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Simulated IPoE front-end
// ---------------------------------------------------------------------------

/// One IPoE subscriber. Traffic is synthesized from elapsed time; a quiet
/// subscriber sends nothing and eventually hits the idle timeout.
struct SimIpoe {
    mac: HwAddr,
    chatty: bool,
    bound_at: Instant,
    link_up: AtomicBool,
}

impl SimIpoe {
    fn new(mac: [u8; 6], chatty: bool) -> Arc<Self> {
        Arc::new(Self {
            mac: HwAddr(mac),
            chatty,
            bound_at: Instant::now(),
            link_up: AtomicBool::new(false),
        })
    }
}

impl ControlInterface for SimIpoe {
    fn kind(&self) -> CtrlKind {
        CtrlKind::Ipoe
    }

    fn start(&self, _session: &Session) -> Result<(), CtrlError> {
        self.link_up.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn terminate(&self, session: &Session, hard: bool) -> Result<(), CtrlError> {
        self.link_up.store(false, Ordering::SeqCst);
        if hard {
            session.finished();
            return Ok(());
        }
        // Soft: pretend to send a DHCP FORCERENEW and wait for the link to drop.
        let Some(session) = session.acquire() else {
            return Ok(());
        };
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = session.ifdown();
            session.finished();
        });
        Ok(())
    }

    fn change_shaper(&self, session: &Session, down: u32, up: u32) -> Result<(), CtrlError> {
        tracing::info!(session_id = %session.id(), down, up, "shaper applied");
        Ok(())
    }

    fn read_stats(&self, _session: &Session) -> Option<Counters> {
        if !self.chatty {
            return Some(Counters::default());
        }
        let ms = self.bound_at.elapsed().as_millis() as u64;
        Some(Counters {
            rx_bytes: ms * 120,
            tx_bytes: ms * 900,
            rx_packets: ms / 10,
            tx_packets: ms / 2,
        })
    }

    fn hwaddr(&self, _session: &Session) -> Option<HwAddr> {
        Some(self.mac)
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

const SUBSCRIBERS: u8 = 4;

fn subscriber_mac(i: u8) -> [u8; 6] {
    [0x02, 0x00, 0x5e, 0x10, 0x00, i]
}

fn namespace() -> StaticNet {
    (0..SUBSCRIBERS).fold(StaticNet::new("default"), |net, i| {
        net.with_link(&format!("ipoe{i}"), 100 + u32::from(i))
    })
}

fn bring_up(concentrator: &Concentrator, i: u8) -> Result<Session, AccelError> {
    let mac = subscriber_mac(i);
    let session = concentrator.create_session(SimIpoe::new(mac, i % 2 == 0))?;
    let hwaddr = HwAddr(mac).to_string();
    session.set_hwaddr(hwaddr.clone());
    session.set_ifname(&format!("ipoe{i}"))?;
    session.set_username(&hwaddr)?;
    session.start()?;
    session.ifup()?;
    session.accounting_started()?;
    concentrator.spawn_timer(&session);
    Ok(session)
}

/// Finds the session a DHCPv6 SOLICIT belongs to.
fn session_for_client_id(registry: &SessionRegistry, client_id: &Dhcpv6Option) -> Option<Session> {
    registry
        .sessions()
        .into_iter()
        .find(|session| session.match_client_id(client_id))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging("info");

    let config = ConcentratorConfig {
        session: SessionConfig {
            idle_timeout: Some(Duration::from_secs(3)),
            session_timeout: Some(Duration::from_secs(8)),
            ..SessionConfig::default()
        },
        ..ConcentratorConfig::default()
    };
    let concentrator = Concentrator::new(config, NetHandle::new(namespace()));

    let mut events = concentrator.registry().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::debug!(?event, "session event");
        }
    });

    // An Access-Reject carrying a rate limit is really a throttled accept.
    let mut reply = RadiusReply::new(1, RadiusCode::AccessReject).with_attribute(Attribute::Vendor {
        vendor_id: VENDOR_MIKROTIK,
        vendor_type: MIKROTIK_RATE_LIMIT,
        value: b"2M/10M".to_vec(),
    });
    concentrator.process_auth_response(&mut reply);
    tracing::info!(code = ?reply.code, "authentication outcome");

    let mut sessions = Vec::new();
    for i in 0..SUBSCRIBERS {
        sessions.push(bring_up(&concentrator, i)?);
    }
    sessions[0].change_shaper(10_000, 2_000)?;

    // DUID-LL built from subscriber 1's MAC.
    let mut duid = vec![0x00, 0x03, 0x00, 0x01];
    duid.extend_from_slice(&subscriber_mac(1));
    let solicit = Dhcpv6Option::client_id(duid);
    if let Some(session) = session_for_client_id(concentrator.registry(), &solicit) {
        tracing::info!(session_id = %session.id(), "dhcpv6 client matched");
    }

    tokio::time::sleep(Duration::from_secs(2)).await;
    for session in &sessions {
        let record = session.interim_accounting();
        tracing::info!(
            session_id = %record.session_id,
            rx_bytes = record.interval.rx_bytes,
            tx_bytes = record.interval.tx_bytes,
            "interim accounting"
        );
    }
    let backups = concentrator.backup_sessions(&JsonCodec)?;
    tracing::info!(records = backups.len(), stat = ?concentrator.stat(), "backup taken");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("shutdown signal received"),
        _ = tokio::time::sleep(Duration::from_secs(10)) => {}
    }

    drop(sessions);
    let clean = concentrator.drain(TerminateCause::NasReboot).await;
    tracing::info!(clean, stat = ?concentrator.stat(), "concentrator stopped");
    Ok(())
}

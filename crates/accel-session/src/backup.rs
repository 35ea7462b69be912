//! Session backup records.
//!
//! A backup carries what a restarted daemon needs to take over a live
//! subscriber without dropping it: identity, addressing, and the counters
//! accumulated so far. Front-end specific state (PPP negotiation, DHCP
//! leases on the wire) is re-learned by [`ControlInterface::restart`].
//!
//! [`ControlInterface::restart`]: crate::ControlInterface::restart

use std::net::{SocketAddrV4, SocketAddrV6};
use std::time::Duration;

use accel_protocol::{Codec, Counters, ProtocolError, SessionId};
use serde::{Deserialize, Serialize};

use crate::CtrlKind;

/// Persistable snapshot of an active session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBackup {
    pub session_id: SessionId,
    /// Front-end kind; a restore must offer the same kind.
    pub ctrl_kind: CtrlKind,
    pub username: Option<String>,
    pub ifname: Option<String>,
    pub hwaddr: Option<String>,
    pub vrf_name: Option<String>,
    pub ipv4_addr: Option<SocketAddrV4>,
    pub ipv6_addr: Option<SocketAddrV6>,
    /// Session totals at backup time.
    pub counters: Counters,
    /// Wall-clock start, seconds since the Unix epoch.
    pub start_time: u64,
    pub idle_timeout: Option<Duration>,
    pub session_timeout: Option<Duration>,
    /// Accounting-start was already sent; a restore must not send it again.
    pub acct_started: bool,
}

impl SessionBackup {
    /// Serializes the record with `codec`.
    pub fn encode(&self, codec: &impl Codec) -> Result<Vec<u8>, ProtocolError> {
        codec.encode(self)
    }

    /// Reads a record written by [`encode`](Self::encode).
    pub fn decode(codec: &impl Codec, data: &[u8]) -> Result<Self, ProtocolError> {
        codec.decode(data)
    }
}

#[cfg(test)]
mod tests {
    use accel_protocol::JsonCodec;

    use super::*;

    fn sample() -> SessionBackup {
        SessionBackup {
            session_id: SessionId(0x1f),
            ctrl_kind: CtrlKind::Ipoe,
            username: Some("00:11:22:33:44:55".into()),
            ifname: Some("ipoe7".into()),
            hwaddr: Some("00:11:22:33:44:55".into()),
            vrf_name: None,
            ipv4_addr: Some("10.0.0.7:0".parse().unwrap()),
            ipv6_addr: None,
            counters: Counters {
                rx_bytes: 1 << 40,
                tx_bytes: 12,
                rx_packets: 3,
                tx_packets: 4,
            },
            start_time: 1_700_000_000,
            idle_timeout: Some(Duration::from_secs(600)),
            session_timeout: None,
            acct_started: true,
        }
    }

    #[test]
    fn test_decode_reads_back_encoded_record() {
        let codec = JsonCodec;
        let backup = sample();

        let bytes = backup.encode(&codec).unwrap();
        let decoded = SessionBackup::decode(&codec, &bytes).unwrap();

        assert_eq!(decoded, backup);
    }

    #[test]
    fn test_decode_truncated_record_returns_error() {
        let codec = JsonCodec;
        let bytes = sample().encode(&codec).unwrap();

        let result = SessionBackup::decode(&codec, &bytes[..bytes.len() / 2]);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}

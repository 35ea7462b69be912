//! Identity and bookkeeping types shared by every accel layer.
//!
//! These are plain values: they carry no behavior beyond parsing and
//! formatting, so they can be stored in backups, logged and compared
//! without dragging the session machinery along.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Identifier of one subscriber session.
///
/// Rendered as 16 lowercase hex digits, the same form that goes out in
/// the `Acct-Session-Id` attribute. Ids are random so they stay unique
/// across restarts without persisted counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Draws a fresh random id.
    pub fn generate() -> Self {
        Self(rand::rng().random())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > 16 {
            return Err(ProtocolError::InvalidSessionId(s.to_string()));
        }
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| ProtocolError::InvalidSessionId(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// HwAddr
// ---------------------------------------------------------------------------

/// Length of an Ethernet hardware address.
pub const ETH_ALEN: usize = 6;

/// An Ethernet hardware (MAC) address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HwAddr(pub [u8; ETH_ALEN]);

impl HwAddr {
    /// The raw octets.
    pub fn octets(&self) -> &[u8; ETH_ALEN] {
        &self.0
    }
}

impl From<[u8; ETH_ALEN]> for HwAddr {
    fn from(octets: [u8; ETH_ALEN]) -> Self {
        Self(octets)
    }
}

impl fmt::Display for HwAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Accepts `aa:bb:cc:dd:ee:ff` and `aa-bb-cc-dd-ee-ff`, any case.
impl FromStr for HwAddr {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidHwAddr(s.to_string());

        let mut octets = [0u8; ETH_ALEN];
        let mut parts = s.split(|c| c == ':' || c == '-');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(octets))
    }
}

// ---------------------------------------------------------------------------
// TerminateCause
// ---------------------------------------------------------------------------

/// Why a session was terminated.
///
/// Recorded exactly once, when the session enters FINISHING. The cause is
/// descriptive metadata for accounting and logs; it never changes how the
/// session is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerminateCause {
    NasRequest,
    NasReboot,
    AdminReset,
    UserRequest,
    SessionTimeout,
    IdleTimeout,
    EchoTimeout,
    MsgAuthFailed,
    AuthError,
    ChapTimeout,
    PapTimeout,
    CalcAuthFailed,
    Policy,
    PeerAuthFailed,
    Ipv6CpNoConfig,
    Ipv6CpDisabled,
    KeepaliveTimeout,
    PacketTimeout,
    ServiceUnavailable,
    NasError,
}

impl TerminateCause {
    /// Every cause, in code order.
    pub const ALL: [Self; 20] = [
        Self::NasRequest,
        Self::NasReboot,
        Self::AdminReset,
        Self::UserRequest,
        Self::SessionTimeout,
        Self::IdleTimeout,
        Self::EchoTimeout,
        Self::MsgAuthFailed,
        Self::AuthError,
        Self::ChapTimeout,
        Self::PapTimeout,
        Self::CalcAuthFailed,
        Self::Policy,
        Self::PeerAuthFailed,
        Self::Ipv6CpNoConfig,
        Self::Ipv6CpDisabled,
        Self::KeepaliveTimeout,
        Self::PacketTimeout,
        Self::ServiceUnavailable,
        Self::NasError,
    ];

    /// Stable numeric code (1-based, as persisted in backups and logs).
    pub fn code(self) -> u8 {
        match self {
            Self::NasRequest => 1,
            Self::NasReboot => 2,
            Self::AdminReset => 3,
            Self::UserRequest => 4,
            Self::SessionTimeout => 5,
            Self::IdleTimeout => 6,
            Self::EchoTimeout => 7,
            Self::MsgAuthFailed => 8,
            Self::AuthError => 9,
            Self::ChapTimeout => 10,
            Self::PapTimeout => 11,
            Self::CalcAuthFailed => 12,
            Self::Policy => 13,
            Self::PeerAuthFailed => 14,
            Self::Ipv6CpNoConfig => 15,
            Self::Ipv6CpDisabled => 16,
            Self::KeepaliveTimeout => 17,
            Self::PacketTimeout => 18,
            Self::ServiceUnavailable => 19,
            Self::NasError => 20,
        }
    }

    /// Inverse of [`code`](Self::code).
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }

    /// The RADIUS `Acct-Terminate-Cause` value (RFC 2866) reported for
    /// this cause.
    pub fn acct_terminate_cause(self) -> u32 {
        match self {
            Self::UserRequest => 1,
            Self::EchoTimeout | Self::KeepaliveTimeout | Self::PacketTimeout => 2,
            Self::IdleTimeout => 4,
            Self::SessionTimeout => 5,
            Self::AdminReset | Self::Policy => 6,
            Self::NasError | Self::Ipv6CpNoConfig | Self::Ipv6CpDisabled => 9,
            Self::NasRequest => 10,
            Self::NasReboot => 11,
            Self::ServiceUnavailable => 15,
            Self::MsgAuthFailed
            | Self::AuthError
            | Self::ChapTimeout
            | Self::PapTimeout
            | Self::CalcAuthFailed
            | Self::PeerAuthFailed => 17,
        }
    }
}

impl fmt::Display for TerminateCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NasRequest => "nas-request",
            Self::NasReboot => "nas-reboot",
            Self::AdminReset => "admin-reset",
            Self::UserRequest => "user-request",
            Self::SessionTimeout => "session-timeout",
            Self::IdleTimeout => "idle-timeout",
            Self::EchoTimeout => "echo-timeout",
            Self::MsgAuthFailed => "msg-auth-failed",
            Self::AuthError => "auth-error",
            Self::ChapTimeout => "chap-timeout",
            Self::PapTimeout => "pap-timeout",
            Self::CalcAuthFailed => "calc-auth-failed",
            Self::Policy => "policy",
            Self::PeerAuthFailed => "peer-auth-failed",
            Self::Ipv6CpNoConfig => "ipv6cp-no-config",
            Self::Ipv6CpDisabled => "ipv6cp-disabled",
            Self::KeepaliveTimeout => "keepalive-timeout",
            Self::PacketTimeout => "packet-timeout",
            Self::ServiceUnavailable => "service-unavailable",
            Self::NasError => "nas-error",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Cumulative traffic counters, as seen from the subscriber's interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
}

impl Counters {
    /// Field-wise sum, saturating at `u64::MAX`.
    pub fn saturating_add(self, other: Self) -> Self {
        Self {
            rx_bytes: self.rx_bytes.saturating_add(other.rx_bytes),
            tx_bytes: self.tx_bytes.saturating_add(other.tx_bytes),
            rx_packets: self.rx_packets.saturating_add(other.rx_packets),
            tx_packets: self.tx_packets.saturating_add(other.tx_packets),
        }
    }

    /// Field-wise difference, clamped at zero.
    pub fn saturating_sub(self, other: Self) -> Self {
        Self {
            rx_bytes: self.rx_bytes.saturating_sub(other.rx_bytes),
            tx_bytes: self.tx_bytes.saturating_sub(other.tx_bytes),
            rx_packets: self.rx_packets.saturating_sub(other.rx_packets),
            tx_packets: self.tx_packets.saturating_sub(other.tx_packets),
        }
    }

    /// Returns `true` if any field is smaller than in `earlier`, meaning
    /// the source was reset or wrapped in between.
    pub fn went_backwards(&self, earlier: &Self) -> bool {
        self.rx_bytes < earlier.rx_bytes
            || self.tx_bytes < earlier.tx_bytes
            || self.rx_packets < earlier.rx_packets
            || self.tx_packets < earlier.tx_packets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_display_is_sixteen_hex_digits() {
        assert_eq!(SessionId(0x2a).to_string(), "000000000000002a");
        assert_eq!(
            "000000000000002a".parse::<SessionId>().unwrap(),
            SessionId(0x2a)
        );
    }

    #[test]
    fn test_session_id_parse_rejects_garbage() {
        assert!("".parse::<SessionId>().is_err());
        assert!("xyz".parse::<SessionId>().is_err());
        assert!("00000000000000000".parse::<SessionId>().is_err());
    }

    #[test]
    fn test_hwaddr_parse_accepts_both_separators() {
        let colon: HwAddr = "AA:bb:CC:dd:EE:ff".parse().unwrap();
        let dash: HwAddr = "aa-bb-cc-dd-ee-ff".parse().unwrap();
        assert_eq!(colon, dash);
        assert_eq!(colon.to_string(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_hwaddr_parse_rejects_wrong_shape() {
        assert!("aa:bb:cc:dd:ee".parse::<HwAddr>().is_err());
        assert!("aa:bb:cc:dd:ee:ff:00".parse::<HwAddr>().is_err());
        assert!("a:bb:cc:dd:ee:ff".parse::<HwAddr>().is_err());
        assert!("zz:bb:cc:dd:ee:ff".parse::<HwAddr>().is_err());
    }

    #[test]
    fn test_hwaddr_parse_rejects_signed_octet() {
        assert!("+a:bb:cc:dd:ee:ff".parse::<HwAddr>().is_err());
        assert!("aa:bb:-c:dd:ee:ff".parse::<HwAddr>().is_err());
    }

    #[test]
    fn test_terminate_cause_codes_are_unique_and_invertible() {
        for cause in TerminateCause::ALL {
            assert_eq!(TerminateCause::from_code(cause.code()), Some(cause));
        }
        assert_eq!(TerminateCause::from_code(0), None);
        assert_eq!(TerminateCause::from_code(21), None);
    }

    #[test]
    fn test_terminate_cause_acct_mapping() {
        assert_eq!(TerminateCause::UserRequest.acct_terminate_cause(), 1);
        assert_eq!(TerminateCause::IdleTimeout.acct_terminate_cause(), 4);
        assert_eq!(TerminateCause::SessionTimeout.acct_terminate_cause(), 5);
        assert_eq!(TerminateCause::AdminReset.acct_terminate_cause(), 6);
        assert_eq!(TerminateCause::NasReboot.acct_terminate_cause(), 11);
    }

    #[test]
    fn test_counters_arithmetic_saturates() {
        let a = Counters { rx_bytes: 10, tx_bytes: 5, rx_packets: 2, tx_packets: 1 };
        let b = Counters { rx_bytes: 4, tx_bytes: 9, rx_packets: 1, tx_packets: 1 };

        let diff = a.saturating_sub(b);
        assert_eq!(diff.rx_bytes, 6);
        assert_eq!(diff.tx_bytes, 0);
        assert!(a.went_backwards(&b));
        assert_eq!(a.saturating_add(b).tx_bytes, 14);
    }
}

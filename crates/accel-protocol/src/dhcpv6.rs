//! DHCPv6 client-identifier correlation.
//!
//! When a DHCPv6 exchange arrives on a shared IPoE interface there is no
//! session key in the packet, only the client's DUID. This module decides
//! whether a DUID could plausibly have been generated from a given
//! hardware address, which is how the exchange is tied to the IPoE session
//! that owns that address.
//!
//! The answer is heuristic. DUID-EN carries no link-layer address at all,
//! and the last-resort scan will accept a MAC that merely happens to appear
//! inside unrelated payload bytes. Treat a match as a binding hint, not as
//! proof of identity.

use serde::{Deserialize, Serialize};

use crate::types::{ETH_ALEN, HwAddr};

/// DHCPv6 option code of the Client Identifier option.
pub const OPTION_CLIENTID: u16 = 1;

/// DUID hardware type for Ethernet.
const HW_TYPE_ETHERNET: u16 = 1;

/// A DHCPv6 option as handed over by the DHCPv6 transport: a 16-bit code
/// and an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dhcpv6Option {
    pub code: u16,
    pub data: Vec<u8>,
}

impl Dhcpv6Option {
    /// A Client Identifier option carrying `duid`.
    pub fn client_id(duid: impl Into<Vec<u8>>) -> Self {
        Self {
            code: OPTION_CLIENTID,
            data: duid.into(),
        }
    }

    /// The DUID type field, if the payload is long enough to have one.
    pub fn duid_type(&self) -> Option<DuidType> {
        read_u16(&self.data, 0).map(DuidType::from)
    }
}

/// The DUID encodings the matcher knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuidType {
    /// Link-layer address plus time (type 1).
    Llt,
    /// Enterprise number (type 2).
    En,
    /// Link-layer address (type 3).
    Ll,
    /// Anything else (UUID-based, unassigned, ...).
    Other(u16),
}

impl From<u16> for DuidType {
    fn from(raw: u16) -> Self {
        match raw {
            1 => Self::Llt,
            2 => Self::En,
            3 => Self::Ll,
            other => Self::Other(other),
        }
    }
}

impl From<DuidType> for u16 {
    fn from(ty: DuidType) -> Self {
        match ty {
            DuidType::Llt => 1,
            DuidType::En => 2,
            DuidType::Ll => 3,
            DuidType::Other(raw) => raw,
        }
    }
}

fn read_u16(data: &[u8], at: usize) -> Option<u16> {
    let bytes = data.get(at..at + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Lowercase hex rendering, used for diagnostics.
pub fn to_hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

/// Returns `true` if `client_id` could have been issued by `hwaddr`.
///
/// Structured checks come first (DUID-LLT, DUID-LL, DUID-EN); when they
/// do not match, every byte offset of the payload is scanned for the
/// address. Malformed or short payloads simply do not match.
pub fn match_client_id(hwaddr: &HwAddr, client_id: &Dhcpv6Option) -> bool {
    let data = client_id.data.as_slice();
    let Some(duid_type) = client_id.duid_type() else {
        return false;
    };
    let mac = hwaddr.octets().as_slice();

    tracing::trace!(
        %hwaddr,
        duid_type = u16::from(duid_type),
        duid = %to_hex(data),
        "dhcpv6: matching client id"
    );

    let structured = match duid_type {
        // Hardware type is read from bytes 6..8 and the address from 8..14.
        DuidType::Llt if data.len() >= 9 => {
            read_u16(data, 6) == Some(HW_TYPE_ETHERNET)
                && data.get(8..8 + ETH_ALEN) == Some(mac)
        }
        DuidType::Ll if data.len() >= 4 => {
            read_u16(data, 2) == Some(HW_TYPE_ETHERNET)
                && data.get(4..4 + ETH_ALEN) == Some(mac)
        }
        DuidType::En if data.len() >= ETH_ALEN + 2 => {
            data[data.len() - ETH_ALEN..] == *mac
        }
        _ => false,
    };
    if structured {
        return true;
    }

    match data.windows(ETH_ALEN).position(|window| window == mac) {
        Some(offset) => {
            tracing::trace!(offset, "dhcpv6: found hwaddr inside duid");
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC: HwAddr = HwAddr([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);

    fn client_id(bytes: &[u8]) -> Dhcpv6Option {
        Dhcpv6Option::client_id(bytes)
    }

    #[test]
    fn test_match_duid_ll_ethernet_returns_true() {
        let opt = client_id(&[0x00, 0x03, 0x00, 0x01, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert!(match_client_id(&MAC, &opt));
    }

    #[test]
    fn test_match_duid_ll_wrong_hw_type_falls_back_to_scan() {
        // Hardware type 2 fails the structured check, but the address is
        // still present at offset 4.
        let opt = client_id(&[0x00, 0x03, 0x00, 0x02, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert!(match_client_id(&MAC, &opt));
    }

    #[test]
    fn test_match_all_zero_payload_returns_false() {
        assert!(!match_client_id(&MAC, &client_id(&[0u8; 10])));
    }

    #[test]
    fn test_match_short_payloads_return_false() {
        assert!(!match_client_id(&MAC, &client_id(&[])));
        assert!(!match_client_id(&MAC, &client_id(&[0x00])));
        assert!(!match_client_id(&MAC, &client_id(&[0x00, 0x03])));
        assert!(!match_client_id(&MAC, &client_id(&[0x00, 0x03, 0x00, 0x01, 0xaa])));
    }

    #[test]
    fn test_match_duid_llt_uses_bytes_six_through_thirteen() {
        let mut duid = vec![0x00, 0x01, 0x12, 0x34, 0x56, 0x78, 0x00, 0x01];
        duid.extend_from_slice(MAC.octets());
        assert!(match_client_id(&MAC, &client_id(&duid)));
    }

    #[test]
    fn test_match_duid_llt_truncated_does_not_panic() {
        // Long enough for the type check, too short for the address.
        let duid = [0x00, 0x01, 0x12, 0x34, 0x56, 0x78, 0x00, 0x01, 0xaa];
        assert!(!match_client_id(&MAC, &client_id(&duid)));
    }

    #[test]
    fn test_match_duid_en_trailing_mac_returns_true() {
        let mut duid = vec![0x00, 0x02, 0x00, 0x00, 0x01, 0x37, 0x01];
        duid.extend_from_slice(MAC.octets());
        assert!(match_client_id(&MAC, &client_id(&duid)));
    }

    #[test]
    fn test_match_unknown_type_scans_payload() {
        let mut duid = vec![0x00, 0x04, 0x11];
        duid.extend_from_slice(MAC.octets());
        duid.push(0x22);
        assert!(match_client_id(&MAC, &client_id(&duid)));
    }

    #[test]
    fn test_match_different_mac_returns_false() {
        let other: HwAddr = "00:11:22:33:44:55".parse().unwrap();
        let opt = client_id(&[0x00, 0x03, 0x00, 0x01, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert!(!match_client_id(&other, &opt));
    }

    #[test]
    fn test_duid_type_roundtrips_raw_value() {
        assert_eq!(DuidType::from(3), DuidType::Ll);
        assert_eq!(u16::from(DuidType::Other(4)), 4);
        assert_eq!(client_id(&[0x00]).duid_type(), None);
    }

    #[test]
    fn test_to_hex() {
        assert_eq!(to_hex(&[0x00, 0x0a, 0xff]), "000aff");
    }
}

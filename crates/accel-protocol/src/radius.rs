//! RADIUS response view and outcome hooks.
//!
//! Packet encoding and the attribute dictionary live in the RADIUS client;
//! this module only needs to read a response's code, look attributes up,
//! and occasionally rewrite the code before anything else sees it.

use serde::{Deserialize, Serialize};

/// Attribute type of Vendor-Specific (RFC 2865).
pub const ATTR_VENDOR_SPECIFIC: u8 = 26;

/// IANA enterprise number of MikroTik.
pub const VENDOR_MIKROTIK: u32 = 14988;

/// MikroTik vendor attribute `Mikrotik-Rate-Limit`.
pub const MIKROTIK_RATE_LIMIT: u8 = 8;

/// RADIUS packet codes this core distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RadiusCode {
    AccessRequest,
    AccessAccept,
    AccessReject,
    AccountingRequest,
    AccountingResponse,
    AccessChallenge,
    DisconnectRequest,
    DisconnectAck,
    DisconnectNak,
    CoaRequest,
    CoaAck,
    CoaNak,
    Other(u8),
}

impl From<u8> for RadiusCode {
    fn from(code: u8) -> Self {
        match code {
            1 => Self::AccessRequest,
            2 => Self::AccessAccept,
            3 => Self::AccessReject,
            4 => Self::AccountingRequest,
            5 => Self::AccountingResponse,
            11 => Self::AccessChallenge,
            40 => Self::DisconnectRequest,
            41 => Self::DisconnectAck,
            42 => Self::DisconnectNak,
            43 => Self::CoaRequest,
            44 => Self::CoaAck,
            45 => Self::CoaNak,
            other => Self::Other(other),
        }
    }
}

impl From<RadiusCode> for u8 {
    fn from(code: RadiusCode) -> Self {
        match code {
            RadiusCode::AccessRequest => 1,
            RadiusCode::AccessAccept => 2,
            RadiusCode::AccessReject => 3,
            RadiusCode::AccountingRequest => 4,
            RadiusCode::AccountingResponse => 5,
            RadiusCode::AccessChallenge => 11,
            RadiusCode::DisconnectRequest => 40,
            RadiusCode::DisconnectAck => 41,
            RadiusCode::DisconnectNak => 42,
            RadiusCode::CoaRequest => 43,
            RadiusCode::CoaAck => 44,
            RadiusCode::CoaNak => 45,
            RadiusCode::Other(raw) => raw,
        }
    }
}

/// An inbound authentication response, as exposed by the RADIUS client.
pub trait AuthResponse {
    /// The response code.
    fn code(&self) -> RadiusCode;

    /// Overwrites the response code.
    fn set_code(&mut self, code: RadiusCode);

    /// Returns `true` if the response carries the attribute.
    ///
    /// For standard attributes `attr_type` is the attribute type and
    /// `vendor_id`/`attr_id` are zero. For vendor attributes `attr_type` is
    /// [`ATTR_VENDOR_SPECIFIC`].
    fn get_attribute(&self, attr_type: u8, vendor_id: u32, attr_id: u8) -> bool;
}

/// A decoded attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Attribute {
    Standard { attr_type: u8, value: Vec<u8> },
    Vendor { vendor_id: u32, vendor_type: u8, value: Vec<u8> },
}

/// A decoded response packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadiusReply {
    pub identifier: u8,
    pub code: RadiusCode,
    pub attributes: Vec<Attribute>,
}

impl RadiusReply {
    /// An empty reply with the given code.
    pub fn new(identifier: u8, code: RadiusCode) -> Self {
        Self {
            identifier,
            code,
            attributes: Vec::new(),
        }
    }

    /// Builder-style attribute append.
    pub fn with_attribute(mut self, attr: Attribute) -> Self {
        self.attributes.push(attr);
        self
    }
}

impl AuthResponse for RadiusReply {
    fn code(&self) -> RadiusCode {
        self.code
    }

    fn set_code(&mut self, code: RadiusCode) {
        self.code = code;
    }

    fn get_attribute(&self, attr_type: u8, vendor_id: u32, attr_id: u8) -> bool {
        self.attributes.iter().any(|attr| match attr {
            Attribute::Standard { attr_type: t, .. } => {
                attr_type != ATTR_VENDOR_SPECIFIC && *t == attr_type
            }
            Attribute::Vendor { vendor_id: v, vendor_type, .. } => {
                attr_type == ATTR_VENDOR_SPECIFIC && *v == vendor_id && *vendor_type == attr_id
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// A policy shim run on every authentication response before normal
/// processing.
///
/// Hooks run synchronously, once per response. They have no failure mode:
/// a hook that does not apply leaves the response untouched.
pub trait ResponseHook: Send + Sync + 'static {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Inspects and possibly rewrites the response. Returns `true` if the
    /// response was modified.
    fn apply(&self, response: &mut dyn AuthResponse) -> bool;
}

/// Treats `Access-Reject` carrying `Mikrotik-Rate-Limit` as
/// `Access-Accept`.
///
/// Some servers express "accept, but throttled" as a reject with a rate
/// limit attached. Rewriting the code here means accounting and shaping
/// only ever see accept or reject.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimitRejectOverride;

impl ResponseHook for RateLimitRejectOverride {
    fn name(&self) -> &'static str {
        "mikrotik-rate-limit-reject"
    }

    fn apply(&self, response: &mut dyn AuthResponse) -> bool {
        if response.code() != RadiusCode::AccessReject {
            return false;
        }
        if !response.get_attribute(ATTR_VENDOR_SPECIFIC, VENDOR_MIKROTIK, MIKROTIK_RATE_LIMIT) {
            return false;
        }
        tracing::info!("Access-Reject with Mikrotik-Rate-Limit, treating as Access-Accept");
        response.set_code(RadiusCode::AccessAccept);
        true
    }
}

/// Runs every hook over `response` in order. Returns how many of them
/// modified it.
pub fn run_response_hooks(hooks: &[Box<dyn ResponseHook>], response: &mut dyn AuthResponse) -> usize {
    let mut rewritten = 0;
    for hook in hooks {
        if hook.apply(response) {
            tracing::debug!(hook = hook.name(), "response rewritten");
            rewritten += 1;
        }
    }
    rewritten
}

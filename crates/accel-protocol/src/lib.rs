//! Protocol-facing types for accel.
//!
//! This crate holds everything the session core shares with the protocol
//! front-ends and AAA clients without owning any session state:
//!
//! - **Types** ([`SessionId`], [`HwAddr`], [`TerminateCause`],
//!   [`Counters`]): identities and bookkeeping values.
//! - **DHCPv6** ([`match_client_id`]): correlating a client DUID with a
//!   subscriber's hardware address.
//! - **RADIUS** ([`ResponseHook`], [`RateLimitRejectOverride`]): policy
//!   shims applied to authentication responses before they are acted on.
//! - **Codec** ([`Codec`], [`JsonCodec`]): how session backups are
//!   turned into bytes.
//!
//! # Architecture
//!
//! ```text
//! Front-ends / RADIUS / DHCPv6 → Protocol (ids, hooks, matcher) → Session core
//! ```

mod codec;
mod error;
mod types;

pub mod dhcpv6;
pub mod radius;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use dhcpv6::{Dhcpv6Option, DuidType, match_client_id};
pub use error::ProtocolError;
pub use radius::{
    Attribute, AuthResponse, RadiusCode, RadiusReply, RateLimitRejectOverride, ResponseHook,
    run_response_hooks,
};
pub use types::{Counters, ETH_ALEN, HwAddr, SessionId, TerminateCause};

//! Core protocol definitions for the rfchat point-to-point link
//!
//! This crate holds everything both ends of a link must agree on, plus the
//! narrow contracts the runtime drives:
//!
//! - [`protocol`] - the service identifier and the newline line codec
//! - [`types`] - peers, roles and session identifiers
//! - [`permission`] - the three capabilities a link needs and their state
//! - [`radio`] - the radio capability and permission provider traits
//! - [`errors`] - the error taxonomy shared by every crate
//! - [`config`] - link tuning knobs
//!
//! ## Wire compatibility
//!
//! Two invariants make up the entire interoperability contract with existing
//! peers: both roles rendezvous on [`SERVICE_UUID`], and every message travels
//! as UTF-8 text followed by a single `\n`.

pub mod config;
pub mod errors;
pub mod permission;
pub mod protocol;
pub mod radio;
pub mod types;

pub use config::LinkConfig;
pub use errors::{
    DiscoveryError, EstablishError, LinkError, LinkResult, RadioError, SessionError,
};
pub use permission::{Permission, PermissionState};
pub use protocol::{
    decode_line, encode_line, DEFAULT_MAX_MESSAGE_LEN, DEFAULT_SERVICE_NAME, LINE_TERMINATOR,
    SERVICE_UUID,
};
pub use radio::{BoxedStream, DuplexStream, ListeningEndpoint, PermissionProvider, Radio};
pub use types::{ConnectionRole, PeerDevice, PeerFound, SessionId};

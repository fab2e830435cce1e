//! rfchat harness
//!
//! In-memory implementations of the radio and permission contracts. Streams
//! are backed by [`tokio::io::duplex`] pipes, so both ends of a link live in
//! the same process and tests can drive the remote side directly.

pub mod permissions;
pub mod radio;

pub use permissions::MockPermissions;
pub use radio::{spawn_echo, MockListener, MockPeer, MockRadio, RadioCall, PIPE_CAPACITY};

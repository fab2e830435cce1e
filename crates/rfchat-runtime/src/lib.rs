//! rfchat runtime
//!
//! The connection-establishment and session lifecycle core of the rfchat
//! link. It drives a [`Radio`](rfchat_core::Radio) through three stages:
//!
//! - [`discovery`] - scan lifecycle and the deduplicated peer registry
//! - [`establish`] - server accept vs client connect, at most one active session
//! - [`session`] - line-framed send/receive over the established stream
//!
//! [`permission`] gates every stage, [`workers`] owns every background task,
//! and [`events`] carries all outcomes to the presentation layer on a single
//! ordered channel.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rfchat_core::{LinkConfig, PermissionProvider, Radio};
//! use rfchat_runtime::{ChatLink, LinkEvent};
//!
//! # async fn example(
//! #     radio: Arc<dyn Radio>,
//! #     permissions: Arc<dyn PermissionProvider>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let (link, mut events) = ChatLink::new(radio, permissions, LinkConfig::default());
//! link.start_serving().await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         LinkEvent::SessionEstablished { .. } => link.send("hello").await?,
//!         LinkEvent::MessageReceived { text, .. } => println!("{}", text),
//!         LinkEvent::SessionEnded { .. } => break,
//!         _ => {}
//!     }
//! }
//!
//! link.teardown().await;
//! # Ok(())
//! # }
//! ```

pub mod discovery;
pub mod establish;
pub mod events;
pub mod link;
pub mod permission;
pub mod session;
pub mod workers;

pub use discovery::DiscoveryController;
pub use establish::ConnectionEstablisher;
pub use events::{event_channel, EventSink, EventStream, LinkEvent};
pub use link::ChatLink;
pub use permission::PermissionGate;
pub use session::{ActiveSessionSlot, ChatSession, ReceiveGate, SessionHandle};
pub use workers::WorkerSet;

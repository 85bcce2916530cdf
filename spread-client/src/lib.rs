//! Client for the Spread group communication daemon.
//!
//! Applications connect to a local or remote daemon over TCP, join named
//! groups and multicast messages to them with a chosen delivery guarantee
//! (unreliable through safe). Besides data, the daemon delivers membership
//! messages describing every view change of the groups a connection has
//! joined, including the virtual synchrony sets of a network partition or
//! merge.
//!
//! Messages are consumed in one of two ways:
//!
//! - pulled with [`Connection::receive`], or
//! - pushed to [`BasicListener`]s and [`AdvancedListener`]s by a dispatcher
//!   thread that runs while at least one listener is registered.
//!
//! # Modules
//!
//! - [`connection`]: the session, handshake and send/receive paths
//! - [`message`]: outgoing and incoming messages
//! - [`membership`]: decoded view changes
//! - [`group`]: group names and joined-group handles
//! - [`service`]: service-type bits and reliability levels
//! - [`codec`]: byte-order aware integer and group-name fields
//! - [`auth`]: pluggable authentication
//! - [`config`]: connection options

pub mod auth;
pub mod codec;
pub mod config;
pub mod connection;
mod dispatcher;
pub mod error;
mod frame;
pub mod group;
mod handshake;
pub mod listener;
pub mod membership;
pub mod message;
pub mod protocol;
pub mod service;
mod transport;
pub mod view;

pub use auth::{AuthError, AuthMethod, Authenticator, NullAuth};
pub use config::ConnectOptions;
pub use connection::Connection;
pub use error::{Error, Result};
pub use group::{Group, GroupHandle};
pub use listener::{AdvancedListener, BasicListener};
pub use membership::{MembershipCause, MembershipInfo};
pub use message::{Direction, Message};
pub use protocol::{protocol_version, Version};
pub use service::{Reliability, ServiceType};
pub use view::{ViewId, VirtualSynchronySet};

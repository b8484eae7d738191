//! UDP transport to and from a Loxone Miniserver.
//!
//! The Miniserver emits one text message per datagram (virtual UDP outputs)
//! and accepts the same format on its virtual UDP inputs.
//!
//! - [`MiniserverListener`] binds `udp://0.0.0.0:<port>`, decodes every
//!   datagram and raises a status or action event. Each datagram, decodable or
//!   not, counts as liveness evidence.
//! - [`MiniserverSender`] encodes outgoing messages and sends them to
//!   `udp://<host>:<port>`, best effort.

pub mod error;
pub mod listener;
pub mod option;
pub mod sender;

pub use error::{MiniserverError, Result};
pub use listener::{
    MiniserverListener, LISTENER_OUTDATED, MAX_DATAGRAM_SIZE, RECEIVE_ERROR_BACKOFF,
};
pub use option::{prefer_ipv4, MiniserverOption};
pub use sender::{MiniserverSender, SEND_QUEUE_CAPACITY};

//! Narrow external-collaborator interfaces.
//!
//! The core never implements a production object store, keychain, or peer
//! transport — it only consumes them through these traits. The `adapters`
//! module ships in-memory implementations suitable for tests and demos.

mod keychain;
mod mail;
mod object_store;
mod peer_transport;
mod web;

pub use keychain::KeychainPort;
pub use mail::MailPort;
pub use object_store::{ObjectStorePort, StoredObject};
pub use peer_transport::PeerTransportPort;
pub use web::WebEndpointPort;

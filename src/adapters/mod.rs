//! In-memory reference implementations of the external ports, suitable for
//! tests and demos. None of these is meant to back a production deployment.

mod memory_keychain;
mod memory_object_store;
mod memory_peer_transport;

pub use memory_keychain::MemoryKeychain;
pub use memory_object_store::MemoryObjectStore;
pub use memory_peer_transport::MemoryPeerTransport;

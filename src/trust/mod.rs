//! Device-level trust relationships and the social trust graph.

pub mod graph;
pub mod store;

pub use graph::{CaDeviceTrustVerifier, DeviceTrustVerifier, EdgeGraph, EvaluatedTrust, SocialGraphSummary, TrustChainNode, TrustPath};
pub use store::{TrustRelationship, TrustStore};

//! Networking module
//!
//! Nodes exchange whole chains over TCP and reconcile with the
//! longest-valid-chain rule.
//!
//! # Features
//! - Length-prefixed JSON framing
//! - Chain server answering chain and height requests
//! - Best-effort reconciliation (unreachable peers are skipped)

pub mod consensus;
pub mod message;
pub mod peer;
pub mod server;

pub use consensus::{
    adopt_candidate, apply_candidates, Candidate, ChainFetcher, PeerCoordinator, ReconcileReport,
    SkippedPeer,
};
pub use message::{Message, MAGIC, MAX_MESSAGE_SIZE};
pub use peer::{normalize_address, PeerError, PeerSet, MAX_PEERS};
pub use server::{ChainServer, MessageCodec, TcpChainFetcher, DEFAULT_FETCH_TIMEOUT};

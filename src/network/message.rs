//! Network message types for chain exchange
//!
//! Nodes only ever pull whole chains from each other; there is no gossip of
//! individual blocks or transactions.

use crate::core::Block;
use serde::{Deserialize, Serialize};

/// Magic bytes for message framing
pub const MAGIC: [u8; 4] = *b"DSLB";

/// Largest accepted frame payload (16 MiB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Network message types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Request the peer's full chain
    GetChain,

    /// Response with every block from genesis to tip
    Chain(Vec<Block>),

    /// Request current chain height
    GetHeight,

    /// Response with chain height
    Height(u64),

    /// Keep-alive ping
    Ping(u64),

    /// Keep-alive pong response
    Pong(u64),
}

impl Message {
    /// Serialize message to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize message from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Get message type name for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::GetChain => "GetChain",
            Message::Chain(_) => "Chain",
            Message::GetHeight => "GetHeight",
            Message::Height(_) => "Height",
            Message::Ping(_) => "Ping",
            Message::Pong(_) => "Pong",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Chain, ChainParams};

    #[test]
    fn test_message_serialization() {
        let msg = Message::Ping(12345);
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(Message::from_bytes(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_chain_message_carries_blocks() {
        let chain = Chain::new(ChainParams::with_difficulty(4)).unwrap();
        let msg = Message::Chain(chain.blocks().to_vec());

        let decoded = Message::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        match decoded {
            Message::Chain(blocks) => assert_eq!(blocks, chain.blocks()),
            other => panic!("Wrong message type: {}", other.type_name()),
        }
    }
}

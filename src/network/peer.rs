//! Peer addresses and transport errors
//!
//! A node keeps no state about its peers beyond their addresses; chains are
//! pulled on demand during reconciliation.

use std::collections::BTreeSet;
use thiserror::Error;

/// Maximum number of peers tracked by one node
pub const MAX_PEERS: usize = 64;

/// Peer communication errors
#[derive(Error, Debug)]
pub enum PeerError {
    #[error("Invalid peer address: {0}")]
    InvalidAddress(String),
    #[error("Peer {peer} unreachable: {reason}")]
    Unreachable { peer: String, reason: String },
    #[error("Peer {0} timed out")]
    Timeout(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Unexpected response from {peer}: {got}")]
    UnexpectedResponse { peer: String, got: String },
    #[error("Max peers reached")]
    MaxPeersReached,
}

/// Normalise a `host:port` address
///
/// Surrounding whitespace and an optional `tcp://` scheme are dropped and
/// the host is lowercased. The port must be a non-zero u16.
pub fn normalize_address(addr: &str) -> Result<String, PeerError> {
    let trimmed = addr.trim();
    let bare = trimmed.strip_prefix("tcp://").unwrap_or(trimmed);

    let (host, port) = bare
        .rsplit_once(':')
        .ok_or_else(|| PeerError::InvalidAddress(addr.to_string()))?;

    let port: u16 = port
        .parse()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| PeerError::InvalidAddress(addr.to_string()))?;

    if host.is_empty() || host.chars().any(char::is_whitespace) {
        return Err(PeerError::InvalidAddress(addr.to_string()));
    }

    Ok(format!("{}:{}", host.to_ascii_lowercase(), port))
}

/// The set of remote nodes this node reconciles with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerSet {
    peers: BTreeSet<String>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from raw addresses, skipping invalid ones
    pub fn from_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for addr in addresses {
            if let Err(e) = set.add(addr.as_ref()) {
                log::warn!("Ignoring peer: {}", e);
            }
        }
        set
    }

    /// Add a peer; returns false if it was already known
    pub fn add(&mut self, addr: &str) -> Result<bool, PeerError> {
        let addr = normalize_address(addr)?;
        if self.peers.contains(&addr) {
            return Ok(false);
        }
        if self.peers.len() >= MAX_PEERS {
            return Err(PeerError::MaxPeersReached);
        }
        log::debug!("Added peer: {}", addr);
        Ok(self.peers.insert(addr))
    }

    /// Remove a peer
    pub fn remove(&mut self, addr: &str) -> bool {
        normalize_address(addr)
            .map(|addr| self.peers.remove(&addr))
            .unwrap_or(false)
    }

    pub fn contains(&self, addr: &str) -> bool {
        normalize_address(addr)
            .map(|addr| self.peers.contains(&addr))
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.peers.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

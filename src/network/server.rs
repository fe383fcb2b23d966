//! TCP transport: the chain server and the chain fetcher
//!
//! Frames are `MAGIC (4) | length (u32 BE) | JSON payload`.

use crate::core::{Block, Chain};
use crate::network::consensus::ChainFetcher;
use crate::network::message::{Message, MAGIC, MAX_MESSAGE_SIZE};
use crate::network::peer::PeerError;
use bytes::{Buf, BufMut, BytesMut};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_util::codec::{Decoder, Encoder, Framed};

const HEADER_LEN: usize = 8;

/// Default bound on one chain fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Message codec for length-prefixed framing
pub struct MessageCodec;

impl Encoder<Message> for MessageCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let data = item
            .to_bytes()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

        if data.len() > MAX_MESSAGE_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Message too large: {} bytes", data.len()),
            ));
        }

        dst.reserve(HEADER_LEN + data.len());
        dst.put_slice(&MAGIC);
        dst.put_u32(data.len() as u32);
        dst.put_slice(&data);

        Ok(())
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        if src[..4] != MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Invalid magic bytes",
            ));
        }

        let len = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Frame too large: {} bytes", len),
            ));
        }

        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let data = src.split_to(len);

        let msg = Message::from_bytes(&data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

        Ok(Some(msg))
    }
}

/// Serves the local chain to peers
pub struct ChainServer {
    listener: TcpListener,
}

impl ChainServer {
    /// Bind to an address such as `0.0.0.0:8333`
    pub async fn bind(addr: &str) -> Result<Self, io::Error> {
        let listener = TcpListener::bind(addr).await?;
        log::info!("Chain server listening on {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, io::Error> {
        self.listener.local_addr()
    }

    /// Accept connections until the listener fails
    pub async fn serve(self, chain: Arc<RwLock<Chain>>) -> Result<(), io::Error> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let chain = Arc::clone(&chain);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, chain).await {
                    log::warn!("Connection from {} failed: {}", addr, e);
                }
            });
        }
    }
}

/// Answer requests on one connection until the peer hangs up
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    chain: Arc<RwLock<Chain>>,
) -> Result<(), PeerError> {
    let mut framed = Framed::new(stream, MessageCodec);

    while let Some(msg) = framed.next().await {
        let msg = msg?;
        log::debug!("{} from {}", msg.type_name(), addr);

        let reply = match msg {
            Message::GetChain => Message::Chain(chain.read().await.blocks().to_vec()),
            Message::GetHeight => Message::Height(chain.read().await.height()),
            Message::Ping(nonce) => Message::Pong(nonce),
            other => {
                log::warn!("Ignoring unsolicited {} from {}", other.type_name(), addr);
                continue;
            }
        };
        framed.send(reply).await?;
    }

    log::debug!("Peer {} disconnected", addr);
    Ok(())
}

/// Pulls chains over TCP, one connection per request
#[derive(Debug, Clone)]
pub struct TcpChainFetcher {
    timeout: Duration,
}

impl Default for TcpChainFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_TIMEOUT)
    }
}

impl TcpChainFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Send one request and wait for its reply
    pub async fn request(&self, peer: &str, msg: Message) -> Result<Message, PeerError> {
        let exchange = async {
            let stream = TcpStream::connect(peer)
                .await
                .map_err(|e| PeerError::Unreachable {
                    peer: peer.to_string(),
                    reason: e.to_string(),
                })?;

            let mut framed = Framed::new(stream, MessageCodec);
            framed.send(msg).await?;

            match framed.next().await {
                Some(reply) => Ok(reply?),
                None => Err(PeerError::Unreachable {
                    peer: peer.to_string(),
                    reason: "connection closed".to_string(),
                }),
            }
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| PeerError::Timeout(peer.to_string()))?
    }

    /// Ask a peer for its chain height
    pub async fn fetch_height(&self, peer: &str) -> Result<u64, PeerError> {
        match self.request(peer, Message::GetHeight).await? {
            Message::Height(height) => Ok(height),
            other => Err(PeerError::UnexpectedResponse {
                peer: peer.to_string(),
                got: other.type_name().to_string(),
            }),
        }
    }
}

impl ChainFetcher for TcpChainFetcher {
    async fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>, PeerError> {
        match self.request(peer, Message::GetChain).await? {
            Message::Chain(blocks) => Ok(blocks),
            other => Err(PeerError::UnexpectedResponse {
                peer: peer.to_string(),
                got: other.type_name().to_string(),
            }),
        }
    }
}

//! Channel transports: how a connection handle reaches an actual server.
//!
//! The wire transport is deliberately thin plumbing: length-prefixed
//! bincode frames over a TCP stream, with connect/disconnect surfaced as
//! lifecycle events. Reliability and ordering come from the stream itself;
//! nothing here retries or re-derives delivery guarantees.

use crate::channel::{ChannelEvent, ConnectionHandle};
use log::{error, info, warn};
use serde::de::DeserializeOwned;
use shared::{encode_frame, ClientEvent, ServerEndpoint, ServerEvent, MAX_FRAME_BYTES};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Opens channels to servers. Connection setup is asynchronous: the caller
/// gets a handle immediately and learns the outcome through the handle's
/// event stream (`Connected` or `Disconnected`).
pub trait Transport: Send + Sync {
    fn open(&self, endpoint: &ServerEndpoint) -> ConnectionHandle;
}

/// Production transport: one TCP stream per channel, a reader task feeding
/// the handle's inbound queue and a writer task draining its outbound one.
pub struct TcpTransport;

impl Transport for TcpTransport {
    fn open(&self, endpoint: &ServerEndpoint) -> ConnectionHandle {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&connected);
        let target = endpoint.clone();
        tokio::spawn(run_channel(target, out_rx, in_tx, flag));

        ConnectionHandle::new(endpoint.clone(), out_tx, in_rx, connected)
    }
}

async fn run_channel(
    endpoint: ServerEndpoint,
    mut outbound: mpsc::UnboundedReceiver<ClientEvent>,
    inbound: mpsc::UnboundedSender<ChannelEvent>,
    connected: Arc<AtomicBool>,
) {
    let addr = format!("{}:{}", endpoint.address, endpoint.game_port());
    let stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Failed to connect to {}: {}", addr, e);
            let _ = inbound.send(ChannelEvent::Disconnected);
            return;
        }
    };

    info!("Connected to {}", addr);
    connected.store(true, Ordering::SeqCst);
    let _ = inbound.send(ChannelEvent::Connected);

    let (mut reader, mut writer) = stream.into_split();

    // Writer: drains the handle's outbound queue until the handle closes
    tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            match encode_frame(&event) {
                Ok(frame) => {
                    if writer.write_all(&frame).await.is_err() {
                        break;
                    }
                }
                Err(e) => error!("Failed to encode outbound event: {}", e),
            }
        }
        let _ = writer.shutdown().await;
    });

    // Reader: feeds the handle's inbound queue until EOF, error, or close
    loop {
        match read_frame::<ServerEvent, _>(&mut reader).await {
            Ok(Some(event)) => {
                if inbound.send(ChannelEvent::Message(event)).is_err() {
                    // Handle closed; late events are dropped by design of
                    // the subscription contract, not processed
                    break;
                }
            }
            Ok(None) => {
                let _ = inbound.send(ChannelEvent::Disconnected);
                break;
            }
            Err(e) => {
                warn!("Read error on {}: {}", addr, e);
                let _ = inbound.send(ChannelEvent::Disconnected);
                break;
            }
        }
    }
    connected.store(false, Ordering::SeqCst);
}

/// Reads one length-prefixed bincode frame. `Ok(None)` is clean EOF at a
/// frame boundary.
pub async fn read_frame<T, R>(reader: &mut R) -> io::Result<Option<T>>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", len),
        ));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    bincode::deserialize(&body)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// The far end of a channel opened through [`MemoryTransport`]: push server
/// events in, observe client intents out.
pub struct MemoryPeer {
    pub to_client: mpsc::UnboundedSender<ChannelEvent>,
    pub from_client: mpsc::UnboundedReceiver<ClientEvent>,
    pub connected: Arc<AtomicBool>,
}

/// In-memory transport for tests and offline development: every opened
/// channel reports `Connected` immediately and its far end is scriptable.
#[derive(Default)]
pub struct MemoryTransport {
    peers: Mutex<Vec<(String, MemoryPeer)>>,
    opens: Mutex<HashMap<String, usize>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns the oldest unclaimed peer for the endpoint.
    pub fn take_peer(&self, endpoint: &ServerEndpoint) -> Option<MemoryPeer> {
        let url = endpoint.canonical_url();
        let mut peers = self.peers.lock().unwrap();
        let index = peers.iter().position(|(u, _)| *u == url)?;
        Some(peers.remove(index).1)
    }

    /// How many channels have ever been opened to the endpoint.
    pub fn open_count(&self, endpoint: &ServerEndpoint) -> usize {
        let url = endpoint.canonical_url();
        self.opens.lock().unwrap().get(&url).copied().unwrap_or(0)
    }
}

impl Transport for MemoryTransport {
    fn open(&self, endpoint: &ServerEndpoint) -> ConnectionHandle {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));

        let _ = in_tx.send(ChannelEvent::Connected);

        let url = endpoint.canonical_url();
        *self.opens.lock().unwrap().entry(url.clone()).or_insert(0) += 1;
        self.peers.lock().unwrap().push((
            url,
            MemoryPeer {
                to_client: in_tx,
                from_client: out_rx,
                connected: Arc::clone(&connected),
            },
        ));

        ConnectionHandle::new(endpoint.clone(), out_tx, in_rx, connected)
    }
}

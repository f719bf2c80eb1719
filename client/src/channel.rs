//! Connection handles: one bidirectional event channel to one zone server.
//!
//! A handle owns the queues that link the session's event loop to the
//! transport tasks shuttling frames. Inbound delivery uses an explicit
//! subscription contract: [`ConnectionHandle::bind`] hands out the single
//! receiver, [`ConnectionHandle::unbind`] takes it back and discards
//! anything still queued. Rebinding after a handoff is therefore an
//! explicit unbind/bind pair; stale listeners cannot accumulate.

use log::{debug, warn};
use shared::{ClientEvent, ServerEndpoint};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Lifecycle and message stream delivered by the transport for one channel.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    Message(shared::ServerEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Opened, transport setup still in flight.
    Connecting,
    /// The one channel the session is bound to.
    Active,
    /// Pre-warmed, idle, awaiting promotion at handoff time.
    OnDeck,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    Closed,
    AlreadyBound,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::Closed => write!(f, "channel is closed"),
            ChannelError::AlreadyBound => write!(f, "channel is already bound"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// Exclusive claim on a handle's inbound event stream.
#[derive(Debug)]
pub struct Subscription {
    url: String,
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.rx.recv().await
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

pub struct ConnectionHandle {
    endpoint: ServerEndpoint,
    url: String,
    state: ChannelState,
    outbound: Option<mpsc::UnboundedSender<ClientEvent>>,
    inbound: Option<mpsc::UnboundedReceiver<ChannelEvent>>,
    connected: Arc<AtomicBool>,
}

impl ConnectionHandle {
    /// Constructed by a transport: the transport keeps the far ends of both
    /// queues and the write half of the connected flag.
    pub fn new(
        endpoint: ServerEndpoint,
        outbound: mpsc::UnboundedSender<ClientEvent>,
        inbound: mpsc::UnboundedReceiver<ChannelEvent>,
        connected: Arc<AtomicBool>,
    ) -> Self {
        let url = endpoint.canonical_url();
        Self {
            endpoint,
            url,
            state: ChannelState::Connecting,
            outbound: Some(outbound),
            inbound: Some(inbound),
            connected,
        }
    }

    pub fn endpoint(&self) -> &ServerEndpoint {
        &self.endpoint
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Whether the transport has completed connection setup. Independent of
    /// [`ChannelState`]: an on-deck handle is typically already connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn mark_active(&mut self) {
        match self.state {
            ChannelState::Connecting | ChannelState::OnDeck => {
                self.state = ChannelState::Active;
            }
            state => warn!("cannot activate channel {} from {:?}", self.url, state),
        }
    }

    pub fn mark_on_deck(&mut self) {
        match self.state {
            ChannelState::Connecting => self.state = ChannelState::OnDeck,
            // An active handle is torn down, never demoted
            state => warn!("cannot put channel {} on deck from {:?}", self.url, state),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.state != ChannelState::Closed && self.inbound.is_none()
    }

    /// Claims the inbound event stream. Events queued before the claim are
    /// delivered to the new subscriber in order.
    pub fn bind(&mut self) -> Result<Subscription, ChannelError> {
        if self.state == ChannelState::Closed {
            return Err(ChannelError::Closed);
        }
        match self.inbound.take() {
            Some(rx) => Ok(Subscription {
                url: self.url.clone(),
                rx,
            }),
            None => Err(ChannelError::AlreadyBound),
        }
    }

    /// Returns a subscription, discarding whatever it still had queued. A
    /// late event on an unbound handle must never reach the session.
    pub fn unbind(&mut self, mut sub: Subscription) {
        if sub.url != self.url {
            warn!(
                "subscription for {} returned to channel {}; dropping it",
                sub.url, self.url
            );
            return;
        }

        let mut discarded = 0usize;
        while sub.rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!("discarded {} queued events on {}", discarded, self.url);
        }

        if self.state != ChannelState::Closed {
            self.inbound = Some(sub.rx);
        }
    }

    /// Sends an intent to the server. Fails once the channel is closed or
    /// the transport side has died.
    pub fn emit(&self, event: ClientEvent) -> Result<(), ChannelError> {
        match &self.outbound {
            Some(tx) => tx.send(event).map_err(|_| ChannelError::Closed),
            None => Err(ChannelError::Closed),
        }
    }

    /// Tears the channel down: pending work on it is cancelled, queued
    /// events are dropped, and the transport tasks wind down once their
    /// queue ends. Idempotent.
    pub fn close(&mut self) {
        if self.state == ChannelState::Closed {
            return;
        }
        debug!("closing channel {}", self.url);
        self.state = ChannelState::Closed;
        self.outbound = None;
        self.inbound = None;
        self.connected.store(false, Ordering::SeqCst);
    }
}

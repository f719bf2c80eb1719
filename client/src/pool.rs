//! ConnectionPool: the single active channel plus the pre-warmed on-deck
//! channels, keyed by canonical server URL.
//!
//! Pre-warming removes connection-setup latency from the critical path of
//! a handoff, which is otherwise the dominant source of visible hitches
//! during zone transitions.

use crate::channel::{ChannelError, ConnectionHandle, Subscription};
use crate::transport::Transport;
use log::{debug, info, warn};
use shared::ServerEndpoint;
use std::collections::HashMap;
use std::sync::Arc;

pub struct ConnectionPool {
    transport: Arc<dyn Transport>,
    active: Option<ConnectionHandle>,
    on_deck: HashMap<String, ConnectionHandle>,
}

impl ConnectionPool {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            active: None,
            on_deck: HashMap::new(),
        }
    }

    pub fn active(&self) -> Option<&ConnectionHandle> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut ConnectionHandle> {
        self.active.as_mut()
    }

    pub fn active_url(&self) -> Option<&str> {
        self.active.as_ref().map(|h| h.url())
    }

    pub fn has_on_deck(&self, endpoint: &ServerEndpoint) -> bool {
        self.on_deck.contains_key(&endpoint.canonical_url())
    }

    pub fn on_deck_len(&self) -> usize {
        self.on_deck.len()
    }

    /// Makes `endpoint` the active channel. Idempotent by canonical URL: an
    /// existing channel to the same server is reused, a matching on-deck
    /// handle is promoted, and only otherwise is a new channel opened.
    pub fn connect(&mut self, endpoint: &ServerEndpoint) {
        let url = endpoint.canonical_url();
        if self.active.as_ref().map(|h| h.url()) == Some(url.as_str()) {
            debug!("Already connected to {}", url);
            return;
        }

        if let Some(mut old) = self.active.take() {
            warn!("Replacing active channel {} with {}", old.url(), url);
            old.close();
        }

        let mut handle = match self.on_deck.remove(&url) {
            Some(handle) => {
                debug!("Reusing on-deck channel for {}", url);
                handle
            }
            None => {
                info!("Initializing connection with {}", url);
                self.transport.open(endpoint)
            }
        };
        handle.mark_active();
        self.active = Some(handle);
    }

    /// Binds the session to the active channel's event stream.
    pub fn bind_active(&mut self) -> Result<Subscription, ChannelError> {
        match self.active.as_mut() {
            Some(handle) => handle.bind(),
            None => Err(ChannelError::Closed),
        }
    }

    /// Reconciles the on-deck registry against the authoritative candidate
    /// list the current server advertises. Full set-difference per event:
    /// retained servers keep their handle (no reconnect), dropped servers
    /// are closed, new servers are opened on-deck. The active channel is
    /// never closed by this path.
    pub fn prepare_on_deck(&mut self, servers: &[ServerEndpoint]) {
        let active_url = self.active.as_ref().map(|h| h.url().to_string());
        let mut next: HashMap<String, ConnectionHandle> = HashMap::new();

        for endpoint in servers {
            let url = endpoint.canonical_url();
            if next.contains_key(&url) {
                continue;
            }
            if active_url.as_deref() == Some(url.as_str()) {
                debug!("On-deck candidate {} is already active", url);
                continue;
            }
            match self.on_deck.remove(&url) {
                Some(handle) => {
                    next.insert(url, handle);
                }
                None => {
                    info!("Opening on-deck channel to {}", url);
                    let mut handle = self.transport.open(endpoint);
                    handle.mark_on_deck();
                    next.insert(url, handle);
                }
            }
        }

        for (url, mut handle) in self.on_deck.drain() {
            info!("Pruning on-deck channel {}", url);
            handle.close();
        }
        self.on_deck = next;
    }

    /// Migrates the active channel to `endpoint`. The old active handle is
    /// unbound (discarding whatever it still had queued) and closed; the
    /// on-deck handle for the target is promoted in place, or a fresh
    /// channel is opened as the logged fallback. Returns the session's new
    /// subscription and whether promotion avoided a reconnect.
    pub fn handoff(
        &mut self,
        endpoint: &ServerEndpoint,
        old_sub: Option<Subscription>,
    ) -> Result<(Subscription, bool), ChannelError> {
        let url = endpoint.canonical_url();

        match self.active.take() {
            Some(mut old) => {
                if let Some(sub) = old_sub {
                    old.unbind(sub);
                }
                old.close();
            }
            None => warn!("Handoff to {} with no active channel", url),
        }

        let (mut handle, promoted) = match self.on_deck.remove(&url) {
            Some(handle) => {
                info!("Using on-deck for {}", url);
                (handle, true)
            }
            None => {
                warn!("No on-deck channel for {}; initializing connection", url);
                (self.transport.open(endpoint), false)
            }
        };
        handle.mark_active();
        let sub = handle.bind()?;
        self.active = Some(handle);
        Ok((sub, promoted))
    }

    /// Tears down every channel the pool owns.
    pub fn close_all(&mut self) {
        if let Some(mut handle) = self.active.take() {
            handle.close();
        }
        for (_, mut handle) in self.on_deck.drain() {
            handle.close();
        }
    }
}

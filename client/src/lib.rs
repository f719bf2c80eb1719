//! # Zone Client Library
//!
//! Client-side implementation of entity replication with live server
//! handoff. The client keeps a local view of a shared world consistent
//! with whichever authoritative zone server currently owns the player's
//! region, and migrates its connection between servers without visible
//! state loss or duplicate entities.
//!
//! ## Architecture Overview
//!
//! The client is intentionally non-authoritative: it applies state the
//! servers push and predicts only its own player between updates. The
//! interesting machinery is connection management:
//!
//! ### Entity Replication
//! Every world object lives in the [`store::EntityStore`], keyed by a
//! cluster-wide id. Updates are field-presence merges, so servers can push
//! small deltas; an update for an unknown id creates the entity. Entities
//! leave the store on an explicit removal event or when the periodic
//! garbage collector finds them outside the player's relevance radius.
//!
//! ### Server Handoff
//! The [`pool::ConnectionPool`] keeps the single active channel plus a
//! registry of pre-warmed "on-deck" channels to the neighbouring zone
//! servers the current server advertises. When the server orders a
//! handoff, the matching on-deck channel is promoted in place, hiding
//! connection-setup latency from the transition. Subscriptions are
//! explicit values, so rebinding the session after a handoff is an
//! unbind/bind pair and stale listeners cannot accumulate.
//!
//! ## Module Organization
//!
//! - [`entity`] — replicated records and the merge rule
//! - [`store`] — the deduplicated world view and collaborator notifications
//! - [`channel`] — connection handles and the subscription contract
//! - [`transport`] — TCP framing and the in-memory test transport
//! - [`pool`] — active/on-deck channel ownership and the handoff
//! - [`session`] — event dispatch, outbound intents, the run loop
//! - [`gc`] — the relevance sweep
//! - [`input`] — key sampling and local-player steering
//! - [`render`] — the macroquad drawing collaborator

pub mod channel;
pub mod entity;
pub mod gc;
pub mod input;
pub mod pool;
pub mod render;
pub mod session;
pub mod store;
pub mod transport;

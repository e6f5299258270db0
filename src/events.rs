//! Engine event bus.
//!
//! Views subscribe here so they can re-render when the session or a cache
//! entry changes state. Publishing is fire-and-forget: an engine with no
//! subscribers is a perfectly healthy engine.

use tokio::sync::broadcast;

use crate::cache::{CacheKey, EntryState};
use crate::session::SessionState;

/// Default capacity of the broadcast channel. Slow subscribers that lag
/// past this many events miss the oldest ones (tokio broadcast semantics);
/// a view that lags should simply re-read through the cache.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    SessionChanged { state: SessionState },
    CacheChanged { key: CacheKey, state: EntryState },
}

pub type EventSender = broadcast::Sender<EngineEvent>;

pub fn channel() -> EventSender {
    broadcast::channel(EVENT_CHANNEL_CAPACITY).0
}

/// Publish an event to all subscribers. Returns silently when nobody is
/// listening.
pub fn publish(tx: &EventSender, event: EngineEvent) {
    let _ = tx.send(event);
}
